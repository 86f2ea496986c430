mod driver;

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;

use cuesync::net::is_valid_room_code;
use driver::{Match, MatchOptions};

#[derive(Parser)]
#[command(name = "cuesync-sim")]
#[command(about = "Plays a scripted lockstep billiards match between two in-process peers")]
struct Args {
    #[arg(short, long, default_value_t = 6, help = "Number of shots to play")]
    shots: u32,

    #[arg(short, long, default_value_t = 0.7, help = "Shot power in [0, 1]")]
    power: f32,

    #[arg(long, default_value_t = 16, help = "Frame interval in ms")]
    frame_ms: u64,

    #[arg(long, help = "Run frames back to back instead of on the wall clock")]
    fast: bool,

    #[arg(long, help = "Nudge a ball on the guest before this shot to force a resync")]
    perturb_at: Option<u32>,

    #[arg(long, default_value = "QX7K")]
    room: String,

    #[arg(long, default_value_t = 200_000, help = "Give up after this many frames")]
    max_frames: u64,

    #[arg(long, help = "Print the final snapshot as JSON")]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !is_valid_room_code(&args.room) {
        bail!("room code must be 4-8 uppercase letters or digits");
    }
    if args.frame_ms == 0 {
        bail!("frame interval must be positive");
    }

    let options = MatchOptions {
        shots: args.shots,
        power: args.power,
        frame: Duration::from_millis(args.frame_ms),
        fast: args.fast,
        perturb_at: args.perturb_at,
        room: args.room,
        max_frames: args.max_frames,
    };

    let mut game = Match::new(options);
    let report = game.run().await?;

    for shot in &report.shots {
        println!(
            "shot {:>2}  {}  steps {:>5}  host {}  guest {}  {}",
            shot.shot_id,
            shot.shooter,
            shot.steps,
            shot.host_hash,
            shot.guest_hash,
            if shot.host_hash != shot.guest_hash {
                "DIVERGED"
            } else if shot.resynced {
                "resynced"
            } else {
                "ok"
            }
        );
    }
    println!(
        "resyncs: {}  final hash: {}  rtt: {:.1} ms",
        report.resyncs, report.final_hash, report.rtt_ms
    );
    if let Some(verdict) = &report.verdict {
        println!("{}", verdict);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.snapshot)?);
    }

    Ok(())
}
