use cuesync::snapshot::canonical_string;
use cuesync::{BallId, GameStateSnapshot, ShotInput, ShotSimulator, SimConfig, TableConfig};

fn simulator() -> ShotSimulator {
    ShotSimulator::new(TableConfig::default(), SimConfig::default())
}

fn shots() -> Vec<ShotInput> {
    vec![
        ShotInput::new(0.0, 1.0),
        ShotInput::new(0.12, 0.7).with_spin(0.8, 0.0),
        ShotInput::new(-0.4, 0.5).with_spin(-0.9, 0.6),
        ShotInput::new(2.7, 0.9).with_spin(0.0, -1.0),
    ]
}

#[test]
fn test_independent_worlds_produce_identical_outcomes() {
    let mut a = simulator();
    let mut b = simulator();

    for input in shots() {
        let left = a.simulate(&input).unwrap();
        let right = b.simulate(&input).unwrap();
        assert_eq!(left.steps, right.steps);
        assert_eq!(left.hash, right.hash);
        assert_eq!(left.tally, right.tally);
        assert_eq!(left.pocket_events.len(), right.pocket_events.len());
        assert_eq!(
            canonical_string(&left.snapshot),
            canonical_string(&right.snapshot)
        );
    }
}

#[test]
fn test_stepwise_and_synchronous_replay_agree() {
    let input = ShotInput::new(0.05, 0.8).with_spin(0.3, -0.2);

    let mut animated = simulator();
    animated.begin(&input).unwrap();
    let mut frames = 0;
    let stepped = loop {
        match animated.step() {
            cuesync::simulation::StepResult::Settled(outcome) => break outcome,
            _ => frames += 1,
        }
    };

    let replayed = simulator().simulate(&input).unwrap();
    assert_eq!(stepped.steps, replayed.steps);
    assert_eq!(stepped.steps, frames + 1);
    assert_eq!(stepped.hash, replayed.hash);
}

#[test]
fn test_distinct_inputs_produce_distinct_hashes() {
    let a = simulator().simulate(&ShotInput::new(0.0, 0.6)).unwrap();
    let b = simulator().simulate(&ShotInput::new(0.5, 0.6)).unwrap();
    assert_ne!(a.hash, b.hash);
}

#[test]
fn test_every_shot_settles_within_the_safety_bound() {
    let config = SimConfig::default();
    let max_steps = config.max_steps;
    for (i, angle) in [0.0f32, 1.3, 3.1, -2.2].into_iter().enumerate() {
        let mut sim = ShotSimulator::new(TableConfig::default(), config.clone());
        let spin = if i % 2 == 0 { 1.0 } else { -1.0 };
        let outcome = sim
            .simulate(&ShotInput::new(angle, 1.0).with_spin(spin, spin))
            .unwrap();
        assert!(outcome.steps <= max_steps);
        assert!(!outcome.forced, "angle {angle} hit the safety bound");
    }
}

#[test]
fn test_degenerate_input_terminates() {
    let mut sim = simulator();
    let outcome = sim
        .simulate(&ShotInput::new(f32::NAN, f32::INFINITY).with_spin(f32::NAN, 99.0))
        .unwrap();
    assert!(outcome.steps <= sim.config().max_steps);
}

#[test]
fn test_tight_step_cap_forces_settle() {
    let config = SimConfig {
        max_steps: 30,
        ..SimConfig::default()
    };
    let mut sim = ShotSimulator::new(TableConfig::default(), config);
    let outcome = sim.simulate(&ShotInput::new(0.0, 1.0)).unwrap();
    assert!(outcome.forced);
    assert_eq!(outcome.steps, 30);
    for ball in &outcome.snapshot.balls {
        assert_eq!(ball.linvel, [0.0; 3]);
        assert_eq!(ball.angvel, [0.0; 3]);
    }
}

#[test]
fn test_snapshot_restore_round_trip() {
    let mut sim = simulator();
    sim.simulate(&ShotInput::new(0.2, 0.9)).unwrap();
    let before = sim.snapshot();

    let mut other = simulator();
    other.restore(&before);
    let after = other.snapshot();

    assert_eq!(before.hash(), after.hash());
    assert_eq!(before.pocketed, after.pocketed);
    assert!(before.max_divergence(&after).unwrap() < 1e-5);
}

#[test]
fn test_restored_worlds_stay_in_lockstep() {
    let mut source = simulator();
    source.simulate(&ShotInput::new(0.0, 1.0)).unwrap();
    let snapshot: GameStateSnapshot = source.snapshot();

    let mut a = simulator();
    let mut b = simulator();
    a.restore(&snapshot);
    b.restore(&snapshot);

    let input = ShotInput::new(1.9, 0.8).with_spin(-0.5, 0.0);
    let left = a.simulate(&input).unwrap();
    let right = b.simulate(&input).unwrap();
    assert_eq!(left.steps, right.steps);
    assert_eq!(left.hash, right.hash);
}

#[test]
fn test_scratch_shot_is_deterministic() {
    // Straight at the nearest pocket from the head spot.
    let table = TableConfig::default();
    let head = table.head_spot();
    let pocket = table
        .pockets()
        .into_iter()
        .min_by(|p, q| {
            p.center
                .distance(head)
                .total_cmp(&q.center.distance(head))
        })
        .unwrap();
    let aim = pocket.center - head;
    let input = ShotInput::new(aim.y.atan2(aim.x), 0.6);

    let left = simulator().simulate(&input).unwrap();
    let right = simulator().simulate(&input).unwrap();
    assert_eq!(left.hash, right.hash);
    assert_eq!(left.tally.scratch, right.tally.scratch);
    assert!(left.snapshot.ball(BallId(0)).is_some());
}
