use std::fmt::Write;

use rkyv::{Archive, Deserialize, Serialize};

use super::GameStateSnapshot;

/// Decimal places kept per coordinate before hashing.
pub const HASH_DECIMALS: u32 = 3;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct StateHash(pub u32);

impl std::fmt::Display for StateHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[inline]
fn quantize(value: f32) -> i64 {
    let scale = 10f64.powi(HASH_DECIMALS as i32);
    (f64::from(value) * scale).round() as i64
}

fn push_quantized(out: &mut String, values: &[f32]) {
    for (i, &v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}", quantize(v));
    }
}

/// The text the hash is computed over. Integers after fixed-point scaling, so
/// `-0.0` and representation noise below the precision collapse to the same text.
pub fn canonical_string(snapshot: &GameStateSnapshot) -> String {
    let mut out = String::with_capacity(snapshot.balls.len() * 64);
    for ball in &snapshot.balls {
        let _ = write!(out, "{}:", ball.number);
        push_quantized(&mut out, &ball.position);
        out.push('|');
        push_quantized(&mut out, &ball.linvel);
        out.push('|');
        push_quantized(&mut out, &ball.angvel);
        out.push('|');
        push_quantized(&mut out, &ball.orientation);
        out.push(';');
    }

    let join = |list: &[u8]| {
        list.iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",")
    };
    let _ = write!(
        out,
        "S[{}]T[{}]E[{}]",
        join(&snapshot.pocketed.solids),
        join(&snapshot.pocketed.stripes),
        u8::from(snapshot.pocketed.eight)
    );
    out
}

impl GameStateSnapshot {
    pub fn hash(&self) -> StateHash {
        StateHash(fnv1a(canonical_string(self).as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::snapshot::{BallState, PocketedState};
    use crate::table::BallId;

    fn sample() -> GameStateSnapshot {
        GameStateSnapshot::new(
            vec![
                BallState::at_rest(BallId(0), Vec3::new(-0.635, 0.0, 0.0)),
                BallState::at_rest(BallId(4), Vec3::new(0.7, 0.0, 0.1)),
            ],
            PocketedState::default(),
        )
    }

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(fnv1a(b""), 0x811c_9dc5);
        assert_eq!(fnv1a(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn noise_below_precision_is_absorbed() {
        let a = sample();
        let mut b = sample();
        b.balls[1].position[0] += 1e-6;
        b.balls[0].linvel[2] = -0.0;
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn visible_change_alters_hash() {
        let a = sample();
        let mut b = sample();
        b.balls[1].position[2] += 0.01;
        assert_ne!(a.hash(), b.hash());

        let mut c = sample();
        c.pocketed.record(BallId(11));
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn canonical_string_includes_pocketed_lists() {
        let mut snapshot = sample();
        snapshot.pocketed.record(BallId(3));
        snapshot.pocketed.record(BallId(1));
        snapshot.pocketed.record(BallId(10));
        let text = canonical_string(&snapshot);
        assert!(text.starts_with("0:-635,0,0|"));
        assert!(text.ends_with("S[1,3]T[10]E[0]"));
    }
}
