use rkyv::{Archive, Deserialize, Serialize};

/// Rack order, filled row by row from the apex. Puts the eight in the middle of row three.
pub const RACK_ORDER: [u8; 15] = [1, 9, 2, 10, 8, 3, 11, 4, 12, 5, 13, 6, 14, 7, 15];

pub const CUE_BALL: BallId = BallId(0);
pub const EIGHT_BALL: BallId = BallId(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BallKind {
    Cue,
    Solid,
    Stripe,
    Eight,
}

/// The two object-ball groups a player can be assigned.
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
pub enum Group {
    Solid,
    Stripe,
}

impl Group {
    pub fn other(self) -> Self {
        match self {
            Self::Solid => Self::Stripe,
            Self::Stripe => Self::Solid,
        }
    }

    pub fn numbers(self) -> std::ops::RangeInclusive<u8> {
        match self {
            Self::Solid => 1..=7,
            Self::Stripe => 9..=15,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Stripe => "stripe",
        }
    }
}

/// Stable ball identity. Physics handles never leave the physics module; everything
/// else refers to balls by number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct BallId(pub u8);

impl BallId {
    pub fn new(number: u8) -> Option<Self> {
        (number <= 15).then_some(Self(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn kind(self) -> BallKind {
        match self.0 {
            0 => BallKind::Cue,
            8 => BallKind::Eight,
            1..=7 => BallKind::Solid,
            _ => BallKind::Stripe,
        }
    }

    pub fn group(self) -> Option<Group> {
        match self.kind() {
            BallKind::Solid => Some(Group::Solid),
            BallKind::Stripe => Some(Group::Stripe),
            BallKind::Cue | BallKind::Eight => None,
        }
    }

    pub fn is_cue(self) -> bool {
        self.0 == 0
    }

    pub fn all() -> impl Iterator<Item = BallId> {
        (0..=15).map(BallId)
    }
}

impl std::fmt::Display for BallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            BallKind::Cue => write!(f, "cue"),
            _ => write!(f, "#{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_by_number() {
        assert_eq!(BallId(0).kind(), BallKind::Cue);
        assert_eq!(BallId(3).kind(), BallKind::Solid);
        assert_eq!(BallId(8).kind(), BallKind::Eight);
        assert_eq!(BallId(12).kind(), BallKind::Stripe);
        assert_eq!(BallId(12).group(), Some(Group::Stripe));
        assert_eq!(BallId(8).group(), None);
        assert!(BallId::new(16).is_none());
    }

    #[test]
    fn rack_order_is_a_permutation() {
        let mut numbers = RACK_ORDER.to_vec();
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=15).collect::<Vec<u8>>());
        assert_eq!(RACK_ORDER[4], 8);
    }
}
