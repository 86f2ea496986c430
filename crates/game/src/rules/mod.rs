use rkyv::{Archive, Deserialize, Serialize};

use crate::snapshot::PocketedState;
use crate::table::{BallId, Group};

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
pub enum Player {
    One,
    Two,
}

impl Player {
    pub fn opponent(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
        }
    }
}

impl std::fmt::Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "player {}", self.number())
    }
}

/// What one settled shot did: the balls it pocketed and whether the cue ball went down.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct ShotTally {
    pub pocketed: PocketedState,
    pub scratch: bool,
}

impl ShotTally {
    pub fn count(&self, group: Group) -> usize {
        match group {
            Group::Solid => self.pocketed.solids.len(),
            Group::Stripe => self.pocketed.stripes.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum WinReason {
    ClearedGroup,
    EightEarly,
    EightBeforeAssignment,
}

impl WinReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClearedGroup => "pocketed 8-ball after clearing all own balls",
            Self::EightEarly => "pocketed 8-ball early",
            Self::EightBeforeAssignment => "pocketed 8-ball before groups were assigned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct GameOver {
    pub winner: Player,
    pub reason: WinReason,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct TurnState {
    pub current: Player,
    pub groups: [Option<Group>; 2],
    pub pocketed: PocketedState,
    /// The current player must place the cue ball before shooting.
    pub ball_in_hand: bool,
}

impl Default for TurnState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnResolution {
    pub next: TurnState,
    pub kept_turn: bool,
    pub assigned: Option<(Player, Group)>,
    pub game_over: Option<GameOver>,
}

impl TurnState {
    pub fn new() -> Self {
        Self {
            current: Player::One,
            groups: [None, None],
            pocketed: PocketedState::default(),
            ball_in_hand: false,
        }
    }

    pub fn with_groups(current: Player, one: Group) -> Self {
        let mut state = Self::new();
        state.current = current;
        state.assign(Player::One, one);
        state
    }

    pub fn group_of(&self, player: Player) -> Option<Group> {
        self.groups[player.index()]
    }

    pub fn is_assigned(&self) -> bool {
        self.groups.iter().any(Option::is_some)
    }

    fn assign(&mut self, player: Player, group: Group) {
        self.groups[player.index()] = Some(group);
        self.groups[player.opponent().index()] = Some(group.other());
    }

    /// Remaining balls of `player`'s group, if assigned.
    pub fn remaining(&self, player: Player) -> Option<usize> {
        let group = self.group_of(player)?;
        let pocketed = match group {
            Group::Solid => self.pocketed.solids.len(),
            Group::Stripe => self.pocketed.stripes.len(),
        };
        Some(7 - pocketed.min(7))
    }

    /// Applies one settled shot by the current player.
    pub fn resolve(&self, shot: &ShotTally) -> TurnResolution {
        let shooter = self.current;
        let mut next = self.clone();
        next.pocketed.merge(&shot.pocketed);
        let mut assigned = None;

        let kept_turn = if shot.scratch {
            false
        } else {
            match self.group_of(shooter) {
                None => {
                    let claimed = if shot.count(Group::Solid) > 0 {
                        Some(Group::Solid)
                    } else if shot.count(Group::Stripe) > 0 {
                        Some(Group::Stripe)
                    } else {
                        None
                    };
                    if let Some(group) = claimed {
                        next.assign(shooter, group);
                        assigned = Some((shooter, group));
                    }
                    claimed.is_some()
                }
                Some(group) => shot.count(group) > 0,
            }
        };

        if !kept_turn {
            next.current = shooter.opponent();
        }
        next.ball_in_hand = shot.scratch;

        let game_over = shot.pocketed.eight.then(|| next.eight_ball_verdict(shooter));
        if game_over.is_some() {
            next.ball_in_hand = false;
        }

        TurnResolution {
            next,
            kept_turn,
            assigned,
            game_over,
        }
    }

    fn eight_ball_verdict(&self, shooter: Player) -> GameOver {
        match self.group_of(shooter) {
            Some(group) if group.numbers().all(|n| self.pocketed.contains(BallId(n))) => GameOver {
                winner: shooter,
                reason: WinReason::ClearedGroup,
            },
            Some(_) => GameOver {
                winner: shooter.opponent(),
                reason: WinReason::EightEarly,
            },
            None => GameOver {
                winner: shooter.opponent(),
                reason: WinReason::EightBeforeAssignment,
            },
        }
    }

    /// Status line for the UI from `viewer`'s point of view.
    pub fn turn_text(&self, viewer: Player) -> String {
        let whose = if self.current == viewer {
            "Your turn"
        } else {
            "Opponent's turn"
        };
        let mut text = match self.group_of(self.current) {
            Some(group) => format!("{} ({}s)", whose, group.as_str()),
            None => whose.to_string(),
        };
        if self.ball_in_hand {
            text.push_str(" - ball in hand");
        }
        text
    }
}
