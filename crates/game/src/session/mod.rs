mod event;
mod lockstep;

pub use event::{DesyncCause, SessionError, SessionEvent, ShotRejected, StateRejected};
pub use lockstep::Session;
