use super::StateHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashCheck {
    /// Only one side of the comparison is known so far.
    Waiting,
    Match {
        shot_id: u32,
    },
    Mismatch {
        shot_id: u32,
        local: StateHash,
        remote: StateHash,
    },
    /// The incoming hash refers to a shot older than the latest local settle.
    Stale,
}

/// Pairs the peer's post-shot hash with the local replay of the same shot.
/// The remote hash may arrive before the replay settles, so it is buffered.
#[derive(Debug, Default)]
pub struct Reconciler {
    local: Option<(u32, StateHash)>,
    pending_remote: Option<(u32, StateHash)>,
    mismatches: u32,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_local(&mut self, shot_id: u32, hash: StateHash) -> HashCheck {
        self.local = Some((shot_id, hash));
        if let Some((pending_id, _)) = self.pending_remote {
            if pending_id < shot_id {
                log::debug!("Discarding stale peer hash for shot {}", pending_id);
                self.pending_remote = None;
            }
        }
        self.compare()
    }

    pub fn record_remote(&mut self, shot_id: u32, hash: StateHash) -> HashCheck {
        if let Some((local_id, _)) = self.local {
            if shot_id < local_id {
                return HashCheck::Stale;
            }
        }
        self.pending_remote = Some((shot_id, hash));
        self.compare()
    }

    fn compare(&mut self) -> HashCheck {
        let (Some((local_id, local)), Some((remote_id, remote))) = (self.local, self.pending_remote)
        else {
            return HashCheck::Waiting;
        };
        if local_id != remote_id {
            return HashCheck::Waiting;
        }

        self.pending_remote = None;
        if local == remote {
            HashCheck::Match { shot_id: local_id }
        } else {
            self.mismatches += 1;
            HashCheck::Mismatch {
                shot_id: local_id,
                local,
                remote,
            }
        }
    }

    pub fn has_pending_remote(&self) -> bool {
        self.pending_remote.is_some()
    }

    pub fn mismatch_count(&self) -> u32 {
        self.mismatches
    }

    pub fn reset(&mut self) {
        self.local = None;
        self.pending_remote = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_hash_before_local_settle_is_buffered() {
        let mut reconciler = Reconciler::new();
        assert_eq!(reconciler.record_remote(1, StateHash(7)), HashCheck::Waiting);
        assert!(reconciler.has_pending_remote());
        assert_eq!(
            reconciler.record_local(1, StateHash(7)),
            HashCheck::Match { shot_id: 1 }
        );
        assert!(!reconciler.has_pending_remote());
    }

    #[test]
    fn mismatch_reports_both_hashes() {
        let mut reconciler = Reconciler::new();
        reconciler.record_local(3, StateHash(1));
        assert_eq!(
            reconciler.record_remote(3, StateHash(2)),
            HashCheck::Mismatch {
                shot_id: 3,
                local: StateHash(1),
                remote: StateHash(2),
            }
        );
        assert_eq!(reconciler.mismatch_count(), 1);
    }

    #[test]
    fn old_remote_hash_is_stale() {
        let mut reconciler = Reconciler::new();
        reconciler.record_local(4, StateHash(1));
        assert_eq!(reconciler.record_remote(2, StateHash(1)), HashCheck::Stale);
    }

    #[test]
    fn hash_for_future_shot_waits() {
        let mut reconciler = Reconciler::new();
        reconciler.record_local(1, StateHash(5));
        assert_eq!(reconciler.record_remote(2, StateHash(5)), HashCheck::Waiting);
        assert_eq!(
            reconciler.record_local(2, StateHash(5)),
            HashCheck::Match { shot_id: 2 }
        );
    }
}
