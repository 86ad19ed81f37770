use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Identity counter for a controller's current lifetime. Load, refresh, and
/// reset bump it; a response issued under an older generation must not touch
/// state.
#[derive(Debug, Default)]
pub(crate) struct Generation(AtomicU64);

impl Generation {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

// ---------------------------------------------------------------------------
// UpdateSequence
// ---------------------------------------------------------------------------

/// Monotonic tags for outgoing mutations. Only the latest issued mutation
/// may apply its response, so a slow older response can never clobber a
/// newer one.
#[derive(Debug, Default)]
pub(crate) struct UpdateSequence(AtomicU64);

impl UpdateSequence {
    pub fn issue(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_latest(&self, seq: u64) -> bool {
        self.0.load(Ordering::SeqCst) == seq
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_bump_invalidates_prior() {
        let generation = Generation::default();
        let first = generation.bump();
        assert!(generation.is_current(first));

        let second = generation.bump();
        assert!(!generation.is_current(first));
        assert!(generation.is_current(second));
    }

    #[test]
    fn only_latest_sequence_wins() {
        let seq = UpdateSequence::default();
        let a = seq.issue();
        let b = seq.issue();
        // The response for `a` resolves late: it must be discarded
        assert!(!seq.is_latest(a));
        assert!(seq.is_latest(b));
    }
}
