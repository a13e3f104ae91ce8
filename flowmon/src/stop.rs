use std::sync::atomic::AtomicBool;

/// One-way shutdown signal shared between the sweeper thread and its
/// handle. Starts cleared; once toggled it never goes back.
#[derive(Debug)]
pub(crate) struct Stop(AtomicBool);

/// total ordering on both sides: the flag is read once per sweep
/// interval, so there is nothing to gain from a weaker ordering and
/// a lot of subtlety to lose.
const ORDERING: std::sync::atomic::Ordering = std::sync::atomic::Ordering::SeqCst;

impl Stop {
    pub(crate) fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    #[inline]
    pub(crate) fn get(&self) -> bool {
        self.0.load(ORDERING)
    }

    /// set the stop signal
    #[inline]
    pub(crate) fn toggle(&self) {
        self.0.store(true, ORDERING)
    }
}

impl Default for Stop {
    fn default() -> Self {
        Self::new()
    }
}
