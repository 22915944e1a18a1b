use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop request shared between the signal watcher and the
/// capture loop
///
/// The signal context only ever raises the flag. The capture loop observes it
/// between frame blocks, never in the middle of one.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    raised: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = StopFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_raised());

        flag.raise();
        assert!(observer.is_raised());
    }
}
