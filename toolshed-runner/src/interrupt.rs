use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag.
///
/// Clones observe the same flag. Only the current state is tracked, so
/// several requests raised before the active waiter acknowledges them
/// collapse into one.
#[derive(Debug, Clone, Default)]
pub struct InterruptSignal {
    flag: Arc<AtomicBool>,
}

impl InterruptSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, interrupted: bool) {
        self.flag.store(interrupted, Ordering::SeqCst);
    }

    /// Request cancellation of whatever is currently running.
    pub fn trigger(&self) {
        self.set(true);
    }

    pub fn clear(&self) {
        self.set(false);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Consume a pending request, returning whether one was pending.
    pub fn acknowledge(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::InterruptSignal;
    use std::thread;

    #[test]
    fn clones_share_state() {
        let signal = InterruptSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_set());

        signal.trigger();
        assert!(observer.is_set());

        observer.clear();
        assert!(!signal.is_set());
    }

    #[test]
    fn repeated_requests_collapse() {
        let signal = InterruptSignal::new();
        signal.trigger();
        signal.trigger();
        assert!(signal.acknowledge());
        assert!(!signal.acknowledge());
    }

    #[test]
    fn visible_across_threads() {
        let signal = InterruptSignal::new();
        let remote = signal.clone();
        thread::spawn(move || remote.trigger()).join().unwrap();
        assert!(signal.is_set());
    }
}
