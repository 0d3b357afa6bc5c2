//! Service lifecycle state.
//!
//! Each long-running service owns one [`Lifecycle`]:
//!
//! ```text
//! Running --begin_shutdown()--> ShuttingDown --mark_closed()--> Closed
//! ```
//!
//! Transitions are compare-and-set, so a shutdown requested from a signal
//! handler and from application code at the same time is applied once.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Accepting and doing work.
    Running = 0,
    /// Rejecting new work, draining in-flight work.
    ShuttingDown = 1,
    /// Resources released.
    Closed = 2,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Running,
            1 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Closed,
        }
    }
}

/// Atomic lifecycle owned by a single service instance.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Running as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Move `Running -> ShuttingDown`.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn begin_shutdown(&self) -> bool {
        self.state
            .compare_exchange(
                LifecycleState::Running as u8,
                LifecycleState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closed` from any state.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn mark_closed(&self) -> bool {
        self.state.swap(LifecycleState::Closed as u8, Ordering::AcqRel)
            != LifecycleState::Closed as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_running() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.is_running());
        assert_eq!(lifecycle.state(), LifecycleState::Running);
    }

    #[test]
    fn test_begin_shutdown_once() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.begin_shutdown());
        assert!(!lifecycle.begin_shutdown());
        assert_eq!(lifecycle.state(), LifecycleState::ShuttingDown);
    }

    #[test]
    fn test_mark_closed_once() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin_shutdown();
        assert!(lifecycle.mark_closed());
        assert!(!lifecycle.mark_closed());
        assert_eq!(lifecycle.state(), LifecycleState::Closed);
        assert!(!lifecycle.begin_shutdown());
    }

    #[test]
    fn test_concurrent_shutdown_has_single_winner() {
        let lifecycle = Arc::new(Lifecycle::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                std::thread::spawn(move || lifecycle.begin_shutdown())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
