//! Request deadline propagation.
//!
//! Every request carries a [`Deadline`] that is threaded through the store
//! gateway; storage calls race against the remaining budget and surface a
//! timeout when it runs out. Detached background work (interest-graph
//! refresh, push emits) gets its own fresh deadline rather than inheriting
//! the request's.

use std::time::{Duration, Instant};

/// A point in time after which a request must give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Create a deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// Time left before the deadline, or `None` when it has already passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.checked_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn is_elapsed(&self) -> bool {
        self.remaining().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_deadline_has_remaining_budget() {
        let deadline = Deadline::after(Duration::from_secs(10));
        let remaining = deadline.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(10));
        assert!(remaining > Duration::from_secs(9));
        assert!(!deadline.is_elapsed());
    }

    #[test]
    fn zero_budget_is_elapsed() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_elapsed());
        assert!(deadline.remaining().is_none());
    }
}
