//! Order and execution id generation

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Generator for external order/execution ids and internal sequence numbers
#[derive(Debug)]
pub struct OrderIds {
    sequence: AtomicU64,
}

impl OrderIds {
    /// Start the internal sequence at 1
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sequence: AtomicU64::new(1),
        }
    }

    /// Resume the internal sequence after recovery
    #[must_use]
    pub const fn starting_at(next: u64) -> Self {
        Self {
            sequence: AtomicU64::new(next),
        }
    }

    /// Next internal numeric id
    pub fn next_internal(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Raise the sequence floor after recovery so restored orders and new
    /// ones never collide
    pub fn ensure_at_least(&self, next: u64) {
        self.sequence.fetch_max(next, Ordering::SeqCst);
    }

    /// New external order id, globally unique
    #[must_use]
    pub fn next_order_id(&self) -> String {
        format!("ORD-{}", Uuid::new_v4().simple())
    }

    /// New execution id for fills
    #[must_use]
    pub fn next_execution_id(&self) -> String {
        format!("EXE-{}", Uuid::new_v4().simple())
    }

    /// New correlation id for request tracing
    #[must_use]
    pub fn next_correlation_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

impl Default for OrderIds {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn internal_sequence_is_strictly_increasing() {
        let ids = OrderIds::new();
        let a = ids.next_internal();
        let b = ids.next_internal();
        assert!(b > a);

        let resumed = OrderIds::starting_at(100);
        assert_eq!(resumed.next_internal(), 100);

        resumed.ensure_at_least(500);
        assert_eq!(resumed.next_internal(), 500);
        resumed.ensure_at_least(10); // lower floors never move the sequence back
        assert_eq!(resumed.next_internal(), 501);
    }

    #[test]
    fn order_ids_are_unique_and_prefixed() {
        let ids = OrderIds::new();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = ids.next_order_id();
            assert!(id.starts_with("ORD-"));
            assert!(seen.insert(id));
        }
        assert!(ids.next_execution_id().starts_with("EXE-"));
    }
}
