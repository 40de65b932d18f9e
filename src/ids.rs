//! Monotonic identifier generation.
//!
//! Compiled queries and row sources are namespaced by identifiers drawn from
//! one process-wide counter. The counter is a single atomic integer, so
//! concurrent callers never observe a duplicate or lose a value.

use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free monotonic counter.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator whose first identifier is `1`.
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next identifier.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the identifier the next call to [`next_id`](Self::next_id) would yield.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    /// Restarts the sequence at `1`.
    pub fn reset(&self) {
        self.next.store(1, Ordering::Relaxed);
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

static QUERY_IDS: IdGenerator = IdGenerator::new();

/// Draws an identifier from the process-wide generator.
pub fn next_query_id() -> u64 {
    QUERY_IDS.next_id()
}

/// Resets the process-wide generator. Intended for tests that assert on
/// concrete identifier values.
pub fn reset_query_ids_for_testing() {
    QUERY_IDS.reset();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_sequence_starts_at_one() {
        let ids = IdGenerator::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.peek(), 3);
    }

    #[test]
    fn test_reset() {
        let ids = IdGenerator::new();
        ids.next_id();
        ids.next_id();
        ids.reset();
        assert_eq!(ids.next_id(), 1);
    }

    #[test]
    fn test_threads_never_share_an_id() {
        let ids = Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..1000).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 8000);
        assert_eq!(seen.iter().max().copied(), Some(8000));
    }
}
