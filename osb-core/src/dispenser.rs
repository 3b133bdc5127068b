//! # Work Dispenser
//!
//! Purpose: Hand out monotonically increasing operation indices to workers
//! under a shared cap. Overrunning the cap is detected by the taker, which
//! must return the index; the undo keeps the assigned range dense so later
//! phases can rely on `[first_object, current]` being fully populated.

use std::sync::atomic::{AtomicI64, Ordering};

/// Per-phase atomic index dispenser.
pub struct Dispenser {
    next: AtomicI64,
    /// Exclusive upper bound on indices; negative disables the cap.
    cap: i64,
}

impl Dispenser {
    /// Creates a dispenser whose first `take` returns `first`.
    pub fn new(first: i64, cap: i64) -> Self {
        Dispenser {
            next: AtomicI64::new(first - 1),
            cap,
        }
    }

    /// Claims the next index, or `None` once the cap is reached. A `None`
    /// has already returned the overrun index.
    pub fn take(&self) -> Option<i64> {
        let index = self.next.fetch_add(1, Ordering::AcqRel) + 1;
        if self.cap >= 0 && index >= self.cap {
            self.undo();
            return None;
        }
        Some(index)
    }

    /// Returns a claimed index after a failed operation.
    pub fn undo(&self) {
        self.next.fetch_sub(1, Ordering::AcqRel);
    }

    /// Highest index currently claimed.
    pub fn current(&self) -> i64 {
        self.next.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn hands_out_dense_indices_from_first() {
        let dispenser = Dispenser::new(5, 8);
        assert_eq!(dispenser.take(), Some(5));
        assert_eq!(dispenser.take(), Some(6));
        assert_eq!(dispenser.take(), Some(7));
        assert_eq!(dispenser.take(), None);
        assert_eq!(dispenser.current(), 7);
    }

    #[test]
    fn cap_overrun_is_undone() {
        let dispenser = Dispenser::new(0, 2);
        assert_eq!(dispenser.take(), Some(0));
        assert_eq!(dispenser.take(), Some(1));
        for _ in 0..3 {
            assert_eq!(dispenser.take(), None);
            assert!(dispenser.current() <= 1);
        }
    }

    #[test]
    fn undo_reissues_the_index() {
        let dispenser = Dispenser::new(0, 10);
        assert_eq!(dispenser.take(), Some(0));
        dispenser.undo();
        assert_eq!(dispenser.take(), Some(0));
    }

    #[test]
    fn negative_cap_never_stops() {
        let dispenser = Dispenser::new(0, -1);
        for expected in 0..1000 {
            assert_eq!(dispenser.take(), Some(expected));
        }
    }

    #[test]
    fn concurrent_takers_stay_dense_under_cap() {
        let dispenser = Arc::new(Dispenser::new(0, 1000));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let dispenser = dispenser.clone();
            handles.push(std::thread::spawn(move || {
                let mut taken = Vec::new();
                while let Some(index) = dispenser.take() {
                    taken.push(index);
                }
                taken
            }));
        }

        let mut all: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        let expected: Vec<i64> = (0..1000).collect();
        assert_eq!(all, expected);
        assert!(dispenser.current() <= 999);
    }
}
