// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]
use proptest::prelude::*;

use cadence_core::{CalendarQueue, RealBinPolicy};

proptest! {
    /// Whatever keys go in, they come out in non-decreasing order and
    /// none are lost.
    #[test]
    fn drains_sorted_and_complete(keys in prop::collection::vec(0.0f64..1.0e6, 0..200)) {
        let mut q = CalendarQueue::new(RealBinPolicy::default());
        for (index, &key) in keys.iter().enumerate() {
            q.put(key, index);
        }
        prop_assert_eq!(q.size(), keys.len());

        let mut drained = Vec::with_capacity(keys.len());
        while let Ok((key, _)) = q.take() {
            drained.push(key);
        }
        prop_assert_eq!(drained.len(), keys.len());
        for pair in drained.windows(2) {
            prop_assert!(pair[0] <= pair[1], "dequeue order must be non-decreasing");
        }

        let mut expected = keys.clone();
        expected.sort_by(f64::total_cmp);
        prop_assert_eq!(drained, expected);
    }

    /// Interleaved puts and takes never lose entries or break ordering
    /// relative to what remains in the queue.
    #[test]
    fn interleaved_takes_respect_remaining_minimum(
        keys in prop::collection::vec(0.0f64..1.0e4, 1..100),
        take_every in 2usize..5,
    ) {
        let mut q = CalendarQueue::new(RealBinPolicy::default());
        let mut in_queue = 0usize;
        for (index, &key) in keys.iter().enumerate() {
            q.put(key, index);
            in_queue += 1;
            if index % take_every == 0 {
                let peeked = q.peek_next_key().ok();
                let (taken, _) = q.take().map_err(|fault| {
                    TestCaseError::fail(format!("take on non-empty queue: {fault}"))
                })?;
                prop_assert_eq!(peeked, Some(taken), "peek must agree with take");
                in_queue -= 1;
            }
        }
        prop_assert_eq!(q.size(), in_queue);
    }
}
