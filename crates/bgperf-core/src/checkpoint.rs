//! Checkpoints and the post-checkpoint cooldown that ends a run.
//!
//! A checkpoint is a route count the monitor is expected to pass through.
//! The list is consumed front to back: only the head is compared, and it is
//! dropped once a sample matches it exactly. Every hit restarts the cooldown;
//! the run ends once `cooling` further monitor samples pass without another
//! hit.

use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoints {
    pending: VecDeque<u64>,
}

impl Checkpoints {
    pub fn new(points: impl IntoIterator<Item = u64>) -> Self {
        Self {
            pending: points.into_iter().collect(),
        }
    }

    /// Returns `true` and consumes the head when `routes` equals it.
    pub fn check(&mut self, routes: u64) -> bool {
        if self.pending.front() == Some(&routes) {
            self.pending.pop_front();
            true
        } else {
            false
        }
    }

    pub fn next(&self) -> Option<u64> {
        self.pending.front().copied()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Cooldown
// ---------------------------------------------------------------------------

/// Counts monitor samples since the last checkpoint hit.
///
/// The counter is idle until the first hit. After each hit it restarts at
/// zero and grows by one per non-hit sample. [`Cooldown::observe`] returns
/// `true` exactly once: the first time the counter reaches `length`.
///
/// The counter is updated before it is compared, so a hit with `length` 0
/// ends the run on that sample. Checking before the update would write one
/// extra row after the hit.
#[derive(Debug, Clone)]
pub struct Cooldown {
    length: u32,
    counter: Option<u32>,
    fired: bool,
}

impl Cooldown {
    pub fn new(length: u32) -> Self {
        Self {
            length,
            counter: None,
            fired: false,
        }
    }

    pub fn observe(&mut self, checkpoint_hit: bool) -> bool {
        if self.fired {
            return false;
        }
        if checkpoint_hit {
            self.counter = Some(0);
        } else if let Some(n) = self.counter.as_mut() {
            *n += 1;
        }
        if self.counter.is_some_and(|n| n >= self.length) {
            self.fired = true;
            return true;
        }
        false
    }

    /// `None` while idle (no checkpoint hit yet).
    pub fn counter(&self) -> Option<u32> {
        self.counter
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoints_match_head_exactly_and_in_order() {
        let mut cps = Checkpoints::new([100, 200]);
        assert!(!cps.check(200));
        assert!(!cps.check(99));
        assert!(!cps.check(101));
        assert!(cps.check(100));
        assert_eq!(cps.next(), Some(200));
        assert!(!cps.check(100));
        assert!(cps.check(200));
        assert_eq!(cps.remaining(), 0);
        assert!(!cps.check(200));
    }

    #[test]
    fn cooldown_is_idle_until_first_hit() {
        let mut c = Cooldown::new(2);
        for _ in 0..10 {
            assert!(!c.observe(false));
        }
        assert_eq!(c.counter(), None);
    }

    #[test]
    fn cooldown_fires_after_length_non_hit_samples() {
        let mut c = Cooldown::new(3);
        assert!(!c.observe(true));
        assert!(!c.observe(false));
        assert!(!c.observe(false));
        assert!(c.observe(false));
        assert!(c.has_fired());
        // exactly once
        assert!(!c.observe(false));
        assert!(!c.observe(true));
    }

    #[test]
    fn hit_resets_the_counter() {
        let mut c = Cooldown::new(2);
        assert!(!c.observe(true));
        assert!(!c.observe(false));
        assert_eq!(c.counter(), Some(1));
        assert!(!c.observe(true));
        assert_eq!(c.counter(), Some(0));
        assert!(!c.observe(false));
        assert!(c.observe(false));
    }

    #[test]
    fn zero_length_fires_on_the_hit_itself() {
        let mut c = Cooldown::new(0);
        assert!(!c.observe(false));
        assert!(c.observe(true));
    }

    /// Over every hit/miss pattern, the cooldown fires at the first sample
    /// that is `length` samples after the most recent hit.
    #[test]
    fn fires_exactly_once_at_first_reach() {
        const LEN: usize = 8;
        for length in 0..4u32 {
            for mask in 0u32..(1 << LEN) {
                let hits: Vec<bool> = (0..LEN).map(|i| mask & (1 << i) != 0).collect();

                let mut expected = None;
                let mut last_hit = None;
                for (i, hit) in hits.iter().enumerate() {
                    if *hit {
                        last_hit = Some(i);
                    }
                    if let Some(h) = last_hit {
                        if i - h == length as usize {
                            expected = Some(i);
                            break;
                        }
                    }
                }

                let mut c = Cooldown::new(length);
                let fired: Vec<usize> = hits
                    .iter()
                    .enumerate()
                    .filter_map(|(i, hit)| c.observe(*hit).then_some(i))
                    .collect();
                assert_eq!(
                    fired,
                    expected.into_iter().collect::<Vec<_>>(),
                    "length={length} hits={hits:?}"
                );
            }
        }
    }
}
