//! Generation tokens and the cooperative completion queue.
//!
//! Background work (an analysis fetch, a chart render pass) never applies its
//! result inline. The initiator tags the work with the generation it targets
//! and pushes a completion onto a queue; the owner drains the queue later and
//! drops anything whose generation is no longer current.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

use crate::error::{ReviewError, ReviewResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Monotonic source of generation tokens for one kind of background work.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: Generation,
}

impl GenerationCounter {
    pub fn current(&self) -> Generation {
        self.current
    }

    /// Starts a new generation; everything tagged with an older one is stale.
    pub fn advance(&mut self) -> Generation {
        self.current = Generation(self.current.0 + 1);
        self.current
    }

    pub fn check(&self, token: Generation) -> ReviewResult<()> {
        if token == self.current {
            Ok(())
        } else {
            Err(ReviewError::StaleFetchResult {
                expected: self.current,
                actual: token,
            })
        }
    }
}

#[derive(Debug)]
pub struct CompletionQueue<E> {
    pending: VecDeque<E>,
}

impl<E> Default for CompletionQueue<E> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }
}

impl<E> CompletionQueue<E> {
    pub fn push(&mut self, event: E) {
        self.pending.push_back(event);
    }

    pub fn pop(&mut self) -> Option<E> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_invalidates_older_tokens() {
        let mut counter = GenerationCounter::default();
        let first = counter.advance();
        assert!(counter.check(first).is_ok());

        let second = counter.advance();
        assert!(second > first);
        assert_eq!(
            counter.check(first),
            Err(ReviewError::StaleFetchResult {
                expected: second,
                actual: first,
            })
        );
    }

    #[test]
    fn queue_is_fifo() {
        let mut queue = CompletionQueue::default();
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert!(queue.is_empty());
    }
}
