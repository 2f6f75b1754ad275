//! Inputs sent to the authority but not yet acknowledged.

use std::collections::VecDeque;

use glam::Vec3;
use tracing::{error, warn};
use vantage_sim::{InputState, Tick};
use vantage_wire::ClientInputBatch;

/// FIFO of unacknowledged inputs, oldest first.
///
/// Growth past `warning_depth` is logged as congestion; past `max_depth`
/// the oldest inputs are dropped.
#[derive(Debug, Clone)]
pub struct PendingInputs {
    queue: VecDeque<InputState>,
    warning_depth: usize,
    max_depth: usize,
}

impl PendingInputs {
    /// # Panics
    /// If `max_depth` is zero.
    pub fn new(warning_depth: usize, max_depth: usize) -> Self {
        assert!(max_depth > 0, "max_depth must be positive");
        Self {
            queue: VecDeque::with_capacity(max_depth + 1),
            warning_depth,
            max_depth,
        }
    }

    /// Queue `input` and return how many old inputs were dropped.
    pub fn push(&mut self, input: InputState) -> usize {
        self.queue.push_back(input);
        let len = self.queue.len();
        if len > self.warning_depth {
            warn!(queued = len, "unacknowledged inputs piling up, network congested?");
        }
        if len <= self.max_depth {
            return 0;
        }

        let dropped = len - self.max_depth;
        self.queue.drain(..dropped);
        error!(dropped, max = self.max_depth, "too many unacknowledged inputs, dropping oldest");
        dropped
    }

    /// Remove every input at or below `tick`. Returns how many were removed.
    pub fn acknowledge(&mut self, tick: Tick) -> usize {
        let before = self.queue.len();
        while self.queue.front().is_some_and(|input| input.tick <= tick) {
            self.queue.pop_front();
        }
        before - self.queue.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputState> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn oldest_tick(&self) -> Option<Tick> {
        self.queue.front().map(|i| i.tick)
    }

    /// The whole queue as a batch, with the client's current position.
    pub fn to_batch(&self, claimed_position: Vec3) -> ClientInputBatch {
        ClientInputBatch {
            inputs: self.queue.iter().copied().map(Into::into).collect(),
            claimed_position: Some(claimed_position.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks(queue: &PendingInputs) -> Vec<Tick> {
        queue.iter().map(|i| i.tick).collect()
    }

    #[test]
    fn test_acknowledge_removes_prefix() {
        let mut queue = PendingInputs::new(30, 50);
        for tick in 1..=5 {
            queue.push(InputState::new(tick));
        }
        assert_eq!(queue.acknowledge(3), 3);
        assert_eq!(ticks(&queue), vec![4, 5]);
        assert_eq!(queue.oldest_tick(), Some(4));
    }

    #[test]
    fn test_acknowledge_is_idempotent() {
        let mut queue = PendingInputs::new(30, 50);
        for tick in 1..=5 {
            queue.push(InputState::new(tick));
        }
        queue.acknowledge(2);
        assert_eq!(queue.acknowledge(2), 0);
        assert_eq!(queue.acknowledge(1), 0);
        assert_eq!(ticks(&queue), vec![3, 4, 5]);
    }

    #[test]
    fn test_acknowledge_past_everything() {
        let mut queue = PendingInputs::new(30, 50);
        for tick in 1..=3 {
            queue.push(InputState::new(tick));
        }
        assert_eq!(queue.acknowledge(100), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.oldest_tick(), None);
    }

    #[test]
    fn test_ack_property() {
        // For every ack value, only newer entries remain and exactly the
        // older ones were removed
        for ack in 0..=12 {
            let mut queue = PendingInputs::new(30, 50);
            for tick in 3..=10 {
                queue.push(InputState::new(tick));
            }
            let expected_removed = queue.iter().filter(|i| i.tick <= ack).count();
            assert_eq!(queue.acknowledge(ack), expected_removed);
            assert!(queue.iter().all(|i| i.tick > ack));
        }
    }

    #[test]
    fn test_hard_cap_drops_oldest() {
        let mut queue = PendingInputs::new(30, 50);
        let mut dropped = 0;
        for tick in 1..=55 {
            dropped += queue.push(InputState::new(tick));
        }
        assert_eq!(dropped, 5);
        assert_eq!(queue.len(), 50);
        assert_eq!(queue.oldest_tick(), Some(6));
    }

    #[test]
    fn test_batch_carries_queue_and_claim() {
        let mut queue = PendingInputs::new(30, 50);
        queue.push(InputState::new(1).with_axes(1.0, 0.0));
        queue.push(InputState::new(2));
        let batch = queue.to_batch(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(batch.decode_inputs().unwrap(), queue.iter().copied().collect::<Vec<_>>());
        assert_eq!(batch.claimed_position(), Some(Vec3::new(1.0, 2.0, 3.0)));
    }
}
