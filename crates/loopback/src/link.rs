//! A lossless one-way link with a fixed delay, counted in ticks.

use std::collections::VecDeque;

use vantage_sim::Tick;

#[derive(Debug, Clone, Default)]
pub struct DelayedLink {
    latency: Tick,
    in_flight: VecDeque<(Tick, Vec<u8>)>,
}

impl DelayedLink {
    pub fn new(latency: Tick) -> Self {
        Self {
            latency,
            in_flight: VecDeque::new(),
        }
    }

    pub fn latency(&self) -> Tick {
        self.latency
    }

    pub fn send(&mut self, now: Tick, bytes: Vec<u8>) {
        self.in_flight.push_back((now + self.latency, bytes));
    }

    /// Every message due by `now`, in send order.
    pub fn deliver(&mut self, now: Tick) -> Vec<Vec<u8>> {
        let mut due = Vec::new();
        while self.in_flight.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, bytes)) = self.in_flight.pop_front() {
                due.push(bytes);
            }
        }
        due
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
