//! Snapshot interpolation for remote characters.
//!
//! Snapshots are assumed to arrive every `update_interval` seconds; the
//! newest one is stamped with its local receipt time and older ones are
//! placed at whole intervals before it. Rendering happens
//! `interpolation_back_time` behind the present, so there is usually a
//! buffered snapshot on each side of the rendered instant even when packets
//! arrive late.

use std::collections::VecDeque;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::warn;
use vantage_geom::math::{lerp_clamped, slerp_clamped};
use vantage_sim::{EntitySnapshot, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    pub buffer_depth: usize,
    /// Seconds the rendered state lags behind the newest snapshot.
    pub interpolation_back_time: f64,
    /// Expected seconds between snapshots.
    pub update_interval: f64,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            buffer_depth: 20,
            interpolation_back_time: 0.4,
            update_interval: 0.33,
        }
    }
}

/// Tick, position and rotation of a character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSnapshot {
    pub tick: Tick,
    pub position: Vec3,
    pub rotation: Quat,
}

impl From<&EntitySnapshot> for TransformSnapshot {
    fn from(s: &EntitySnapshot) -> Self {
        Self {
            tick: s.state.tick,
            position: s.state.position,
            rotation: s.state.rotation,
        }
    }
}

/// Most-recent-first ring buffer of snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotInterpolator {
    config: InterpolationConfig,
    buffer: VecDeque<TransformSnapshot>,
    last_received_at: f64,
}

impl SnapshotInterpolator {
    /// # Panics
    /// If `config.buffer_depth` is zero.
    pub fn new(config: InterpolationConfig) -> Self {
        assert!(config.buffer_depth > 0, "buffer_depth must be positive");
        Self {
            buffer: VecDeque::with_capacity(config.buffer_depth),
            config,
            last_received_at: 0.0,
        }
    }

    pub fn config(&self) -> &InterpolationConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn latest(&self) -> Option<&TransformSnapshot> {
        self.buffer.front()
    }

    /// Buffer `snapshot`, received at local time `now` (seconds).
    ///
    /// Snapshots are kept in arrival order. An older tick arriving after a
    /// newer one is logged but still buffered.
    pub fn push(&mut self, snapshot: TransformSnapshot, now: f64) {
        self.buffer.push_front(snapshot);
        self.buffer.truncate(self.config.buffer_depth);
        self.last_received_at = now;

        let misordered = self
            .buffer
            .iter()
            .zip(self.buffer.iter().skip(1))
            .any(|(newer, older)| newer.tick < older.tick);
        if misordered {
            warn!(tick = snapshot.tick, "snapshots buffered out of order");
        }
    }

    /// Interpolated position and rotation at local time `now`, or `None`
    /// before the first snapshot.
    ///
    /// Walks from the newest snapshot back to the first one stamped at or
    /// before `now - interpolation_back_time` (or the oldest buffered) and
    /// blends it with its newer neighbour.
    pub fn sample(&self, now: f64) -> Option<(Vec3, Quat)> {
        let rate = self.config.update_interval;
        let render_time = now - self.config.interpolation_back_time;
        let count = self.buffer.len();

        for (i, before) in self.buffer.iter().enumerate() {
            let before_time = self.last_received_at - i as f64 * rate;
            if before_time > render_time && i + 1 < count {
                continue;
            }

            let after = &self.buffer[i.saturating_sub(1)];
            let after_time = self.last_received_at - (i as f64 - 1.0) * rate;
            let length = after_time - before_time;
            let t = if length > 0.0001 {
                ((render_time - before_time) / length) as f32
            } else {
                0.0
            };

            return Some((
                lerp_clamped(before.position, after.position, t),
                slerp_clamped(before.rotation, after.rotation, t),
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(tick: Tick, x: f32) -> TransformSnapshot {
        TransformSnapshot {
            tick,
            position: Vec3::new(x, 0.0, 0.0),
            rotation: Quat::IDENTITY,
        }
    }

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_empty_has_no_sample() {
        let interp = SnapshotInterpolator::new(InterpolationConfig::default());
        assert!(interp.sample(10.0).is_none());
    }

    #[test]
    fn test_midpoint_between_two_snapshots() {
        let mut interp = SnapshotInterpolator::new(InterpolationConfig::default());
        let t = 100.0;
        interp.push(snap(10, 0.0), t - 0.33);
        interp.push(snap(11, 1.0), t);

        // Render time t - 0.165 sits halfway between the two
        let (position, _) = interp.sample(t + 0.235).unwrap();
        assert!(close(position, Vec3::new(0.5, 0.0, 0.0)), "{position}");
    }

    #[test]
    fn test_render_time_before_oldest_clamps() {
        let mut interp = SnapshotInterpolator::new(InterpolationConfig::default());
        interp.push(snap(10, 0.0), 4.67);
        interp.push(snap(11, 1.0), 5.0);
        let (position, _) = interp.sample(5.0).unwrap();
        assert!(close(position, Vec3::ZERO));
    }

    #[test]
    fn test_render_time_past_newest_holds_newest() {
        let mut interp = SnapshotInterpolator::new(InterpolationConfig::default());
        interp.push(snap(10, 0.0), 4.67);
        interp.push(snap(11, 1.0), 5.0);
        let (position, _) = interp.sample(9.0).unwrap();
        assert!(close(position, Vec3::X));
    }

    #[test]
    fn test_single_snapshot() {
        let mut interp = SnapshotInterpolator::new(InterpolationConfig::default());
        interp.push(snap(3, 2.0), 1.0);
        let (position, _) = interp.sample(1.0).unwrap();
        assert!(close(position, Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_picks_bracketing_pair() {
        let mut interp = SnapshotInterpolator::new(InterpolationConfig::default());
        for (i, x) in [0.0, 1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            interp.push(snap(i as Tick, x), i as f64 * 0.33);
        }
        // Newest stamped at 1.32; render time 0.825 lies halfway between
        // the snapshots stamped 0.66 and 0.99
        let (position, _) = interp.sample(1.225).unwrap();
        assert!(close(position, Vec3::new(2.5, 0.0, 0.0)), "{position}");
    }

    #[test]
    fn test_rotation_slerped() {
        let mut interp = SnapshotInterpolator::new(InterpolationConfig::default());
        let mut a = snap(1, 0.0);
        let mut b = snap(2, 0.0);
        a.rotation = Quat::from_rotation_y(0.0);
        b.rotation = Quat::from_rotation_y(1.0);
        interp.push(a, 0.0);
        interp.push(b, 0.33);
        let (_, rotation) = interp.sample(0.33 + 0.4 - 0.165).unwrap();
        assert!(rotation.angle_between(Quat::from_rotation_y(0.5)) < 1e-3);
    }

    #[test]
    fn test_buffer_depth_bounded() {
        let config = InterpolationConfig {
            buffer_depth: 4,
            ..Default::default()
        };
        let mut interp = SnapshotInterpolator::new(config);
        for tick in 0..10 {
            interp.push(snap(tick, tick as f32), tick as f64);
        }
        assert_eq!(interp.len(), 4);
        assert_eq!(interp.latest().unwrap().tick, 9);
    }

    #[test]
    fn test_out_of_order_still_buffered() {
        let mut interp = SnapshotInterpolator::new(InterpolationConfig::default());
        interp.push(snap(5, 0.0), 0.0);
        interp.push(snap(4, 1.0), 0.33);
        assert_eq!(interp.len(), 2);
        assert_eq!(interp.latest().unwrap().tick, 4);
    }
}
