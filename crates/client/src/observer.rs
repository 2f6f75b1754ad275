//! View of a character controlled by another client.

use glam::{Quat, Vec3};
use vantage_sim::{EntityId, EntitySnapshot};
use vantage_wire::AuthoritativeSnapshot;

use crate::ClientError;
use crate::interpolation::{InterpolationConfig, SnapshotInterpolator, TransformSnapshot};

#[derive(Debug, Clone)]
pub struct RemoteObserver {
    entity_id: EntityId,
    interpolator: SnapshotInterpolator,
    position: Vec3,
    rotation: Quat,
}

impl RemoteObserver {
    pub fn new(entity_id: EntityId, config: InterpolationConfig) -> Self {
        Self {
            entity_id,
            interpolator: SnapshotInterpolator::new(config),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// False until the first snapshot arrives.
    pub fn is_initialized(&self) -> bool {
        !self.interpolator.is_empty()
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn interpolator(&self) -> &SnapshotInterpolator {
        &self.interpolator
    }

    /// Buffer a snapshot received at local time `now`. The very first one is
    /// also shown immediately.
    pub fn on_snapshot(&mut self, snapshot: &AuthoritativeSnapshot, now: f64) -> Result<(), ClientError> {
        let snapshot = EntitySnapshot::try_from(snapshot)?;
        if snapshot.entity_id != self.entity_id {
            return Err(ClientError::WrongEntity {
                expected: self.entity_id,
                found: snapshot.entity_id,
            });
        }

        let transform = TransformSnapshot::from(&snapshot);
        if !self.is_initialized() {
            self.position = transform.position;
            self.rotation = transform.rotation;
        }
        self.interpolator.push(transform, now);
        Ok(())
    }

    /// Per render frame: move to the interpolated transform for `now`.
    pub fn update(&mut self, now: f64) -> (Vec3, Quat) {
        if let Some((position, rotation)) = self.interpolator.sample(now) {
            self.position = position;
            self.rotation = rotation;
        }
        (self.position, self.rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_sim::{CharacterState, LocomotionState};

    fn snapshot(entity_id: EntityId, tick: u64, x: f32) -> AuthoritativeSnapshot {
        AuthoritativeSnapshot::from(&EntitySnapshot {
            entity_id,
            state: CharacterState {
                tick,
                position: Vec3::new(x, 0.0, 0.0),
                rotation: Quat::IDENTITY,
                velocity: Vec3::ZERO,
                locomotion: LocomotionState::Walk,
                clamping: true,
                anchor: None,
            },
        })
    }

    #[test]
    fn test_first_snapshot_snaps() {
        let mut observer = RemoteObserver::new(2, InterpolationConfig::default());
        assert!(!observer.is_initialized());
        observer.on_snapshot(&snapshot(2, 10, 3.0), 1.0).unwrap();
        assert!(observer.is_initialized());
        assert_eq!(observer.position(), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_later_snapshots_interpolate() {
        let mut observer = RemoteObserver::new(2, InterpolationConfig::default());
        observer.on_snapshot(&snapshot(2, 10, 0.0), 99.67).unwrap();
        observer.on_snapshot(&snapshot(2, 11, 1.0), 100.0).unwrap();
        // Not applied until the next frame
        assert_eq!(observer.position(), Vec3::ZERO);

        let (position, _) = observer.update(100.235);
        assert!((position - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-3);
        assert_eq!(observer.position(), position);
    }

    #[test]
    fn test_update_before_first_snapshot() {
        let mut observer = RemoteObserver::new(2, InterpolationConfig::default());
        assert_eq!(observer.update(5.0), (Vec3::ZERO, Quat::IDENTITY));
    }

    #[test]
    fn test_other_entity_rejected() {
        let mut observer = RemoteObserver::new(2, InterpolationConfig::default());
        assert!(matches!(
            observer.on_snapshot(&snapshot(3, 1, 0.0), 0.0),
            Err(ClientError::WrongEntity { expected: 2, found: 3 })
        ));
        assert!(!observer.is_initialized());
    }
}
