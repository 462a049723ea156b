//! Movement plausibility checks (speed and world bounds)

use tokio::time::Instant;

use super::player::{Player, PlayerState};

/// Maximum distance per second between two accepted positions
pub const MAX_SPEED: f64 = 15.0;

/// Half-width of the axis-aligned play volume
pub const WORLD_BOUND: f64 = 1000.0;

/// Limits applied to every candidate update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementLimits {
    pub max_speed: f64,
    pub world_bound: f64,
}

impl Default for MovementLimits {
    fn default() -> Self {
        Self {
            max_speed: MAX_SPEED,
            world_bound: WORLD_BOUND,
        }
    }
}

/// Why a candidate update was dropped
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum MovementRejection {
    #[error("update not newer than previous accepted state")]
    NonIncreasingTime,

    #[error("implied speed {speed:.2} u/s exceeds limit")]
    TooFast { speed: f64 },

    #[error("position outside world bounds")]
    OutOfBounds,
}

/// Stateless validator; all state it needs comes from the registry entry
#[derive(Debug, Clone, Copy, Default)]
pub struct MovementValidator {
    limits: MovementLimits,
}

impl MovementValidator {
    pub fn new(limits: MovementLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> MovementLimits {
        self.limits
    }

    /// Decide whether `candidate`, received at `now`, may replace `previous`
    pub fn validate(
        &self,
        previous: &Player,
        candidate: &PlayerState,
        now: Instant,
    ) -> Result<(), MovementRejection> {
        // checked_duration_since is None when now precedes the baseline
        let dt = now
            .checked_duration_since(previous.last_update)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        if dt <= 0.0 {
            return Err(MovementRejection::NonIncreasingTime);
        }

        // Bounds first: an escape attempt is reported as such whatever its speed
        let bound = self.limits.world_bound;
        let in_bounds = candidate
            .position
            .components()
            .iter()
            .all(|c| c.is_finite() && c.abs() <= bound);
        if !in_bounds {
            return Err(MovementRejection::OutOfBounds);
        }

        let distance = candidate.position.distance(&previous.state.position);
        let speed = distance / dt;
        if speed > self.limits.max_speed {
            return Err(MovementRejection::TooFast { speed });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::player::{PlayerId, Vec3};
    use std::time::Duration;

    fn player_at(position: Vec3, at: Instant) -> Player {
        let mut player = Player::spawn(PlayerId::new(), "pilot".into(), at);
        player.state.position = position;
        player
    }

    fn moved_to(x: f64, y: f64, z: f64) -> PlayerState {
        PlayerState::new(Vec3::new(x, y, z), Vec3::ZERO)
    }

    #[test]
    fn accepts_movement_under_speed_limit() {
        let validator = MovementValidator::default();
        let start = Instant::now();
        let prev = player_at(Vec3::ZERO, start);

        let result = validator.validate(&prev, &moved_to(5.0, 0.0, 0.0), start + Duration::from_secs(1));
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn accepts_exactly_max_speed() {
        let validator = MovementValidator::default();
        let start = Instant::now();
        let prev = player_at(Vec3::ZERO, start);

        let result = validator.validate(&prev, &moved_to(15.0, 0.0, 0.0), start + Duration::from_secs(1));
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn rejects_teleport() {
        let validator = MovementValidator::default();
        let start = Instant::now();
        let prev = player_at(Vec3::new(5.0, 0.0, 0.0), start);

        let result = validator.validate(
            &prev,
            &moved_to(500.0, 0.0, 0.0),
            start + Duration::from_millis(100),
        );
        match result {
            Err(MovementRejection::TooFast { speed }) => assert!((speed - 4950.0).abs() < 1e-6),
            other => panic!("expected TooFast, got {:?}", other),
        }
    }

    #[test]
    fn rejects_zero_elapsed_time() {
        let validator = MovementValidator::default();
        let start = Instant::now();
        let prev = player_at(Vec3::ZERO, start);

        let result = validator.validate(&prev, &PlayerState::ORIGIN, start);
        assert_eq!(result, Err(MovementRejection::NonIncreasingTime));
    }

    #[test]
    fn rejects_out_of_order_timestamp() {
        let validator = MovementValidator::default();
        let start = Instant::now();
        let prev = player_at(Vec3::ZERO, start + Duration::from_secs(2));

        let result = validator.validate(&prev, &moved_to(1.0, 0.0, 0.0), start);
        assert_eq!(result, Err(MovementRejection::NonIncreasingTime));
    }

    #[test]
    fn rejects_out_of_bounds_even_when_slow() {
        let validator = MovementValidator::default();
        let start = Instant::now();
        let prev = player_at(Vec3::new(995.0, 0.0, 0.0), start);

        let result = validator.validate(
            &prev,
            &moved_to(0.0, 0.0, -1000.5),
            start + Duration::from_secs(3600),
        );
        assert_eq!(result, Err(MovementRejection::OutOfBounds));

        let result = validator.validate(
            &prev,
            &moved_to(1001.0, 0.0, 0.0),
            start + Duration::from_secs(10),
        );
        assert_eq!(result, Err(MovementRejection::OutOfBounds));
    }

    #[test]
    fn boundary_itself_is_inside() {
        let validator = MovementValidator::default();
        let start = Instant::now();
        let prev = player_at(Vec3::new(999.0, -999.0, 0.0), start);

        let result = validator.validate(
            &prev,
            &moved_to(1000.0, -1000.0, 0.0),
            start + Duration::from_secs(1),
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn rotation_does_not_count_towards_speed() {
        let validator = MovementValidator::default();
        let start = Instant::now();
        let prev = player_at(Vec3::ZERO, start);
        let spun = PlayerState::new(Vec3::ZERO, Vec3::new(500.0, -500.0, 3.0));

        let result = validator.validate(&prev, &spun, start + Duration::from_millis(10));
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn custom_limits_apply() {
        let validator = MovementValidator::new(MovementLimits {
            max_speed: 1.0,
            world_bound: 10.0,
        });
        let start = Instant::now();
        let prev = player_at(Vec3::ZERO, start);

        assert!(matches!(
            validator.validate(&prev, &moved_to(2.0, 0.0, 0.0), start + Duration::from_secs(1)),
            Err(MovementRejection::TooFast { .. })
        ));
        assert_eq!(
            validator.validate(&prev, &moved_to(0.0, 11.0, 0.0), start + Duration::from_secs(60)),
            Err(MovementRejection::OutOfBounds)
        );
    }
}
