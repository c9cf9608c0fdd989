//! Mobility model interface and default implementations (C5, §4.8).
//!
//! The node runtime only ever calls `advance`; it never matches on the concrete
//! mobility kind, mirroring how the teacher's node task is handed an opaque
//! `RadioDevice` rather than reaching into device internals.

use crate::config::Config;
use crate::geometry::Vec3;
use rand::Rng;
use rand::rngs::StdRng;

/// Opaque position/velocity update function consumed by the node runtime.
pub trait MobilityModel: Send {
    /// Advance by `dt_micros` of virtual time and return the new
    /// `(position, velocity)`. Implementations own all internal trajectory state.
    fn advance(&mut self, dt_micros: u64) -> (Vec3, Vec3);

    fn position(&self) -> Vec3;
    fn velocity(&self) -> Vec3;
}

/// Always returns the initial position with zero velocity (`STATIC_CASE=1`).
pub struct StaticMobility {
    position: Vec3,
}

impl StaticMobility {
    pub fn new(position: Vec3) -> Self {
        StaticMobility { position }
    }
}

impl MobilityModel for StaticMobility {
    fn advance(&mut self, _dt_micros: u64) -> (Vec3, Vec3) {
        (self.position, Vec3::ZERO)
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn velocity(&self) -> Vec3 {
        Vec3::ZERO
    }
}

/// Straight-line random-waypoint mobility bounded by the map extents, at a fixed
/// altitude band. On arrival at the current destination, pauses for
/// `pause_micros`, then redraws a destination and speed.
pub struct RandomWaypoint3D {
    position: Vec3,
    velocity: Vec3,
    destination: Vec3,
    speed_mps: f64,
    pause_remaining_micros: u64,
    bounds: (f64, f64, f64),
    speed_range: (f64, f64),
    pause_micros: u64,
    rng: StdRng,
}

impl RandomWaypoint3D {
    pub fn new(initial: Vec3, cfg: &Config, speed_range: (f64, f64), pause_micros: u64, mut rng: StdRng) -> Self {
        let bounds = (cfg.map_length, cfg.map_width, cfg.map_height);
        let destination = Self::random_point(&mut rng, bounds);
        let speed_mps = rng.gen_range(speed_range.0..=speed_range.1);
        let mut model = RandomWaypoint3D {
            position: initial,
            velocity: Vec3::ZERO,
            destination,
            speed_mps,
            pause_remaining_micros: 0,
            bounds,
            speed_range,
            pause_micros,
            rng,
        };
        model.retarget_velocity();
        model
    }

    fn random_point(rng: &mut StdRng, bounds: (f64, f64, f64)) -> Vec3 {
        Vec3::new(rng.gen_range(0.0..bounds.0), rng.gen_range(0.0..bounds.1), rng.gen_range(0.0..bounds.2))
    }

    fn retarget_velocity(&mut self) {
        let to_dest = self.destination.sub(&self.position);
        let dist = to_dest.norm();
        if dist < 1e-6 {
            self.velocity = Vec3::ZERO;
        } else {
            self.velocity = to_dest.scale(self.speed_mps / dist);
        }
    }
}

impl MobilityModel for RandomWaypoint3D {
    fn advance(&mut self, dt_micros: u64) -> (Vec3, Vec3) {
        let dt_s = dt_micros as f64 / 1_000_000.0;

        if self.pause_remaining_micros > 0 {
            self.pause_remaining_micros = self.pause_remaining_micros.saturating_sub(dt_micros);
            self.velocity = Vec3::ZERO;
            return (self.position, self.velocity);
        }

        let remaining = self.destination.sub(&self.position).norm();
        let step = self.speed_mps * dt_s;

        if step >= remaining {
            self.position = self.destination;
            self.velocity = Vec3::ZERO;
            self.pause_remaining_micros = self.pause_micros;
            self.destination = Self::random_point(&mut self.rng, self.bounds);
            self.speed_mps = self.rng.gen_range(self.speed_range.0..=self.speed_range.1);
        } else {
            self.position = self.position.add(&self.velocity.scale(dt_s));
            self.retarget_velocity();
        }

        (self.position, self.velocity)
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn static_mobility_never_moves() {
        let mut m = StaticMobility::new(Vec3::new(1.0, 2.0, 3.0));
        let (p, v) = m.advance(1_000_000);
        assert_eq!(p, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(v, Vec3::ZERO);
    }

    #[test]
    fn random_waypoint_moves_toward_destination() {
        let cfg = Config::default_for_tests();
        let rng = StdRng::seed_from_u64(42);
        let mut m = RandomWaypoint3D::new(Vec3::new(0.0, 0.0, 10.0), &cfg, (5.0, 10.0), 0, rng);
        let start = m.position();
        let (p1, _) = m.advance(100_000);
        assert_ne!(p1, start);
    }
}
