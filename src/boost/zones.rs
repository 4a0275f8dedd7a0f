//! Reward zone generation.
//!
//! While boost is active, a small set of irregular polygons is scattered
//! around the driver's position to visually suggest high-value areas. The
//! geometry is ephemeral: regenerated on a fixed interval, entirely replaced
//! each time, and never diffed against the previous generation.

use crate::core::geo::LatLng;
use rand::Rng;

/// How far a zone center may be placed from the driver, in meters
const MIN_OFFSET_M: f64 = 300.0;
const MAX_OFFSET_M: f64 = 1500.0;
/// Nominal zone radius range, in meters
const MIN_RADIUS_M: f64 = 150.0;
const MAX_RADIUS_M: f64 = 400.0;
/// Per-vertex radius jitter factors
const JITTER_LOW: f64 = 0.65;
const JITTER_HIGH: f64 = 1.3;

/// An ephemeral polygon ring of reward geometry
#[derive(Debug, Clone, PartialEq)]
pub struct RewardZone {
    pub ring: Vec<LatLng>,
}

impl RewardZone {
    pub fn vertex_count(&self) -> usize {
        self.ring.len()
    }
}

/// Generates 2-3 irregular reward zones around `center`.
///
/// An unknown center yields an empty set rather than failing. Output is not
/// seeded and not reproducible; callers regenerate on a timer and discard
/// the previous set wholesale.
pub fn generate_zones(center: Option<LatLng>, rng: &mut impl Rng) -> Vec<RewardZone> {
    let Some(center) = center else {
        return Vec::new();
    };

    let count = rng.gen_range(2..=3);
    (0..count).map(|_| generate_ring(center, rng)).collect()
}

fn generate_ring(center: LatLng, rng: &mut impl Rng) -> RewardZone {
    let bearing = rng.gen_range(0.0..360.0);
    let offset = rng.gen_range(MIN_OFFSET_M..MAX_OFFSET_M);
    let zone_center = center.destination(bearing, offset);

    let vertices = rng.gen_range(8..=12);
    let nominal_radius = rng.gen_range(MIN_RADIUS_M..MAX_RADIUS_M);
    let step = 360.0 / vertices as f64;

    let ring = (0..vertices)
        .map(|i| {
            // Irregular ring: jittered radius on a jittered angular grid
            let angle = i as f64 * step + rng.gen_range(-step * 0.3..step * 0.3);
            let radius = nominal_radius * rng.gen_range(JITTER_LOW..JITTER_HIGH);
            zone_center.destination(angle, radius)
        })
        .collect();

    RewardZone { ring }
}
