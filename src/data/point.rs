use crate::core::geo::LatLng;
use serde::{Deserialize, Serialize};

/// Provenance of a map point. Used only for display (icon choice), never for
/// merge precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointSource {
    /// Submitted by a user through the manual point store
    Manual,
    /// Delivered by the polled external feed
    Auto,
}

/// Effective identity of a point. Ids are only unique within a source, so
/// both halves are needed for dedup and popup targeting.
pub type PointKey = (PointSource, String);

/// Canonical representation of a map-displayable entity.
///
/// Raw external records are mapped into this shape before they reach any
/// render path. A `None` position means coordinate coercion failed: the point
/// still appears in list/search views but is excluded from markers and from
/// the heatmap input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub id: String,
    pub position: Option<LatLng>,
    pub label: String,
    pub description: String,
    pub time: String,
    pub source: PointSource,
    pub city: Option<String>,
    pub intensity: f64,
}

impl GeoPoint {
    /// Key under which this point is deduplicated and addressed
    pub fn key(&self) -> PointKey {
        (self.source, self.id.clone())
    }

    /// Whether the point can be placed on the map at all
    pub fn is_renderable(&self) -> bool {
        self.position.map(|p| p.is_valid()).unwrap_or(false)
    }
}

/// Numeric-only heatmap input derived from renderable points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatPoint {
    pub lat: f64,
    pub lng: f64,
    pub weight: f64,
}

impl HeatPoint {
    /// Builds a heat point from a geo point, or `None` when the point has no
    /// usable coordinates.
    pub fn from_point(point: &GeoPoint) -> Option<Self> {
        let position = point.position.filter(|p| p.is_valid())?;
        Some(Self {
            lat: position.lat,
            lng: position.lng,
            weight: point.intensity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_at(position: Option<LatLng>) -> GeoPoint {
        GeoPoint {
            id: "p1".to_string(),
            position,
            label: "Station".to_string(),
            description: String::new(),
            time: String::new(),
            source: PointSource::Manual,
            city: None,
            intensity: 5.0,
        }
    }

    #[test]
    fn test_renderable_requires_position() {
        assert!(point_at(Some(LatLng::new(55.7, 37.6))).is_renderable());
        assert!(!point_at(None).is_renderable());
        assert!(!point_at(Some(LatLng::new(f64::NAN, 37.6))).is_renderable());
    }

    #[test]
    fn test_heat_point_excludes_unusable_coordinates() {
        assert!(HeatPoint::from_point(&point_at(None)).is_none());

        let heat = HeatPoint::from_point(&point_at(Some(LatLng::new(55.7, 37.6)))).unwrap();
        assert_eq!(heat.lat, 55.7);
        assert_eq!(heat.weight, 5.0);
    }

    #[test]
    fn test_key_carries_source() {
        let manual = point_at(Some(LatLng::new(1.0, 2.0)));
        let mut auto = manual.clone();
        auto.source = PointSource::Auto;
        assert_ne!(manual.key(), auto.key());
    }
}
