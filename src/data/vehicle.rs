use crate::core::geo::LatLng;
use serde::{Deserialize, Serialize};

/// Live vehicle position from the polled feed.
///
/// Ephemeral: the whole set is replaced on every poll cycle and no history is
/// retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub position: LatLng,
}

impl Vehicle {
    pub fn new(id: impl Into<String>, position: LatLng) -> Self {
        Self {
            id: id.into(),
            position,
        }
    }
}
