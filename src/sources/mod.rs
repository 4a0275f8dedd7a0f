pub mod feed;
pub mod manual;
pub mod profile;

use crate::core::geo::coerce_coord;
use serde::{Deserialize, Deserializer};

/// Deserializes a coordinate that may arrive as a number, a numeric string,
/// or garbage. Garbage becomes `None` instead of a deserialization error so a
/// single bad record never poisons a whole snapshot.
pub(crate) fn lenient_coord<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(coerce_coord(&value))
}
