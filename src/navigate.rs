//! Outbound navigation deep link.
//!
//! Builds a third-party map URL for the host to open in a new context.
//! Fire-and-forget: no response is handled. When the device position is
//! unknown the origin is omitted and the navigator resolves it itself.

use crate::core::geo::LatLng;

const BASE_URL: &str = "https://yandex.ru/maps/";

/// Builds a route URL from an optional origin to the destination
pub fn navigation_url(dest: LatLng, origin: Option<LatLng>) -> String {
    match origin {
        Some(from) => format!(
            "{BASE_URL}?rtext={},{}~{},{}&rtt=auto",
            from.lat, from.lng, dest.lat, dest.lng
        ),
        None => format!("{BASE_URL}?rtext=~{},{}&rtt=auto", dest.lat, dest.lng),
    }
}
