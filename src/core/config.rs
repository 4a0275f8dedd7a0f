//! Launch-time configuration
//!
//! All parameters are resolved once from the host's launch context and are
//! never re-read afterward. The host passes them as a flat string map (query
//! parameters, start params or similar).

use crate::core::geo::LatLng;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::time::Duration;

/// Default city used when the launch context carries none
pub const DEFAULT_CITY: &str = "moscow";

/// Known city centers for initial viewport placement
pub static CITY_CENTERS: Lazy<HashMap<&'static str, LatLng>> = Lazy::new(|| {
    HashMap::from([
        ("moscow", LatLng::new(55.7558, 37.6173)),
        ("spb", LatLng::new(59.9311, 30.3609)),
        ("kazan", LatLng::new(55.7963, 49.1088)),
        ("ekb", LatLng::new(56.8389, 60.6057)),
        ("novosibirsk", LatLng::new(55.0084, 82.9357)),
    ])
});

/// Which screen the application starts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    Map,
    Boost,
}

/// How manual points without a `city` field are treated when filtering
/// against the active city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CityFilter {
    /// Untagged records are universally applicable and kept
    #[default]
    IncludeUntagged,
    /// Only records tagged with the active city are kept
    Strict,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Active city key, scopes both feed queries and point filtering
    pub city: String,
    /// Screen selector (map mode vs. boost mode)
    pub page: Page,
    /// Driver identifier, required only in boost mode
    pub driver_id: Option<String>,
    /// Endpoint of the polled event/vehicle feed
    pub feed_url: String,
    /// Matching rule for city-untagged records
    pub city_filter: CityFilter,
    /// Optional time-based feed refresh on top of push-triggered refetches
    pub refresh_interval: Option<Duration>,
    /// Delay between a fly-to command and the auto-opened detail callout
    pub settle_delay: Duration,
    /// Simulated provisioning latency for boost activation
    pub provisioning_delay: Duration,
    /// How often reward zones are regenerated while boost is active
    pub zone_interval: Duration,
    /// How long one boost activation lasts
    pub boost_duration: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            city: DEFAULT_CITY.to_string(),
            page: Page::default(),
            driver_id: None,
            feed_url: "https://hotzones-feed.example.com/events".to_string(),
            city_filter: CityFilter::default(),
            refresh_interval: Some(Duration::from_secs(60)),
            settle_delay: Duration::from_millis(1600),
            provisioning_delay: Duration::from_secs(3),
            zone_interval: Duration::from_secs(30),
            boost_duration: Duration::from_secs(3600),
        }
    }
}

impl AppConfig {
    /// Builds a configuration from launch parameters, falling back to
    /// defaults for anything absent or unparseable.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let mut config = Self::default();

        if let Some(city) = params.get("city") {
            if !city.is_empty() {
                config.city = city.to_lowercase();
            }
        }
        if let Some(page) = params.get("page") {
            config.page = match page.as_str() {
                "boost" => Page::Boost,
                _ => Page::Map,
            };
        }
        config.driver_id = params.get("driver_id").cloned().filter(|id| !id.is_empty());
        if let Some(url) = params.get("feed_url") {
            if !url.is_empty() {
                config.feed_url = url.clone();
            }
        }
        if let Some(rule) = params.get("city_filter") {
            config.city_filter = match rule.as_str() {
                "strict" => CityFilter::Strict,
                _ => CityFilter::IncludeUntagged,
            };
        }

        config
    }

    /// Initial map center for the configured city
    pub fn city_center(&self) -> LatLng {
        CITY_CENTERS
            .get(self.city.as_str())
            .copied()
            .unwrap_or_else(|| CITY_CENTERS[DEFAULT_CITY])
    }
}
