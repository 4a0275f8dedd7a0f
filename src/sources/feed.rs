//! Polled HTTP event/vehicle feed.
//!
//! The endpoint returns either a flat array of events or an object carrying
//! `events` and `taxis`. Every fetch is one-shot: no retry and no local
//! timeout, so a hung request simply never resolves and leaves the previously
//! published view in place.

use crate::{
    core::geo::LatLng,
    data::{
        point::{GeoPoint, PointSource},
        vehicle::Vehicle,
    },
    Result,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Raw event record from the polled feed
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEvent {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "super::lenient_coord")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "super::lenient_coord")]
    pub lng: Option<f64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, rename = "expireAt")]
    pub expire_at: Option<serde_json::Value>,
    #[serde(default)]
    pub city: Option<String>,
}

impl FeedEvent {
    /// Parses the feed's absolute expiry timestamp; accepted as epoch
    /// milliseconds or an RFC 3339 string.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        match self.expire_at.as_ref()? {
            serde_json::Value::Number(n) => {
                let millis = n.as_i64()?;
                DateTime::<Utc>::from_timestamp_millis(millis)
            }
            serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Display time: the expiry formatted client-side to `HH:mm`
    pub fn display_time(&self) -> String {
        self.expiry()
            .map(|dt| dt.format("%H:%M").to_string())
            .unwrap_or_default()
    }

    /// Maps the raw event into the canonical point shape
    pub fn into_point(self) -> GeoPoint {
        let position = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)).filter(LatLng::is_valid),
            _ => None,
        };
        let time = self.display_time();
        GeoPoint {
            id: self.id,
            position,
            label: self.title,
            description: self.address.unwrap_or_default(),
            time,
            source: PointSource::Auto,
            city: self.city,
            intensity: 1.0,
        }
    }
}

/// Raw taxi record from the polled feed
#[derive(Debug, Clone, Deserialize)]
pub struct FeedTaxi {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "super::lenient_coord")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "super::lenient_coord")]
    pub lng: Option<f64>,
}

impl FeedTaxi {
    pub fn into_vehicle(self) -> Option<Vehicle> {
        let position = LatLng::new(self.lat?, self.lng?);
        if !position.is_valid() {
            return None;
        }
        Some(Vehicle::new(self.id, position))
    }
}

/// The two body shapes the feed is known to return
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedResponse {
    Full {
        #[serde(default)]
        events: Vec<FeedEvent>,
        #[serde(default)]
        taxis: Vec<FeedTaxi>,
    },
    Flat(Vec<FeedEvent>),
}

/// Normalized result of one feed poll
#[derive(Debug, Default)]
pub struct FeedSnapshot {
    pub events: Vec<FeedEvent>,
    pub taxis: Vec<FeedTaxi>,
}

impl From<FeedResponse> for FeedSnapshot {
    fn from(response: FeedResponse) -> Self {
        match response {
            FeedResponse::Flat(events) => Self {
                events,
                taxis: Vec::new(),
            },
            FeedResponse::Full { events, taxis } => Self { events, taxis },
        }
    }
}

/// HTTP client for the polled feed
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    endpoint: String,
}

impl FeedClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Fetches one snapshot, optionally scoped to a city.
    ///
    /// Any failure (network, non-200, malformed body) is returned as an
    /// error; the caller degrades to manual-only data.
    pub async fn fetch(&self, city: Option<&str>) -> Result<FeedSnapshot> {
        let mut request = self.client.get(&self.endpoint);
        if let Some(city) = city {
            request = request.query(&[("city", city)]);
        }

        let response = request.send().await?.error_for_status()?;
        let body: FeedResponse = response.json().await?;
        let snapshot = FeedSnapshot::from(body);
        log::debug!(
            "feed poll returned {} events, {} taxis",
            snapshot.events.len(),
            snapshot.taxis.len()
        );
        Ok(snapshot)
    }
}
