//! Push-based store of user-submitted points.
//!
//! The backing service is an external realtime document store; this module
//! only defines the seam the rest of the pipeline talks to, plus an in-memory
//! implementation with the same snapshot-on-change delivery semantics for
//! tests and local runs.

use crate::{
    core::geo::LatLng,
    data::point::{GeoPoint, PointSource},
    HotzoneError, Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

const DEFAULT_INTENSITY: f64 = 5.0;

/// Raw record shape of the manual point collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub time: String,
    #[serde(default, deserialize_with = "super::lenient_coord")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "super::lenient_coord")]
    pub lng: Option<f64>,
    #[serde(default = "default_intensity")]
    pub intensity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

fn default_intensity() -> f64 {
    DEFAULT_INTENSITY
}

impl ManualRecord {
    /// Maps the raw record into the canonical point shape
    pub fn into_point(self) -> GeoPoint {
        let position = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)).filter(LatLng::is_valid),
            _ => None,
        };
        GeoPoint {
            id: self.id,
            position,
            label: self.label,
            description: self.description,
            time: self.time,
            source: PointSource::Manual,
            city: self.city,
            intensity: self.intensity,
        }
    }
}

/// User input for a new point, as entered in the creation form
#[derive(Debug, Clone, Default)]
pub struct NewPoint {
    pub label: String,
    pub description: String,
    pub time: String,
    pub lat: String,
    pub lng: String,
}

impl NewPoint {
    /// Validates the entered coordinates. Write failures here are surfaced to
    /// the user and never retried automatically.
    pub fn validate(&self) -> Result<LatLng> {
        let lat: f64 = self
            .lat
            .trim()
            .parse()
            .map_err(|_| HotzoneError::InvalidCoordinates(format!("lat: {:?}", self.lat)))?;
        let lng: f64 = self
            .lng
            .trim()
            .parse()
            .map_err(|_| HotzoneError::InvalidCoordinates(format!("lng: {:?}", self.lng)))?;

        let position = LatLng::new(lat, lng);
        if !position.is_valid() {
            return Err(HotzoneError::InvalidCoordinates(format!(
                "out of range: {lat}, {lng}"
            ))
            .into());
        }
        Ok(position)
    }
}

/// Seam over the realtime manual point collection.
///
/// `subscribe` delivers the full snapshot of the collection whenever it
/// changes, starting with the current contents.
#[async_trait]
pub trait ManualPointSource: Send + Sync {
    async fn subscribe(&self) -> mpsc::UnboundedReceiver<Vec<ManualRecord>>;

    /// Appends a new record, returning the generated id
    async fn add_point(&self, point: NewPoint) -> Result<String>;
}

/// In-memory manual point store with snapshot-on-write fan-out
#[derive(Default)]
pub struct InMemoryManualStore {
    records: Mutex<Vec<ManualRecord>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Vec<ManualRecord>>>>,
    next_id: AtomicU64,
    fail_writes: AtomicBool,
}

impl InMemoryManualStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent writes fail, for exercising the surfaced-error path
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Inserts a pre-built record, bypassing form validation
    pub fn insert_record(&self, mut record: ManualRecord) {
        if record.id.is_empty() {
            record.id = self.generate_id();
        }
        self.records
            .lock()
            .expect("manual store lock poisoned")
            .push(record);
        self.notify();
    }

    fn generate_id(&self) -> String {
        format!("manual-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn snapshot(&self) -> Vec<ManualRecord> {
        self.records
            .lock()
            .expect("manual store lock poisoned")
            .clone()
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("manual store lock poisoned");
        subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

#[async_trait]
impl ManualPointSource for InMemoryManualStore {
    async fn subscribe(&self) -> mpsc::UnboundedReceiver<Vec<ManualRecord>> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Initial snapshot, matching the remote store's subscription behavior
        let _ = tx.send(self.snapshot());
        self.subscribers
            .lock()
            .expect("manual store lock poisoned")
            .push(tx);
        rx
    }

    async fn add_point(&self, point: NewPoint) -> Result<String> {
        let position = point.validate()?;
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(HotzoneError::StoreWrite("manual point store rejected the write".into()).into());
        }

        let id = self.generate_id();
        let record = ManualRecord {
            id: id.clone(),
            label: point.label,
            description: point.description,
            time: point.time,
            lat: Some(position.lat),
            lng: Some(position.lng),
            intensity: DEFAULT_INTENSITY,
            city: None,
        };
        self.records
            .lock()
            .expect("manual store lock poisoned")
            .push(record);
        self.notify();
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_delivers_initial_snapshot() {
        let store = InMemoryManualStore::new();
        store.insert_record(ManualRecord {
            id: "a".into(),
            label: "First".into(),
            description: String::new(),
            time: String::new(),
            lat: Some(55.0),
            lng: Some(37.0),
            intensity: 5.0,
            city: None,
        });

        let mut rx = store.subscribe().await;
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "a");
    }

    #[tokio::test]
    async fn test_add_point_pushes_new_snapshot() {
        let store = InMemoryManualStore::new();
        let mut rx = store.subscribe().await;
        let _ = rx.recv().await.unwrap(); // initial, empty

        let id = store
            .add_point(NewPoint {
                label: "Airport".into(),
                lat: "55.97".into(),
                lng: "37.41".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].lat, Some(55.97));
    }

    #[tokio::test]
    async fn test_add_point_rejects_bad_coordinates() {
        let store = InMemoryManualStore::new();
        let result = store
            .add_point(NewPoint {
                lat: "abc".into(),
                lng: "37.41".into(),
                ..Default::default()
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_write_failure_is_surfaced() {
        let store = InMemoryManualStore::new();
        store.set_fail_writes(true);
        let result = store
            .add_point(NewPoint {
                lat: "55.0".into(),
                lng: "37.0".into(),
                ..Default::default()
            })
            .await;
        assert!(result.is_err());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_record_deserialization_with_string_coords() {
        let record: ManualRecord = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "label": "Center",
            "lat": "55.7558",
            "lng": 37.6173,
            "intensity": 8
        }))
        .unwrap();

        assert_eq!(record.lat, Some(55.7558));
        assert_eq!(record.lng, Some(37.6173));
        assert_eq!(record.intensity, 8.0);

        let point = record.into_point();
        assert!(point.is_renderable());
    }

    #[test]
    fn test_record_with_garbage_coords_is_listed_but_not_renderable() {
        let record: ManualRecord = serde_json::from_value(serde_json::json!({
            "id": "m2",
            "label": "Broken",
            "lat": "abc",
            "lng": 37.6
        }))
        .unwrap();

        let point = record.into_point();
        assert_eq!(point.label, "Broken");
        assert!(!point.is_renderable());
    }
}
