//! Realtime driver profile store.
//!
//! A profile is created once during the boost registration sub-flow; the id
//! returned by `create` becomes the local profile key. Subscribers observe
//! the record by id; a transition from present to absent is the deletion
//! signal that forces the boost machine back to `Off`.

use crate::{HotzoneError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

/// Driver identity required before the first boost activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverProfile {
    pub fio: String,
    pub car_number: String,
    pub tariff: String,
    pub created_at: DateTime<Utc>,
}

impl DriverProfile {
    pub fn new(
        fio: impl Into<String>,
        car_number: impl Into<String>,
        tariff: impl Into<String>,
    ) -> Self {
        Self {
            fio: fio.into(),
            car_number: car_number.into(),
            tariff: tariff.into(),
            created_at: Utc::now(),
        }
    }
}

/// Seam over the realtime profile collection
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Persists a new profile, returning the generated record id
    async fn create(&self, profile: DriverProfile) -> Result<String>;

    async fn get(&self, id: &str) -> Result<Option<DriverProfile>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Watches a record by id. The receiver holds `Some` while the record
    /// exists and flips to `None` when it is deleted remotely.
    async fn subscribe(&self, id: &str) -> watch::Receiver<Option<DriverProfile>>;
}

#[derive(Default)]
struct ProfileStoreInner {
    records: HashMap<String, DriverProfile>,
    watchers: HashMap<String, watch::Sender<Option<DriverProfile>>>,
}

/// In-memory profile store mirroring the remote store's subscription behavior
#[derive(Default)]
pub struct InMemoryProfileStore {
    inner: Mutex<ProfileStoreInner>,
    next_id: AtomicU64,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn create(&self, profile: DriverProfile) -> Result<String> {
        let id = format!("profile-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.lock().expect("profile store lock poisoned");
        inner.records.insert(id.clone(), profile.clone());
        if let Some(tx) = inner.watchers.get(&id) {
            let _ = tx.send(Some(profile));
        }
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<DriverProfile>> {
        let inner = self.inner.lock().expect("profile store lock poisoned");
        Ok(inner.records.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("profile store lock poisoned");
        if inner.records.remove(id).is_none() {
            return Err(HotzoneError::Profile(format!("no profile with id {id}")).into());
        }
        if let Some(tx) = inner.watchers.get(id) {
            let _ = tx.send(None);
        }
        Ok(())
    }

    async fn subscribe(&self, id: &str) -> watch::Receiver<Option<DriverProfile>> {
        let mut inner = self.inner.lock().expect("profile store lock poisoned");
        let current = inner.records.get(id).cloned();
        let tx = inner
            .watchers
            .entry(id.to_string())
            .or_insert_with(|| watch::channel(None).0);
        let _ = tx.send(current);
        tx.subscribe()
    }
}
