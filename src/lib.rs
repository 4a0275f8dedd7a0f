//! # Hotzones
//!
//! Core engine for a driver-facing "hot zones" map application.
//!
//! This library owns everything between the external data services and the
//! render surface: reconciling push-delivered manual points with a polled
//! event/vehicle feed into one render-ready model, the persisted boost state
//! machine, reward zone generation, and the per-screen view controllers that
//! translate user actions into map commands.

pub mod app;
pub mod boost;
pub mod core;
pub mod data;
pub mod navigate;
pub mod reconcile;
pub mod screen;
pub mod sources;
pub mod storage;

// Re-export public API
pub use crate::core::{
    config::{AppConfig, CityFilter, Page},
    geo::LatLng,
};

pub use data::{
    point::{GeoPoint, HeatPoint, PointKey, PointSource},
    vehicle::Vehicle,
};

pub use sources::{
    feed::{FeedClient, FeedSnapshot},
    manual::{InMemoryManualStore, ManualPointSource, ManualRecord, NewPoint},
    profile::{DriverProfile, InMemoryProfileStore, ProfileStore},
};

pub use boost::{
    machine::{ActivationOutcome, BoostMachine, BoostStatus, Coefficient},
    zones::{generate_zones, RewardZone},
};

pub use reconcile::{MergedView, ReconcileService};

pub use screen::{
    boost::BoostScreen,
    map::{MapCommand, MapScreen},
};

pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};

pub use app::HotzoneApp;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum HotzoneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Store write failed: {0}")]
    StoreWrite(String),

    #[error("Profile error: {0}")]
    Profile(String),
}

/// Error type alias for convenience
pub type Error = HotzoneError;
