//! Weather data acquisition for Nimbus
//!
//! Fetches current conditions and forecasts from a configurable provider,
//! caches them with per-kind freshness policies, converts units without
//! touching the network, and falls back to the last good forecast when
//! offline.

pub mod conditions;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod query_cache;
pub mod retry;
pub mod service;
pub mod snapshot;
pub mod solar;
pub mod types;
pub mod units;

pub use error::{FetchError, ProviderError, StorageUnavailable};
pub use orchestrator::FetchOrchestrator;
pub use provider::{OpenMeteo, OpenWeatherMap, Provider, WeatherSource};
pub use query_cache::{CacheEvent, QueryCache, QueryKey, QueryKind, QueryValue};
pub use retry::RetryPolicy;
pub use service::WeatherService;
pub use snapshot::{FileStore, KeyValueStore, MemoryStore, Snapshot, SnapshotStore, StorageOutcome};
pub use types::*;
pub use units::Units;
