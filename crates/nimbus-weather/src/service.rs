//! Entry point for the weather layer.
//!
//! Everything is cached in canonical (metric) units and converted to the
//! requested display units on the way out, so switching units never costs a
//! network round trip.

use std::sync::Arc;
use std::time::Duration;

use nimbus_core::{Config, Units};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, ProviderError};
use crate::orchestrator::FetchOrchestrator;
use crate::provider::{Provider, WeatherSource};
use crate::query_cache::{CacheEvent, CachePolicies, QueryCache, QueryKey, QueryValue};
use crate::retry::RetryPolicy;
use crate::snapshot::{FileStore, Snapshot, SnapshotStore};
use crate::types::{CanonicalForecast, CanonicalWeather, Fetched, GeoPoint};
use crate::units::{convert_forecast, convert_weather};

/// Units everything is fetched and cached in
pub const CANONICAL_UNITS: Units = Units::Metric;

#[derive(Debug, Clone)]
pub struct WeatherService {
    orchestrator: FetchOrchestrator,
    cache: QueryCache,
    sweep_interval: Duration,
}

impl WeatherService {
    pub fn new(orchestrator: FetchOrchestrator, cache: QueryCache) -> Self {
        Self {
            orchestrator,
            cache,
            sweep_interval: Duration::from_secs(60),
        }
    }

    /// Wire up the configured provider, a file-backed snapshot under the
    /// profile's storage directory, and the configured cache policies.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let provider: Arc<dyn WeatherSource> = Arc::new(Provider::from_config(&config.weather)?);
        Ok(Self::with_source(provider, config))
    }

    /// Like [`from_config`](Self::from_config) with an explicit source.
    pub fn with_source(source: Arc<dyn WeatherSource>, config: &Config) -> Self {
        let max_age_hours = config.snapshot.max_age_hours.min(u64::from(u32::MAX)) as i64;
        let snapshots = SnapshotStore::new(Arc::new(FileStore::new(config.storage_dir())))
            .with_max_age(chrono::Duration::hours(max_age_hours));

        let orchestrator = FetchOrchestrator::new(source, snapshots, RetryPolicy::from(&config.retry));
        let cache = QueryCache::new(CachePolicies::from(&config.cache));

        Self {
            orchestrator,
            cache,
            sweep_interval: Duration::from_secs(config.cache.sweep_interval_secs.max(1)),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    /// Start the periodic cache sweeper. Needs a running tokio runtime.
    pub fn start(&self) {
        self.cache.start_sweeper(self.sweep_interval);
    }

    /// Current conditions at `point` in `display` units.
    pub async fn current(
        &self,
        point: &GeoPoint,
        display: Units,
        cancel: &CancellationToken,
    ) -> Result<Fetched<CanonicalWeather>, FetchError> {
        let orchestrator = self.orchestrator.clone();
        let target = point.clone();

        let value = self
            .cache
            .get_or_fetch(QueryKey::current(point, CANONICAL_UNITS), cancel, move |token| async move {
                orchestrator
                    .fetch_current(&target, CANONICAL_UNITS, &token)
                    .await
                    .map(QueryValue::Current)
            })
            .await?;

        let fetched = value.into_current().ok_or_else(kind_mismatch)?;
        Ok(fetched.map(|w| convert_weather(&w, CANONICAL_UNITS, display)))
    }

    /// Forecast at `point` in `display` units. May be served from the
    /// offline snapshot; check [`Fetched::is_from_snapshot`].
    pub async fn forecast(
        &self,
        point: &GeoPoint,
        display: Units,
        cancel: &CancellationToken,
    ) -> Result<Fetched<CanonicalForecast>, FetchError> {
        let orchestrator = self.orchestrator.clone();
        let target = point.clone();

        let value = self
            .cache
            .get_or_fetch(QueryKey::forecast(point, CANONICAL_UNITS), cancel, move |token| async move {
                orchestrator
                    .fetch_forecast(&target, CANONICAL_UNITS, &token)
                    .await
                    .map(QueryValue::Forecast)
            })
            .await?;

        let fetched = value.into_forecast().ok_or_else(kind_mismatch)?;
        Ok(fetched.map(|f| convert_forecast(&f, CANONICAL_UNITS, display)))
    }

    /// Cached current conditions in `display` units, without any fetch.
    pub fn cached_current(&self, point: &GeoPoint, display: Units) -> Option<Fetched<CanonicalWeather>> {
        self.cache
            .peek(&QueryKey::current(point, CANONICAL_UNITS))?
            .into_current()
            .map(|f| f.map(|w| convert_weather(&w, CANONICAL_UNITS, display)))
    }

    /// Cached forecast in `display` units, without any fetch.
    pub fn cached_forecast(&self, point: &GeoPoint, display: Units) -> Option<Fetched<CanonicalForecast>> {
        self.cache
            .peek(&QueryKey::forecast(point, CANONICAL_UNITS))?
            .into_forecast()
            .map(|f| f.map(|fc| convert_forecast(&fc, CANONICAL_UNITS, display)))
    }

    pub async fn search(&self, query: &str, cancel: &CancellationToken) -> Result<Vec<GeoPoint>, FetchError> {
        self.orchestrator.search_locations(query, cancel).await
    }

    /// Mark both queries for `point` stale; the next lookup revalidates.
    pub fn refresh(&self, point: &GeoPoint) {
        self.cache.invalidate(&QueryKey::current(point, CANONICAL_UNITS));
        self.cache.invalidate(&QueryKey::forecast(point, CANONICAL_UNITS));
    }

    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.orchestrator.snapshots().load()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.subscribe()
    }

    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}

fn kind_mismatch() -> FetchError {
    FetchError::DataShape("cache entry holds a different query kind".into())
}
