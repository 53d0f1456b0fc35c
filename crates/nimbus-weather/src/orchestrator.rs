//! Fetch orchestration: retries, error classification and the offline
//! snapshot fallback for forecasts.

use std::sync::Arc;

use nimbus_core::Units;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::provider::WeatherSource;
use crate::retry::{with_retry, RetryPolicy};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::types::{CanonicalForecast, CanonicalWeather, DataSource, Fetched, GeoPoint};
use crate::units::convert_forecast;

/// Runs provider calls under the retry policy and owns the snapshot
/// read/write path.
#[derive(Clone)]
pub struct FetchOrchestrator {
    source: Arc<dyn WeatherSource>,
    snapshots: SnapshotStore,
    policy: RetryPolicy,
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("snapshots", &self.snapshots)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl FetchOrchestrator {
    pub fn new(source: Arc<dyn WeatherSource>, snapshots: SnapshotStore, policy: RetryPolicy) -> Self {
        Self {
            source,
            snapshots,
            policy,
        }
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Current conditions. Failures propagate; there is no offline fallback.
    pub async fn fetch_current(
        &self,
        point: &GeoPoint,
        units: Units,
        cancel: &CancellationToken,
    ) -> Result<Fetched<CanonicalWeather>, FetchError> {
        let weather = with_retry(&self.policy, cancel, "fetch_current", || {
            self.source.fetch_current(point, units)
        })
        .await?;

        Ok(Fetched::network(weather))
    }

    /// Forecast, saved as the snapshot on success.
    ///
    /// When the network path fails with anything but a client error, a
    /// recent enough snapshot of the same location is served instead,
    /// tagged [`DataSource::Snapshot`].
    pub async fn fetch_forecast(
        &self,
        point: &GeoPoint,
        units: Units,
        cancel: &CancellationToken,
    ) -> Result<Fetched<CanonicalForecast>, FetchError> {
        let location_key = point.location_key();

        let result = with_retry(&self.policy, cancel, "fetch_forecast", || {
            self.source.fetch_forecast(point, units)
        })
        .await;

        match result {
            Ok(forecast) => {
                if cancel.is_cancelled() {
                    return Err(FetchError::Cancelled);
                }
                self.snapshots.save(&forecast, &location_key, units);
                Ok(Fetched::network(forecast))
            }
            Err(e @ (FetchError::Client { .. } | FetchError::Cancelled)) => Err(e),
            Err(e) => match self.recent_snapshot(&location_key) {
                Some(snapshot) => Ok(self.serve_snapshot(snapshot, units, &e)),
                None => {
                    tracing::debug!("No usable forecast snapshot for {}", location_key);
                    Err(e)
                }
            },
        }
    }

    /// Location search under the retry policy. No fallback.
    pub async fn search_locations(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<GeoPoint>, FetchError> {
        with_retry(&self.policy, cancel, "search_locations", || {
            self.source.search_locations(query)
        })
        .await
    }

    fn recent_snapshot(&self, location_key: &str) -> Option<Snapshot> {
        let snapshot = self.snapshots.load()?;
        if snapshot.location_key != location_key {
            tracing::debug!(
                "Forecast snapshot is for {}, not {}",
                snapshot.location_key,
                location_key
            );
            None
        } else if !self.snapshots.is_recent(&snapshot) {
            tracing::debug!("Forecast snapshot from {} is too old", snapshot.timestamp);
            None
        } else {
            Some(snapshot)
        }
    }

    fn serve_snapshot(&self, snapshot: Snapshot, units: Units, error: &FetchError) -> Fetched<CanonicalForecast> {
        tracing::warn!("Serving forecast snapshot for {}: {}", snapshot.location_key, error);

        let saved_at = snapshot.saved_at().unwrap_or_default();
        let value = convert_forecast(&snapshot.data, snapshot.units, units);

        Fetched {
            value,
            source: DataSource::Snapshot {
                saved_at,
                location_key: snapshot.location_key,
            },
        }
    }
}
