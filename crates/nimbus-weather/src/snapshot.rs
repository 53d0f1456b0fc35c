//! Last-known-good forecast snapshot.
//!
//! A single slot holding the most recent successful forecast, used when the
//! network is unavailable. Storage failures never reach callers: every
//! operation degrades to a no-op, reported as [`StorageOutcome::Unavailable`]
//! or through [`SnapshotStore::try_load`].

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use nimbus_core::Units;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StorageUnavailable;
use crate::types::CanonicalForecast;

/// Logical key of the forecast snapshot
pub const SNAPSHOT_KEY: &str = "forecast_snapshot";

/// Default maximum snapshot age
pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;

/// String key-value persistence medium
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageUnavailable>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageUnavailable>;
    fn remove(&self, key: &str) -> Result<(), StorageUnavailable>;
}

/// One JSON file per key under a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageUnavailable> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageUnavailable::new(format!("invalid key: {:?}", key)));
        }
        Ok(self.root.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageUnavailable> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageUnavailable> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root)?;

        // Readers never observe a partially written file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageUnavailable> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, for tests and profiles without a writable directory
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageUnavailable> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageUnavailable> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageUnavailable> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Persisted forecast with the context it was fetched in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub data: CanonicalForecast,
    /// RFC 3339 save time
    pub timestamp: String,
    pub location_key: String,
    pub units: Units,
}

impl Snapshot {
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Age at `now`; `None` when the timestamp does not parse
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.saved_at().map(|saved| now - saved)
    }
}

/// Result of a write to the snapshot medium
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOutcome {
    Stored,
    Unavailable(StorageUnavailable),
}

impl StorageOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, StorageOutcome::Stored)
    }
}

impl From<Result<(), StorageUnavailable>> for StorageOutcome {
    fn from(result: Result<(), StorageUnavailable>) -> Self {
        match result {
            Ok(()) => StorageOutcome::Stored,
            Err(e) => {
                tracing::debug!("Snapshot storage degraded: {}", e);
                StorageOutcome::Unavailable(e)
            }
        }
    }
}

/// Single-slot forecast snapshot over a [`KeyValueStore`]
#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn KeyValueStore>,
    max_age: Duration,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            max_age: Duration::hours(DEFAULT_MAX_AGE_HOURS),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Overwrite the slot with `forecast`, stamped with the current time.
    pub fn save(&self, forecast: &CanonicalForecast, location_key: &str, units: Units) -> StorageOutcome {
        self.save_at(forecast, location_key, units, Utc::now())
    }

    /// [`save`](Self::save) with an explicit timestamp.
    pub fn save_at(
        &self,
        forecast: &CanonicalForecast,
        location_key: &str,
        units: Units,
        at: DateTime<Utc>,
    ) -> StorageOutcome {
        let snapshot = Snapshot {
            data: forecast.clone(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            location_key: location_key.to_string(),
            units,
        };

        let outcome: StorageOutcome = serde_json::to_string(&snapshot)
            .map_err(|e| StorageUnavailable::new(e.to_string()))
            .and_then(|json| self.store.set(SNAPSHOT_KEY, &json))
            .into();

        if outcome.is_stored() {
            tracing::debug!("Saved forecast snapshot for {}", location_key);
        }
        outcome
    }

    /// Load the snapshot, reporting an unusable medium.
    ///
    /// A stored value that no longer parses is treated as absent.
    pub fn try_load(&self) -> Result<Option<Snapshot>, StorageUnavailable> {
        let Some(json) = self.store.get(SNAPSHOT_KEY)? else {
            return Ok(None);
        };

        match serde_json::from_str::<Snapshot>(&json) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::debug!("Discarding unreadable forecast snapshot: {}", e);
                Ok(None)
            }
        }
    }

    /// Load the snapshot; an unavailable medium reads as empty.
    pub fn load(&self) -> Option<Snapshot> {
        self.try_load().unwrap_or_else(|e| {
            tracing::debug!("Snapshot storage degraded: {}", e);
            None
        })
    }

    /// Whether `snapshot` is younger than the maximum age
    pub fn is_recent(&self, snapshot: &Snapshot) -> bool {
        self.is_recent_at(snapshot, Utc::now())
    }

    pub fn is_recent_at(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> bool {
        snapshot.age_at(now).is_some_and(|age| age < self.max_age)
    }

    pub fn clear(&self) -> StorageOutcome {
        self.store.remove(SNAPSHOT_KEY).into()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::types::HourlySource;

    /// Medium that refuses every operation
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageUnavailable> {
            Err(StorageUnavailable::new("quota exceeded"))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageUnavailable> {
            Err(StorageUnavailable::new("quota exceeded"))
        }
        fn remove(&self, _key: &str) -> Result<(), StorageUnavailable> {
            Err(StorageUnavailable::new("quota exceeded"))
        }
    }

    fn forecast() -> CanonicalForecast {
        CanonicalForecast {
            daily: vec![],
            hourly: vec![],
            hourly_source: HourlySource::Provider,
            timezone: 3600,
        }
    }

    #[test]
    fn test_save_then_load() {
        let store = SnapshotStore::in_memory();
        assert!(store.load().is_none());

        let outcome = store.save(&forecast(), "51.5000,-0.1200", Units::Metric);
        assert_eq!(outcome, StorageOutcome::Stored);

        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.data, forecast());
        assert_eq!(snapshot.location_key, "51.5000,-0.1200");
        assert_eq!(snapshot.units, Units::Metric);
        assert!(store.is_recent(&snapshot));
    }

    #[test]
    fn test_most_recent_write_wins() {
        let store = SnapshotStore::in_memory();
        store.save(&forecast(), "1.0000,1.0000", Units::Metric);
        store.save(&forecast(), "2.0000,2.0000", Units::Imperial);

        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.location_key, "2.0000,2.0000");
        assert_eq!(snapshot.units, Units::Imperial);
    }

    #[test]
    fn test_recency_boundary() {
        let store = SnapshotStore::in_memory();
        let now = Utc::now();

        store.save_at(&forecast(), "k", Units::Metric, now - Duration::hours(2));
        let snapshot = store.load().unwrap();
        assert!(store.is_recent_at(&snapshot, now));

        store.save_at(&forecast(), "k", Units::Metric, now - Duration::hours(25));
        let snapshot = store.load().unwrap();
        assert!(!store.is_recent_at(&snapshot, now));

        store.save_at(&forecast(), "k", Units::Metric, now - Duration::hours(24));
        let snapshot = store.load().unwrap();
        assert!(!store.is_recent_at(&snapshot, now));
    }

    #[test]
    fn test_unparseable_timestamp_is_not_recent() {
        let store = SnapshotStore::in_memory();
        let snapshot = Snapshot {
            data: forecast(),
            timestamp: "yesterday".into(),
            location_key: "k".into(),
            units: Units::Metric,
        };
        assert!(!store.is_recent(&snapshot));
    }

    #[test]
    fn test_clear() {
        let store = SnapshotStore::in_memory();
        store.save(&forecast(), "k", Units::Metric);
        assert!(store.clear().is_stored());
        assert!(store.load().is_none());
        // Clearing an empty slot is fine
        assert!(store.clear().is_stored());
    }

    #[test]
    fn test_unavailable_medium_degrades() {
        let store = SnapshotStore::new(Arc::new(BrokenStore));

        let outcome = store.save(&forecast(), "k", Units::Metric);
        assert!(matches!(outcome, StorageOutcome::Unavailable(_)));
        assert!(matches!(store.clear(), StorageOutcome::Unavailable(_)));
        assert!(store.try_load().is_err());
        assert!(store.load().is_none());
    }

    #[test]
    fn test_corrupt_value_reads_as_empty() {
        let memory = Arc::new(MemoryStore::new());
        memory.set(SNAPSHOT_KEY, "{not json").unwrap();

        let store = SnapshotStore::new(memory);
        assert_eq!(store.try_load(), Ok(None));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileStore::new(dir.path().join("storage"));

        assert_eq!(files.get("forecast_snapshot").unwrap(), None);
        files.set("forecast_snapshot", "{\"a\":1}").unwrap();
        assert_eq!(
            files.get("forecast_snapshot").unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert!(dir.path().join("storage/forecast_snapshot.json").exists());

        files.remove("forecast_snapshot").unwrap();
        assert_eq!(files.get("forecast_snapshot").unwrap(), None);
        files.remove("forecast_snapshot").unwrap();
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileStore::new(dir.path());
        assert!(files.set("../escape", "x").is_err());
        assert!(files.get("").is_err());
    }

    #[test]
    fn test_snapshot_survives_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        SnapshotStore::new(Arc::new(FileStore::new(dir.path()))).save(
            &forecast(),
            "k",
            Units::Metric,
        );

        let reopened = SnapshotStore::new(Arc::new(FileStore::new(dir.path())));
        assert_eq!(reopened.load().unwrap().data, forecast());
    }
}
