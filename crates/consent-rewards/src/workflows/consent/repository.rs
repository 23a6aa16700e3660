use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use super::domain::{CategoryId, DatasetRecord, Partner, RewardId, VoucherRecord};
use super::emitter::{
    ActivityLogEntry, DashboardAggregates, NotificationEntry, NotificationPreferences,
};

/// One logical storage key per persisted collection.
pub mod keys {
    pub const PARTNERS: &str = "partners";
    pub const DATASETS: &str = "datasets";
    pub const ACTIVE_CATEGORIES: &str = "active_categories";
    pub const VOUCHERS: &str = "vouchers";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const ACTIVITY_LOG: &str = "activity_log";
    pub const DASHBOARD: &str = "dashboard";
    pub const NOTIFICATION_PREFERENCES: &str = "notification_preferences";
    pub const DATASET_SEQUENCE: &str = "dataset_sequence";

    pub const ALL: [&str; 9] = [
        PARTNERS,
        DATASETS,
        DATASET_SEQUENCE,
        ACTIVE_CATEGORIES,
        VOUCHERS,
        NOTIFICATIONS,
        ACTIVITY_LOG,
        DASHBOARD,
        NOTIFICATION_PREFERENCES,
    ];
}

/// String key-value storage the engine persists through.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
    #[error("storage io failed for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn keys(&self) -> Vec<String> {
        let values = self.values.lock().expect("memory store poisoned");
        let mut keys: Vec<String> = values.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().expect("memory store poisoned");
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut values = self.values.lock().expect("memory store poisoned");
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().expect("memory store poisoned");
        values.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let staging = path.with_extension("json.tmp");
        let io_err = |source: io::Error| StoreError::Io {
            key: key.to_string(),
            source,
        };
        fs::write(&staging, value).map_err(io_err)?;
        fs::rename(&staging, &path).map_err(io_err)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// Every collection the engine persists, in its storage shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub partners: Vec<Partner>,
    pub datasets: Vec<DatasetRecord>,
    /// Highest dataset id ever issued.
    pub dataset_sequence: u64,
    pub active_categories: BTreeSet<CategoryId>,
    pub vouchers: BTreeMap<RewardId, VoucherRecord>,
    pub notifications: Vec<NotificationEntry>,
    pub activity_log: Vec<ActivityLogEntry>,
    pub dashboard: DashboardAggregates,
    pub notification_preferences: NotificationPreferences,
}

/// Outcome of a load: the recovered state plus which keys fell back to defaults.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub state: PersistedState,
    /// Keys whose stored value could not be read or decoded.
    pub reset_keys: Vec<&'static str>,
    /// Keys with nothing stored yet.
    pub missing_keys: Vec<&'static str>,
}

impl LoadReport {
    pub fn is_fresh(&self) -> bool {
        self.missing_keys.len() == keys::ALL.len()
    }
}

/// Maps [`PersistedState`] onto a [`KeyValueStore`], one JSON document per key.
#[derive(Debug)]
pub struct PersistenceAdapter<S> {
    store: Arc<S>,
}

impl<S> Clone for PersistenceAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> PersistenceAdapter<S>
where
    S: KeyValueStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Partial recovery: a key that fails to decode resets to its default and the
    /// remaining keys still load.
    pub fn load(&self) -> LoadReport {
        let mut report = LoadReport::default();
        let state = PersistedState {
            partners: self.load_key(keys::PARTNERS, &mut report),
            datasets: self.load_key(keys::DATASETS, &mut report),
            dataset_sequence: self.load_key(keys::DATASET_SEQUENCE, &mut report),
            active_categories: self.load_key(keys::ACTIVE_CATEGORIES, &mut report),
            vouchers: self.load_key(keys::VOUCHERS, &mut report),
            notifications: self.load_key(keys::NOTIFICATIONS, &mut report),
            activity_log: self.load_key(keys::ACTIVITY_LOG, &mut report),
            dashboard: self.load_key(keys::DASHBOARD, &mut report),
            notification_preferences: self.load_key(keys::NOTIFICATION_PREFERENCES, &mut report),
        };
        report.state = state;
        report
    }

    /// Writes every key. All keys are attempted; the first failure is returned.
    pub fn flush(&self, state: &PersistedState) -> Result<(), StoreError> {
        let results = [
            self.save_key(keys::PARTNERS, &state.partners),
            self.save_key(keys::DATASETS, &state.datasets),
            self.save_key(keys::DATASET_SEQUENCE, &state.dataset_sequence),
            self.save_key(keys::ACTIVE_CATEGORIES, &state.active_categories),
            self.save_key(keys::VOUCHERS, &state.vouchers),
            self.save_key(keys::NOTIFICATIONS, &state.notifications),
            self.save_key(keys::ACTIVITY_LOG, &state.activity_log),
            self.save_key(keys::DASHBOARD, &state.dashboard),
            self.save_key(keys::NOTIFICATION_PREFERENCES, &state.notification_preferences),
        ];
        results.into_iter().collect()
    }

    /// Drops every persisted collection.
    pub fn clear(&self) -> Result<(), StoreError> {
        keys::ALL.iter().try_for_each(|key| self.store.remove(key))
    }

    fn load_key<T>(&self, key: &'static str, report: &mut LoadReport) -> T
    where
        T: DeserializeOwned + Default,
    {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                report.missing_keys.push(key);
                return T::default();
            }
            Err(err) => {
                error!(key, error = %err, "failed to read persisted collection; using defaults");
                report.reset_keys.push(key);
                return T::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "corrupt persisted collection; resetting to defaults");
                report.reset_keys.push(key);
                T::default()
            }
        }
    }

    fn save_key<T>(&self, key: &'static str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + ?Sized,
    {
        let encoded = serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, encoded)
    }
}
