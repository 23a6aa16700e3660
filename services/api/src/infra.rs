use async_trait::async_trait;
use consent_rewards::config::EngineConfig;
use consent_rewards::error::AppError;
use consent_rewards::workflows::consent::{
    ConsentRewardsService, DatasetUpload, DatasetValidator, FileStore, HttpAccountDeletion,
    HttpValidator, JournalCaps, KeyValueStore, MemoryStore, SimulatedValidator,
    SimulatedVerifier, StoreError, ValidatorError, ValidatorVerdict,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type EngineService =
    ConsentRewardsService<ConfiguredStore, ConfiguredValidator, SimulatedVerifier>;

/// Store selected by `APP_DATA_DIR`.
pub(crate) enum ConfiguredStore {
    Memory(MemoryStore),
    File(FileStore),
}

impl KeyValueStore for ConfiguredStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            ConfiguredStore::Memory(store) => store.get(key),
            ConfiguredStore::File(store) => store.get(key),
        }
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        match self {
            ConfiguredStore::Memory(store) => store.set(key, value),
            ConfiguredStore::File(store) => store.set(key, value),
        }
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match self {
            ConfiguredStore::Memory(store) => store.remove(key),
            ConfiguredStore::File(store) => store.remove(key),
        }
    }
}

/// Validator selected by `APP_VALIDATOR_URL`.
pub(crate) enum ConfiguredValidator {
    Simulated(SimulatedValidator),
    Http(HttpValidator),
}

#[async_trait]
impl DatasetValidator for ConfiguredValidator {
    async fn validate(&self, upload: &DatasetUpload) -> Result<ValidatorVerdict, ValidatorError> {
        match self {
            ConfiguredValidator::Simulated(validator) => validator.validate(upload).await,
            ConfiguredValidator::Http(validator) => validator.validate(upload).await,
        }
    }
}

pub(crate) fn configured_store(config: &EngineConfig) -> Result<ConfiguredStore, AppError> {
    match &config.data_dir {
        Some(dir) => {
            let store = FileStore::open(dir)?;
            info!(root = %store.root().display(), "persisting engine state to disk");
            Ok(ConfiguredStore::File(store))
        }
        None => {
            info!("engine state kept in memory");
            Ok(ConfiguredStore::Memory(MemoryStore::default()))
        }
    }
}

pub(crate) fn configured_validator(
    config: &EngineConfig,
) -> Result<ConfiguredValidator, AppError> {
    match &config.validator_url {
        Some(url) => {
            let validator = HttpValidator::new(url.clone())?;
            info!(endpoint = validator.endpoint(), "using remote dataset validator");
            Ok(ConfiguredValidator::Http(validator))
        }
        None => Ok(ConfiguredValidator::Simulated(SimulatedValidator::default())),
    }
}

/// Wire the engine from configuration. Bootstrap partners are not seeded here.
pub(crate) fn build_engine(config: &EngineConfig) -> Result<EngineService, AppError> {
    let caps = JournalCaps {
        notifications: config.notification_cap,
        activity: config.activity_cap,
    };
    let service = ConsentRewardsService::open(
        Arc::new(configured_store(config)?),
        Arc::new(configured_validator(config)?),
        Arc::new(SimulatedVerifier::new(config.verification_delay)),
        caps,
    );

    match &config.account_deletion_url {
        Some(url) => {
            let client = HttpAccountDeletion::new(url.clone())?;
            Ok(service.with_account_deletion(Arc::new(client)))
        }
        None => Ok(service),
    }
}
