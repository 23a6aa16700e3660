use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::workflows::consent::catalog::bootstrap_partners;
use crate::workflows::consent::datasets::DatasetStore;
use crate::workflows::consent::domain::{
    CategoryId, DatasetId, DatasetRecord, Partner, PartnerId, UploadOutcome,
};
use crate::workflows::consent::emitter::JournalCaps;
use crate::workflows::consent::repository::{KeyValueStore, MemoryStore, StoreError};
use crate::workflows::consent::service::ConsentRewardsService;
use crate::workflows::consent::validator::{
    DatasetUpload, DatasetValidator, SimulatedValidator, ValidatorError, ValidatorVerdict,
};
use crate::workflows::consent::verification::{
    SimulatedVerifier, VerificationVerdict, Verifier, VerifierError,
};

pub(super) type TestService =
    ConsentRewardsService<MemoryStore, SimulatedValidator, SimulatedVerifier>;

pub(super) const TRAVEL: &str = "Travel Preferences";
pub(super) const BOOKINGS: &str = "Booking History";

pub(super) fn category(label: &str) -> CategoryId {
    CategoryId::new(label)
}

pub(super) fn categories(labels: &[&str]) -> BTreeSet<CategoryId> {
    labels.iter().map(|label| category(label)).collect()
}

/// SkyHigh Airways: requires travel preferences and booking history, rewards `r1`.
pub(super) fn skyhigh() -> Partner {
    bootstrap_partners()
        .into_iter()
        .find(|partner| partner.id == PartnerId(1))
        .expect("bootstrap partner 1")
}

pub(super) fn record(id: u64, label: &str, outcome: UploadOutcome) -> DatasetRecord {
    DatasetRecord {
        id: DatasetId(id),
        file_name: format!("{}-{id}.csv", label.to_lowercase().replace(' ', "-")),
        category: category(label),
        size_bytes: 128,
        uploaded_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap(),
        outcome,
        record_count: if outcome == UploadOutcome::Success { 12 } else { 0 },
        file_type: "text/csv".to_string(),
    }
}

pub(super) fn store_with(records: Vec<DatasetRecord>) -> DatasetStore {
    DatasetStore::from_records(records)
}

/// Both SkyHigh categories covered by successful uploads with ids 1 and 2.
pub(super) fn covered_store() -> DatasetStore {
    store_with(vec![
        record(1, TRAVEL, UploadOutcome::Success),
        record(2, BOOKINGS, UploadOutcome::Success),
    ])
}

pub(super) fn csv_upload(label: &str) -> DatasetUpload {
    DatasetUpload::new(
        format!("{}.csv", label.to_lowercase().replace(' ', "_")),
        category(label),
        "date,value\n2025-01-04,alpha\n2025-02-11,beta\n",
    )
}

pub(super) fn build_service() -> Arc<TestService> {
    build_service_with_store(Arc::new(MemoryStore::default()))
}

pub(super) fn build_service_with_store(store: Arc<MemoryStore>) -> Arc<TestService> {
    let service = ConsentRewardsService::open(
        store,
        Arc::new(SimulatedValidator::default()),
        Arc::new(SimulatedVerifier::instant()),
        JournalCaps::default(),
    );
    service.seed_partners(bootstrap_partners());
    Arc::new(service)
}

/// Enables both SkyHigh categories and uploads one valid CSV for each.
pub(super) async fn prepare_skyhigh<S, D, V>(
    service: &ConsentRewardsService<S, D, V>,
) -> Vec<DatasetId>
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    let mut ids = Vec::new();
    for label in [TRAVEL, BOOKINGS] {
        service
            .set_category_active(&category(label), true)
            .expect("known category");
        let receipt = service
            .upload_dataset(csv_upload(label))
            .await
            .expect("upload accepted");
        assert!(receipt.record.is_success(), "{:?}", receipt.rationale);
        ids.push(receipt.record.id);
    }
    ids
}

/// Verifier whose verdicts are released one invocation at a time by the test.
pub(super) struct GateVerifier {
    gates: Mutex<VecDeque<oneshot::Receiver<bool>>>,
}

impl GateVerifier {
    pub(super) fn new(invocations: usize) -> (Self, Vec<oneshot::Sender<bool>>) {
        let mut gates = VecDeque::with_capacity(invocations);
        let mut releases = Vec::with_capacity(invocations);
        for _ in 0..invocations {
            let (release, gate) = oneshot::channel();
            gates.push_back(gate);
            releases.push(release);
        }
        (
            Self {
                gates: Mutex::new(gates),
            },
            releases,
        )
    }
}

#[async_trait]
impl Verifier for GateVerifier {
    async fn verify(
        &self,
        _partner: &Partner,
        _datasets: &[DatasetRecord],
    ) -> Result<VerificationVerdict, VerifierError> {
        let gate = self
            .gates
            .lock()
            .expect("gate mutex poisoned")
            .pop_front()
            .ok_or_else(|| VerifierError::Unavailable("no gate left".to_string()))?;
        let success = gate
            .await
            .map_err(|_| VerifierError::RequestFailed("gate dropped".to_string()))?;
        Ok(VerificationVerdict { success })
    }
}

pub(super) struct FailingVerifier;

#[async_trait]
impl Verifier for FailingVerifier {
    async fn verify(
        &self,
        _partner: &Partner,
        _datasets: &[DatasetRecord],
    ) -> Result<VerificationVerdict, VerifierError> {
        Err(VerifierError::Unavailable("verification backend offline".to_string()))
    }
}

/// Validator that always answers with the same outcome.
pub(super) struct FixedValidator {
    pub(super) outcome: Result<ValidatorVerdict, ValidatorError>,
}

#[async_trait]
impl DatasetValidator for FixedValidator {
    async fn validate(&self, _upload: &DatasetUpload) -> Result<ValidatorVerdict, ValidatorError> {
        self.outcome.clone()
    }
}

/// Store whose writes always fail; reads see nothing.
#[derive(Default)]
pub(super) struct ReadOnlyStore;

impl KeyValueStore for ReadOnlyStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: String) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read only".to_string()))
    }

    fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read only".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
