use std::sync::Arc;

use chrono::Utc;

use super::common::*;

use crate::workflows::consent::catalog::bootstrap_partners;
use crate::workflows::consent::domain::{PartnerStatus, RewardId, UploadOutcome, VoucherRecord};
use crate::workflows::consent::repository::{
    keys, FileStore, KeyValueStore, MemoryStore, PersistedState, PersistenceAdapter, StoreError,
};

fn populated_state() -> PersistedState {
    let mut vouchers = std::collections::BTreeMap::new();
    vouchers.insert(
        RewardId::new("r1"),
        VoucherRecord {
            reward_id: RewardId::new("r1"),
            code: "R1XABC123".to_string(),
            issued_at: Utc::now(),
        },
    );
    PersistedState {
        partners: bootstrap_partners(),
        datasets: covered_store().records().to_vec(),
        active_categories: categories(&[TRAVEL, BOOKINGS]),
        vouchers,
        ..PersistedState::default()
    }
}

#[test]
fn flush_then_load_restores_every_collection() {
    let adapter = PersistenceAdapter::new(Arc::new(MemoryStore::default()));
    let state = populated_state();

    adapter.flush(&state).expect("memory store accepts writes");
    let report = adapter.load();

    assert_eq!(report.state, state);
    assert!(report.reset_keys.is_empty());
    assert!(report.missing_keys.is_empty());
    assert!(!report.is_fresh());
}

#[test]
fn empty_store_loads_defaults() {
    let adapter = PersistenceAdapter::new(Arc::new(MemoryStore::default()));

    let report = adapter.load();

    assert!(report.is_fresh());
    assert_eq!(report.state, PersistedState::default());
}

#[test]
fn corrupt_datasets_do_not_block_partners() {
    let store = Arc::new(MemoryStore::default());
    let adapter = PersistenceAdapter::new(Arc::clone(&store));
    let state = populated_state();
    adapter.flush(&state).unwrap();

    store
        .set(keys::DATASETS, "[{\"id\": 1, \"fileName\"".to_string())
        .unwrap();
    let report = adapter.load();

    assert_eq!(report.reset_keys, vec![keys::DATASETS]);
    assert!(report.state.datasets.is_empty());
    assert_eq!(report.state.partners, state.partners);
    assert_eq!(report.state.vouchers, state.vouchers);
}

#[test]
fn collections_use_documented_shapes() {
    let store = Arc::new(MemoryStore::default());
    let adapter = PersistenceAdapter::new(Arc::clone(&store));
    adapter.flush(&populated_state()).unwrap();

    let active: serde_json::Value =
        serde_json::from_str(&store.get(keys::ACTIVE_CATEGORIES).unwrap().unwrap()).unwrap();
    assert_eq!(active, serde_json::json!([BOOKINGS, TRAVEL]));

    let vouchers: serde_json::Value =
        serde_json::from_str(&store.get(keys::VOUCHERS).unwrap().unwrap()).unwrap();
    assert_eq!(vouchers["r1"]["code"], "R1XABC123");

    let partners: serde_json::Value =
        serde_json::from_str(&store.get(keys::PARTNERS).unwrap().unwrap()).unwrap();
    assert_eq!(partners[0]["status"], "pending");
    assert_eq!(partners[0]["verification_status"], "unverified");

    assert_eq!(store.keys().len(), keys::ALL.len());
}

#[test]
fn flush_reports_store_failures() {
    let adapter = PersistenceAdapter::new(Arc::new(ReadOnlyStore));

    let err = adapter.flush(&populated_state()).unwrap_err();

    assert!(matches!(err, StoreError::Unavailable(_)));
}

#[test]
fn file_store_round_trips_through_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = Arc::new(FileStore::open(dir.path().join("state")).expect("open store"));
    let adapter = PersistenceAdapter::new(Arc::clone(&store));
    let mut state = populated_state();
    state.partners[0].status = PartnerStatus::Active;
    state.datasets.push(record(3, "Location", UploadOutcome::Error));

    adapter.flush(&state).unwrap();
    assert!(store.root().join("partners.json").exists());
    assert!(!store.root().join("partners.json.tmp").exists());

    let reopened = PersistenceAdapter::new(Arc::new(FileStore::open(store.root()).unwrap()));
    assert_eq!(reopened.load().state, state);
}

#[test]
fn file_store_rejects_path_like_keys() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = FileStore::open(dir.path()).unwrap();

    assert!(matches!(
        store.set("../escape", "{}".to_string()),
        Err(StoreError::InvalidKey(_))
    ));
    assert_eq!(store.get("never_written").unwrap(), None);
    store.remove("never_written").expect("missing keys remove cleanly");
}

#[test]
fn clear_drops_every_key() {
    let store = Arc::new(MemoryStore::default());
    let adapter = PersistenceAdapter::new(Arc::clone(&store));
    adapter.flush(&populated_state()).unwrap();

    adapter.clear().unwrap();

    assert!(store.keys().is_empty());
    assert!(adapter.load().is_fresh());
}
