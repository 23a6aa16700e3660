use std::collections::BTreeSet;

use super::datasets::DatasetStore;
use super::domain::{CategoryId, PartnerId};
use super::emitter::{DashboardAggregates, Journal, JournalCaps};
use super::ledger::RewardLedger;
use super::lifecycle::PartnerBook;
use super::repository::PersistedState;

/// The serializable engine state. Every mutation goes through the owning service.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub partners: PartnerBook,
    pub datasets: DatasetStore,
    pub active_categories: BTreeSet<CategoryId>,
    pub ledger: RewardLedger,
    pub journal: Journal,
    pub dashboard: DashboardAggregates,
}

impl EngineState {
    /// Rebuild from storage. Returns the partners whose verification was cut short by
    /// the restart; they come back as `Pending`.
    pub fn restore(persisted: PersistedState, caps: JournalCaps) -> (Self, Vec<PartnerId>) {
        let mut partners = PartnerBook::from_partners(persisted.partners);
        let interrupted = partners.release_interrupted();

        let state = Self {
            partners,
            datasets: DatasetStore::restore(persisted.datasets, persisted.dataset_sequence),
            active_categories: persisted.active_categories,
            ledger: RewardLedger::from_vouchers(persisted.vouchers),
            journal: Journal::restore(
                persisted.notifications,
                persisted.activity_log,
                persisted.notification_preferences,
                caps,
            ),
            dashboard: persisted.dashboard,
        };
        (state, interrupted)
    }

    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            partners: self.partners.iter().cloned().collect(),
            datasets: self.datasets.records().to_vec(),
            dataset_sequence: self.datasets.last_issued(),
            active_categories: self.active_categories.clone(),
            vouchers: self.ledger.vouchers().clone(),
            notifications: self.journal.notifications().to_vec(),
            activity_log: self.journal.activity().to_vec(),
            dashboard: self.dashboard.clone(),
            notification_preferences: self.journal.preferences(),
        }
    }
}
