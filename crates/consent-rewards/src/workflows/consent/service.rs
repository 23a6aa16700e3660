use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::account::{
    AccountDeletion, AccountDeletionRequest, AccountDeletionResponse, AccountError,
};
use super::catalog::{Category, CategoryRegistry};
use super::datasets::UploadReceipt;
use super::domain::{
    CategoryId, DatasetId, DatasetRecord, Partner, PartnerId, PartnerStatus, RewardId,
    VoucherRecord,
};
use super::eligibility::{evaluate, Eligibility};
use super::emitter::{
    ActivityLogEntry, EngineEvent, JournalCaps, NotificationEntry, NotificationPreferences,
    TransactionEntry,
};
use super::ledger::{LedgerError, Redemption};
use super::lifecycle::{
    Acceptance, LifecycleError, Transition, VerificationDelivery, VerificationTicket,
};
use super::repository::{KeyValueStore, PersistenceAdapter};
use super::state::EngineState;
use super::validator::{DatasetUpload, DatasetValidator};
use super::verification::{
    VerdictSink, VerificationHandle, VerificationOrchestrator, VerificationVerdict, Verifier,
};
use super::writer::StateWriter;

/// A category together with whether the user currently shares it.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryView {
    #[serde(flatten)]
    pub category: Category,
    pub active: bool,
}

/// Partner as presented to the user, with the current eligibility verdict.
#[derive(Debug, Clone, Serialize)]
pub struct PartnerView {
    #[serde(flatten)]
    pub partner: Partner,
    /// Only computed while the partner still awaits a decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligibility: Option<Eligibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    pub reward_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher: Option<VoucherRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub active_partners: usize,
    pub pending_offers: usize,
    pub verifying: usize,
    pub uploads: usize,
    pub successful_uploads: usize,
    pub shared_categories: usize,
    pub redeemed_count: u64,
    pub unread_notifications: usize,
    pub unlocked_rewards: Vec<RewardId>,
    pub transactions: Vec<TransactionEntry>,
}

/// Owns the engine state and applies every user action and verdict to it. Each mutation
/// queues a snapshot for the background writer.
pub struct ConsentRewardsService<S, D, V> {
    state: Mutex<EngineState>,
    writer: StateWriter<S>,
    validator: Arc<D>,
    orchestrator: VerificationOrchestrator<V>,
    registry: CategoryRegistry,
    account: Option<Arc<dyn AccountDeletion>>,
    reset_keys: Vec<&'static str>,
}

impl<S, D, V> ConsentRewardsService<S, D, V>
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    pub fn open(store: Arc<S>, validator: Arc<D>, verifier: Arc<V>, caps: JournalCaps) -> Self {
        Self::with_registry(CategoryRegistry::standard(), store, validator, verifier, caps)
    }

    pub fn with_registry(
        registry: CategoryRegistry,
        store: Arc<S>,
        validator: Arc<D>,
        verifier: Arc<V>,
        caps: JournalCaps,
    ) -> Self {
        let persistence = PersistenceAdapter::new(store);
        let report = persistence.load();
        if !report.reset_keys.is_empty() {
            warn!(keys = ?report.reset_keys, "persisted collections reset to defaults");
        }
        let reset_keys = report.reset_keys.clone();
        let (state, interrupted) = EngineState::restore(report.state, caps);

        let service = Self {
            state: Mutex::new(state),
            writer: StateWriter::start(persistence),
            validator,
            orchestrator: VerificationOrchestrator::new(verifier),
            registry,
            account: None,
            reset_keys,
        };

        if !interrupted.is_empty() {
            info!(
                partners = ?interrupted,
                "verifications interrupted by restart returned to pending"
            );
            service.persist(&service.lock());
        }
        service
    }

    pub fn with_account_deletion(mut self, client: Arc<dyn AccountDeletion>) -> Self {
        self.account = Some(client);
        self
    }

    /// Keys that failed to load and were reset when the service opened.
    pub fn reset_keys(&self) -> &[&'static str] {
        &self.reset_keys
    }

    /// Admit bootstrap partners that are not already known. Returns how many were added.
    pub fn seed_partners(&self, partners: impl IntoIterator<Item = Partner>) -> usize {
        let mut state = self.lock();
        let mut seeded = 0;
        for partner in partners {
            if state.partners.get(partner.id).is_some() {
                continue;
            }
            if state.partners.offer(partner).is_ok() {
                seeded += 1;
            }
        }
        if seeded > 0 {
            self.persist(&state);
        }
        seeded
    }

    pub fn offer_partner(&self, partner: Partner) -> Result<(), EngineError> {
        let mut state = self.lock();
        let event = EngineEvent::PartnerOffered {
            partner: partner.id,
            name: partner.name.clone(),
        };
        state.partners.offer(partner)?;
        state.journal.record(&event, Utc::now());
        self.persist(&state);
        Ok(())
    }

    pub fn categories(&self) -> Vec<CategoryView> {
        let state = self.lock();
        self.registry
            .iter()
            .map(|category| CategoryView {
                active: state.active_categories.contains(&category.id),
                category: category.clone(),
            })
            .collect()
    }

    pub fn active_categories(&self) -> BTreeSet<CategoryId> {
        self.lock().active_categories.clone()
    }

    /// Returns whether the set changed.
    pub fn set_category_active(
        &self,
        category: &CategoryId,
        active: bool,
    ) -> Result<bool, EngineError> {
        self.require_category(category)?;
        let mut state = self.lock();
        let changed = if active {
            state.active_categories.insert(category.clone())
        } else {
            state.active_categories.remove(category)
        };
        if changed {
            let event = EngineEvent::CategoryToggled {
                category: category.clone(),
                active,
            };
            state.journal.record(&event, Utc::now());
            self.persist(&state);
        }
        Ok(changed)
    }

    pub fn datasets(&self) -> Vec<DatasetRecord> {
        self.lock().datasets.records().to_vec()
    }

    /// The validator runs without the state lock held; a failed validation still
    /// produces a stored `error` record.
    pub async fn upload_dataset(
        &self,
        upload: DatasetUpload,
    ) -> Result<UploadReceipt, EngineError> {
        self.require_category(&upload.category)?;
        let verdict = self.validator.validate(&upload).await;

        let mut state = self.lock();
        let receipt =
            state
                .datasets
                .record_verdict(upload, verdict, Utc::now(), &mut rand::thread_rng());
        let event = EngineEvent::DatasetUploaded {
            dataset: receipt.record.id,
            file_name: receipt.record.file_name.clone(),
            category: receipt.record.category.clone(),
            success: receipt.record.is_success(),
            rationale: receipt.rationale.clone(),
        };
        state.journal.record(&event, receipt.record.uploaded_at);
        self.persist(&state);
        Ok(receipt)
    }

    pub fn remove_dataset(&self, id: DatasetId) -> Result<DatasetRecord, EngineError> {
        let mut state = self.lock();
        let removed = state
            .datasets
            .remove(id)
            .ok_or(EngineError::UnknownDataset(id))?;
        let event = EngineEvent::DatasetRemoved {
            dataset: removed.id,
            file_name: removed.file_name.clone(),
        };
        state.journal.record(&event, Utc::now());
        self.persist(&state);
        Ok(removed)
    }

    pub fn partners(&self) -> Vec<PartnerView> {
        let state = self.lock();
        let today = Utc::now().date_naive();
        state
            .partners
            .iter()
            .map(|partner| partner_view(&state, partner, today))
            .collect()
    }

    pub fn partner(&self, id: PartnerId) -> Result<PartnerView, EngineError> {
        let state = self.lock();
        let partner = state
            .partners
            .get(id)
            .ok_or(LifecycleError::UnknownPartner(id))?;
        Ok(partner_view(&state, partner, Utc::now().date_naive()))
    }

    pub fn eligibility(&self, id: PartnerId) -> Result<Eligibility, EngineError> {
        let state = self.lock();
        let eligibility =
            state
                .partners
                .eligibility(id, &state.active_categories, &state.datasets)?;
        Ok(eligibility)
    }

    /// Guarded hand-off to verification. Must be called inside a tokio runtime: the
    /// verdict is delivered back to this service from a spawned task.
    pub fn request_acceptance(
        self: &Arc<Self>,
        partner_id: PartnerId,
        selected: &[DatasetId],
    ) -> Result<VerificationHandle, EngineError> {
        let acceptance = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let acceptance = state.partners.request_acceptance(
                partner_id,
                selected,
                &state.active_categories,
                &state.datasets,
            )?;
            match acceptance.transition {
                Some(transition) => {
                    info!(
                        partner = %partner_id,
                        from = %transition.from,
                        to = %transition.to,
                        token = acceptance.ticket.token,
                        "verification requested"
                    );
                    let event = EngineEvent::VerificationStarted {
                        partner: partner_id,
                        name: acceptance.partner.name.clone(),
                    };
                    state.journal.record(&event, Utc::now());
                }
                None => {
                    info!(
                        partner = %partner_id,
                        token = acceptance.ticket.token,
                        "outstanding verification superseded"
                    );
                }
            }
            self.persist(state);
            acceptance
        };

        let Acceptance {
            ticket,
            partner,
            datasets,
            ..
        } = acceptance;
        Ok(self
            .orchestrator
            .dispatch(Arc::clone(self), ticket, partner, datasets))
    }

    /// Apply a verdict for `ticket`. Superseded or cancelled tickets come back as
    /// [`VerificationDelivery::Stale`] and change nothing.
    pub fn apply_verification(
        &self,
        ticket: VerificationTicket,
        success: bool,
    ) -> Result<VerificationDelivery, EngineError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let delivery = state.partners.on_verification_result(
            ticket,
            success,
            &state.active_categories,
            &state.datasets,
        )?;
        let transition = match delivery {
            VerificationDelivery::Applied(transition) => transition,
            VerificationDelivery::Stale => {
                debug!(
                    partner = %ticket.partner_id,
                    token = ticket.token,
                    "dropping stale verification verdict"
                );
                return Ok(delivery);
            }
        };

        let now = Utc::now();
        let partner = state
            .partners
            .get(ticket.partner_id)
            .cloned()
            .ok_or(LifecycleError::UnknownPartner(ticket.partner_id))?;
        if success && transition.to != PartnerStatus::Active {
            warn!(
                partner = %ticket.partner_id,
                "requirements lapsed during verification; activation refused"
            );
        }
        let event = if transition.to == PartnerStatus::Active {
            state.dashboard.record_activation(&partner, now);
            EngineEvent::PartnerActivated {
                partner: partner.id,
                name: partner.name.clone(),
                reward_title: partner.reward.title.clone(),
            }
        } else {
            EngineEvent::VerificationFailed {
                partner: partner.id,
                name: partner.name.clone(),
            }
        };
        info!(
            partner = %partner.id,
            from = %transition.from,
            to = %transition.to,
            "verification settled"
        );
        state.journal.record(&event, now);
        self.persist(state);
        Ok(delivery)
    }

    pub fn cancel_verification(&self, id: PartnerId) -> Result<Transition, EngineError> {
        let mut state = self.lock();
        let transition = state.partners.cancel_verification(id)?;
        let name = partner_name(&state, id);
        info!(partner = %id, "verification cancelled");
        state
            .journal
            .record(&EngineEvent::VerificationCancelled { partner: id, name }, Utc::now());
        self.persist(&state);
        Ok(transition)
    }

    pub fn reject(&self, id: PartnerId) -> Result<Vec<Transition>, EngineError> {
        let mut state = self.lock();
        let transitions = state.partners.reject(id)?;
        let name = partner_name(&state, id);
        info!(partner = %id, "partner rejected");
        state
            .journal
            .record(&EngineEvent::PartnerRejected { partner: id, name }, Utc::now());
        self.persist(&state);
        Ok(transitions)
    }

    /// Idempotent: a reward redeemed before returns its original voucher.
    pub fn redeem(&self, reward: &RewardId) -> Result<Redemption, EngineError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let partner = state
            .partners
            .by_reward(reward)
            .ok_or_else(|| EngineError::UnknownReward(reward.clone()))?;
        let redemption = state.ledger.redeem(partner, Utc::now())?;
        if redemption.newly_issued {
            let event = EngineEvent::RewardRedeemed {
                reward: reward.clone(),
                title: partner.reward.title.clone(),
                code: redemption.voucher.code.clone(),
            };
            state.dashboard.record_redemption();
            state.journal.record(&event, redemption.voucher.issued_at);
            self.persist(state);
        }
        Ok(redemption)
    }

    pub fn vouchers(&self) -> Vec<VoucherRecord> {
        self.lock().ledger.vouchers().values().cloned().collect()
    }

    pub fn notifications(&self) -> Vec<NotificationEntry> {
        self.lock().journal.notifications().to_vec()
    }

    pub fn mark_notification_read(&self, id: u64) -> Result<(), EngineError> {
        let mut state = self.lock();
        if !state.journal.mark_read(id) {
            return Err(EngineError::UnknownNotification(id));
        }
        self.persist(&state);
        Ok(())
    }

    pub fn mark_all_notifications_read(&self) -> usize {
        let mut state = self.lock();
        let flipped = state.journal.mark_all_read();
        if flipped > 0 {
            self.persist(&state);
        }
        flipped
    }

    pub fn activity(&self) -> Vec<ActivityLogEntry> {
        self.lock().journal.activity().to_vec()
    }

    pub fn notification_preferences(&self) -> NotificationPreferences {
        self.lock().journal.preferences()
    }

    pub fn set_notification_preferences(&self, preferences: NotificationPreferences) {
        let mut state = self.lock();
        state.journal.set_preferences(preferences);
        self.persist(&state);
    }

    pub fn dashboard(&self) -> DashboardView {
        let state = self.lock();
        DashboardView {
            active_partners: state.partners.count_with_status(PartnerStatus::Active),
            pending_offers: state.partners.count_with_status(PartnerStatus::Pending),
            verifying: state
                .partners
                .count_with_status(PartnerStatus::VerificationPending),
            uploads: state.datasets.records().len(),
            successful_uploads: state.datasets.successful_count(),
            shared_categories: state.active_categories.len(),
            redeemed_count: state.dashboard.redeemed_count,
            unread_notifications: state.journal.unread_count(),
            unlocked_rewards: state.dashboard.unlocked_rewards.iter().cloned().collect(),
            transactions: state.dashboard.transactions.clone(),
        }
    }

    pub async fn request_account_deletion(
        &self,
        request: AccountDeletionRequest,
    ) -> Result<AccountDeletionResponse, EngineError> {
        let client = self
            .account
            .as_ref()
            .ok_or(EngineError::AccountDeletionUnavailable)?;
        request.validate()?;
        let response = client.request_deletion(&request).await?;

        if response.success {
            let mut state = self.lock();
            let event = EngineEvent::AccountDeletionRequested {
                email: request.user_email,
            };
            state.journal.record(&event, Utc::now());
            self.persist(&state);
        }
        Ok(response)
    }

    /// Waits until every mutation made so far has reached the store.
    pub async fn flushed(&self) {
        self.writer.flushed().await;
    }

    fn require_category(&self, category: &CategoryId) -> Result<(), EngineError> {
        if self.registry.contains(category) {
            Ok(())
        } else {
            Err(EngineError::UnknownCategory(category.clone()))
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state mutex poisoned")
    }

    /// Queues under the caller's lock so writes land in mutation order.
    fn persist(&self, state: &EngineState) {
        self.writer.submit(state.snapshot());
    }
}

impl<S, D, V> VerdictSink for ConsentRewardsService<S, D, V>
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    fn deliver(&self, ticket: VerificationTicket, verdict: VerificationVerdict) {
        if let Err(err) = self.apply_verification(ticket, verdict.success) {
            warn!(
                partner = %ticket.partner_id,
                token = ticket.token,
                error = %err,
                "verification verdict could not be applied"
            );
        }
    }
}

fn partner_view(state: &EngineState, partner: &Partner, today: NaiveDate) -> PartnerView {
    let eligibility = match partner.status {
        PartnerStatus::Pending | PartnerStatus::VerificationPending => Some(evaluate(
            partner,
            &state.active_categories,
            &state.datasets,
        )),
        PartnerStatus::Active | PartnerStatus::Rejected => None,
    };
    PartnerView {
        guidance: eligibility.as_ref().and_then(Eligibility::guidance),
        eligibility,
        reward_expired: partner.reward.is_expired_on(today),
        voucher: state.ledger.get(&partner.reward.id).cloned(),
        partner: partner.clone(),
    }
}

fn partner_name(state: &EngineState, id: PartnerId) -> String {
    state
        .partners
        .get(id)
        .map(|partner| partner.name.clone())
        .unwrap_or_else(|| id.to_string())
}

/// Error raised by the consent and rewards service.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error("category {0} is not in the registry")]
    UnknownCategory(CategoryId),
    #[error("reward {0} not found")]
    UnknownReward(RewardId),
    #[error("dataset {0} not found")]
    UnknownDataset(DatasetId),
    #[error("notification {0} not found")]
    UnknownNotification(u64),
    #[error("account deletion is not configured")]
    AccountDeletionUnavailable,
}
