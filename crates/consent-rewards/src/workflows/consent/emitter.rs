//! Narration of engine events into the notification inbox and activity log.
//!
//! The emitter never decides anything on its own: it only translates events the state
//! machine or ledger already applied. Notifications are filtered by per-category opt-in
//! and dropped, not queued, when the category is muted.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CategoryId, DatasetId, Partner, PartnerId, RewardId};

pub const DEFAULT_NOTIFICATION_CAP: usize = 50;
pub const DEFAULT_ACTIVITY_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Reward,
    Security,
    Consent,
    Alert,
}

/// Per-category opt-in flags. Everything is enabled for a new account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub reward: bool,
    pub security: bool,
    pub consent: bool,
    pub alert: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            reward: true,
            security: true,
            consent: true,
            alert: true,
        }
    }
}

impl NotificationPreferences {
    pub fn allows(&self, category: NotificationCategory) -> bool {
        match category {
            NotificationCategory::Reward => self.reward,
            NotificationCategory::Security => self.security,
            NotificationCategory::Consent => self.consent,
            NotificationCategory::Alert => self.alert,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub id: u64,
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Offer,
    Sharing,
    Upload,
    Verification,
    Rejection,
    Redemption,
    Account,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: u64,
    pub kind: ActivityKind,
    pub description: String,
    pub at: DateTime<Utc>,
}

/// Most-recent-first ring with a fixed capacity; the oldest entry falls off the back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CappedLog<T> {
    entries: VecDeque<T>,
    cap: usize,
}

impl<T> CappedLog<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Restore from persisted order (newest first), dropping anything past `cap`.
    pub fn from_entries(entries: Vec<T>, cap: usize) -> Self {
        let mut entries = VecDeque::from(entries);
        entries.truncate(cap);
        Self { entries, cap }
    }

    pub fn push(&mut self, entry: T) {
        if self.cap == 0 {
            return;
        }
        self.entries.push_front(entry);
        self.entries.truncate(self.cap);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> CappedLog<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

/// Something that already happened inside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    PartnerOffered {
        partner: PartnerId,
        name: String,
    },
    CategoryToggled {
        category: CategoryId,
        active: bool,
    },
    DatasetUploaded {
        dataset: DatasetId,
        file_name: String,
        category: CategoryId,
        success: bool,
        rationale: Option<String>,
    },
    DatasetRemoved {
        dataset: DatasetId,
        file_name: String,
    },
    VerificationStarted {
        partner: PartnerId,
        name: String,
    },
    VerificationCancelled {
        partner: PartnerId,
        name: String,
    },
    PartnerActivated {
        partner: PartnerId,
        name: String,
        reward_title: String,
    },
    VerificationFailed {
        partner: PartnerId,
        name: String,
    },
    PartnerRejected {
        partner: PartnerId,
        name: String,
    },
    RewardRedeemed {
        reward: RewardId,
        title: String,
        code: String,
    },
    AccountDeletionRequested {
        email: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityDraft {
    pub kind: ActivityKind,
    pub description: String,
}

/// At most one notification and one activity entry per event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Narration {
    pub notification: Option<NotificationDraft>,
    pub activity: Option<ActivityDraft>,
}

fn notify(
    category: NotificationCategory,
    title: &str,
    message: String,
) -> Option<NotificationDraft> {
    Some(NotificationDraft {
        category,
        title: title.to_string(),
        message,
    })
}

fn log(kind: ActivityKind, description: String) -> Option<ActivityDraft> {
    Some(ActivityDraft { kind, description })
}

pub struct SideEffectEmitter;

impl SideEffectEmitter {
    pub fn narrate(event: &EngineEvent) -> Narration {
        use NotificationCategory::{Alert, Consent, Reward, Security};

        let (notification, activity) = match event {
            EngineEvent::PartnerOffered { name, .. } => (
                notify(
                    Alert,
                    "New partner offer",
                    format!("{name} would like to partner with you"),
                ),
                log(ActivityKind::Offer, format!("Received an offer from {name}")),
            ),
            EngineEvent::CategoryToggled { category, active } => {
                let verb = if *active { "enabled" } else { "disabled" };
                (
                    notify(
                        Consent,
                        "Sharing preferences updated",
                        format!("Sharing {verb} for {category}"),
                    ),
                    log(ActivityKind::Sharing, format!("Sharing {verb} for {category}")),
                )
            }
            EngineEvent::DatasetUploaded {
                file_name,
                category,
                success,
                rationale,
                ..
            } => {
                if *success {
                    (
                        None,
                        log(
                            ActivityKind::Upload,
                            format!("Uploaded {file_name} for {category}"),
                        ),
                    )
                } else {
                    let reason = rationale.as_deref().unwrap_or("validation failed");
                    (
                        notify(
                            Alert,
                            "Upload rejected",
                            format!("{file_name} was not accepted: {reason}"),
                        ),
                        log(
                            ActivityKind::Upload,
                            format!("Upload of {file_name} for {category} failed"),
                        ),
                    )
                }
            }
            EngineEvent::DatasetRemoved { file_name, .. } => {
                (None, log(ActivityKind::Upload, format!("Removed {file_name}")))
            }
            EngineEvent::VerificationStarted { name, .. } => (
                notify(
                    Consent,
                    "Verification started",
                    format!("We are verifying your data for {name}"),
                ),
                log(
                    ActivityKind::Verification,
                    format!("Started verification with {name}"),
                ),
            ),
            EngineEvent::VerificationCancelled { name, .. } => (
                None,
                log(
                    ActivityKind::Verification,
                    format!("Cancelled verification with {name}"),
                ),
            ),
            EngineEvent::PartnerActivated {
                name, reward_title, ..
            } => (
                notify(
                    Reward,
                    "Reward unlocked",
                    format!("{reward_title} from {name} is ready to redeem"),
                ),
                log(
                    ActivityKind::Verification,
                    format!("Now sharing data with {name}"),
                ),
            ),
            EngineEvent::VerificationFailed { name, .. } => (
                notify(
                    Alert,
                    "Verification failed",
                    format!(
                        "{name} could not verify your data; upload a valid dataset and try again"
                    ),
                ),
                log(
                    ActivityKind::Verification,
                    format!("Verification with {name} failed"),
                ),
            ),
            EngineEvent::PartnerRejected { name, .. } => (
                notify(
                    Consent,
                    "Offer declined",
                    format!("You declined the offer from {name}"),
                ),
                log(ActivityKind::Rejection, format!("Declined {name}")),
            ),
            EngineEvent::RewardRedeemed { title, code, .. } => (
                notify(
                    Reward,
                    "Reward redeemed",
                    format!("{title}: your code is {code}"),
                ),
                log(ActivityKind::Redemption, format!("Redeemed {title}")),
            ),
            EngineEvent::AccountDeletionRequested { email } => (
                notify(
                    Security,
                    "Account deletion requested",
                    format!("Check {email} to confirm the deletion"),
                ),
                log(ActivityKind::Account, "Requested account deletion".to_string()),
            ),
        };

        Narration {
            notification,
            activity,
        }
    }
}

/// Ring capacities for the notification inbox and activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalCaps {
    pub notifications: usize,
    pub activity: usize,
}

impl Default for JournalCaps {
    fn default() -> Self {
        Self {
            notifications: DEFAULT_NOTIFICATION_CAP,
            activity: DEFAULT_ACTIVITY_CAP,
        }
    }
}

/// What [`Journal::record`] actually appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recorded {
    pub notification: Option<NotificationEntry>,
    pub activity: Option<ActivityLogEntry>,
}

/// Owns the notification inbox, the activity log and the opt-in flags.
#[derive(Debug, Clone)]
pub struct Journal {
    notifications: CappedLog<NotificationEntry>,
    activity: CappedLog<ActivityLogEntry>,
    preferences: NotificationPreferences,
    next_notification: u64,
    next_activity: u64,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new(JournalCaps::default())
    }
}

impl Journal {
    pub fn new(caps: JournalCaps) -> Self {
        Self::restore(Vec::new(), Vec::new(), NotificationPreferences::default(), caps)
    }

    pub fn restore(
        notifications: Vec<NotificationEntry>,
        activity: Vec<ActivityLogEntry>,
        preferences: NotificationPreferences,
        caps: JournalCaps,
    ) -> Self {
        let next_notification = notifications.iter().map(|entry| entry.id).max().unwrap_or(0) + 1;
        let next_activity = activity.iter().map(|entry| entry.id).max().unwrap_or(0) + 1;
        Self {
            notifications: CappedLog::from_entries(notifications, caps.notifications),
            activity: CappedLog::from_entries(activity, caps.activity),
            preferences,
            next_notification,
            next_activity,
        }
    }

    pub fn record(&mut self, event: &EngineEvent, at: DateTime<Utc>) -> Recorded {
        let narration = SideEffectEmitter::narrate(event);
        let mut recorded = Recorded::default();

        if let Some(draft) = narration.notification {
            if self.preferences.allows(draft.category) {
                let entry = NotificationEntry {
                    id: self.next_notification,
                    category: draft.category,
                    title: draft.title,
                    message: draft.message,
                    created_at: at,
                    read: false,
                };
                self.next_notification += 1;
                self.notifications.push(entry.clone());
                recorded.notification = Some(entry);
            }
        }

        if let Some(draft) = narration.activity {
            let entry = ActivityLogEntry {
                id: self.next_activity,
                kind: draft.kind,
                description: draft.description,
                at,
            };
            self.next_activity += 1;
            self.activity.push(entry.clone());
            recorded.activity = Some(entry);
        }

        recorded
    }

    pub fn notifications(&self) -> &CappedLog<NotificationEntry> {
        &self.notifications
    }

    pub fn activity(&self) -> &CappedLog<ActivityLogEntry> {
        &self.activity
    }

    pub fn preferences(&self) -> NotificationPreferences {
        self.preferences
    }

    pub fn set_preferences(&mut self, preferences: NotificationPreferences) {
        self.preferences = preferences;
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|entry| !entry.read).count()
    }

    /// Returns `false` when no notification with `id` is in the inbox.
    pub fn mark_read(&mut self, id: u64) -> bool {
        match self.notifications.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.read = true;
                true
            }
            None => false,
        }
    }

    /// Returns how many entries flipped from unread to read.
    pub fn mark_all_read(&mut self) -> usize {
        let mut flipped = 0;
        for entry in self.notifications.iter_mut().filter(|entry| !entry.read) {
            entry.read = true;
            flipped += 1;
        }
        flipped
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEntry {
    pub partner_id: PartnerId,
    pub partner_name: String,
    pub reward_id: RewardId,
    pub value: String,
    pub at: DateTime<Utc>,
}

/// Running totals behind the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardAggregates {
    pub transactions: Vec<TransactionEntry>,
    pub unlocked_rewards: BTreeSet<RewardId>,
    pub redeemed_count: u64,
}

impl DashboardAggregates {
    /// Books the transaction and reward unlock for an activation. A reward already
    /// unlocked is left alone, so repeated deliveries count once.
    pub fn record_activation(&mut self, partner: &Partner, at: DateTime<Utc>) -> bool {
        if !self.unlocked_rewards.insert(partner.reward.id.clone()) {
            return false;
        }
        self.transactions.push(TransactionEntry {
            partner_id: partner.id,
            partner_name: partner.name.clone(),
            reward_id: partner.reward.id.clone(),
            value: partner.reward.value.clone(),
            at,
        });
        true
    }

    pub fn record_redemption(&mut self) {
        self.redeemed_count += 1;
    }
}
