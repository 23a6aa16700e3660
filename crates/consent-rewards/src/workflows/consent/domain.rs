use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a data category, e.g. `"Travel Preferences"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub String);

impl CategoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartnerId(pub u64);

impl fmt::Display for PartnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reward identifier, doubling as the redemption key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardId(pub String);

impl RewardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RewardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub u64);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadOutcome {
    Success,
    Error,
}

/// Evidence that a file was uploaded for a category and judged by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: DatasetId,
    pub file_name: String,
    pub category: CategoryId,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub outcome: UploadOutcome,
    pub record_count: u32,
    pub file_type: String,
}

impl DatasetRecord {
    pub fn is_success(&self) -> bool {
        self.outcome == UploadOutcome::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardCategory {
    Travel,
    Dining,
    Shopping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: RewardId,
    pub title: String,
    pub description: String,
    pub category: RewardCategory,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<String>,
}

impl Reward {
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.expiry_date.map(|expiry| expiry < today).unwrap_or(false)
    }
}

/// Lifecycle position of a partner request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerStatus {
    Pending,
    VerificationPending,
    Active,
    Rejected,
}

impl PartnerStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PartnerStatus::Pending => "pending",
            PartnerStatus::VerificationPending => "verification_pending",
            PartnerStatus::Active => "active",
            PartnerStatus::Rejected => "rejected",
        }
    }

    /// The only edges the lifecycle accepts.
    pub const fn can_transition_to(self, next: PartnerStatus) -> bool {
        matches!(
            (self, next),
            (PartnerStatus::Pending, PartnerStatus::VerificationPending)
                | (PartnerStatus::Pending, PartnerStatus::Rejected)
                | (PartnerStatus::VerificationPending, PartnerStatus::Active)
                | (PartnerStatus::VerificationPending, PartnerStatus::Pending)
        )
    }
}

impl fmt::Display for PartnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Unverified,
    Pending,
    Verified,
    Failed,
}

/// External entity requesting categorized data in exchange for a reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub id: PartnerId,
    pub name: String,
    pub required_categories: BTreeSet<CategoryId>,
    pub reward: Reward,
    pub status: PartnerStatus,
    pub verification_status: VerificationStatus,
}

impl Partner {
    /// A freshly offered partner waiting on the user's decision.
    pub fn offered(
        id: PartnerId,
        name: impl Into<String>,
        required_categories: impl IntoIterator<Item = CategoryId>,
        reward: Reward,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            required_categories: required_categories.into_iter().collect(),
            reward,
            status: PartnerStatus::Pending,
            verification_status: VerificationStatus::Unverified,
        }
    }
}

/// Issued once per reward and never regenerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherRecord {
    pub reward_id: RewardId,
    pub code: String,
    pub issued_at: DateTime<Utc>,
}
