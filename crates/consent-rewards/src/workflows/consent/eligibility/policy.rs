use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::super::domain::{CategoryId, Partner};
use super::DatasetEvidence;

/// Why a partner cannot be accepted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IneligibilityReason {
    /// A required category is not enabled for sharing.
    Categories,
    /// A required category has no successful upload.
    Datasets,
    /// The datasets chosen for acceptance do not cover every required category.
    /// Raised by the acceptance guard only; `evaluate` never returns it.
    Selection,
}

impl IneligibilityReason {
    pub const fn code(self) -> &'static str {
        match self {
            IneligibilityReason::Categories => "categories",
            IneligibilityReason::Datasets => "datasets",
            IneligibilityReason::Selection => "selection",
        }
    }

    pub fn guidance(self, missing: &[CategoryId]) -> String {
        let list = missing
            .iter()
            .map(CategoryId::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        match self {
            IneligibilityReason::Categories => {
                format!("enable sharing for: {list}")
            }
            IneligibilityReason::Datasets => {
                format!("upload a valid dataset for: {list}")
            }
            IneligibilityReason::Selection => {
                format!("select a successful dataset for: {list}")
            }
        }
    }
}

/// The first unmet requirement, category gating before dataset gating.
pub(super) fn first_blocker<D>(
    partner: &Partner,
    active: &BTreeSet<CategoryId>,
    datasets: &D,
) -> Option<(IneligibilityReason, Vec<CategoryId>)>
where
    D: DatasetEvidence + ?Sized,
{
    let inactive = missing_where(partner, |category| !active.contains(category));
    if !inactive.is_empty() {
        return Some((IneligibilityReason::Categories, inactive));
    }

    let without_uploads =
        missing_where(partner, |category| !datasets.has_successful_upload(category));
    if !without_uploads.is_empty() {
        return Some((IneligibilityReason::Datasets, without_uploads));
    }

    None
}

fn missing_where(partner: &Partner, blocked: impl Fn(&CategoryId) -> bool) -> Vec<CategoryId> {
    partner
        .required_categories
        .iter()
        .filter(|category| blocked(category))
        .cloned()
        .collect()
}
