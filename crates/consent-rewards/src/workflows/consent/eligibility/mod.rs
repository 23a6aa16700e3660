mod policy;

pub use policy::IneligibilityReason;

use policy::first_blocker;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::domain::{CategoryId, Partner};

/// Anything that can answer whether a category has successful upload evidence.
pub trait DatasetEvidence {
    fn has_successful_upload(&self, category: &CategoryId) -> bool;
}

/// Eligibility verdict with the categories blocking acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub met: bool,
    pub reason: Option<IneligibilityReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<CategoryId>,
}

impl Eligibility {
    pub fn eligible() -> Self {
        Self {
            met: true,
            reason: None,
            missing: Vec::new(),
        }
    }

    pub fn blocked(reason: IneligibilityReason, missing: Vec<CategoryId>) -> Self {
        Self {
            met: false,
            reason: Some(reason),
            missing,
        }
    }

    /// Actionable next step for the user, `None` once eligible.
    pub fn guidance(&self) -> Option<String> {
        self.reason.map(|reason| reason.guidance(&self.missing))
    }
}

pub fn evaluate<D>(partner: &Partner, active: &BTreeSet<CategoryId>, datasets: &D) -> Eligibility
where
    D: DatasetEvidence + ?Sized,
{
    match first_blocker(partner, active, datasets) {
        Some((reason, missing)) => Eligibility::blocked(reason, missing),
        None => Eligibility::eligible(),
    }
}
