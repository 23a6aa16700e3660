//! Partner lifecycle state machine.
//!
//! Legal edges: `Pending -> VerificationPending`, `Pending -> Rejected`,
//! `VerificationPending -> Active` and `VerificationPending -> Pending`. Every other
//! attempted edge is an error. Each verification invocation carries a per-partner token;
//! only the outstanding token may apply a verdict.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::datasets::DatasetStore;
use super::domain::{
    CategoryId, DatasetId, DatasetRecord, Partner, PartnerId, PartnerStatus, RewardId,
    VerificationStatus,
};
use super::eligibility::{evaluate, Eligibility, IneligibilityReason};

/// A single status change applied to a partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub partner_id: PartnerId,
    pub from: PartnerStatus,
    pub to: PartnerStatus,
}

/// Handle naming one verification invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationTicket {
    pub partner_id: PartnerId,
    pub token: u64,
}

/// A successful acceptance request, ready to hand to the orchestrator.
#[derive(Debug, Clone)]
pub struct Acceptance {
    pub ticket: VerificationTicket,
    /// `None` when an outstanding invocation was superseded without a status change.
    pub transition: Option<Transition>,
    pub partner: Partner,
    pub datasets: Vec<DatasetRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationDelivery {
    Applied(Transition),
    /// The ticket was superseded or cancelled; nothing changed.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("partner {0} not found")]
    UnknownPartner(PartnerId),
    #[error("partner {0} has already been offered")]
    DuplicatePartner(PartnerId),
    #[error("dataset {0} not found")]
    UnknownDataset(DatasetId),
    #[error("partner {0} was rejected")]
    Rejected(PartnerId),
    #[error("partner {partner} is not eligible: {guidance}")]
    IneligiblePartner {
        partner: PartnerId,
        reason: IneligibilityReason,
        missing: Vec<CategoryId>,
        guidance: String,
    },
    #[error("partner {partner} cannot move from {from} to {to}")]
    IllegalTransition {
        partner: PartnerId,
        from: PartnerStatus,
        to: PartnerStatus,
    },
}

impl LifecycleError {
    fn ineligible(
        partner: PartnerId,
        reason: IneligibilityReason,
        missing: Vec<CategoryId>,
    ) -> Self {
        let guidance = reason.guidance(&missing);
        LifecycleError::IneligiblePartner {
            partner,
            reason,
            missing,
            guidance,
        }
    }
}

/// Owns every partner and the outstanding verification tokens.
#[derive(Debug, Clone, Default)]
pub struct PartnerBook {
    partners: BTreeMap<PartnerId, Partner>,
    issued: HashMap<PartnerId, u64>,
    outstanding: HashMap<PartnerId, u64>,
}

impl PartnerBook {
    pub fn from_partners(partners: Vec<Partner>) -> Self {
        Self {
            partners: partners
                .into_iter()
                .map(|partner| (partner.id, partner))
                .collect(),
            ..Self::default()
        }
    }

    pub fn get(&self, id: PartnerId) -> Option<&Partner> {
        self.partners.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partner> {
        self.partners.values()
    }

    pub fn len(&self) -> usize {
        self.partners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    pub fn by_reward(&self, reward: &RewardId) -> Option<&Partner> {
        self.partners
            .values()
            .find(|partner| &partner.reward.id == reward)
    }

    pub fn count_with_status(&self, status: PartnerStatus) -> usize {
        self.partners
            .values()
            .filter(|partner| partner.status == status)
            .count()
    }

    /// Admit a newly offered partner. Offers always enter as `Pending`.
    pub fn offer(&mut self, mut partner: Partner) -> Result<(), LifecycleError> {
        if self.partners.contains_key(&partner.id) {
            return Err(LifecycleError::DuplicatePartner(partner.id));
        }
        partner.status = PartnerStatus::Pending;
        partner.verification_status = VerificationStatus::Unverified;
        self.partners.insert(partner.id, partner);
        Ok(())
    }

    /// Eligibility for a partner still awaiting a decision. Rejected partners are
    /// excluded from eligibility queries.
    pub fn eligibility(
        &self,
        id: PartnerId,
        active: &BTreeSet<CategoryId>,
        datasets: &DatasetStore,
    ) -> Result<Eligibility, LifecycleError> {
        let partner = self.partner(id)?;
        if partner.status == PartnerStatus::Rejected {
            return Err(LifecycleError::Rejected(id));
        }
        Ok(evaluate(partner, active, datasets))
    }

    /// Guarded hand-off to verification. Re-requesting while a verification is
    /// outstanding supersedes its token without changing status.
    pub fn request_acceptance(
        &mut self,
        id: PartnerId,
        selected: &[DatasetId],
        active: &BTreeSet<CategoryId>,
        datasets: &DatasetStore,
    ) -> Result<Acceptance, LifecycleError> {
        let partner = self.partner(id)?;
        let from = partner.status;
        if !matches!(
            from,
            PartnerStatus::Pending | PartnerStatus::VerificationPending
        ) {
            return Err(LifecycleError::IllegalTransition {
                partner: id,
                from,
                to: PartnerStatus::VerificationPending,
            });
        }

        let eligibility = evaluate(partner, active, datasets);
        if let Some(reason) = eligibility.reason {
            return Err(LifecycleError::ineligible(id, reason, eligibility.missing));
        }

        let mut chosen = Vec::with_capacity(selected.len());
        for dataset_id in selected {
            let record = datasets
                .get(*dataset_id)
                .ok_or(LifecycleError::UnknownDataset(*dataset_id))?;
            chosen.push(record.clone());
        }
        let covered: BTreeSet<&CategoryId> = chosen
            .iter()
            .filter(|record| record.is_success())
            .map(|record| &record.category)
            .collect();
        let uncovered: Vec<CategoryId> = partner
            .required_categories
            .iter()
            .filter(|category| !covered.contains(category))
            .cloned()
            .collect();
        if !uncovered.is_empty() {
            return Err(LifecycleError::ineligible(
                id,
                IneligibilityReason::Selection,
                uncovered,
            ));
        }

        let transition = if from == PartnerStatus::Pending {
            Some(self.apply(id, PartnerStatus::VerificationPending)?)
        } else {
            None
        };
        let ticket = self.issue_token(id);

        let partner = self.partner_mut(id)?;
        partner.verification_status = VerificationStatus::Pending;

        Ok(Acceptance {
            ticket,
            transition,
            partner: partner.clone(),
            datasets: chosen,
        })
    }

    /// Apply a verdict. Tickets that are no longer outstanding are dropped as stale.
    ///
    /// Requirements are evaluated again before activation: a success verdict for a
    /// partner whose categories or evidence lapsed mid-verification settles as failed.
    pub fn on_verification_result(
        &mut self,
        ticket: VerificationTicket,
        success: bool,
        active: &BTreeSet<CategoryId>,
        datasets: &DatasetStore,
    ) -> Result<VerificationDelivery, LifecycleError> {
        let partner = self.partner(ticket.partner_id)?;
        if !self.is_outstanding(ticket) {
            return Ok(VerificationDelivery::Stale);
        }
        let activates = success && evaluate(partner, active, datasets).met;
        self.outstanding.remove(&ticket.partner_id);

        let (to, verification) = if activates {
            (PartnerStatus::Active, VerificationStatus::Verified)
        } else {
            (PartnerStatus::Pending, VerificationStatus::Failed)
        };
        let transition = self.apply(ticket.partner_id, to)?;
        self.partner_mut(ticket.partner_id)?.verification_status = verification;

        Ok(VerificationDelivery::Applied(transition))
    }

    /// Abandon the outstanding verification and return the partner to `Pending`.
    pub fn cancel_verification(&mut self, id: PartnerId) -> Result<Transition, LifecycleError> {
        let transition = self.apply(id, PartnerStatus::Pending)?;
        self.outstanding.remove(&id);
        self.partner_mut(id)?.verification_status = VerificationStatus::Unverified;
        Ok(transition)
    }

    /// Terminal rejection. An in-flight verification is cancelled first so its
    /// verdict arrives stale.
    pub fn reject(&mut self, id: PartnerId) -> Result<Vec<Transition>, LifecycleError> {
        let mut transitions = Vec::with_capacity(2);
        if self.partner(id)?.status == PartnerStatus::VerificationPending {
            transitions.push(self.cancel_verification(id)?);
        }
        transitions.push(self.apply(id, PartnerStatus::Rejected)?);
        Ok(transitions)
    }

    pub fn is_outstanding(&self, ticket: VerificationTicket) -> bool {
        self.outstanding.get(&ticket.partner_id) == Some(&ticket.token)
    }

    /// No invocation survives a restart, so partners loaded mid-verification go back
    /// to `Pending`.
    pub fn release_interrupted(&mut self) -> Vec<PartnerId> {
        let interrupted: Vec<PartnerId> = self
            .partners
            .values()
            .filter(|partner| partner.status == PartnerStatus::VerificationPending)
            .map(|partner| partner.id)
            .collect();
        for id in &interrupted {
            if let Some(partner) = self.partners.get_mut(id) {
                partner.status = PartnerStatus::Pending;
                partner.verification_status = VerificationStatus::Unverified;
            }
            self.outstanding.remove(id);
        }
        interrupted
    }

    fn issue_token(&mut self, id: PartnerId) -> VerificationTicket {
        let counter = self.issued.entry(id).or_insert(0);
        *counter += 1;
        let token = *counter;
        self.outstanding.insert(id, token);
        VerificationTicket {
            partner_id: id,
            token,
        }
    }

    fn apply(&mut self, id: PartnerId, to: PartnerStatus) -> Result<Transition, LifecycleError> {
        let partner = self.partner_mut(id)?;
        let from = partner.status;
        if !from.can_transition_to(to) {
            return Err(LifecycleError::IllegalTransition {
                partner: id,
                from,
                to,
            });
        }
        partner.status = to;
        Ok(Transition {
            partner_id: id,
            from,
            to,
        })
    }

    fn partner(&self, id: PartnerId) -> Result<&Partner, LifecycleError> {
        self.partners
            .get(&id)
            .ok_or(LifecycleError::UnknownPartner(id))
    }

    fn partner_mut(&mut self, id: PartnerId) -> Result<&mut Partner, LifecycleError> {
        self.partners
            .get_mut(&id)
            .ok_or(LifecycleError::UnknownPartner(id))
    }
}
