use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::Serialize;

use super::domain::{Partner, PartnerStatus, RewardId, VerificationStatus, VoucherRecord};

const CODE_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const PREFIX_LEN: usize = 3;
const SUFFIX_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("reward {reward} is locked while its partner is {status}")]
    RewardLocked {
        reward: RewardId,
        status: PartnerStatus,
    },
    #[error("reward {0} is waiting on verification")]
    VerificationIncomplete(RewardId),
    #[error("reward {reward} expired on {expired_on}")]
    RewardExpired {
        reward: RewardId,
        expired_on: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub voucher: VoucherRecord,
    /// `false` when an earlier redemption's voucher was returned unchanged.
    pub newly_issued: bool,
}

/// Voucher codes keyed by reward. At most one voucher per reward, ever.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardLedger {
    vouchers: BTreeMap<RewardId, VoucherRecord>,
}

impl RewardLedger {
    pub fn from_vouchers(vouchers: BTreeMap<RewardId, VoucherRecord>) -> Self {
        Self { vouchers }
    }

    pub fn vouchers(&self) -> &BTreeMap<RewardId, VoucherRecord> {
        &self.vouchers
    }

    pub fn get(&self, reward: &RewardId) -> Option<&VoucherRecord> {
        self.vouchers.get(reward)
    }

    pub fn len(&self) -> usize {
        self.vouchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vouchers.is_empty()
    }

    pub fn redeem(
        &mut self,
        partner: &Partner,
        now: DateTime<Utc>,
    ) -> Result<Redemption, LedgerError> {
        self.redeem_with(partner, now, &mut rand::thread_rng())
    }

    /// Idempotent redemption: an existing voucher is returned before any gate is checked.
    pub fn redeem_with<R>(
        &mut self,
        partner: &Partner,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Redemption, LedgerError>
    where
        R: Rng + ?Sized,
    {
        let reward = &partner.reward;
        if let Some(existing) = self.vouchers.get(&reward.id) {
            return Ok(Redemption {
                voucher: existing.clone(),
                newly_issued: false,
            });
        }

        if partner.status != PartnerStatus::Active {
            return Err(LedgerError::RewardLocked {
                reward: reward.id.clone(),
                status: partner.status,
            });
        }
        if partner.verification_status == VerificationStatus::Pending {
            return Err(LedgerError::VerificationIncomplete(reward.id.clone()));
        }
        if let Some(expired_on) = reward.expiry_date {
            if expired_on < now.date_naive() {
                return Err(LedgerError::RewardExpired {
                    reward: reward.id.clone(),
                    expired_on,
                });
            }
        }

        let taken: HashSet<&str> = self.vouchers.values().map(|v| v.code.as_str()).collect();
        let code = loop {
            let candidate = generate_code(&reward.id, rng);
            if !taken.contains(candidate.as_str()) {
                break candidate;
            }
        };

        let voucher = VoucherRecord {
            reward_id: reward.id.clone(),
            code,
            issued_at: now,
        };
        self.vouchers.insert(reward.id.clone(), voucher.clone());

        Ok(Redemption {
            voucher,
            newly_issued: true,
        })
    }
}

/// First three alphanumerics of the reward id, upper-cased and padded with `X`.
pub fn voucher_prefix(reward: &RewardId) -> String {
    let mut prefix: String = reward
        .as_str()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(PREFIX_LEN)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    while prefix.len() < PREFIX_LEN {
        prefix.push('X');
    }
    prefix
}

/// `<prefix><6 random base-36 chars>`.
pub fn generate_code<R>(reward: &RewardId, rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    let mut code = voucher_prefix(reward);
    for _ in 0..SUFFIX_LEN {
        let index = rng.gen_range(0..CODE_ALPHABET.len());
        code.push(char::from(CODE_ALPHABET[index]));
    }
    code
}
