use chrono::{NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::common::*;

use crate::workflows::consent::domain::{Partner, PartnerStatus, RewardId, VerificationStatus};
use crate::workflows::consent::ledger::{generate_code, voucher_prefix, LedgerError, RewardLedger};

fn active_skyhigh() -> Partner {
    let mut partner = skyhigh();
    partner.status = PartnerStatus::Active;
    partner.verification_status = VerificationStatus::Verified;
    partner
}

#[test]
fn redeeming_twice_returns_the_same_voucher() {
    let mut ledger = RewardLedger::default();
    let partner = active_skyhigh();
    let now = Utc::now();

    let first = ledger.redeem(&partner, now).expect("active partner");
    let second = ledger.redeem(&partner, now).expect("idempotent");

    assert!(first.newly_issued);
    assert!(!second.newly_issued);
    assert_eq!(first.voucher, second.voucher);
    assert_eq!(ledger.len(), 1);
}

#[test]
fn pending_partner_reward_is_locked() {
    let mut ledger = RewardLedger::default();

    let err = ledger.redeem(&skyhigh(), Utc::now()).unwrap_err();

    assert_eq!(
        err,
        LedgerError::RewardLocked {
            reward: RewardId::new("r1"),
            status: PartnerStatus::Pending,
        }
    );
    assert!(ledger.is_empty());
}

#[test]
fn active_partner_with_pending_verification_cannot_redeem() {
    let mut ledger = RewardLedger::default();
    let mut partner = active_skyhigh();
    partner.verification_status = VerificationStatus::Pending;

    assert_eq!(
        ledger.redeem(&partner, Utc::now()).unwrap_err(),
        LedgerError::VerificationIncomplete(RewardId::new("r1"))
    );
}

#[test]
fn expired_reward_cannot_be_newly_redeemed() {
    let mut ledger = RewardLedger::default();
    let mut partner = active_skyhigh();
    let expiry = NaiveDate::from_ymd_opt(2025, 1, 31).expect("valid date");
    partner.reward.expiry_date = Some(expiry);

    let on_expiry_day = Utc.with_ymd_and_hms(2025, 1, 31, 23, 0, 0).unwrap();
    let after_expiry = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();

    let mut late = ledger.clone();
    assert_eq!(
        late.redeem(&partner, after_expiry).unwrap_err(),
        LedgerError::RewardExpired {
            reward: RewardId::new("r1"),
            expired_on: expiry,
        }
    );

    let issued = ledger.redeem(&partner, on_expiry_day).expect("still valid");
    let replay = ledger.redeem(&partner, after_expiry).expect("existing voucher");
    assert_eq!(issued.voucher.code, replay.voucher.code);
}

#[test]
fn existing_voucher_survives_a_status_change() {
    let mut ledger = RewardLedger::default();
    let partner = active_skyhigh();
    let issued = ledger.redeem(&partner, Utc::now()).unwrap();

    let mut locked = partner.clone();
    locked.status = PartnerStatus::Rejected;

    assert_eq!(
        ledger.redeem(&locked, Utc::now()).unwrap().voucher,
        issued.voucher
    );
}

#[test]
fn code_has_prefix_and_base36_suffix() {
    let mut rng = StdRng::seed_from_u64(42);

    let code = generate_code(&RewardId::new("r1"), &mut rng);

    assert_eq!(code.len(), 9);
    assert!(code.starts_with("R1X"));
    assert!(code[3..]
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
}

#[test]
fn prefix_skips_punctuation() {
    assert_eq!(voucher_prefix(&RewardId::new("wanderlust-night")), "WAN");
    assert_eq!(voucher_prefix(&RewardId::new("-a-")), "AXX");
    assert_eq!(voucher_prefix(&RewardId::new("")), "XXX");
}

#[test]
fn codes_are_unique_across_the_ledger() {
    let mut ledger = RewardLedger::default();
    let mut rng = StdRng::seed_from_u64(9);
    for index in 0..50 {
        let mut partner = active_skyhigh();
        partner.reward.id = RewardId::new(format!("r{index}"));
        ledger
            .redeem_with(&partner, Utc::now(), &mut rng)
            .expect("active partner");
    }

    let mut codes: Vec<&str> = ledger.vouchers().values().map(|v| v.code.as_str()).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), 50);
}
