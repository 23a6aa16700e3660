//! End-to-end scenarios for the consent and rewards engine driven through the public
//! service facade, with state kept in a file-backed store.

use std::sync::Arc;
use std::time::Duration;

use consent_rewards::workflows::consent::{
    bootstrap_partners, offer_channel, offer_templates, spawn_offer_listener,
    spawn_offer_ticker, CategoryId, ConsentRewardsService, DatasetUpload, EngineError, FileStore,
    IneligibilityReason, JournalCaps, LifecycleError, NotificationCategory, PartnerId,
    PartnerOffered, PartnerStatus, RewardId, SimulatedValidator, SimulatedVerifier,
    UploadOutcome,
};

type Service = ConsentRewardsService<FileStore, SimulatedValidator, SimulatedVerifier>;

fn open_service(root: &std::path::Path) -> Arc<Service> {
    let store = FileStore::open(root).expect("open file store");
    let service = ConsentRewardsService::open(
        Arc::new(store),
        Arc::new(SimulatedValidator::default()),
        Arc::new(SimulatedVerifier::new(Duration::from_millis(5))),
        JournalCaps::default(),
    );
    service.seed_partners(bootstrap_partners());
    Arc::new(service)
}

fn csv(file_name: &str, category: &str, rows: usize) -> DatasetUpload {
    let mut body = String::from("date,detail\n");
    for row in 0..rows {
        body.push_str(&format!("2025-04-{:02},entry {row}\n", row + 1));
    }
    DatasetUpload::new(file_name, CategoryId::new(category), body)
}

#[tokio::test]
async fn user_unlocks_and_redeems_a_flight_credit() {
    let dir = tempfile::tempdir().expect("temp dir");
    let service = open_service(dir.path());
    let skyhigh = PartnerId(1);

    let blocked = service.eligibility(skyhigh).expect("known partner");
    assert_eq!(blocked.reason, Some(IneligibilityReason::Categories));
    assert_eq!(
        blocked.guidance().as_deref(),
        Some("enable sharing for: Booking History, Travel Preferences")
    );

    for category in ["Travel Preferences", "Booking History"] {
        service
            .set_category_active(&CategoryId::new(category), true)
            .expect("registry category");
    }

    let rejected = service
        .upload_dataset(csv("notes.txt", "Travel Preferences", 3))
        .await
        .expect("upload stored");
    assert_eq!(rejected.record.outcome, UploadOutcome::Error);
    assert_eq!(
        service.eligibility(skyhigh).unwrap().reason,
        Some(IneligibilityReason::Datasets)
    );

    let travel = service
        .upload_dataset(csv("trips.csv", "Travel Preferences", 4))
        .await
        .expect("upload stored");
    let bookings = service
        .upload_dataset(csv("bookings.csv", "Booking History", 2))
        .await
        .expect("upload stored");
    assert_eq!(travel.record.record_count, 4);
    assert!(service.eligibility(skyhigh).unwrap().met);

    let selection = service
        .request_acceptance(skyhigh, &[travel.record.id])
        .unwrap_err();
    assert!(matches!(
        selection,
        EngineError::Lifecycle(LifecycleError::IneligiblePartner {
            reason: IneligibilityReason::Selection,
            ..
        })
    ));

    let handle = service
        .request_acceptance(skyhigh, &[travel.record.id, bookings.record.id])
        .expect("eligible partner");
    assert_eq!(service.dashboard().verifying, 1);
    handle.settled().await;

    let reward = RewardId::new("r1");
    let voucher = service.redeem(&reward).expect("active partner").voucher;
    assert!(voucher.code.starts_with("R1X"));
    assert_eq!(service.redeem(&reward).unwrap().voucher, voucher);

    let reward_notices = service
        .notifications()
        .into_iter()
        .filter(|entry| entry.category == NotificationCategory::Reward)
        .count();
    assert_eq!(reward_notices, 2);

    service.flushed().await;
    drop(service);
    let reopened = open_service(dir.path());
    assert_eq!(
        reopened.partner(skyhigh).unwrap().partner.status,
        PartnerStatus::Active
    );
    assert_eq!(reopened.vouchers(), vec![voucher]);
    assert_eq!(reopened.datasets().len(), 3);
    assert_eq!(reopened.dashboard().redeemed_count, 1);
}

#[tokio::test]
async fn cancelled_verification_can_be_requested_again() {
    let dir = tempfile::tempdir().expect("temp dir");
    let service = open_service(dir.path());
    let tabletaste = PartnerId(2);

    let mut selected = Vec::new();
    for (file_name, category) in [("meals.csv", "Dining Preferences"), ("places.csv", "Location")] {
        service
            .set_category_active(&CategoryId::new(category), true)
            .unwrap();
        let receipt = service
            .upload_dataset(csv(file_name, category, 2))
            .await
            .unwrap();
        selected.push(receipt.record.id);
    }

    let abandoned = service.request_acceptance(tabletaste, &selected).unwrap();
    let transition = service.cancel_verification(tabletaste).unwrap();
    assert_eq!(transition.to, PartnerStatus::Pending);
    abandoned.settled().await;
    assert_eq!(
        service.partner(tabletaste).unwrap().partner.status,
        PartnerStatus::Pending
    );

    service
        .request_acceptance(tabletaste, &selected)
        .unwrap()
        .settled()
        .await;
    assert_eq!(
        service.partner(tabletaste).unwrap().partner.status,
        PartnerStatus::Active
    );
    assert_eq!(service.dashboard().transactions.len(), 1);
}

#[tokio::test]
async fn offer_ticker_feeds_the_listener_once_per_template() {
    let dir = tempfile::tempdir().expect("temp dir");
    let service = open_service(dir.path());
    let (sender, receiver) = offer_channel();

    let listener = spawn_offer_listener(Arc::clone(&service), receiver);
    let duplicate = sender.clone();
    duplicate
        .send(PartnerOffered {
            partner: bootstrap_partners().remove(0),
        })
        .await
        .expect("listener running");
    drop(duplicate);

    let ticker = spawn_offer_ticker(sender, offer_templates(), Duration::from_millis(5));
    ticker.await.expect("ticker finishes");
    let admitted = listener.await.expect("listener finishes");

    assert_eq!(admitted, offer_templates().len());
    assert_eq!(service.partners().len(), 6);
    assert_eq!(
        service.dashboard().pending_offers,
        6,
        "offers always arrive pending"
    );
    let alerts = service
        .notifications()
        .into_iter()
        .filter(|entry| entry.category == NotificationCategory::Alert)
        .count();
    assert_eq!(alerts, 3);
}
