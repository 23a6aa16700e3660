//! New partner offers arriving after bootstrap.
//!
//! Offers travel over an explicit channel of [`PartnerOffered`] events and enter the
//! engine through the same `offer_partner` path as any other partner.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::domain::Partner;
use super::lifecycle::LifecycleError;
use super::repository::KeyValueStore;
use super::service::{ConsentRewardsService, EngineError};
use super::validator::DatasetValidator;
use super::verification::Verifier;

pub const OFFER_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerOffered {
    pub partner: Partner,
}

pub fn offer_channel() -> (mpsc::Sender<PartnerOffered>, mpsc::Receiver<PartnerOffered>) {
    mpsc::channel(OFFER_CHANNEL_CAPACITY)
}

/// Drain offers into the service until every sender is dropped. Resolves to the number
/// of partners admitted; duplicates are skipped.
pub fn spawn_offer_listener<S, D, V>(
    service: Arc<ConsentRewardsService<S, D, V>>,
    mut offers: mpsc::Receiver<PartnerOffered>,
) -> JoinHandle<usize>
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    tokio::spawn(async move {
        let mut admitted = 0;
        while let Some(PartnerOffered { partner }) = offers.recv().await {
            let id = partner.id;
            match service.offer_partner(partner) {
                Ok(()) => {
                    info!(partner = %id, "partner offer received");
                    admitted += 1;
                }
                Err(EngineError::Lifecycle(LifecycleError::DuplicatePartner(_))) => {
                    debug!(partner = %id, "ignoring duplicate partner offer");
                }
                Err(err) => {
                    warn!(partner = %id, error = %err, "partner offer dropped");
                }
            }
        }
        admitted
    })
}

/// Emit each template once, in random order, one per `every`. Stops early when the
/// receiving side has gone away.
pub fn spawn_offer_ticker(
    offers: mpsc::Sender<PartnerOffered>,
    mut templates: Vec<Partner>,
    every: Duration,
) -> JoinHandle<()> {
    templates.shuffle(&mut rand::thread_rng());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick of a tokio interval completes immediately.
        ticker.tick().await;
        for partner in templates {
            ticker.tick().await;
            if offers.send(PartnerOffered { partner }).await.is_err() {
                debug!("offer listener closed; stopping ticker");
                break;
            }
        }
    })
}
