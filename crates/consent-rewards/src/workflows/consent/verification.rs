//! Asynchronous verification that gates `VerificationPending -> Active`.
//!
//! Each dispatch spawns one task that resolves the verifier exactly once and hands the
//! verdict, tagged with its ticket, to a [`VerdictSink`]. Cancellation is logical: the
//! sink drops verdicts whose ticket is no longer outstanding.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::warn;

use super::domain::{DatasetRecord, Partner};
use super::lifecycle::VerificationTicket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub success: bool,
}

impl VerificationVerdict {
    pub const PASSED: Self = Self { success: true };
    pub const FAILED: Self = Self { success: false };
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifierError {
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
    #[error("verification request failed: {0}")]
    RequestFailed(String),
}

#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        partner: &Partner,
        datasets: &[DatasetRecord],
    ) -> Result<VerificationVerdict, VerifierError>;
}

/// Receives verdicts from dispatched verification tasks.
pub trait VerdictSink: Send + Sync + 'static {
    fn deliver(&self, ticket: VerificationTicket, verdict: VerificationVerdict);
}

/// Fixed-duration check that passes when every dataset succeeded and together they
/// cover the partner's required categories.
#[derive(Debug, Clone)]
pub struct SimulatedVerifier {
    delay: Duration,
}

impl SimulatedVerifier {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl Verifier for SimulatedVerifier {
    async fn verify(
        &self,
        partner: &Partner,
        datasets: &[DatasetRecord],
    ) -> Result<VerificationVerdict, VerifierError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let all_successful = datasets.iter().all(DatasetRecord::is_success);
        let covers = partner.required_categories.iter().all(|category| {
            datasets
                .iter()
                .any(|record| &record.category == category && record.is_success())
        });

        Ok(VerificationVerdict {
            success: all_successful && covers,
        })
    }
}

/// Drives verifier calls on the tokio runtime.
pub struct VerificationOrchestrator<V> {
    verifier: Arc<V>,
}

impl<V> Clone for VerificationOrchestrator<V> {
    fn clone(&self) -> Self {
        Self {
            verifier: Arc::clone(&self.verifier),
        }
    }
}

impl<V> VerificationOrchestrator<V>
where
    V: Verifier + 'static,
{
    pub fn new(verifier: Arc<V>) -> Self {
        Self { verifier }
    }

    /// Spawn one verification; the sink receives exactly one verdict for `ticket`.
    /// Verifier errors resolve as a failed verdict.
    pub fn dispatch<S>(
        &self,
        sink: Arc<S>,
        ticket: VerificationTicket,
        partner: Partner,
        datasets: Vec<DatasetRecord>,
    ) -> VerificationHandle
    where
        S: VerdictSink,
    {
        let verifier = Arc::clone(&self.verifier);
        let join = tokio::spawn(async move {
            let verdict = match verifier.verify(&partner, &datasets).await {
                Ok(verdict) => verdict,
                Err(err) => {
                    warn!(
                        partner = %ticket.partner_id,
                        token = ticket.token,
                        error = %err,
                        "verification errored; treating as failed"
                    );
                    VerificationVerdict::FAILED
                }
            };
            sink.deliver(ticket, verdict);
        });

        VerificationHandle { ticket, join }
    }
}

/// Cancellation handle for one dispatched verification.
#[derive(Debug)]
pub struct VerificationHandle {
    ticket: VerificationTicket,
    join: JoinHandle<()>,
}

impl VerificationHandle {
    pub fn ticket(&self) -> VerificationTicket {
        self.ticket
    }

    pub fn is_settled(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait until the verdict has been handed to the sink.
    pub async fn settled(self) {
        if let Err(err) = self.join.await {
            warn!(partner = %self.ticket.partner_id, error = %err, "verification task aborted");
        }
    }
}
