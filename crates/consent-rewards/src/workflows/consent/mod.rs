//! Data-sharing consent and reward lifecycle.
//!
//! Users enable data categories, upload datasets that an external validator judges, and
//! accept partner offers. Acceptance goes through an asynchronous verification before a
//! partner becomes active and its reward can be redeemed for a one-time voucher.

pub mod account;
pub mod catalog;
pub mod datasets;
pub mod domain;
pub mod eligibility;
pub mod emitter;
pub mod ledger;
pub mod lifecycle;
pub mod offers;
pub mod repository;
pub mod router;
pub mod service;
pub mod state;
pub mod validator;
pub mod verification;
pub mod writer;

#[cfg(test)]
mod tests;

pub use account::{
    AccountDeletion, AccountDeletionRequest, AccountDeletionResponse, AccountError,
    HttpAccountDeletion,
};
pub use catalog::{bootstrap_partners, offer_templates, Category, CategoryRegistry};
pub use datasets::{DatasetStore, UploadReceipt};
pub use domain::{
    CategoryId, DatasetId, DatasetRecord, Partner, PartnerId, PartnerStatus, Reward,
    RewardCategory, RewardId, UploadOutcome, VerificationStatus, VoucherRecord,
};
pub use eligibility::{evaluate, DatasetEvidence, Eligibility, IneligibilityReason};
pub use emitter::{
    ActivityKind, ActivityLogEntry, DashboardAggregates, EngineEvent, Journal, JournalCaps,
    NotificationCategory, NotificationEntry, NotificationPreferences, SideEffectEmitter,
    TransactionEntry,
};
pub use ledger::{LedgerError, Redemption, RewardLedger};
pub use lifecycle::{
    LifecycleError, PartnerBook, Transition, VerificationDelivery, VerificationTicket,
};
pub use offers::{offer_channel, spawn_offer_listener, spawn_offer_ticker, PartnerOffered};
pub use repository::{
    FileStore, KeyValueStore, LoadReport, MemoryStore, PersistedState, PersistenceAdapter,
    StoreError,
};
pub use router::consent_router;
pub use service::{
    CategoryView, ConsentRewardsService, DashboardView, EngineError, PartnerView,
};
pub use state::EngineState;
pub use validator::{
    DatasetUpload, DatasetValidator, HttpValidator, SimulatedValidator, ValidatorError,
    ValidatorVerdict,
};
pub use verification::{
    SimulatedVerifier, VerdictSink, VerificationHandle, VerificationOrchestrator,
    VerificationVerdict, Verifier, VerifierError,
};
pub use writer::StateWriter;
