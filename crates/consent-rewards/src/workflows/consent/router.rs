use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::account::{AccountDeletionRequest, AccountError};
use super::domain::{CategoryId, DatasetId, PartnerId, PartnerStatus, RewardId};
use super::emitter::NotificationPreferences;
use super::ledger::LedgerError;
use super::lifecycle::LifecycleError;
use super::repository::KeyValueStore;
use super::service::{ConsentRewardsService, EngineError};
use super::validator::{DatasetUpload, DatasetValidator, HttpValidator};
use super::verification::Verifier;

type Service<S, D, V> = Arc<ConsentRewardsService<S, D, V>>;

/// Router exposing the consent and rewards engine under `/api/v1`.
pub fn consent_router<S, D, V>(service: Service<S, D, V>) -> Router
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    Router::new()
        .route("/api/v1/categories", get(categories_handler::<S, D, V>))
        .route(
            "/api/v1/categories/:category_id",
            put(toggle_category_handler::<S, D, V>),
        )
        .route(
            "/api/v1/datasets",
            get(datasets_handler::<S, D, V>).post(upload_handler::<S, D, V>),
        )
        .route(
            "/api/v1/datasets/:dataset_id",
            delete(remove_dataset_handler::<S, D, V>),
        )
        .route("/api/v1/partners", get(partners_handler::<S, D, V>))
        .route(
            "/api/v1/partners/:partner_id",
            get(partner_handler::<S, D, V>),
        )
        .route(
            "/api/v1/partners/:partner_id/eligibility",
            get(eligibility_handler::<S, D, V>),
        )
        .route(
            "/api/v1/partners/:partner_id/accept",
            post(accept_handler::<S, D, V>),
        )
        .route(
            "/api/v1/partners/:partner_id/reject",
            post(reject_handler::<S, D, V>),
        )
        .route(
            "/api/v1/partners/:partner_id/cancel-verification",
            post(cancel_handler::<S, D, V>),
        )
        .route(
            "/api/v1/rewards/:reward_id/redeem",
            post(redeem_handler::<S, D, V>),
        )
        .route("/api/v1/vouchers", get(vouchers_handler::<S, D, V>))
        .route(
            "/api/v1/notifications",
            get(notifications_handler::<S, D, V>),
        )
        .route(
            "/api/v1/notifications/read-all",
            post(read_all_handler::<S, D, V>),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            post(read_handler::<S, D, V>),
        )
        .route(
            "/api/v1/notification-preferences",
            get(preferences_handler::<S, D, V>).put(update_preferences_handler::<S, D, V>),
        )
        .route("/api/v1/activity", get(activity_handler::<S, D, V>))
        .route("/api/v1/dashboard", get(dashboard_handler::<S, D, V>))
        .route(
            "/api/v1/account/deletion",
            post(account_deletion_handler::<S, D, V>),
        )
        .with_state(service)
}

/// Status code for a service error. Ineligibility is actionable input, illegal
/// transitions and locked rewards are conflicts, expired rewards are gone.
pub fn engine_error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Lifecycle(lifecycle) => match lifecycle {
            LifecycleError::UnknownPartner(_) | LifecycleError::UnknownDataset(_) => {
                StatusCode::NOT_FOUND
            }
            LifecycleError::IneligiblePartner { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LifecycleError::DuplicatePartner(_)
            | LifecycleError::Rejected(_)
            | LifecycleError::IllegalTransition { .. } => StatusCode::CONFLICT,
        },
        EngineError::Ledger(ledger) => match ledger {
            LedgerError::RewardLocked { .. } | LedgerError::VerificationIncomplete(_) => {
                StatusCode::CONFLICT
            }
            LedgerError::RewardExpired { .. } => StatusCode::GONE,
        },
        EngineError::Account(AccountError::Invalid(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Account(_) => StatusCode::BAD_GATEWAY,
        EngineError::UnknownCategory(_)
        | EngineError::UnknownReward(_)
        | EngineError::UnknownDataset(_)
        | EngineError::UnknownNotification(_) => StatusCode::NOT_FOUND,
        EngineError::AccountDeletionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub fn engine_error_response(err: EngineError) -> Response {
    let status = engine_error_status(&err);
    let payload = match &err {
        EngineError::Lifecycle(LifecycleError::IneligiblePartner {
            partner,
            reason,
            missing,
            guidance,
        }) => json!({
            "error": err.to_string(),
            "partner_id": partner,
            "reason": reason,
            "missing": missing,
            "guidance": guidance,
        }),
        _ => json!({ "error": err.to_string() }),
    };
    (status, axum::Json(payload)).into_response()
}

fn bad_request(message: &str) -> Response {
    let payload = json!({ "error": message });
    (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
}

pub(crate) async fn categories_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    axum::Json(service.categories()).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToggleRequest {
    active: bool,
}

pub(crate) async fn toggle_category_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
    Path(category_id): Path<String>,
    axum::Json(request): axum::Json<ToggleRequest>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    let category = CategoryId::new(category_id);
    match service.set_category_active(&category, request.active) {
        Ok(changed) => {
            let payload = json!({
                "category_id": category,
                "active": request.active,
                "changed": changed,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => engine_error_response(err),
    }
}

pub(crate) async fn datasets_handler<S, D, V>(State(service): State<Service<S, D, V>>) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    axum::Json(service.datasets()).into_response()
}

/// Raw file body; name and category travel in the same headers the validator receives.
pub(crate) async fn upload_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let Some(file_name) = header(HttpValidator::FILE_NAME_HEADER) else {
        return bad_request("missing x-file-name header");
    };
    let Some(category) = header(HttpValidator::CATEGORY_HEADER) else {
        return bad_request("missing x-data-category header");
    };

    let upload = DatasetUpload::new(file_name, CategoryId::new(category), body.to_vec());
    match service.upload_dataset(upload).await {
        Ok(receipt) => (StatusCode::CREATED, axum::Json(receipt)).into_response(),
        Err(err) => engine_error_response(err),
    }
}

pub(crate) async fn remove_dataset_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
    Path(dataset_id): Path<u64>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    match service.remove_dataset(DatasetId(dataset_id)) {
        Ok(record) => axum::Json(record).into_response(),
        Err(err) => engine_error_response(err),
    }
}

pub(crate) async fn partners_handler<S, D, V>(State(service): State<Service<S, D, V>>) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    axum::Json(service.partners()).into_response()
}

pub(crate) async fn partner_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
    Path(partner_id): Path<u64>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    match service.partner(PartnerId(partner_id)) {
        Ok(view) => axum::Json(view).into_response(),
        Err(err) => engine_error_response(err),
    }
}

pub(crate) async fn eligibility_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
    Path(partner_id): Path<u64>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    match service.eligibility(PartnerId(partner_id)) {
        Ok(eligibility) => {
            let payload = json!({
                "partner_id": partner_id,
                "met": eligibility.met,
                "reason": eligibility.reason,
                "missing": eligibility.missing,
                "guidance": eligibility.guidance(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => engine_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AcceptRequest {
    pub(crate) dataset_ids: Vec<DatasetId>,
}

pub(crate) async fn accept_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
    Path(partner_id): Path<u64>,
    axum::Json(request): axum::Json<AcceptRequest>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    match service.request_acceptance(PartnerId(partner_id), &request.dataset_ids) {
        Ok(handle) => {
            let ticket = handle.ticket();
            let payload = json!({
                "partner_id": ticket.partner_id,
                "token": ticket.token,
                "status": PartnerStatus::VerificationPending.label(),
            });
            (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
        }
        Err(err) => engine_error_response(err),
    }
}

pub(crate) async fn reject_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
    Path(partner_id): Path<u64>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    match service.reject(PartnerId(partner_id)) {
        Ok(transitions) => axum::Json(json!({ "transitions": transitions })).into_response(),
        Err(err) => engine_error_response(err),
    }
}

pub(crate) async fn cancel_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
    Path(partner_id): Path<u64>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    match service.cancel_verification(PartnerId(partner_id)) {
        Ok(transition) => axum::Json(transition).into_response(),
        Err(err) => engine_error_response(err),
    }
}

pub(crate) async fn redeem_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
    Path(reward_id): Path<String>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    match service.redeem(&RewardId::new(reward_id)) {
        Ok(redemption) => {
            let status = if redemption.newly_issued {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, axum::Json(redemption)).into_response()
        }
        Err(err) => engine_error_response(err),
    }
}

pub(crate) async fn vouchers_handler<S, D, V>(State(service): State<Service<S, D, V>>) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    axum::Json(service.vouchers()).into_response()
}

pub(crate) async fn notifications_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    axum::Json(service.notifications()).into_response()
}

pub(crate) async fn read_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
    Path(notification_id): Path<u64>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    match service.mark_notification_read(notification_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => engine_error_response(err),
    }
}

pub(crate) async fn read_all_handler<S, D, V>(State(service): State<Service<S, D, V>>) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    let marked = service.mark_all_notifications_read();
    axum::Json(json!({ "marked_read": marked })).into_response()
}

pub(crate) async fn preferences_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    axum::Json(service.notification_preferences()).into_response()
}

pub(crate) async fn update_preferences_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
    axum::Json(preferences): axum::Json<NotificationPreferences>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    service.set_notification_preferences(preferences);
    axum::Json(preferences).into_response()
}

pub(crate) async fn activity_handler<S, D, V>(State(service): State<Service<S, D, V>>) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    axum::Json(service.activity()).into_response()
}

pub(crate) async fn dashboard_handler<S, D, V>(State(service): State<Service<S, D, V>>) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    axum::Json(service.dashboard()).into_response()
}

pub(crate) async fn account_deletion_handler<S, D, V>(
    State(service): State<Service<S, D, V>>,
    axum::Json(request): axum::Json<AccountDeletionRequest>,
) -> Response
where
    S: KeyValueStore + 'static,
    D: DatasetValidator + 'static,
    V: Verifier + 'static,
{
    match service.request_account_deletion(request).await {
        Ok(response) => {
            let status = if response.success {
                StatusCode::ACCEPTED
            } else {
                StatusCode::BAD_GATEWAY
            };
            (status, axum::Json(response)).into_response()
        }
        Err(err) => engine_error_response(err),
    }
}
