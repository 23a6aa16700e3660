//! Client for the account-deletion callable.
//!
//! The callable sends a confirmation email; the irreversible deletion happens later, out
//! of band, when the user follows the confirmation link.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDeletionRequest {
    pub user_name: String,
    pub user_email: String,
    pub user_id: String,
}

impl AccountDeletionRequest {
    pub fn validate(&self) -> Result<(), AccountError> {
        if self.user_id.trim().is_empty() {
            return Err(AccountError::Invalid("user id is required".to_string()));
        }
        let email = self.user_email.trim();
        let well_formed = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
        if !well_formed {
            return Err(AccountError::Invalid(format!(
                "{:?} is not a valid email address",
                self.user_email
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDeletionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("invalid deletion request: {0}")]
    Invalid(String),
    #[error("account service unreachable: {0}")]
    Transport(String),
    #[error("account service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("account service response unreadable: {0}")]
    Decode(String),
}

#[async_trait]
pub trait AccountDeletion: Send + Sync {
    async fn request_deletion(
        &self,
        request: &AccountDeletionRequest,
    ) -> Result<AccountDeletionResponse, AccountError>;
}

#[derive(Debug, Clone)]
pub struct HttpAccountDeletion {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAccountDeletion {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AccountError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| AccountError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AccountDeletion for HttpAccountDeletion {
    async fn request_deletion(
        &self,
        request: &AccountDeletionRequest,
    ) -> Result<AccountDeletionResponse, AccountError> {
        request.validate()?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|err| AccountError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AccountError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let outcome: AccountDeletionResponse = response
            .json()
            .await
            .map_err(|err| AccountError::Decode(err.to_string()))?;
        info!(user = %request.user_id, success = outcome.success, "account deletion requested");
        Ok(outcome)
    }
}
