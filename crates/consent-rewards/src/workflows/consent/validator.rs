//! Dataset-content validator contract and its implementations.
//!
//! The engine only relies on the verdict shape: accept/reject, an optional record count,
//! and rationale text. Transport failures are errors here and become failed dataset
//! records one layer up.

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::CategoryId;

/// Raw file handed to the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetUpload {
    pub file_name: String,
    pub category: CategoryId,
    pub bytes: Vec<u8>,
}

impl DatasetUpload {
    pub fn new(
        file_name: impl Into<String>,
        category: CategoryId,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            category,
            bytes: bytes.into(),
        }
    }

    pub fn mime(&self) -> mime::Mime {
        mime_guess::from_path(&self.file_name).first_or_octet_stream()
    }

    pub fn file_type(&self) -> String {
        self.mime().essence_str().to_string()
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Validator response body: `{ ok, result?, error?, recordsCount? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorVerdict {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_count: Option<u32>,
}

impl ValidatorVerdict {
    pub fn accepted(records_count: Option<u32>, result: impl Into<String>) -> Self {
        Self {
            ok: true,
            result: Some(result.into()),
            error: None,
            records_count,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.into()),
            records_count: None,
        }
    }

    pub fn rationale(&self) -> Option<String> {
        if self.ok {
            self.result.clone()
        } else {
            self.error.clone().or_else(|| self.result.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidatorError {
    #[error("validator unreachable: {0}")]
    Transport(String),
    #[error("validator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("validator response unreadable: {0}")]
    Decode(String),
}

#[async_trait]
pub trait DatasetValidator: Send + Sync {
    async fn validate(&self, upload: &DatasetUpload) -> Result<ValidatorVerdict, ValidatorError>;
}

/// Remote validator reached over HTTP with the file as the request body.
#[derive(Debug, Clone)]
pub struct HttpValidator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpValidator {
    pub const FILE_NAME_HEADER: &'static str = "x-file-name";
    pub const CATEGORY_HEADER: &'static str = "x-data-category";

    pub fn new(endpoint: impl Into<String>) -> Result<Self, ValidatorError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| ValidatorError::Transport(err.to_string()))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DatasetValidator for HttpValidator {
    async fn validate(&self, upload: &DatasetUpload) -> Result<ValidatorVerdict, ValidatorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, upload.file_type())
            .header(Self::FILE_NAME_HEADER, upload.file_name.as_str())
            .header(Self::CATEGORY_HEADER, upload.category.as_str())
            .body(upload.bytes.clone())
            .send()
            .await
            .map_err(|err| ValidatorError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ValidatorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let verdict: ValidatorVerdict = response
            .json()
            .await
            .map_err(|err| ValidatorError::Decode(err.to_string()))?;
        debug!(file = %upload.file_name, ok = verdict.ok, "validator responded");
        Ok(verdict)
    }
}

/// Offline validator that inspects CSV and JSON payloads locally.
#[derive(Debug, Clone)]
pub struct SimulatedValidator {
    min_records: u32,
}

impl Default for SimulatedValidator {
    fn default() -> Self {
        Self { min_records: 1 }
    }
}

impl SimulatedValidator {
    pub fn with_min_records(min_records: u32) -> Self {
        Self { min_records }
    }

    fn count_records(&self, upload: &DatasetUpload) -> Result<u32, String> {
        let mime = upload.mime();
        if mime.essence_str() == mime::TEXT_CSV.essence_str() {
            return count_csv_rows(&upload.bytes);
        }
        if mime.essence_str() == mime::APPLICATION_JSON.essence_str() {
            return count_json_entries(&upload.bytes);
        }
        Err(format!(
            "unsupported file type {} for {}",
            mime.essence_str(),
            upload.category
        ))
    }
}

fn count_csv_rows(bytes: &[u8]) -> Result<u32, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);
    let mut rows = 0u32;
    for record in reader.records() {
        record.map_err(|err| format!("malformed CSV: {err}"))?;
        rows = rows.saturating_add(1);
    }
    Ok(rows)
}

fn count_json_entries(bytes: &[u8]) -> Result<u32, String> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|err| format!("malformed JSON: {err}"))?;
    match value {
        serde_json::Value::Array(items) => Ok(u32::try_from(items.len()).unwrap_or(u32::MAX)),
        serde_json::Value::Object(_) => Ok(1),
        _ => Err("JSON payload must be an object or an array of objects".to_string()),
    }
}

#[async_trait]
impl DatasetValidator for SimulatedValidator {
    async fn validate(&self, upload: &DatasetUpload) -> Result<ValidatorVerdict, ValidatorError> {
        if upload.bytes.is_empty() {
            return Ok(ValidatorVerdict::rejected(format!(
                "{} is empty",
                upload.file_name
            )));
        }

        let verdict = match self.count_records(upload) {
            Ok(count) if count >= self.min_records => ValidatorVerdict::accepted(
                Some(count),
                format!("{count} records look like {} data", upload.category),
            ),
            Ok(count) => ValidatorVerdict::rejected(format!(
                "found {count} records, at least {} required",
                self.min_records
            )),
            Err(reason) => ValidatorVerdict::rejected(reason),
        };
        Ok(verdict)
    }
}
