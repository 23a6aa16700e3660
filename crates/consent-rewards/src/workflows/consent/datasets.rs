use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::warn;

use super::domain::{CategoryId, DatasetId, DatasetRecord, UploadOutcome};
use super::eligibility::DatasetEvidence;
use super::validator::{DatasetUpload, DatasetValidator, ValidatorError, ValidatorVerdict};

/// Placeholder record counts used when the validator accepts without counting.
const PLACEHOLDER_RECORDS: std::ops::Range<u32> = 100..1_100;

/// Result of one upload: the stored record plus the validator's rationale, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub record: DatasetRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Every uploaded dataset with its validation outcome. Uploads never merge, and an id
/// is never handed out twice, even after the record holding it is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetStore {
    records: Vec<DatasetRecord>,
    last_issued: u64,
}

impl DatasetStore {
    pub fn from_records(records: Vec<DatasetRecord>) -> Self {
        Self::restore(records, 0)
    }

    /// Rebuild with the persisted id high-water mark. The mark is raised to the largest
    /// stored id if it was lost.
    pub fn restore(records: Vec<DatasetRecord>, last_issued: u64) -> Self {
        let highest = records.iter().map(|record| record.id.0).max().unwrap_or(0);
        Self {
            records,
            last_issued: last_issued.max(highest),
        }
    }

    /// Largest id issued so far.
    pub fn last_issued(&self) -> u64 {
        self.last_issued
    }

    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    pub fn get(&self, id: DatasetId) -> Option<&DatasetRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn for_category<'a>(
        &'a self,
        category: &'a CategoryId,
    ) -> impl Iterator<Item = &'a DatasetRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| &record.category == category)
    }

    pub fn has_successful_upload(&self, category: &CategoryId) -> bool {
        self.for_category(category).any(DatasetRecord::is_success)
    }

    pub fn successful_count(&self) -> usize {
        self.records.iter().filter(|record| record.is_success()).count()
    }

    fn next_id(&mut self) -> DatasetId {
        self.last_issued += 1;
        DatasetId(self.last_issued)
    }

    /// Validate the file and append the resulting record. Never fails: validator
    /// rejections and transport errors both become `error` records.
    pub async fn upload<V>(&mut self, validator: &V, upload: DatasetUpload) -> UploadReceipt
    where
        V: DatasetValidator + ?Sized,
    {
        let verdict = validator.validate(&upload).await;
        self.record_verdict(upload, verdict, Utc::now(), &mut rand::thread_rng())
    }

    /// Append a record for a verdict obtained out of band.
    pub fn record_verdict<R>(
        &mut self,
        upload: DatasetUpload,
        verdict: Result<ValidatorVerdict, ValidatorError>,
        uploaded_at: DateTime<Utc>,
        rng: &mut R,
    ) -> UploadReceipt
    where
        R: Rng + ?Sized,
    {
        let (outcome, record_count, rationale) = match verdict {
            Ok(verdict) if verdict.ok => {
                let count = verdict
                    .records_count
                    .unwrap_or_else(|| rng.gen_range(PLACEHOLDER_RECORDS));
                (UploadOutcome::Success, count, verdict.rationale())
            }
            Ok(verdict) => (UploadOutcome::Error, 0, verdict.rationale()),
            Err(err) => {
                warn!(
                    file = %upload.file_name,
                    category = %upload.category,
                    error = %err,
                    "dataset validator transport failure"
                );
                (UploadOutcome::Error, 0, Some(err.to_string()))
            }
        };

        let record = DatasetRecord {
            id: self.next_id(),
            file_type: upload.file_type(),
            size_bytes: upload.size_bytes(),
            file_name: upload.file_name,
            category: upload.category,
            uploaded_at,
            outcome,
            record_count,
        };
        self.records.push(record.clone());

        UploadReceipt { record, rationale }
    }

    /// Hard delete. Partners already active are unaffected.
    pub fn remove(&mut self, id: DatasetId) -> Option<DatasetRecord> {
        let index = self.records.iter().position(|record| record.id == id)?;
        Some(self.records.remove(index))
    }
}

impl DatasetEvidence for DatasetStore {
    fn has_successful_upload(&self, category: &CategoryId) -> bool {
        DatasetStore::has_successful_upload(self, category)
    }
}
