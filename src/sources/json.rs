use super::BillingSource;
use crate::error::AppError;
use crate::models::{BillingRecord, UtilizationSample};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub struct JsonFileSource {
    pub billing_path: PathBuf,
    pub utilization_path: Option<PathBuf>,
}

impl JsonFileSource {
    pub fn new(billing_path: impl Into<PathBuf>) -> Self {
        Self {
            billing_path: billing_path.into(),
            utilization_path: None,
        }
    }

    pub fn with_utilization(mut self, path: impl Into<PathBuf>) -> Self {
        self.utilization_path = Some(path.into());
        self
    }
}

impl BillingSource for JsonFileSource {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load_records(&self) -> Result<Vec<BillingRecord>, AppError> {
        let raw = fs::read_to_string(&self.billing_path)?;
        let records: Vec<BillingRecord> = serde_json::from_str(&raw)?;
        debug!(path = %self.billing_path.display(), count = records.len(), "read billing export");
        Ok(records)
    }

    fn load_utilization(&self) -> Result<Vec<UtilizationSample>, AppError> {
        let Some(path) = &self.utilization_path else {
            return Ok(vec![]);
        };
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
