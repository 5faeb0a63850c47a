use crate::error::AppError;
use crate::models::{BillingRecord, UtilizationSample};

pub mod demo;
pub mod json;

pub trait BillingSource {
    fn name(&self) -> &'static str;

    fn load_records(&self) -> Result<Vec<BillingRecord>, AppError>;

    fn load_utilization(&self) -> Result<Vec<UtilizationSample>, AppError> {
        Ok(vec![])
    }
}

impl BillingSource for crate::storage::Storage {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load_records(&self) -> Result<Vec<BillingRecord>, AppError> {
        self.load_billing()
    }

    fn load_utilization(&self) -> Result<Vec<UtilizationSample>, AppError> {
        crate::storage::Storage::load_utilization(self)
    }
}
