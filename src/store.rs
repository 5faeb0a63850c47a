use crate::models::BillingRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct BillingStore {
    records: Vec<BillingRecord>,
}

impl BillingStore {
    pub fn new(mut records: Vec<BillingRecord>) -> Self {
        // stable: records sharing a date keep their source order
        records.sort_by_key(|r| r.usage_date);
        Self { records }
    }

    pub fn records(&self) -> &[BillingRecord] {
        &self.records
    }

    pub fn services(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.service.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyStatus {
    New,
    Acknowledged,
    Dismissed,
}

impl AnomalyStatus {
    pub fn as_label(self) -> &'static str {
        match self {
            AnomalyStatus::New => "new",
            AnomalyStatus::Acknowledged => "acknowledged",
            AnomalyStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "new" => Some(AnomalyStatus::New),
            "acknowledged" | "ack" => Some(AnomalyStatus::Acknowledged),
            "dismissed" | "dismiss" => Some(AnomalyStatus::Dismissed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Pending,
    Accepted,
    Ignored,
    Deferred,
}

impl RecommendationStatus {
    pub fn as_label(self) -> &'static str {
        match self {
            RecommendationStatus::Pending => "pending",
            RecommendationStatus::Accepted => "accepted",
            RecommendationStatus::Ignored => "ignored",
            RecommendationStatus::Deferred => "deferred",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(RecommendationStatus::Pending),
            "accepted" | "accept" => Some(RecommendationStatus::Accepted),
            "ignored" | "ignore" => Some(RecommendationStatus::Ignored),
            "deferred" | "defer" => Some(RecommendationStatus::Deferred),
            _ => None,
        }
    }
}

// User-assigned statuses keyed by entity id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusBook {
    pub anomalies: HashMap<String, AnomalyStatus>,
    pub recommendations: HashMap<String, RecommendationStatus>,
}

impl StatusBook {
    pub fn anomaly(&self, id: &str) -> Option<AnomalyStatus> {
        self.anomalies.get(id).copied()
    }

    pub fn recommendation(&self, id: &str) -> RecommendationStatus {
        self.recommendations
            .get(id)
            .copied()
            .unwrap_or(RecommendationStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Environment;
    use chrono::NaiveDate;

    fn record(service: &str, day: u32) -> BillingRecord {
        BillingRecord {
            service: service.to_string(),
            cost: 1.0,
            usage_date: NaiveDate::from_ymd_opt(2024, 5, day).expect("valid date"),
            team: None,
            environment: Environment::Development,
            project: None,
            region: "us-east-1".into(),
            usage_quantity: 1.0,
            usage_unit: "hours".into(),
        }
    }

    #[test]
    fn store_orders_records_by_date_and_keeps_ties_stable() {
        let store = BillingStore::new(vec![record("S3", 3), record("EC2", 1), record("RDS", 3)]);
        let services: Vec<&str> = store.records().iter().map(|r| r.service.as_str()).collect();
        assert_eq!(services, vec!["EC2", "S3", "RDS"]);
    }

    #[test]
    fn services_are_sorted_and_unique() {
        let store = BillingStore::new(vec![record("S3", 1), record("EC2", 2), record("S3", 3)]);
        assert_eq!(store.services(), vec!["EC2".to_string(), "S3".to_string()]);
    }

    #[test]
    fn statuses_parse_short_forms() {
        assert_eq!(AnomalyStatus::parse("ack"), Some(AnomalyStatus::Acknowledged));
        assert_eq!(AnomalyStatus::parse("weird"), None);
        assert_eq!(
            RecommendationStatus::parse(" Defer "),
            Some(RecommendationStatus::Deferred)
        );
    }

    #[test]
    fn unknown_recommendation_defaults_to_pending() {
        let book = StatusBook::default();
        assert_eq!(book.recommendation("i-123"), RecommendationStatus::Pending);
        assert_eq!(book.anomaly("anomaly-EC2-2024-05-01"), None);
    }
}
