use crate::models::{round_cents, round_tenths, BillingRecord};
use crate::store::{AnomalyStatus, StatusBook};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub baseline_days: usize,
    pub scan_limit: usize,
    pub spike_percent: f64,
    pub min_spend: f64,
    pub max_results: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            baseline_days: 7,
            scan_limit: 30,
            spike_percent: 40.0,
            min_spend: 400.0,
            max_results: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: String,
    pub service: String,
    pub detected_date: NaiveDate,
    pub baseline_spend: f64,
    pub actual_spend: f64,
    pub percent_increase: f64,
    pub status: AnomalyStatus,
    pub description: String,
}

pub fn anomaly_id(service: &str, date: NaiveDate) -> String {
    format!("anomaly-{service}-{date}")
}

fn daily_by_service(records: &[BillingRecord]) -> Vec<(String, BTreeMap<NaiveDate, f64>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<(String, BTreeMap<NaiveDate, f64>)> = Vec::new();
    for record in records {
        let slot = *index.entry(record.service.as_str()).or_insert_with(|| {
            out.push((record.service.clone(), BTreeMap::new()));
            out.len() - 1
        });
        *out[slot].1.entry(record.usage_date).or_insert(0.0) += record.cost;
    }
    out
}

pub fn detect_anomalies(records: &[BillingRecord], cfg: &AnomalyConfig) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    let window = cfg.baseline_days.max(1);

    for (service, daily) in daily_by_service(records) {
        // BTreeMap iteration is already date-ascending
        let series: Vec<(NaiveDate, f64)> = daily.into_iter().collect();
        let end = series.len().min(cfg.scan_limit);

        for i in window..end {
            let (date, current) = series[i];
            let baseline = series[i - window..i].iter().map(|(_, c)| c).sum::<f64>() / window as f64;
            if baseline == 0.0 {
                continue;
            }

            let pct = (current - baseline) / baseline * 100.0;
            let actual_spend = round_cents(current);
            let percent_increase = round_tenths(pct);
            if percent_increase <= cfg.spike_percent || actual_spend <= cfg.min_spend {
                continue;
            }

            anomalies.push(Anomaly {
                id: anomaly_id(&service, date),
                service: service.clone(),
                detected_date: date,
                baseline_spend: round_cents(baseline),
                actual_spend,
                percent_increase,
                status: AnomalyStatus::New,
                description: format!(
                    "Unusual spike in {service} spend detected. Cost was {}% higher than the {window}-day average.",
                    pct.round()
                ),
            });
        }
    }

    anomalies.sort_by(|a, b| b.detected_date.cmp(&a.detected_date));
    anomalies.truncate(cfg.max_results);
    debug!(count = anomalies.len(), "anomaly detection finished");
    anomalies
}

pub fn merge_statuses(anomalies: Vec<Anomaly>, book: &StatusBook) -> Vec<Anomaly> {
    anomalies
        .into_iter()
        .map(|mut anomaly| {
            if let Some(status) = book.anomaly(&anomaly.id) {
                anomaly.status = status;
            }
            anomaly
        })
        .filter(|a| a.status != AnomalyStatus::Dismissed)
        .collect()
}
