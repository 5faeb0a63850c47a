use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

pub const UNALLOCATED: &str = "Unallocated";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl Environment {
    pub const ALL: [Environment; 3] = [
        Environment::Production,
        Environment::Staging,
        Environment::Development,
    ];

    pub fn as_label(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Development => "development",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|env| env.as_label().eq_ignore_ascii_case(input.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingRecord {
    #[serde(rename = "service_name")]
    pub service: String,
    pub cost: f64,
    pub usage_date: NaiveDate,
    #[serde(rename = "tag_team", default)]
    pub team: Option<String>,
    #[serde(rename = "tag_environment")]
    pub environment: Environment,
    #[serde(rename = "tag_project", default)]
    pub project: Option<String>,
    pub region: String,
    pub usage_quantity: f64,
    pub usage_unit: String,
}

impl BillingRecord {
    pub fn team_label(&self) -> &str {
        self.team.as_deref().unwrap_or(UNALLOCATED)
    }

    pub fn is_unallocated(&self) -> bool {
        self.team.is_none() && self.project.is_none()
    }
}

// Inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl LookbackWindow {
    pub fn ending(today: NaiveDate, days: u32) -> Self {
        Self {
            start: today
                .checked_sub_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MIN),
            end: today,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    // Empty when this window already starts at the earliest representable date.
    pub fn preceding(&self) -> Self {
        let Some(end) = self.start.pred_opt() else {
            return Self {
                start: NaiveDate::MAX,
                end: NaiveDate::MIN,
            };
        };
        let span = self.end - self.start;
        Self {
            start: self
                .start
                .checked_sub_signed(span)
                .unwrap_or(NaiveDate::MIN),
            end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostDriver {
    pub service: String,
    pub current_cost: f64,
    pub previous_cost: f64,
    pub change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnallocatedSpend {
    pub amount: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostUnitMetrics {
    pub cost_per_user: f64,
    pub cost_per_request: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthTotals {
    pub this_month: f64,
    pub last_month: f64,
    pub change: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceType {
    #[serde(rename = "EC2")]
    Ec2,
    #[serde(rename = "RDS")]
    Rds,
}

impl ResourceType {
    pub fn as_label(self) -> &'static str {
        match self {
            ResourceType::Ec2 => "EC2",
            ResourceType::Rds => "RDS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub instance_class: String,
    pub cpu_avg: f64,
    pub cpu_max: f64,
    pub memory_avg: f64,
    pub memory_max: f64,
    pub monthly_cost: f64,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub environment: Option<Environment>,
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).expect("valid date")
    }

    #[test]
    fn lookback_window_is_inclusive_on_both_ends() {
        let window = LookbackWindow::ending(day(10), 2);
        assert!(window.contains(day(8)));
        assert!(window.contains(day(10)));
        assert!(!window.contains(day(7)));
        assert!(!window.contains(day(11)));
    }

    #[test]
    fn preceding_window_does_not_overlap() {
        let window = LookbackWindow::ending(day(20), 5);
        let previous = window.preceding();
        assert_eq!(previous.start, day(10));
        assert_eq!(previous.end, day(14));
        assert!(!previous.contains(window.start));
    }

    #[test]
    fn oversized_lookback_saturates_instead_of_overflowing() {
        let window = LookbackWindow::ending(day(10), u32::MAX);
        assert_eq!(window.start, NaiveDate::MIN);
        assert_eq!(window.end, day(10));
        assert!(window.contains(NaiveDate::MIN));

        let previous = window.preceding();
        assert!(previous.start > previous.end);
        assert!(!previous.contains(day(1)));
        assert!(!previous.contains(NaiveDate::MIN));
    }

    #[test]
    fn preceding_window_clamps_at_earliest_date() {
        let start = NaiveDate::MIN
            .checked_add_days(Days::new(3))
            .expect("representable date");
        let window = LookbackWindow {
            start,
            end: start.checked_add_days(Days::new(9)).expect("representable date"),
        };
        let previous = window.preceding();
        assert_eq!(previous.start, NaiveDate::MIN);
        assert_eq!(previous.end, start.pred_opt().expect("previous day"));
    }

    #[test]
    fn round_cents_rounds_half_away_from_zero() {
        assert_eq!(round_cents(1.005_000_1), 1.01);
        assert_eq!(round_cents(2.5), 2.5);
        assert_eq!(round_cents(-0.125_000_1), -0.13);
    }

    #[test]
    fn percent_change_guards_zero_previous() {
        assert_eq!(percent_change(50.0, 0.0), 0.0);
        assert_eq!(percent_change(150.0, 100.0), 50.0);
    }

    #[test]
    fn billing_record_uses_export_field_names() {
        let raw = r#"{
            "service_name": "EC2",
            "cost": 12.5,
            "usage_date": "2024-03-01",
            "tag_team": null,
            "tag_environment": "staging",
            "region": "us-east-1",
            "usage_quantity": 10.0,
            "usage_unit": "hours"
        }"#;
        let record: BillingRecord = serde_json::from_str(raw).expect("parse record");
        assert_eq!(record.service, "EC2");
        assert_eq!(record.environment, Environment::Staging);
        assert_eq!(record.team_label(), UNALLOCATED);
        assert!(record.is_unallocated());
    }
}
