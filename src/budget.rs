use crate::aggregate::matches_filter;
use crate::models::{round_cents, BillingRecord, Environment, LookbackWindow, UNALLOCATED};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const TOP_SERVICES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamPolicy {
    pub multiplier: f64,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetPolicy {
    pub default_multiplier: f64,
    pub alert_threshold: f64,
    pub owner_domain: String,
    pub teams: HashMap<String, TeamPolicy>,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        let team = |multiplier: f64, owner: &str| TeamPolicy {
            multiplier,
            owner: Some(owner.to_string()),
        };
        Self {
            default_multiplier: 1.0,
            alert_threshold: 80.0,
            owner_domain: "company.com".into(),
            teams: HashMap::from([
                ("Engineering".into(), team(1.1, "eng-lead@company.com")),
                ("Data".into(), team(0.95, "data-lead@company.com")),
                ("Platform".into(), team(1.05, "platform-lead@company.com")),
                ("DevOps".into(), team(1.2, "devops-lead@company.com")),
                ("ML".into(), team(0.85, "ml-lead@company.com")),
            ]),
        }
    }
}

impl BudgetPolicy {
    pub fn multiplier(&self, team: &str) -> f64 {
        self.teams
            .get(team)
            .map(|p| p.multiplier)
            .unwrap_or(self.default_multiplier)
    }

    pub fn owner(&self, team: &str) -> String {
        self.teams
            .get(team)
            .and_then(|p| p.owner.clone())
            .unwrap_or_else(|| format!("{}@{}", team.to_lowercase(), self.owner_domain))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCost {
    pub name: String,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamBudget {
    pub team: String,
    pub monthly_budget: f64,
    pub current_spend: f64,
    pub previous_spend: f64,
    pub budget_owner: String,
    pub alert_threshold: f64,
    pub top_services: Vec<ServiceCost>,
}

impl TeamBudget {
    pub fn utilization_percent(&self) -> f64 {
        if self.monthly_budget > 0.0 {
            self.current_spend / self.monthly_budget * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
struct TeamSpend {
    current: f64,
    previous: f64,
    services: Vec<(String, f64)>,
}

impl TeamSpend {
    fn add_service(&mut self, service: &str, cost: f64) {
        match self.services.iter_mut().find(|(name, _)| name == service) {
            Some((_, total)) => *total += cost,
            None => self.services.push((service.to_string(), cost)),
        }
    }
}

// rounded to the nearest hundred
pub fn coarse_budget(spend: f64, multiplier: f64) -> f64 {
    (spend * multiplier / 100.0).round() * 100.0
}

pub fn team_budgets(
    records: &[BillingRecord],
    days: u32,
    today: NaiveDate,
    policy: &BudgetPolicy,
) -> Vec<TeamBudget> {
    let current_window = LookbackWindow::ending(today, days);
    let previous_window = current_window.preceding();

    let mut order: Vec<String> = Vec::new();
    let mut spend: HashMap<String, TeamSpend> = HashMap::new();
    for record in records {
        let team = record.team_label();
        let entry = spend.entry(team.to_string()).or_insert_with(|| {
            order.push(team.to_string());
            TeamSpend::default()
        });
        if current_window.contains(record.usage_date) {
            entry.current += record.cost;
            entry.add_service(&record.service, record.cost);
        } else if previous_window.contains(record.usage_date) {
            entry.previous += record.cost;
        }
    }

    let mut out: Vec<TeamBudget> = order
        .into_iter()
        .filter(|team| team != UNALLOCATED)
        .filter_map(|team| {
            let data = spend.remove(&team)?;
            let mut top_services: Vec<ServiceCost> = data
                .services
                .into_iter()
                .map(|(name, cost)| ServiceCost {
                    name,
                    cost: round_cents(cost),
                })
                .collect();
            top_services.sort_by(|a, b| b.cost.total_cmp(&a.cost));
            top_services.truncate(TOP_SERVICES);

            Some(TeamBudget {
                monthly_budget: coarse_budget(data.current, policy.multiplier(&team)),
                current_spend: round_cents(data.current),
                previous_spend: round_cents(data.previous),
                budget_owner: policy.owner(&team),
                alert_threshold: policy.alert_threshold,
                top_services,
                team,
            })
        })
        .collect();
    out.sort_by(|a, b| b.current_spend.total_cmp(&a.current_spend));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
}

impl PeriodType {
    pub fn days(self) -> u32 {
        match self {
            PeriodType::Daily => 1,
            PeriodType::Weekly => 7,
            PeriodType::Monthly => 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Exceeded,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub alert_name: String,
    pub recipient_email: String,
    pub threshold: f64,
    pub current_amount: f64,
    pub period_type: PeriodType,
    pub status: AlertStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_environment: Option<Environment>,
}

// Both thresholds are inclusive. No spend never alerts.
pub fn classify_spend(current: f64, budget: f64, threshold_percent: f64) -> Option<AlertStatus> {
    if current <= 0.0 {
        return None;
    }
    if current >= budget {
        Some(AlertStatus::Exceeded)
    } else if current >= budget * (threshold_percent / 100.0) {
        Some(AlertStatus::Warning)
    } else {
        None
    }
}

pub fn team_budget_alert(budget: &TeamBudget, period: PeriodType) -> Option<NotificationPayload> {
    let status = classify_spend(
        budget.current_spend,
        budget.monthly_budget,
        budget.alert_threshold,
    )?;
    Some(NotificationPayload {
        alert_name: format!("{} budget", budget.team),
        recipient_email: budget.budget_owner.clone(),
        threshold: budget.monthly_budget,
        current_amount: budget.current_spend,
        period_type: period,
        status,
        filter_team: Some(budget.team.clone()),
        filter_service: None,
        filter_environment: None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub name: String,
    pub recipient: String,
    pub amount: f64,
    pub period: PeriodType,
    #[serde(default = "default_warn_percent")]
    pub warn_percent: f64,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub environment: Option<Environment>,
}

fn default_warn_percent() -> f64 {
    80.0
}

impl AlertRule {
    fn matches(&self, record: &BillingRecord) -> bool {
        self.team
            .as_deref()
            .map_or(true, |t| record.team_label() == t)
            && self
                .service
                .as_deref()
                .map_or(true, |s| matches_filter(s, &record.service))
            && self.environment.map_or(true, |e| record.environment == e)
    }
}

pub fn evaluate_alert(
    rule: &AlertRule,
    records: &[BillingRecord],
    today: NaiveDate,
) -> Option<NotificationPayload> {
    // a daily period covers today only
    let window = LookbackWindow::ending(today, rule.period.days() - 1);
    let spend: f64 = records
        .iter()
        .filter(|r| window.contains(r.usage_date) && rule.matches(r))
        .map(|r| r.cost)
        .sum();
    let current_amount = round_cents(spend);
    let status = classify_spend(current_amount, rule.amount, rule.warn_percent)?;

    Some(NotificationPayload {
        alert_name: rule.name.clone(),
        recipient_email: rule.recipient.clone(),
        threshold: rule.amount,
        current_amount,
        period_type: rule.period,
        status,
        filter_team: rule.team.clone(),
        filter_service: rule.service.clone(),
        filter_environment: rule.environment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 30).expect("valid date")
    }

    fn record(team: Option<&str>, service: &str, days_ago: i64, cost: f64) -> BillingRecord {
        BillingRecord {
            service: service.to_string(),
            cost,
            usage_date: today() - Duration::days(days_ago),
            team: team.map(str::to_string),
            environment: Environment::Production,
            project: None,
            region: "us-west-2".into(),
            usage_quantity: 1.0,
            usage_unit: "hours".into(),
        }
    }

    #[test]
    fn coarse_budget_rounds_to_nearest_hundred() {
        assert_eq!(coarse_budget(1234.0, 1.1), 1400.0);
        assert_eq!(coarse_budget(149.0, 1.0), 100.0);
        assert_eq!(coarse_budget(150.0, 1.0), 200.0);
    }

    #[test]
    fn team_budgets_skip_unallocated_and_rank_by_spend() {
        let records = vec![
            record(Some("Data"), "S3", 1, 300.0),
            record(None, "EC2", 1, 900.0),
            record(Some("Engineering"), "EC2", 2, 1000.0),
            record(Some("Engineering"), "EC2", 10, 400.0),
        ];
        let budgets = team_budgets(&records, 7, today(), &BudgetPolicy::default());
        let teams: Vec<&str> = budgets.iter().map(|b| b.team.as_str()).collect();
        assert_eq!(teams, vec!["Engineering", "Data"]);

        let eng = &budgets[0];
        assert_eq!(eng.current_spend, 1000.0);
        assert_eq!(eng.previous_spend, 400.0);
        assert_eq!(eng.monthly_budget, 1100.0);
        assert_eq!(eng.budget_owner, "eng-lead@company.com");
        assert_eq!(eng.alert_threshold, 80.0);
    }

    #[test]
    fn unknown_team_uses_policy_defaults() {
        let budgets = team_budgets(
            &[record(Some("Growth"), "Lambda", 0, 250.0)],
            7,
            today(),
            &BudgetPolicy::default(),
        );
        assert_eq!(budgets[0].budget_owner, "growth@company.com");
        assert_eq!(budgets[0].monthly_budget, 300.0);
    }

    #[test]
    fn top_services_are_capped_at_five() {
        let records: Vec<BillingRecord> = ["A", "B", "C", "D", "E", "F"]
            .iter()
            .enumerate()
            .map(|(i, s)| record(Some("ML"), s, 0, 10.0 + i as f64))
            .collect();
        let budgets = team_budgets(&records, 7, today(), &BudgetPolicy::default());
        let names: Vec<&str> = budgets[0].top_services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["F", "E", "D", "C", "B"]);
    }

    #[test]
    fn classify_spend_distinguishes_warning_and_exceeded() {
        assert_eq!(classify_spend(1000.0, 1000.0, 80.0), Some(AlertStatus::Exceeded));
        assert_eq!(classify_spend(850.0, 1000.0, 80.0), Some(AlertStatus::Warning));
        assert_eq!(classify_spend(700.0, 1000.0, 80.0), None);
        assert_eq!(classify_spend(0.0, 0.0, 80.0), None);
    }

    #[test]
    fn team_alert_targets_budget_owner() {
        let budget = TeamBudget {
            team: "Platform".into(),
            monthly_budget: 1000.0,
            current_spend: 900.0,
            previous_spend: 0.0,
            budget_owner: "platform-lead@company.com".into(),
            alert_threshold: 80.0,
            top_services: vec![],
        };
        let payload = team_budget_alert(&budget, PeriodType::Monthly).expect("warning payload");
        assert_eq!(payload.status, AlertStatus::Warning);
        assert_eq!(payload.recipient_email, "platform-lead@company.com");
        assert_eq!(payload.filter_team.as_deref(), Some("Platform"));

        let json = serde_json::to_value(&payload).expect("serialize payload");
        assert_eq!(json["alertName"], "Platform budget");
        assert_eq!(json["periodType"], "monthly");
        assert!(json.get("filterService").is_none());
    }

    #[test]
    fn alert_rule_applies_filters_and_period() {
        let rule = AlertRule {
            name: "prod EC2 weekly".into(),
            recipient: "ops@company.com".into(),
            amount: 500.0,
            period: PeriodType::Weekly,
            warn_percent: 80.0,
            team: None,
            service: Some("EC2".into()),
            environment: Some(Environment::Production),
        };
        let mut staging = record(Some("Data"), "EC2", 0, 1000.0);
        staging.environment = Environment::Staging;
        let records = vec![
            record(Some("Data"), "EC2", 0, 300.0),
            record(Some("Data"), "EC2", 6, 150.0),
            record(Some("Data"), "EC2", 7, 1000.0),
            record(Some("Data"), "S3", 0, 1000.0),
            staging,
        ];
        let payload = evaluate_alert(&rule, &records, today()).expect("warning payload");
        assert_eq!(payload.current_amount, 450.0);
        assert_eq!(payload.status, AlertStatus::Warning);
        assert_eq!(payload.filter_environment, Some(Environment::Production));
    }
}
