use crate::models::{
    percent_change, round_cents, round_tenths, BillingRecord, BreakdownEntry, CostDriver,
    CostUnitMetrics, DailyTotal, LookbackWindow, MonthTotals, UnallocatedSpend,
};
use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;

pub const ALL_SERVICES: &str = "all";

// one estimated active user per 15 units of spend
const COST_PER_ESTIMATED_USER: f64 = 15.0;
const REQUEST_UNIT: &str = "requests";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Service,
    Team,
    Environment,
    Date,
}

impl Dimension {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "service" => Some(Dimension::Service),
            "team" => Some(Dimension::Team),
            "environment" | "env" => Some(Dimension::Environment),
            "date" | "day" => Some(Dimension::Date),
            _ => None,
        }
    }

    fn key(self, record: &BillingRecord) -> String {
        match self {
            Dimension::Service => record.service.clone(),
            Dimension::Team => record.team_label().to_string(),
            Dimension::Environment => record.environment.as_label().to_string(),
            Dimension::Date => record.usage_date.to_string(),
        }
    }
}

pub fn matches_filter(filter: &str, service: &str) -> bool {
    filter.is_empty() || filter == ALL_SERVICES || filter == service
}

#[derive(Debug, Default)]
struct OrderedTotals {
    index: HashMap<String, usize>,
    entries: Vec<(String, f64)>,
}

impl OrderedTotals {
    fn add(&mut self, key: String, cost: f64) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 += cost,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, cost));
            }
        }
    }

    fn get(&self, key: &str) -> f64 {
        self.index.get(key).map(|&i| self.entries[i].1).unwrap_or(0.0)
    }

    fn into_ranked(self) -> Vec<BreakdownEntry> {
        let mut out: Vec<BreakdownEntry> = self
            .entries
            .into_iter()
            .map(|(name, value)| BreakdownEntry {
                name,
                value: round_cents(value),
            })
            .collect();
        // stable, so ties keep first-seen order
        out.sort_by(|a, b| b.value.total_cmp(&a.value));
        out
    }
}

fn windowed<'a>(
    records: &'a [BillingRecord],
    window: LookbackWindow,
    filter: &'a str,
) -> impl Iterator<Item = &'a BillingRecord> {
    records
        .iter()
        .filter(move |r| window.contains(r.usage_date) && matches_filter(filter, &r.service))
}

// Ranked descending by total, except dates which stay ascending.
pub fn breakdown(
    records: &[BillingRecord],
    dimension: Dimension,
    days: u32,
    filter: &str,
    today: NaiveDate,
) -> Vec<BreakdownEntry> {
    if dimension == Dimension::Date {
        return daily_trend(records, days, filter, today)
            .into_iter()
            .map(|d| BreakdownEntry {
                name: d.date.to_string(),
                value: d.total,
            })
            .collect();
    }

    let window = LookbackWindow::ending(today, days);
    let mut totals = OrderedTotals::default();
    for record in windowed(records, window, filter) {
        totals.add(dimension.key(record), record.cost);
    }
    totals.into_ranked()
}

pub fn service_breakdown(
    records: &[BillingRecord],
    days: u32,
    filter: &str,
    today: NaiveDate,
) -> Vec<BreakdownEntry> {
    breakdown(records, Dimension::Service, days, filter, today)
}

pub fn team_breakdown(
    records: &[BillingRecord],
    days: u32,
    filter: &str,
    today: NaiveDate,
) -> Vec<BreakdownEntry> {
    breakdown(records, Dimension::Team, days, filter, today)
}

pub fn environment_breakdown(
    records: &[BillingRecord],
    days: u32,
    filter: &str,
    today: NaiveDate,
) -> Vec<BreakdownEntry> {
    breakdown(records, Dimension::Environment, days, filter, today)
}

pub fn daily_trend(
    records: &[BillingRecord],
    days: u32,
    filter: &str,
    today: NaiveDate,
) -> Vec<DailyTotal> {
    let window = LookbackWindow::ending(today, days);
    let mut totals: HashMap<NaiveDate, f64> = HashMap::new();
    for record in windowed(records, window, filter) {
        *totals.entry(record.usage_date).or_insert(0.0) += record.cost;
    }

    let mut out: Vec<DailyTotal> = totals
        .into_iter()
        .map(|(date, total)| DailyTotal {
            date,
            total: round_cents(total),
        })
        .collect();
    out.sort_by_key(|d| d.date);
    out
}

pub fn window_total(records: &[BillingRecord], days: u32, filter: &str, today: NaiveDate) -> f64 {
    let window = LookbackWindow::ending(today, days);
    windowed(records, window, filter).map(|r| r.cost).sum()
}

pub fn top_cost_drivers(records: &[BillingRecord], days: u32, today: NaiveDate) -> Vec<CostDriver> {
    let current_window = LookbackWindow::ending(today, days);
    let previous_window = current_window.preceding();

    let mut seen = OrderedTotals::default();
    let mut current = OrderedTotals::default();
    let mut previous = OrderedTotals::default();
    for record in records {
        if current_window.contains(record.usage_date) {
            current.add(record.service.clone(), record.cost);
            seen.add(record.service.clone(), 0.0);
        } else if previous_window.contains(record.usage_date) {
            previous.add(record.service.clone(), record.cost);
            seen.add(record.service.clone(), 0.0);
        }
    }

    let mut drivers: Vec<CostDriver> = seen
        .entries
        .into_iter()
        .map(|(service, _)| {
            let current_cost = current.get(&service);
            let previous_cost = previous.get(&service);
            CostDriver {
                change: round_tenths(percent_change(current_cost, previous_cost)),
                current_cost: round_cents(current_cost),
                previous_cost: round_cents(previous_cost),
                service,
            }
        })
        .collect();
    drivers.sort_by(|a, b| b.current_cost.total_cmp(&a.current_cost));
    drivers
}

pub fn unallocated_spend(records: &[BillingRecord], days: u32, today: NaiveDate) -> UnallocatedSpend {
    let window = LookbackWindow::ending(today, days);
    let (amount, total) = windowed(records, window, ALL_SERVICES).fold(
        (0.0, 0.0),
        |(amount, total), r| {
            let amount = if r.is_unallocated() { amount + r.cost } else { amount };
            (amount, total + r.cost)
        },
    );
    UnallocatedSpend {
        amount: round_cents(amount),
        total: round_cents(total),
    }
}

pub fn cost_unit_metrics(records: &[BillingRecord], days: u32, today: NaiveDate) -> CostUnitMetrics {
    let window = LookbackWindow::ending(today, days);
    let mut total_cost = 0.0;
    let mut total_requests = 0.0;
    for record in windowed(records, window, ALL_SERVICES) {
        total_cost += record.cost;
        if record.usage_unit == REQUEST_UNIT {
            total_requests += record.usage_quantity;
        }
    }

    let estimated_users = (total_cost / COST_PER_ESTIMATED_USER).floor();
    let cost_per_user = if estimated_users > 0.0 {
        total_cost / estimated_users
    } else {
        0.0
    };
    let cost_per_request = if total_requests > 0.0 {
        total_cost / total_requests * 1000.0
    } else {
        0.0
    };

    CostUnitMetrics {
        cost_per_user: round_cents(cost_per_user),
        cost_per_request: round_cents(cost_per_request),
    }
}

pub fn month_totals(records: &[BillingRecord], today: NaiveDate) -> MonthTotals {
    let this_month_start = today.with_day(1).unwrap_or(today);
    let last_month_end = this_month_start.pred_opt().unwrap_or(this_month_start);
    let last_month_start = last_month_end.with_day(1).unwrap_or(last_month_end);

    let mut this_month = 0.0;
    let mut last_month = 0.0;
    for record in records {
        if record.usage_date >= this_month_start {
            this_month += record.cost;
        } else if record.usage_date >= last_month_start && record.usage_date <= last_month_end {
            last_month += record.cost;
        }
    }

    MonthTotals {
        this_month: round_cents(this_month),
        last_month: round_cents(last_month),
        change: round_tenths(percent_change(this_month, last_month)),
    }
}
