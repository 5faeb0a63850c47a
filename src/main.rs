use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use spendlens::aggregate::{self, Dimension};
use spendlens::anomaly::{detect_anomalies, merge_statuses};
use spendlens::budget::{
    evaluate_alert, team_budget_alert, team_budgets, NotificationPayload, PeriodType,
};
use spendlens::config::{
    db_path, delete_webhook_token, ensure_initialized, get_webhook_token, load_config,
    save_config, set_webhook_token, validate_webhook_url, AppConfig,
};
use spendlens::error::AppError;
use spendlens::forecast::{
    analyze_trend, generate_forecast, project_monthly_totals, savings_scenario, DataPoint,
};
use spendlens::logging::init_logging;
use spendlens::models::{round_cents, BillingRecord};
use spendlens::notify::{deliver_all, AlertSink, StdoutSink, WebhookSink};
use spendlens::rightsizing::{advise_all, total_savings};
use spendlens::sources::demo::{DemoProfile, DemoSource, DEFAULT_DAYS, DEFAULT_SEED};
use spendlens::sources::json::JsonFileSource;
use spendlens::sources::BillingSource;
use spendlens::storage::Storage;
use spendlens::store::{AnomalyStatus, BillingStore, RecommendationStatus};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "spendlens")]
#[command(about = "Cloud spend analytics: breakdowns, forecasts, anomalies and rightsizing")]
struct Cli {
    /// Evaluate windows as if today were this date (YYYY-MM-DD).
    #[arg(long, global = true)]
    as_of: Option<NaiveDate>,
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init,
    SeedDemo {
        #[arg(long, default_value = "startup-saas")]
        profile: String,
        #[arg(long, default_value_t = DEFAULT_DAYS)]
        days: u32,
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
    Import {
        billing: PathBuf,
        #[arg(long)]
        utilization: Option<PathBuf>,
    },
    Services,
    Breakdown {
        #[arg(long, default_value = "service")]
        by: String,
        #[arg(long)]
        days: Option<u32>,
        #[arg(long, default_value = aggregate::ALL_SERVICES)]
        service: String,
    },
    Drivers {
        #[arg(long)]
        days: Option<u32>,
    },
    Unallocated {
        #[arg(long)]
        days: Option<u32>,
    },
    UnitMetrics {
        #[arg(long)]
        days: Option<u32>,
    },
    Totals,
    Anomalies,
    AnomalyStatus {
        id: String,
        status: String,
    },
    Forecast {
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        horizon: Option<u32>,
        #[arg(long)]
        confidence: Option<f64>,
        #[arg(long, default_value = aggregate::ALL_SERVICES)]
        service: String,
    },
    Trend {
        #[arg(long)]
        days: Option<u32>,
        #[arg(long, default_value = aggregate::ALL_SERVICES)]
        service: String,
    },
    Savings {
        #[arg(long)]
        reduction: f64,
        #[arg(long, default_value_t = 12)]
        months: u32,
        /// Monthly spend to start from; defaults to the last 30 days.
        #[arg(long)]
        monthly: Option<f64>,
    },
    Rightsize,
    RecommendationStatus {
        resource_id: String,
        status: String,
    },
    Budgets {
        #[arg(long)]
        days: Option<u32>,
    },
    Alerts {
        /// Deliver payloads to the configured webhook, or stdout without one.
        #[arg(long)]
        send: bool,
    },
    SetWebhook {
        url: String,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        clear_token: bool,
    },
    Export {
        #[arg(long, default_value = "json")]
        format: String,
    },
}

fn parse_dimension(input: &str) -> Result<Dimension, AppError> {
    Dimension::parse(input).ok_or_else(|| {
        AppError::Config("Unsupported dimension. Use service, team, environment, or date.".into())
    })
}

fn parse_profile(input: &str) -> Result<DemoProfile, AppError> {
    DemoProfile::parse(input).ok_or_else(|| {
        AppError::Config("Unsupported profile. Use startup-saas, ecommerce, or ml-heavy.".into())
    })
}

fn resolve_days(days: Option<u32>, cfg: &AppConfig) -> u32 {
    days.filter(|d| *d > 0).unwrap_or(cfg.default_days)
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn history(records: &[BillingRecord], days: u32, service: &str, today: NaiveDate) -> Vec<DataPoint> {
    aggregate::daily_trend(records, days, service, today)
        .into_iter()
        .map(|d| DataPoint {
            date: d.date,
            value: d.total,
        })
        .collect()
}

fn open_storage() -> Result<Storage, AppError> {
    Storage::open(&db_path()?)
}

fn load_store(storage: &Storage) -> Result<BillingStore, AppError> {
    let records = storage.load_records()?;
    info!(source = storage.name(), count = records.len(), "loaded billing records");
    Ok(BillingStore::new(records))
}

fn pending_alerts(
    cfg: &AppConfig,
    records: &[BillingRecord],
    today: NaiveDate,
) -> Vec<NotificationPayload> {
    let budgets = team_budgets(records, cfg.default_days, today, &cfg.budget);
    budgets
        .iter()
        .filter_map(|b| team_budget_alert(b, PeriodType::Monthly))
        .chain(
            cfg.alerts
                .iter()
                .filter_map(|rule| evaluate_alert(rule, records, today)),
        )
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    ensure_initialized()?;
    let mut cfg = load_config()?;
    init_logging(&cfg.log_level);

    let today = cli.as_of.unwrap_or_else(|| Local::now().date_naive());
    let as_json = cli.json;

    match cli.command {
        Commands::Init => {
            println!("Initialized spendlens config and data directories.");
        }
        Commands::SeedDemo {
            profile,
            days,
            seed,
        } => {
            let profile = parse_profile(&profile)?;
            let source = DemoSource::with_seed(profile, today, seed).days(days);
            let records = source.load_records()?;
            let samples = source.load_utilization()?;

            let mut storage = open_storage()?;
            storage.clear_all()?;
            storage.replace_billing(&records)?;
            storage.replace_utilization(&samples)?;
            info!(profile = profile.as_label(), seed = source.seed(), "seeded demo data");
            println!(
                "Seeded {} billing records and {} resources ({} profile, {} days).",
                records.len(),
                samples.len(),
                profile.as_label(),
                days
            );
        }
        Commands::Import {
            billing,
            utilization,
        } => {
            let mut source = JsonFileSource::new(billing);
            if let Some(path) = utilization {
                source = source.with_utilization(path);
            }
            let records = source.load_records()?;
            let samples = source.load_utilization()?;

            let mut storage = open_storage()?;
            let stored = storage.replace_billing(&records)?;
            if !samples.is_empty() {
                storage.replace_utilization(&samples)?;
            }
            println!(
                "Imported {} billing records and {} resources from {}.",
                stored,
                samples.len(),
                source.name()
            );
        }
        Commands::Services => {
            let store = load_store(&open_storage()?)?;
            let services = store.services();
            if as_json {
                print_json(&services)?;
            } else {
                for name in services {
                    println!("{name}");
                }
            }
        }
        Commands::Breakdown { by, days, service } => {
            let dimension = parse_dimension(&by)?;
            let days = resolve_days(days, &cfg);
            let store = load_store(&open_storage()?)?;
            let rows = aggregate::breakdown(store.records(), dimension, days, &service, today);
            if as_json {
                print_json(&rows)?;
            } else {
                for row in rows {
                    println!("{:<24} {:>12.2}", row.name, row.value);
                }
            }
        }
        Commands::Drivers { days } => {
            let days = resolve_days(days, &cfg);
            let store = load_store(&open_storage()?)?;
            let drivers = aggregate::top_cost_drivers(store.records(), days, today);
            if as_json {
                print_json(&drivers)?;
            } else {
                for d in drivers {
                    println!(
                        "{:<16} {:>12.2} {:>12.2} {:>+8.1}%",
                        d.service, d.current_cost, d.previous_cost, d.change
                    );
                }
            }
        }
        Commands::Unallocated { days } => {
            let days = resolve_days(days, &cfg);
            let store = load_store(&open_storage()?)?;
            let spend = aggregate::unallocated_spend(store.records(), days, today);
            if as_json {
                print_json(&spend)?;
            } else {
                println!("Unallocated {:.2} of {:.2}", spend.amount, spend.total);
            }
        }
        Commands::UnitMetrics { days } => {
            let days = resolve_days(days, &cfg);
            let store = load_store(&open_storage()?)?;
            let metrics = aggregate::cost_unit_metrics(store.records(), days, today);
            if as_json {
                print_json(&metrics)?;
            } else {
                println!("Cost per user:          {:.2}", metrics.cost_per_user);
                println!("Cost per 1000 requests: {:.2}", metrics.cost_per_request);
            }
        }
        Commands::Totals => {
            let store = load_store(&open_storage()?)?;
            let totals = aggregate::month_totals(store.records(), today);
            if as_json {
                print_json(&totals)?;
            } else {
                println!("This month: {:.2}", totals.this_month);
                println!("Last month: {:.2}", totals.last_month);
                println!("Change:     {:+.1}%", totals.change);
            }
        }
        Commands::Anomalies => {
            let storage = open_storage()?;
            let store = load_store(&storage)?;
            let anomalies = merge_statuses(
                detect_anomalies(store.records(), &cfg.anomaly),
                &storage.status_book()?,
            );
            if as_json {
                print_json(&anomalies)?;
            } else if anomalies.is_empty() {
                println!("No anomalies detected.");
            } else {
                for a in anomalies {
                    println!(
                        "{} [{}] {}",
                        a.id,
                        a.status.as_label(),
                        a.description
                    );
                }
            }
        }
        Commands::AnomalyStatus { id, status } => {
            let status = AnomalyStatus::parse(&status).ok_or_else(|| {
                AppError::Config("Unsupported status. Use new, acknowledged, or dismissed.".into())
            })?;
            open_storage()?.set_anomaly_status(&id, status)?;
            println!("Anomaly '{}' marked {}.", id, status.as_label());
        }
        Commands::Forecast {
            days,
            horizon,
            confidence,
            service,
        } => {
            let days = resolve_days(days, &cfg);
            let horizon = horizon.unwrap_or(cfg.forecast.horizon_days);
            let confidence = confidence.unwrap_or(cfg.forecast.confidence_level);
            let store = load_store(&open_storage()?)?;
            let points = generate_forecast(
                &history(store.records(), days, &service, today),
                horizon,
                confidence,
            );
            let monthly = project_monthly_totals(&points, cfg.forecast.months);
            if as_json {
                print_json(&json!({ "points": points, "monthly": monthly }))?;
            } else {
                for p in points.iter().filter(|p| p.is_projection) {
                    println!(
                        "{} {:>10.2} [{:>10.2} .. {:>10.2}]",
                        p.date, p.forecast, p.lower_bound, p.upper_bound
                    );
                }
                for m in monthly {
                    println!(
                        "{} {:>12.2} [{:>12.2} .. {:>12.2}]",
                        m.month, m.projected, m.lower, m.upper
                    );
                }
            }
        }
        Commands::Trend { days, service } => {
            let days = resolve_days(days, &cfg);
            let store = load_store(&open_storage()?)?;
            let trend = analyze_trend(&history(store.records(), days, &service, today));
            if as_json {
                print_json(&trend)?;
            } else {
                println!(
                    "{} (slope {:.2}/day, r² {:.2}, avg {:.2}/day, volatility {:.1}%)",
                    trend.trend.as_label(),
                    trend.slope,
                    trend.r_squared,
                    trend.average_daily,
                    trend.volatility
                );
            }
        }
        Commands::Savings {
            reduction,
            months,
            monthly,
        } => {
            let monthly = match monthly {
                Some(value) => value,
                None => {
                    let store = load_store(&open_storage()?)?;
                    round_cents(aggregate::window_total(
                        store.records(),
                        30,
                        aggregate::ALL_SERVICES,
                        today,
                    ))
                }
            };
            let rows = savings_scenario(monthly, reduction, months);
            if as_json {
                print_json(&rows)?;
            } else {
                for r in rows {
                    println!(
                        "month {:>2}: baseline {:>12.2} optimized {:>12.2} saved {:>12.2}",
                        r.month, r.baseline, r.optimized, r.savings
                    );
                }
            }
        }
        Commands::Rightsize => {
            let storage = open_storage()?;
            let samples = BillingSource::load_utilization(&storage)?;
            let advice = advise_all(&samples, &storage.status_book()?);
            if as_json {
                print_json(&json!({
                    "resources": advice,
                    "total_savings": total_savings(&advice),
                }))?;
            } else {
                for a in &advice {
                    println!(
                        "{:<18} {:<14} {:<10} {:<14} {:>9.2} [{}] {}",
                        a.sample.resource_id,
                        a.result.current_class,
                        a.result.recommendation.as_label(),
                        a.result.suggested_class.as_deref().unwrap_or("-"),
                        a.result.savings,
                        a.status.as_label(),
                        a.result.reason
                    );
                }
                println!("Potential monthly savings: {:.2}", total_savings(&advice));
            }
        }
        Commands::RecommendationStatus {
            resource_id,
            status,
        } => {
            let status = RecommendationStatus::parse(&status).ok_or_else(|| {
                AppError::Config(
                    "Unsupported status. Use pending, accepted, ignored, or deferred.".into(),
                )
            })?;
            open_storage()?.set_recommendation_status(&resource_id, status)?;
            println!(
                "Recommendation for '{}' marked {}.",
                resource_id,
                status.as_label()
            );
        }
        Commands::Budgets { days } => {
            let days = resolve_days(days, &cfg);
            let store = load_store(&open_storage()?)?;
            let budgets = team_budgets(store.records(), days, today, &cfg.budget);
            if as_json {
                print_json(&budgets)?;
            } else {
                for b in budgets {
                    println!(
                        "{:<12} {:>12.2} / {:>10.0} ({:>5.1}%) owner {}",
                        b.team,
                        b.current_spend,
                        b.monthly_budget,
                        b.utilization_percent(),
                        b.budget_owner
                    );
                }
            }
        }
        Commands::Alerts { send } => {
            let store = load_store(&open_storage()?)?;
            let payloads = pending_alerts(&cfg, store.records(), today);
            if !send {
                return print_json(&payloads);
            }

            let sink: Box<dyn AlertSink> = match cfg.notifications.webhook_url.as_deref() {
                Some(raw) => Box::new(WebhookSink::new(
                    validate_webhook_url(raw)?,
                    get_webhook_token(),
                    cfg.notifications.timeout_seconds,
                )?),
                None => Box::new(StdoutSink),
            };
            let reports = deliver_all(sink.as_ref(), &payloads).await;
            let failed = reports.iter().filter(|r| !r.delivered).count();
            if as_json {
                print_json(&reports)?;
            } else {
                println!(
                    "Delivered {} of {} alerts via {}.",
                    reports.len() - failed,
                    reports.len(),
                    sink.name()
                );
            }
            if failed > 0 {
                return Err(AppError::Notify(format!("{failed} alert(s) failed to deliver")));
            }
        }
        Commands::SetWebhook {
            url,
            token,
            clear_token,
        } => {
            let url = validate_webhook_url(&url)?;
            cfg.notifications.webhook_url = Some(url.to_string());
            if let Some(token) = token {
                set_webhook_token(&token)?;
            } else if clear_token {
                delete_webhook_token()?;
            }
            save_config(&cfg)?;
            println!("Webhook set to {}.", url);
        }
        Commands::Export { format } => {
            let storage = open_storage()?;
            if format.eq_ignore_ascii_case("json") {
                println!("{}", storage.export_billing_json()?);
            } else if format.eq_ignore_ascii_case("csv") {
                println!("service_name,cost,usage_date,tag_team,tag_environment,tag_project,region,usage_quantity,usage_unit");
                for r in storage.load_billing()? {
                    println!(
                        "{},{:.2},{},{},{},{},{},{},{}",
                        csv_field(&r.service),
                        r.cost,
                        r.usage_date,
                        csv_field(r.team.as_deref().unwrap_or("")),
                        r.environment.as_label(),
                        csv_field(r.project.as_deref().unwrap_or("")),
                        csv_field(&r.region),
                        r.usage_quantity,
                        csv_field(&r.usage_unit),
                    );
                }
            } else {
                return Err(AppError::Config(
                    "Unsupported export format. Use json or csv".into(),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dimension_rejects_unknown_values() {
        assert_eq!(parse_dimension("team").expect("team"), Dimension::Team);
        let err = parse_dimension("region").expect_err("expected validation error");
        assert!(err.to_string().contains("Unsupported dimension"));
    }

    #[test]
    fn parse_profile_rejects_unknown_values() {
        assert_eq!(
            parse_profile("ecommerce").expect("profile"),
            DemoProfile::Ecommerce
        );
        assert!(parse_profile("gaming").is_err());
    }

    #[test]
    fn resolve_days_falls_back_to_config() {
        let cfg = AppConfig::default();
        assert_eq!(resolve_days(None, &cfg), 30);
        assert_eq!(resolve_days(Some(0), &cfg), 30);
        assert_eq!(resolve_days(Some(7), &cfg), 7);
    }

    #[test]
    fn csv_field_escapes_special_characters() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("a\"b"), "\"a\"\"b\"");
        assert_eq!(csv_field("a\nb"), "\"a\nb\"");
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "spendlens",
            "breakdown",
            "--by",
            "team",
            "--as-of",
            "2024-05-31",
            "--json",
        ])
        .expect("parse");
        assert!(cli.json);
        assert_eq!(cli.as_of, NaiveDate::from_ymd_opt(2024, 5, 31));
    }
}
