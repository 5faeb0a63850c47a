use crate::anomaly::AnomalyConfig;
use crate::budget::{AlertRule, BudgetPolicy, TeamPolicy};
use crate::error::AppError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

pub const SERVICE_NAME: &str = "spendlens";
const WEBHOOK_KEY: &str = "notifications:webhook";
const DEFAULT_ALERT_THRESHOLD: f64 = 80.0;

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var("SPENDLENS_HOME") {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "spendlens", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".spendlens"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub default_days: u32,
    pub log_level: String,
    pub anomaly: AnomalyConfig,
    pub forecast: ForecastSettings,
    pub budget: BudgetPolicy,
    pub notifications: NotificationSettings,
    pub alerts: Vec<AlertRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForecastSettings {
    pub horizon_days: u32,
    pub confidence_level: f64,
    pub months: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    pub webhook_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_days: 30,
            log_level: "warn".into(),
            anomaly: AnomalyConfig::default(),
            forecast: ForecastSettings::default(),
            budget: BudgetPolicy::default(),
            notifications: NotificationSettings::default(),
            alerts: vec![],
        }
    }
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            horizon_days: 30,
            confidence_level: 0.95,
            months: 3,
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_seconds: 30,
        }
    }
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn data_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("data"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn db_path() -> Result<PathBuf, AppError> {
    Ok(data_dir()?.join("spendlens.sqlite"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(data_dir()?)?;
    Ok(())
}

pub fn validate_webhook_url(raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::Config(format!(
            "Unsupported webhook scheme '{other}'. Use http or https."
        ))),
    }
}

fn normalize_config(config: &mut AppConfig) -> bool {
    let mut changed = false;

    let mut teams: HashMap<String, TeamPolicy> = HashMap::new();
    for (team, policy) in std::mem::take(&mut config.budget.teams) {
        let trimmed = team.trim().to_string();
        if trimmed != team {
            changed = true;
        }
        teams.insert(trimmed, policy);
    }
    config.budget.teams = teams;

    let threshold = config.budget.alert_threshold;
    if !(threshold > 0.0 && threshold <= 100.0) {
        config.budget.alert_threshold = if threshold > 100.0 {
            100.0
        } else {
            DEFAULT_ALERT_THRESHOLD
        };
        changed = true;
    }

    let mut alerts: Vec<AlertRule> = Vec::new();
    for mut rule in std::mem::take(&mut config.alerts) {
        let name = rule.name.trim().to_string();
        if name != rule.name {
            rule.name = name;
            changed = true;
        }
        if alerts.iter().any(|a| a.name.eq_ignore_ascii_case(&rule.name)) {
            changed = true;
            continue;
        }
        alerts.push(rule);
    }
    config.alerts = alerts;

    if config.default_days == 0 {
        config.default_days = AppConfig::default().default_days;
        changed = true;
    }

    changed
}

pub fn load_config() -> Result<AppConfig, AppError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw_str = fs::read_to_string(&path)?;
    let mut parsed: AppConfig = toml::from_str(&raw_str)?;
    if let Some(url) = parsed.notifications.webhook_url.as_deref() {
        validate_webhook_url(url)?;
    }

    // Persist normalized values so the file reflects what is in effect.
    if normalize_config(&mut parsed) {
        info!(path = %path.display(), "rewriting normalized config");
        save_config(&parsed)?;
    }

    Ok(parsed)
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    ensure_dirs()?;
    let path = config_path()?;
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

pub fn set_webhook_token(token: &str) -> Result<(), AppError> {
    let entry = keyring::Entry::new(SERVICE_NAME, WEBHOOK_KEY)?;
    entry.set_password(token)?;
    Ok(())
}

pub fn delete_webhook_token() -> Result<(), AppError> {
    let entry = keyring::Entry::new(SERVICE_NAME, WEBHOOK_KEY)?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(AppError::Keyring(e)),
    }
}

// keyring first, then SPENDLENS_WEBHOOK_TOKEN
pub fn get_webhook_token() -> Option<String> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, WEBHOOK_KEY) {
        match entry.get_password() {
            Ok(value) if !value.is_empty() => return Some(value),
            Ok(_) => {}
            Err(e) => debug!(error = %e, "webhook token not available from keyring"),
        }
    }

    std::env::var("SPENDLENS_WEBHOOK_TOKEN")
        .ok()
        .filter(|v| !v.is_empty())
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    let cfg_path = config_path()?;
    if !Path::new(&cfg_path).exists() {
        save_config(&AppConfig::default())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::PeriodType;

    fn rule(name: &str) -> AlertRule {
        AlertRule {
            name: name.to_string(),
            recipient: "ops@company.com".into(),
            amount: 100.0,
            period: PeriodType::Daily,
            warn_percent: 80.0,
            team: None,
            service: None,
            environment: None,
        }
    }

    #[test]
    fn normalize_config_trims_and_dedupes() {
        let mut cfg = AppConfig::default();
        cfg.budget.teams.insert(
            " Growth ".into(),
            TeamPolicy {
                multiplier: 1.3,
                owner: None,
            },
        );
        cfg.alerts = vec![rule(" daily EC2 "), rule("DAILY ec2"), rule("weekly")];

        let changed = normalize_config(&mut cfg);
        assert!(changed);
        assert!(cfg.budget.teams.contains_key("Growth"));
        let names: Vec<&str> = cfg.alerts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["daily EC2", "weekly"]);
    }

    #[test]
    fn normalize_config_clamps_threshold() {
        let mut cfg = AppConfig::default();
        cfg.budget.alert_threshold = 0.0;
        assert!(normalize_config(&mut cfg));
        assert_eq!(cfg.budget.alert_threshold, 80.0);

        cfg.budget.alert_threshold = 140.0;
        assert!(normalize_config(&mut cfg));
        assert_eq!(cfg.budget.alert_threshold, 100.0);
    }

    #[test]
    fn default_config_is_already_normalized() {
        let mut cfg = AppConfig::default();
        assert!(!normalize_config(&mut cfg));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            default_days = 14

            [anomaly]
            min_spend = 250.0
            "#,
        )
        .expect("parse partial config");
        assert_eq!(cfg.default_days, 14);
        assert_eq!(cfg.anomaly.min_spend, 250.0);
        assert_eq!(cfg.anomaly.baseline_days, 7);
        assert_eq!(cfg.forecast.horizon_days, 30);
        assert_eq!(cfg.budget.multiplier("DevOps"), 1.2);
    }

    #[test]
    fn webhook_url_requires_http_scheme() {
        assert!(validate_webhook_url("https://hooks.example.com/budget").is_ok());
        let err = validate_webhook_url("ftp://hooks.example.com").expect_err("reject ftp");
        assert!(err.to_string().contains("Unsupported webhook scheme"));
        assert!(validate_webhook_url("not a url").is_err());
    }
}
