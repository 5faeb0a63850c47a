use crate::error::AppError;
use crate::models::{BillingRecord, Environment, ResourceType, UtilizationSample};
use crate::store::{AnomalyStatus, RecommendationStatus, StatusBook};
use chrono::NaiveDate;
use rusqlite::{params, types::Type, Connection, Row};
use std::path::Path;
use tracing::{debug, warn};

const ANOMALY_KIND: &str = "anomaly";
const RECOMMENDATION_KIND: &str = "recommendation";

pub struct Storage {
    conn: Connection,
}

fn conversion_error(
    col: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(err))
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized value '{0}'")]
struct UnknownValue(String);

fn billing_from_row(r: &Row<'_>) -> rusqlite::Result<BillingRecord> {
    let date: String = r.get(2)?;
    let env: String = r.get(4)?;
    Ok(BillingRecord {
        service: r.get(0)?,
        cost: r.get(1)?,
        usage_date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| conversion_error(2, e))?,
        team: r.get(3)?,
        environment: Environment::parse(&env).ok_or_else(|| conversion_error(4, UnknownValue(env)))?,
        project: r.get(5)?,
        region: r.get(6)?,
        usage_quantity: r.get(7)?,
        usage_unit: r.get(8)?,
    })
}

fn sample_from_row(r: &Row<'_>) -> rusqlite::Result<UtilizationSample> {
    let kind: String = r.get(1)?;
    let resource_type = match kind.as_str() {
        "EC2" => ResourceType::Ec2,
        "RDS" => ResourceType::Rds,
        _ => return Err(conversion_error(1, UnknownValue(kind))),
    };
    let env: Option<String> = r.get(10)?;
    Ok(UtilizationSample {
        resource_id: r.get(0)?,
        resource_type,
        instance_class: r.get(2)?,
        cpu_avg: r.get(3)?,
        cpu_max: r.get(4)?,
        memory_avg: r.get(5)?,
        memory_max: r.get(6)?,
        monthly_cost: r.get(7)?,
        region: r.get(8)?,
        team: r.get(9)?,
        environment: env.as_deref().and_then(Environment::parse),
    })
}

impl Storage {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        let this = Self { conn };
        this.init()?;
        Ok(this)
    }

    fn init(&self) -> Result<(), AppError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS billing_records (
                id INTEGER PRIMARY KEY,
                service_name TEXT NOT NULL,
                cost REAL NOT NULL,
                usage_date TEXT NOT NULL,
                tag_team TEXT,
                tag_environment TEXT NOT NULL,
                tag_project TEXT,
                region TEXT NOT NULL,
                usage_quantity REAL NOT NULL,
                usage_unit TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS billing_records_date ON billing_records (usage_date);

            CREATE TABLE IF NOT EXISTS utilization_samples (
                resource_id TEXT PRIMARY KEY,
                resource_type TEXT NOT NULL,
                instance_class TEXT NOT NULL,
                cpu_avg REAL NOT NULL,
                cpu_max REAL NOT NULL,
                memory_avg REAL NOT NULL,
                memory_max REAL NOT NULL,
                monthly_cost REAL NOT NULL,
                region TEXT,
                team TEXT,
                environment TEXT
            );

            CREATE TABLE IF NOT EXISTS entity_status (
                kind TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                status TEXT NOT NULL,
                PRIMARY KEY (kind, entity_id)
            );
            "#,
        )?;
        Ok(())
    }

    // Replaces stored rows per (date, service) pair present in `records`.
    pub fn replace_billing(&mut self, records: &[BillingRecord]) -> Result<usize, AppError> {
        let tx = self.conn.transaction()?;

        {
            let mut delete = tx.prepare(
                "DELETE FROM billing_records WHERE usage_date = ? AND service_name = ?",
            )?;
            let mut covered: Vec<(NaiveDate, &str)> = records
                .iter()
                .map(|r| (r.usage_date, r.service.as_str()))
                .collect();
            covered.sort_unstable();
            covered.dedup();
            for (date, service) in covered {
                delete.execute(params![date.to_string(), service])?;
            }

            let mut insert = tx.prepare(
                "INSERT INTO billing_records (service_name, cost, usage_date, tag_team, tag_environment, tag_project, region, usage_quantity, usage_unit)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for r in records {
                insert.execute(params![
                    r.service,
                    r.cost,
                    r.usage_date.to_string(),
                    r.team,
                    r.environment.as_label(),
                    r.project,
                    r.region,
                    r.usage_quantity,
                    r.usage_unit,
                ])?;
            }
        }

        tx.commit()?;
        debug!(count = records.len(), "stored billing records");
        Ok(records.len())
    }

    pub fn load_billing(&self) -> Result<Vec<BillingRecord>, AppError> {
        let mut stmt = self.conn.prepare(
            "SELECT service_name, cost, usage_date, tag_team, tag_environment, tag_project, region, usage_quantity, usage_unit
             FROM billing_records ORDER BY usage_date ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([], billing_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn replace_utilization(&mut self, samples: &[UtilizationSample]) -> Result<usize, AppError> {
        let tx = self.conn.transaction()?;

        {
            let mut upsert = tx.prepare(
                "INSERT OR REPLACE INTO utilization_samples (resource_id, resource_type, instance_class, cpu_avg, cpu_max, memory_avg, memory_max, monthly_cost, region, team, environment)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for s in samples {
                upsert.execute(params![
                    s.resource_id,
                    s.resource_type.as_label(),
                    s.instance_class,
                    s.cpu_avg,
                    s.cpu_max,
                    s.memory_avg,
                    s.memory_max,
                    s.monthly_cost,
                    s.region,
                    s.team,
                    s.environment.map(Environment::as_label),
                ])?;
            }
        }

        tx.commit()?;
        Ok(samples.len())
    }

    pub fn load_utilization(&self) -> Result<Vec<UtilizationSample>, AppError> {
        let mut stmt = self.conn.prepare(
            "SELECT resource_id, resource_type, instance_class, cpu_avg, cpu_max, memory_avg, memory_max, monthly_cost, region, team, environment
             FROM utilization_samples ORDER BY resource_type, resource_id",
        )?;
        let rows = stmt
            .query_map([], sample_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn set_status(&self, kind: &str, id: &str, status: &str) -> Result<(), AppError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO entity_status (kind, entity_id, status) VALUES (?, ?, ?)",
            params![kind, id, status],
        )?;
        Ok(())
    }

    pub fn set_anomaly_status(&self, id: &str, status: AnomalyStatus) -> Result<(), AppError> {
        self.set_status(ANOMALY_KIND, id, status.as_label())
    }

    pub fn set_recommendation_status(
        &self,
        id: &str,
        status: RecommendationStatus,
    ) -> Result<(), AppError> {
        self.set_status(RECOMMENDATION_KIND, id, status.as_label())
    }

    pub fn status_book(&self) -> Result<StatusBook, AppError> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, entity_id, status FROM entity_status")?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut book = StatusBook::default();
        for (kind, id, status) in rows {
            let parsed = match kind.as_str() {
                ANOMALY_KIND => AnomalyStatus::parse(&status)
                    .map(|s| book.anomalies.insert(id.clone(), s))
                    .is_some(),
                RECOMMENDATION_KIND => RecommendationStatus::parse(&status)
                    .map(|s| book.recommendations.insert(id.clone(), s))
                    .is_some(),
                _ => false,
            };
            if !parsed {
                warn!(kind = %kind, id = %id, status = %status, "ignoring unrecognized stored status");
            }
        }
        Ok(book)
    }

    pub fn clear_all(&self) -> Result<(), AppError> {
        self.conn.execute_batch(
            "DELETE FROM billing_records; DELETE FROM utilization_samples; DELETE FROM entity_status;",
        )?;
        Ok(())
    }

    pub fn export_billing_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(&self.load_billing()?)?)
    }
}
