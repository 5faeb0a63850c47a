use super::BillingSource;
use crate::catalog::resolve_instance;
use crate::error::AppError;
use crate::models::{round_cents, BillingRecord, Environment, ResourceType, UtilizationSample};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use fastrand::Rng;
use std::cell::RefCell;

pub const DEFAULT_DAYS: u32 = 90;
pub const DEFAULT_SEED: u64 = 42;

const TEAMS: [&str; 5] = ["Engineering", "Data", "Platform", "DevOps", "ML"];
const REGIONS: [&str; 4] = ["us-east-1", "us-west-2", "eu-west-1", "ap-southeast-1"];
const UNTAGGED_RATE: f64 = 0.1;
const WEEKEND_FACTOR: f64 = 0.7;
const DAILY_GROWTH: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Compute,
    Storage,
    Database,
    Monitoring,
    Networking,
    Containers,
}

impl Category {
    fn usage_unit(self) -> &'static str {
        match self {
            Category::Compute => "hours",
            Category::Storage => "GB",
            Category::Networking => "requests",
            _ => "units",
        }
    }
}

struct ServiceProfile {
    name: &'static str,
    category: Category,
    base_daily: f64,
    variance: f64,
}

const fn service(
    name: &'static str,
    category: Category,
    base_daily: f64,
    variance: f64,
) -> ServiceProfile {
    ServiceProfile {
        name,
        category,
        base_daily,
        variance,
    }
}

const SERVICES: [ServiceProfile; 12] = [
    service("EC2", Category::Compute, 450.0, 0.15),
    service("S3", Category::Storage, 120.0, 0.1),
    service("RDS", Category::Database, 280.0, 0.08),
    service("Lambda", Category::Compute, 85.0, 0.25),
    service("CloudWatch", Category::Monitoring, 45.0, 0.12),
    service("CloudFront", Category::Networking, 95.0, 0.2),
    service("DynamoDB", Category::Database, 65.0, 0.18),
    service("EBS", Category::Storage, 78.0, 0.05),
    service("EKS", Category::Containers, 180.0, 0.1),
    service("ElastiCache", Category::Database, 110.0, 0.08),
    service("Route53", Category::Networking, 12.0, 0.05),
    service("API Gateway", Category::Networking, 35.0, 0.3),
];

const EC2_CLASSES: [&str; 12] = [
    "t3.micro",
    "t3.small",
    "t3.medium",
    "t3.large",
    "t3.xlarge",
    "m6i.large",
    "m6i.xlarge",
    "m6i.2xlarge",
    "c6i.large",
    "c6i.xlarge",
    "r6i.large",
    "r6i.xlarge",
];

const RDS_CLASSES: [&str; 8] = [
    "db.t3.micro",
    "db.t3.small",
    "db.t3.medium",
    "db.t3.large",
    "db.m6g.large",
    "db.m6g.xlarge",
    "db.r6g.large",
    "db.r6g.xlarge",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoProfile {
    StartupSaas,
    Ecommerce,
    MlHeavy,
}

impl DemoProfile {
    pub const ALL: [DemoProfile; 3] = [
        DemoProfile::StartupSaas,
        DemoProfile::Ecommerce,
        DemoProfile::MlHeavy,
    ];

    pub fn as_label(self) -> &'static str {
        match self {
            DemoProfile::StartupSaas => "startup-saas",
            DemoProfile::Ecommerce => "ecommerce",
            DemoProfile::MlHeavy => "ml-heavy",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        let normalized = input.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_label() == normalized)
    }

    fn weight(self, service: &str) -> f64 {
        let weights: &[(&str, f64)] = match self {
            DemoProfile::StartupSaas => &[
                ("Lambda", 2.0),
                ("EC2", 0.8),
                ("S3", 1.2),
                ("RDS", 1.0),
                ("DynamoDB", 1.5),
                ("CloudFront", 0.8),
                ("EKS", 1.2),
                ("ElastiCache", 0.9),
            ],
            DemoProfile::Ecommerce => &[
                ("Lambda", 0.8),
                ("EC2", 1.5),
                ("S3", 2.0),
                ("RDS", 1.3),
                ("DynamoDB", 0.7),
                ("CloudFront", 2.5),
                ("EKS", 1.0),
                ("ElastiCache", 1.5),
            ],
            DemoProfile::MlHeavy => &[
                ("Lambda", 0.5),
                ("EC2", 3.0),
                ("S3", 1.8),
                ("RDS", 0.8),
                ("DynamoDB", 0.5),
                ("CloudFront", 0.4),
                ("EKS", 2.0),
                ("ElastiCache", 0.6),
            ],
        };
        weights
            .iter()
            .find(|(name, _)| *name == service)
            .map(|(_, w)| *w)
            .unwrap_or(1.0)
    }

    fn instance_counts(self) -> (usize, usize) {
        match self {
            DemoProfile::StartupSaas => (10, 4),
            DemoProfile::Ecommerce => (14, 6),
            DemoProfile::MlHeavy => (18, 4),
        }
    }
}

fn environment_factor(env: Environment) -> f64 {
    match env {
        Environment::Production => 2.5,
        Environment::Staging => 0.8,
        Environment::Development => 0.3,
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn pick<'a, T>(rng: &mut Rng, items: &'a [T]) -> &'a T {
    &items[rng.usize(..items.len())]
}

fn vary(rng: &mut Rng, base: f64, variance: f64) -> f64 {
    round_cents(base * (1.0 + (rng.f64() * 2.0 - 1.0) * variance))
}

fn percent(rng: &mut Rng, low: f64, spread: f64) -> f64 {
    (low + rng.f64() * spread).round()
}

fn resource_suffix(rng: &mut Rng, len: usize) -> String {
    std::iter::repeat_with(|| {
        let c = rng.alphanumeric();
        c.to_ascii_lowercase()
    })
    .take(len)
    .collect()
}

pub struct DemoSource {
    pub profile: DemoProfile,
    pub days: u32,
    pub today: NaiveDate,
    rng: RefCell<Rng>,
    seed: u64,
}

impl DemoSource {
    pub fn new(profile: DemoProfile, today: NaiveDate) -> Self {
        Self::with_seed(profile, today, DEFAULT_SEED)
    }

    pub fn with_seed(profile: DemoProfile, today: NaiveDate, seed: u64) -> Self {
        Self {
            profile,
            days: DEFAULT_DAYS,
            today,
            rng: RefCell::new(Rng::with_seed(seed)),
            seed,
        }
    }

    pub fn days(mut self, days: u32) -> Self {
        self.days = days;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn billing(&self, rng: &mut Rng) -> Vec<BillingRecord> {
        let mut items = Vec::new();

        for d in 0..self.days {
            let Some(date) = self.today.checked_sub_days(Days::new(u64::from(d))) else {
                break;
            };
            let trend = 1.0 + f64::from(self.days - d) * DAILY_GROWTH;
            let weekend = if is_weekend(date) { WEEKEND_FACTOR } else { 1.0 };

            for svc in &SERVICES {
                let weight = self.profile.weight(svc.name);
                let entries = rng.usize(2..=5);

                for _ in 0..entries {
                    let team = *pick(rng, &TEAMS);
                    let env = *pick(rng, &Environment::ALL);
                    let region = *pick(rng, &REGIONS);

                    let base = svc.base_daily / entries as f64;
                    let cost = vary(
                        rng,
                        base * trend * weekend * environment_factor(env) * weight,
                        svc.variance,
                    );
                    let untagged = rng.f64() < UNTAGGED_RATE;
                    let quantity = (cost * (10.0 + rng.f64() * 50.0)).round();

                    items.push(BillingRecord {
                        service: svc.name.to_string(),
                        cost,
                        usage_date: date,
                        team: (!untagged).then(|| team.to_string()),
                        environment: env,
                        project: (!untagged).then(|| {
                            format!(
                                "{}-{}-{}",
                                team.to_lowercase(),
                                env.as_label(),
                                svc.name.to_lowercase()
                            )
                        }),
                        region: region.to_string(),
                        usage_quantity: quantity,
                        usage_unit: svc.category.usage_unit().to_string(),
                    });
                }
            }
        }

        items
    }

    fn sample(
        rng: &mut Rng,
        resource_type: ResourceType,
        classes: &[&str],
        fallback_cost: f64,
    ) -> UtilizationSample {
        let class = *pick(rng, classes);
        let team = *pick(rng, &TEAMS);
        let env = *pick(rng, &Environment::ALL);
        let region = *pick(rng, &REGIONS);

        let profile = rng.f64();
        let (cpu_avg, cpu_max, memory_avg, memory_max) = match resource_type {
            ResourceType::Ec2 if profile < 0.15 => (
                percent(rng, 0.0, 3.0),
                percent(rng, 0.0, 8.0),
                percent(rng, 0.0, 5.0),
                percent(rng, 0.0, 12.0),
            ),
            ResourceType::Ec2 if profile < 0.4 => (
                percent(rng, 10.0, 20.0),
                percent(rng, 30.0, 25.0),
                percent(rng, 15.0, 25.0),
                percent(rng, 35.0, 20.0),
            ),
            ResourceType::Ec2 if profile < 0.85 => (
                percent(rng, 40.0, 30.0),
                percent(rng, 60.0, 20.0),
                percent(rng, 45.0, 25.0),
                percent(rng, 65.0, 20.0),
            ),
            ResourceType::Ec2 => (
                percent(rng, 70.0, 20.0),
                percent(rng, 85.0, 15.0),
                percent(rng, 75.0, 15.0),
                percent(rng, 88.0, 12.0),
            ),
            ResourceType::Rds if profile < 0.3 => (
                percent(rng, 10.0, 15.0),
                percent(rng, 25.0, 20.0),
                percent(rng, 20.0, 20.0),
                percent(rng, 40.0, 15.0),
            ),
            ResourceType::Rds if profile < 0.85 => (
                percent(rng, 35.0, 30.0),
                percent(rng, 55.0, 25.0),
                percent(rng, 50.0, 25.0),
                percent(rng, 70.0, 15.0),
            ),
            ResourceType::Rds => (
                percent(rng, 65.0, 25.0),
                percent(rng, 80.0, 20.0),
                percent(rng, 70.0, 20.0),
                percent(rng, 85.0, 15.0),
            ),
        };

        let resource_id = match resource_type {
            ResourceType::Ec2 => format!("i-{}", resource_suffix(rng, 12)),
            ResourceType::Rds => format!("db-{}", resource_suffix(rng, 10)),
        };

        UtilizationSample {
            resource_id,
            resource_type,
            instance_class: class.to_string(),
            cpu_avg,
            cpu_max,
            memory_avg,
            memory_max,
            monthly_cost: resolve_instance(resource_type, class)
                .map(|spec| spec.monthly_rate)
                .unwrap_or(fallback_cost),
            region: Some(region.to_string()),
            team: Some(team.to_string()),
            environment: Some(env),
        }
    }

    fn utilization(&self, rng: &mut Rng) -> Vec<UtilizationSample> {
        let (ec2, rds) = self.profile.instance_counts();
        let mut samples = Vec::with_capacity(ec2 + rds);
        for _ in 0..ec2 {
            samples.push(Self::sample(rng, ResourceType::Ec2, &EC2_CLASSES, 50.0));
        }
        for _ in 0..rds {
            samples.push(Self::sample(rng, ResourceType::Rds, &RDS_CLASSES, 100.0));
        }
        samples
    }
}

impl BillingSource for DemoSource {
    fn name(&self) -> &'static str {
        "demo"
    }

    fn load_records(&self) -> Result<Vec<BillingRecord>, AppError> {
        let mut rng = self.rng.borrow_mut();
        rng.seed(self.seed);
        Ok(self.billing(&mut rng))
    }

    fn load_utilization(&self) -> Result<Vec<UtilizationSample>, AppError> {
        let mut rng = self.rng.borrow_mut();
        // offset keeps the utilization stream independent of the billing one
        rng.seed(self.seed.wrapping_add(1));
        Ok(self.utilization(&mut rng))
    }
}
