use crate::models::ResourceType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceCategory {
    General,
    Compute,
    Memory,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub vcpu: u32,
    pub memory_gb: u32,
    pub hourly_rate: f64,
    pub monthly_rate: f64,
    pub category: InstanceCategory,
}

const fn spec(
    vcpu: u32,
    memory_gb: u32,
    hourly_rate: f64,
    monthly_rate: f64,
    category: InstanceCategory,
) -> InstanceSpec {
    InstanceSpec {
        vcpu,
        memory_gb,
        hourly_rate,
        monthly_rate,
        category,
    }
}

use InstanceCategory::{Compute, General, Memory};

pub const EC2_INSTANCES: &[(&str, InstanceSpec)] = &[
    ("t3.micro", spec(2, 1, 0.0104, 7.59, General)),
    ("t3.small", spec(2, 2, 0.0208, 15.18, General)),
    ("t3.medium", spec(2, 4, 0.0416, 30.37, General)),
    ("t3.large", spec(2, 8, 0.0832, 60.74, General)),
    ("t3.xlarge", spec(4, 16, 0.1664, 121.47, General)),
    ("t3.2xlarge", spec(8, 32, 0.3328, 242.94, General)),
    ("m6i.large", spec(2, 8, 0.096, 70.08, General)),
    ("m6i.xlarge", spec(4, 16, 0.192, 140.16, General)),
    ("m6i.2xlarge", spec(8, 32, 0.384, 280.32, General)),
    ("m6i.4xlarge", spec(16, 64, 0.768, 560.64, General)),
    ("m6i.8xlarge", spec(32, 128, 1.536, 1121.28, General)),
    ("c6i.large", spec(2, 4, 0.085, 62.05, Compute)),
    ("c6i.xlarge", spec(4, 8, 0.170, 124.10, Compute)),
    ("c6i.2xlarge", spec(8, 16, 0.340, 248.20, Compute)),
    ("c6i.4xlarge", spec(16, 32, 0.680, 496.40, Compute)),
    ("r6i.large", spec(2, 16, 0.126, 91.98, Memory)),
    ("r6i.xlarge", spec(4, 32, 0.252, 183.96, Memory)),
    ("r6i.2xlarge", spec(8, 64, 0.504, 367.92, Memory)),
    ("r6i.4xlarge", spec(16, 128, 1.008, 735.84, Memory)),
];

pub const RDS_INSTANCES: &[(&str, InstanceSpec)] = &[
    ("db.t3.micro", spec(2, 1, 0.017, 12.41, General)),
    ("db.t3.small", spec(2, 2, 0.034, 24.82, General)),
    ("db.t3.medium", spec(2, 4, 0.068, 49.64, General)),
    ("db.t3.large", spec(2, 8, 0.136, 99.28, General)),
    ("db.m6g.large", spec(2, 8, 0.154, 112.42, General)),
    ("db.m6g.xlarge", spec(4, 16, 0.308, 224.84, General)),
    ("db.m6g.2xlarge", spec(8, 32, 0.616, 449.68, General)),
    ("db.m6g.4xlarge", spec(16, 64, 1.232, 899.36, General)),
    ("db.r6g.large", spec(2, 16, 0.192, 140.16, Memory)),
    ("db.r6g.xlarge", spec(4, 32, 0.384, 280.32, Memory)),
    ("db.r6g.2xlarge", spec(8, 64, 0.768, 560.64, Memory)),
    ("db.r6g.4xlarge", spec(16, 128, 1.536, 1121.28, Memory)),
];

pub fn catalog_for(resource_type: ResourceType) -> &'static [(&'static str, InstanceSpec)] {
    match resource_type {
        ResourceType::Ec2 => EC2_INSTANCES,
        ResourceType::Rds => RDS_INSTANCES,
    }
}

pub fn resolve_instance(resource_type: ResourceType, class: &str) -> Option<InstanceSpec> {
    catalog_for(resource_type)
        .iter()
        .find(|(name, _)| *name == class)
        .map(|(_, spec)| *spec)
}

// every RDS class shares the `db` family
pub fn family(class: &str) -> &str {
    class.split('.').next().unwrap_or(class)
}

fn sorted_by_rate(resource_type: ResourceType) -> Vec<(&'static str, InstanceSpec)> {
    let mut list = catalog_for(resource_type).to_vec();
    list.sort_by(|a, b| a.1.monthly_rate.total_cmp(&b.1.monthly_rate));
    list
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Smaller,
    Larger,
}

pub fn neighbor(
    resource_type: ResourceType,
    class: &str,
    direction: Direction,
) -> Option<(&'static str, InstanceSpec)> {
    let list = sorted_by_rate(resource_type);
    let current = list.iter().position(|(name, _)| *name == class)?;
    let current_family = family(class);

    let candidates: Vec<usize> = match direction {
        Direction::Smaller => (0..current).rev().collect(),
        Direction::Larger => (current + 1..list.len()).collect(),
    };
    let first = *candidates.first()?;
    let chosen = candidates
        .iter()
        .copied()
        .find(|&i| family(list[i].0) == current_family)
        .unwrap_or(first);
    Some(list[chosen])
}
