use crate::catalog::{neighbor, resolve_instance, Direction, InstanceSpec};
use crate::models::{round_cents, ResourceType, UtilizationSample};
use crate::store::{RecommendationStatus, StatusBook};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Downsize,
    Upsize,
    Optimal,
    Terminate,
}

impl Recommendation {
    pub fn as_label(self) -> &'static str {
        match self {
            Recommendation::Downsize => "downsize",
            Recommendation::Upsize => "upsize",
            Recommendation::Optimal => "optimal",
            Recommendation::Terminate => "terminate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_label(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RightsizingResult {
    pub recommendation: Recommendation,
    pub current_class: String,
    pub suggested_class: Option<String>,
    pub current_cost: f64,
    pub projected_cost: f64,
    pub savings: f64,
    pub confidence: Confidence,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utilization {
    pub cpu_avg: f64,
    pub cpu_max: f64,
    pub memory_avg: f64,
    pub memory_max: f64,
}

impl From<&UtilizationSample> for Utilization {
    fn from(sample: &UtilizationSample) -> Self {
        Self {
            cpu_avg: sample.cpu_avg,
            cpu_max: sample.cpu_max,
            memory_avg: sample.memory_avg,
            memory_max: sample.memory_max,
        }
    }
}

struct RuleContext<'a> {
    resource_type: ResourceType,
    class: &'a str,
    spec: InstanceSpec,
    usage: Utilization,
}

impl RuleContext<'_> {
    fn result(
        &self,
        recommendation: Recommendation,
        suggested: Option<(&str, InstanceSpec)>,
        projected_cost: f64,
        confidence: Confidence,
        reason: String,
    ) -> RightsizingResult {
        RightsizingResult {
            recommendation,
            current_class: self.class.to_string(),
            suggested_class: suggested.map(|(name, _)| name.to_string()),
            current_cost: self.spec.monthly_rate,
            projected_cost,
            savings: round_cents(self.spec.monthly_rate - projected_cost),
            confidence,
            reason,
        }
    }

    fn resize(
        &self,
        recommendation: Recommendation,
        direction: Direction,
        confidence: Confidence,
        reason: String,
    ) -> Option<RightsizingResult> {
        let target = neighbor(self.resource_type, self.class, direction)?;
        Some(self.result(
            recommendation,
            Some(target),
            target.1.monthly_rate,
            confidence,
            reason,
        ))
    }
}

struct Rule {
    name: &'static str,
    matches: fn(&Utilization) -> bool,
    resolve: fn(&RuleContext<'_>) -> Option<RightsizingResult>,
}

// First rule that matches and resolves wins. A resize with no neighbor
// class resolves to None and evaluation moves on.
const RULES: &[Rule] = &[
    Rule {
        name: "terminate",
        matches: |u| u.cpu_avg < 2.0 && u.memory_avg < 5.0 && u.cpu_max < 10.0,
        resolve: |ctx| {
            Some(ctx.result(
                Recommendation::Terminate,
                None,
                0.0,
                Confidence::High,
                "Instance appears to be idle (CPU < 2%, Memory < 5%)".to_string(),
            ))
        },
    },
    Rule {
        name: "downsize",
        matches: |u| u.cpu_avg < 30.0 && u.memory_avg < 40.0 && u.cpu_max < 60.0,
        resolve: |ctx| {
            let confidence = if ctx.usage.cpu_avg < 15.0 {
                Confidence::High
            } else {
                Confidence::Medium
            };
            ctx.resize(
                Recommendation::Downsize,
                Direction::Smaller,
                confidence,
                format!(
                    "Low utilization (CPU: {}%, Memory: {}%)",
                    ctx.usage.cpu_avg, ctx.usage.memory_avg
                ),
            )
        },
    },
    Rule {
        name: "upsize",
        matches: |u| u.cpu_max > 85.0 || u.memory_max > 90.0,
        resolve: |ctx| {
            let confidence = if ctx.usage.cpu_max > 95.0 || ctx.usage.memory_max > 95.0 {
                Confidence::High
            } else {
                Confidence::Medium
            };
            ctx.resize(
                Recommendation::Upsize,
                Direction::Larger,
                confidence,
                format!(
                    "High utilization (CPU max: {}%, Memory max: {}%)",
                    ctx.usage.cpu_max, ctx.usage.memory_max
                ),
            )
        },
    },
    Rule {
        name: "optimal",
        matches: |_| true,
        resolve: |ctx| Some(optimal(ctx)),
    },
];

fn optimal(ctx: &RuleContext<'_>) -> RightsizingResult {
    ctx.result(
        Recommendation::Optimal,
        None,
        ctx.spec.monthly_rate,
        Confidence::High,
        "Instance is appropriately sized".to_string(),
    )
}

pub fn analyze_rightsizing(
    resource_type: ResourceType,
    class: &str,
    usage: Utilization,
) -> RightsizingResult {
    let Some(spec) = resolve_instance(resource_type, class) else {
        return RightsizingResult {
            recommendation: Recommendation::Optimal,
            current_class: class.to_string(),
            suggested_class: None,
            current_cost: 0.0,
            projected_cost: 0.0,
            savings: 0.0,
            confidence: Confidence::Low,
            reason: "Unknown instance type".to_string(),
        };
    };

    let ctx = RuleContext {
        resource_type,
        class,
        spec,
        usage,
    };
    RULES
        .iter()
        .filter(|rule| (rule.matches)(&usage))
        .find_map(|rule| {
            let result = (rule.resolve)(&ctx)?;
            debug!(class, rule = rule.name, "rightsizing rule applied");
            Some(result)
        })
        .unwrap_or_else(|| optimal(&ctx))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAdvice {
    pub sample: UtilizationSample,
    pub result: RightsizingResult,
    pub status: RecommendationStatus,
}

pub fn advise(sample: &UtilizationSample) -> RightsizingResult {
    analyze_rightsizing(
        sample.resource_type,
        &sample.instance_class,
        Utilization::from(sample),
    )
}

pub fn advise_all(samples: &[UtilizationSample], book: &StatusBook) -> Vec<ResourceAdvice> {
    samples
        .iter()
        .map(|sample| ResourceAdvice {
            result: advise(sample),
            status: book.recommendation(&sample.resource_id),
            sample: sample.clone(),
        })
        .collect()
}

// upsize cost increases are not savings
pub fn total_savings(advice: &[ResourceAdvice]) -> f64 {
    round_cents(
        advice
            .iter()
            .map(|a| a.result.savings)
            .filter(|s| *s > 0.0)
            .sum(),
    )
}
