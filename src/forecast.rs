use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,
    pub forecast: f64,
    pub upper_bound: f64,
    pub lower_bound: f64,
    pub is_projection: bool,
}

impl ForecastPoint {
    pub fn width(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn as_label(self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub trend: TrendDirection,
    pub average_daily: f64,
    // coefficient of variation, percent
    pub volatility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyProjection {
    pub month: String,
    pub projected: f64,
    pub upper: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavingsScenarioRow {
    pub month: u32,
    pub baseline: f64,
    pub optimized: f64,
    pub savings: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl Regression {
    pub fn predict(&self, index: f64) -> f64 {
        self.intercept + self.slope * index
    }
}

const STABLE_SLOPE_PERCENT: f64 = 1.0;

pub fn linear_regression(data: &[DataPoint]) -> Regression {
    let n = data.len();
    if n < 2 {
        return Regression {
            slope: 0.0,
            intercept: data.first().map(|p| p.value).unwrap_or(0.0),
            r_squared: 0.0,
        };
    }

    let nf = n as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
    for (i, point) in data.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += point.value;
        sum_xy += x * point.value;
        sum_xx += x * x;
    }

    let denominator = nf * sum_xx - sum_x * sum_x;
    let slope = if denominator == 0.0 {
        0.0
    } else {
        (nf * sum_xy - sum_x * sum_y) / denominator
    };
    let intercept = (sum_y - slope * sum_x) / nf;

    let mean_y = sum_y / nf;
    let (ss_res, ss_tot) = data
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(res, tot), (i, point)| {
            let predicted = intercept + slope * i as f64;
            (
                res + (point.value - predicted).powi(2),
                tot + (point.value - mean_y).powi(2),
            )
        });
    let r_squared = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };

    Regression {
        slope,
        intercept,
        r_squared,
    }
}

// n - 2 degrees of freedom
pub fn residual_std_dev(data: &[DataPoint], regression: &Regression) -> f64 {
    let n = data.len();
    if n < 3 {
        return 0.0;
    }

    let residuals: Vec<f64> = data
        .iter()
        .enumerate()
        .map(|(i, point)| point.value - regression.predict(i as f64))
        .collect();
    let mean_residual = residuals.iter().sum::<f64>() / n as f64;
    let variance = residuals
        .iter()
        .map(|r| (r - mean_residual).powi(2))
        .sum::<f64>()
        / (n - 2) as f64;
    variance.sqrt()
}

pub fn z_score(confidence_level: f64) -> f64 {
    if (confidence_level - 0.95).abs() < 1e-9 {
        1.96
    } else if (confidence_level - 0.90).abs() < 1e-9 {
        1.645
    } else {
        1.28
    }
}

fn banded(date: NaiveDate, actual: Option<f64>, forecast: f64, half_width: f64) -> ForecastPoint {
    ForecastPoint {
        date,
        actual,
        forecast,
        upper_bound: forecast + half_width,
        lower_bound: (forecast - half_width).max(0.0),
        is_projection: actual.is_none(),
    }
}

pub fn generate_forecast(
    history: &[DataPoint],
    horizon_days: u32,
    confidence_level: f64,
) -> Vec<ForecastPoint> {
    let Some(last) = history.last() else {
        return Vec::new();
    };

    let regression = linear_regression(history);
    let half_width = z_score(confidence_level) * residual_std_dev(history, &regression);

    let mut out: Vec<ForecastPoint> = history
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let forecast = regression.predict(i as f64).max(0.0);
            banded(point.date, Some(point.value), forecast, half_width)
        })
        .collect();

    let last_index = history.len() - 1;
    for step in 1..=horizon_days {
        let Some(date) = last.date.checked_add_days(Days::new(u64::from(step))) else {
            break;
        };
        let index = (last_index + step as usize) as f64;
        let forecast = regression.predict(index).max(0.0);
        // projected bands widen linearly to 1.5x at the horizon
        let widen = 1.0 + (f64::from(step) / f64::from(horizon_days)) * 0.5;
        out.push(banded(date, None, forecast, half_width * widen));
    }

    out
}

pub fn analyze_trend(data: &[DataPoint]) -> TrendAnalysis {
    let regression = linear_regression(data);
    let average_daily = if data.is_empty() {
        0.0
    } else {
        data.iter().map(|p| p.value).sum::<f64>() / data.len() as f64
    };

    let volatility = if average_daily > 0.0 {
        let variance = data
            .iter()
            .map(|p| (p.value - average_daily).powi(2))
            .sum::<f64>()
            / data.len() as f64;
        variance.sqrt() / average_daily * 100.0
    } else {
        0.0
    };

    let slope_percent = if average_daily > 0.0 {
        regression.slope / average_daily * 100.0
    } else {
        0.0
    };
    let trend = if slope_percent > STABLE_SLOPE_PERCENT {
        TrendDirection::Increasing
    } else if slope_percent < -STABLE_SLOPE_PERCENT {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    TrendAnalysis {
        slope: regression.slope,
        intercept: regression.intercept,
        r_squared: regression.r_squared,
        trend,
        average_daily,
        volatility,
    }
}

pub fn project_monthly_totals(points: &[ForecastPoint], months: usize) -> Vec<MonthlyProjection> {
    let mut out: Vec<MonthlyProjection> = Vec::new();
    for point in points.iter().filter(|p| p.is_projection) {
        let month = point.date.format("%Y-%m").to_string();
        match out.iter_mut().find(|m| m.month == month) {
            Some(existing) => {
                existing.projected += point.forecast;
                existing.upper += point.upper_bound;
                existing.lower += point.lower_bound;
            }
            None => out.push(MonthlyProjection {
                month,
                projected: point.forecast,
                upper: point.upper_bound,
                lower: point.lower_bound,
            }),
        }
    }
    out.truncate(months);
    out
}

pub fn savings_scenario(
    current_monthly: f64,
    reduction_percent: f64,
    months: u32,
) -> Vec<SavingsScenarioRow> {
    let monthly_savings = current_monthly * (reduction_percent / 100.0);
    (1..=months)
        .map(|month| SavingsScenarioRow {
            month,
            baseline: current_monthly,
            optimized: current_monthly - monthly_savings,
            savings: monthly_savings * f64::from(month),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 20).expect("valid date")
    }

    fn series(values: &[f64]) -> Vec<DataPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| DataPoint {
                date: start() + Duration::days(i as i64),
                value,
            })
            .collect()
    }

    #[test]
    fn flat_series_is_stable_with_zero_volatility() {
        let analysis = analyze_trend(&series(&[100.0; 10]));
        assert_eq!(analysis.trend, TrendDirection::Stable);
        assert_eq!(analysis.volatility, 0.0);
        assert_eq!(analysis.average_daily, 100.0);
        assert_eq!(analysis.r_squared, 0.0);
    }

    #[test]
    fn rising_series_is_increasing() {
        let values: Vec<f64> = (0..10).map(|i| 100.0 + 10.0 * i as f64).collect();
        let analysis = analyze_trend(&series(&values));
        assert_eq!(analysis.trend, TrendDirection::Increasing);
        assert!((analysis.slope - 10.0).abs() < 1e-9);
        assert!((analysis.r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn falling_series_is_decreasing() {
        let values: Vec<f64> = (0..10).map(|i| 200.0 - 5.0 * i as f64).collect();
        assert_eq!(analyze_trend(&series(&values)).trend, TrendDirection::Decreasing);
    }

    #[test]
    fn single_point_regression_is_flat() {
        let reg = linear_regression(&series(&[42.0]));
        assert_eq!(reg.slope, 0.0);
        assert_eq!(reg.intercept, 42.0);
        assert_eq!(linear_regression(&[]).intercept, 0.0);
    }

    #[test]
    fn short_series_has_zero_residual_spread() {
        let data = series(&[10.0, 30.0]);
        let reg = linear_regression(&data);
        assert_eq!(residual_std_dev(&data, &reg), 0.0);
    }

    #[test]
    fn z_score_matches_confidence_level() {
        assert_eq!(z_score(0.95), 1.96);
        assert_eq!(z_score(0.90), 1.645);
        assert_eq!(z_score(0.8), 1.28);
    }

    #[test]
    fn forecast_appends_projection_days_after_history() {
        let data = series(&[100.0, 120.0, 90.0, 130.0, 110.0]);
        let points = generate_forecast(&data, 3, 0.95);
        assert_eq!(points.len(), 8);
        assert!(points[..5].iter().all(|p| !p.is_projection && p.actual.is_some()));
        assert!(points[5..].iter().all(|p| p.is_projection && p.actual.is_none()));
        assert_eq!(points[5].date, start() + Duration::days(5));
        assert_eq!(points[7].date, start() + Duration::days(7));
    }

    #[test]
    fn bounds_are_ordered_non_negative_and_widen() {
        let data = series(&[5.0, 40.0, 2.0, 60.0, 1.0, 30.0, 3.0]);
        let points = generate_forecast(&data, 10, 0.95);
        for p in &points {
            assert!(p.lower_bound <= p.forecast && p.forecast <= p.upper_bound);
            assert!(p.lower_bound >= 0.0);
        }
        let history_widths: Vec<f64> = points[..7].iter().map(|p| p.upper_bound - p.forecast).collect();
        assert!(history_widths.windows(2).all(|w| (w[0] - w[1]).abs() < 1e-9));

        let projected: Vec<f64> = points[7..].iter().map(|p| p.upper_bound - p.forecast).collect();
        assert!(projected.windows(2).all(|w| w[0] <= w[1]));
        assert!((projected[9] / history_widths[0] - 1.5).abs() < 1e-9);
    }

    #[test]
    fn projection_stops_at_the_last_representable_date() {
        let near_end = NaiveDate::MAX
            .checked_sub_days(Days::new(2))
            .expect("representable date");
        let data = vec![
            DataPoint {
                date: near_end,
                value: 10.0,
            },
            DataPoint {
                date: NaiveDate::MAX.pred_opt().expect("previous day"),
                value: 12.0,
            },
        ];
        let points = generate_forecast(&data, 30, 0.95);
        assert_eq!(points.len(), 3);
        assert_eq!(points[2].date, NaiveDate::MAX);
        assert!(points[2].is_projection);
    }

    #[test]
    fn empty_history_produces_no_points() {
        assert!(generate_forecast(&[], 30, 0.95).is_empty());
    }

    #[test]
    fn monthly_totals_only_sum_projections() {
        let data = series(&[10.0; 5]);
        // history ends 2024-01-24; 15 projected days span January and February
        let points = generate_forecast(&data, 15, 0.95);
        let months = project_monthly_totals(&points, 3);
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].month, "2024-01");
        assert!((months[0].projected - 70.0).abs() < 1e-9);
        assert_eq!(months[1].month, "2024-02");
        assert!((months[1].projected - 80.0).abs() < 1e-9);

        assert_eq!(project_monthly_totals(&points, 1).len(), 1);
    }

    #[test]
    fn savings_scenario_accumulates_monthly() {
        let rows = savings_scenario(1000.0, 20.0, 3);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].optimized, 800.0);
        assert_eq!(rows[2].savings, 600.0);
    }
}
