//! Built-in statistical analysis functions.
//!
//! These are sample implementations of the [`AnalysisFunction`] trait for
//! common tabular analyses. None are registered automatically; callers
//! pick what they expose via [`register_builtins`] or individual
//! registrations.

use anyhow::{Context, bail};
use ao_core::traits::AnalysisFunction;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::registry::{AnalysisRegistry, IntentSchema, ParamKind, ParamSpec};

/// Registers every built-in under its conventional intent name.
pub fn register_builtins(registry: &mut AnalysisRegistry) {
    registry.register("correlation", Correlation::schema(), Arc::new(Correlation));
    registry.register("trend", Trend::schema(), Arc::new(Trend));
    registry.register("seasonality", Seasonality::schema(), Arc::new(Seasonality));
}

fn numeric_series(params: &Map<String, Value>, name: &str) -> anyhow::Result<Vec<f64>> {
    let values = params
        .get(name)
        .with_context(|| format!("series '{name}' is missing"))?
        .as_array()
        .with_context(|| format!("series '{name}' must be an array"))?;

    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64()
                .with_context(|| format!("series '{name}' element {i} is not a number"))
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Pearson correlation between two equal-length numeric series.
pub struct Correlation;

impl Correlation {
    pub fn schema() -> IntentSchema {
        IntentSchema::new(vec![
            ParamSpec::required("x", ParamKind::Array),
            ParamSpec::required("y", ParamKind::Array),
        ])
    }

    fn coefficient(x: &[f64], y: &[f64]) -> anyhow::Result<f64> {
        if x.len() != y.len() {
            bail!("series lengths differ: {} vs {}", x.len(), y.len());
        }
        if x.len() < 2 {
            bail!("need at least two data points");
        }

        let (mx, my) = (mean(x), mean(y));
        let mut cov = 0.0;
        let mut var_x = 0.0;
        let mut var_y = 0.0;
        for (a, b) in x.iter().zip(y) {
            cov += (a - mx) * (b - my);
            var_x += (a - mx).powi(2);
            var_y += (b - my).powi(2);
        }

        let denom = (var_x * var_y).sqrt();
        if denom == 0.0 {
            bail!("a series is constant; correlation is undefined");
        }
        Ok(cov / denom)
    }

    fn strength_label(r: f64) -> &'static str {
        match r.abs() {
            a if a >= 0.8 => "strong",
            a if a >= 0.5 => "moderate",
            a if a >= 0.3 => "weak",
            _ => "negligible"
        }
    }
}

#[async_trait]
impl AnalysisFunction for Correlation {
    async fn run(&self, params: &Map<String, Value>) -> anyhow::Result<Value> {
        let x = numeric_series(params, "x")?;
        let y = numeric_series(params, "y")?;
        let r = Self::coefficient(&x, &y)?;

        Ok(json!({
            "coefficient": r,
            "strength": Self::strength_label(r),
            "direction": if r >= 0.0 { "positive" } else { "negative" },
            "samples": x.len()
        }))
    }
}

/// Direction and magnitude of change across an ordered series.
pub struct Trend;

impl Trend {
    pub fn schema() -> IntentSchema {
        IntentSchema::new(vec![ParamSpec::required("values", ParamKind::Array)])
    }
}

#[async_trait]
impl AnalysisFunction for Trend {
    async fn run(&self, params: &Map<String, Value>) -> anyhow::Result<Value> {
        let values = numeric_series(params, "values")?;
        if values.len() < 2 {
            bail!("need at least two data points");
        }

        let first = values[0];
        let last = values[values.len() - 1];
        let total_change = last - first;
        let percent_change = if first != 0.0 {
            Some(total_change / first * 100.0)
        } else {
            None
        };

        let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
        let rising = deltas.iter().filter(|d| **d > 0.0).count();
        let falling = deltas.iter().filter(|d| **d < 0.0).count();
        let direction = if total_change > 0.0 {
            "increasing"
        } else if total_change < 0.0 {
            "decreasing"
        } else {
            "flat"
        };

        Ok(json!({
            "direction": direction,
            "total_change": total_change,
            "percent_change": percent_change,
            "rising_steps": rising,
            "falling_steps": falling,
            "mean": mean(&values)
        }))
    }
}

/// Per-period averages over a repeating cycle, e.g. day-of-week effects
/// with `period` 7.
pub struct Seasonality;

impl Seasonality {
    pub fn schema() -> IntentSchema {
        IntentSchema::new(vec![
            ParamSpec::required("values", ParamKind::Array),
            ParamSpec::required("period", ParamKind::Number),
        ])
    }
}

#[async_trait]
impl AnalysisFunction for Seasonality {
    async fn run(&self, params: &Map<String, Value>) -> anyhow::Result<Value> {
        let values = numeric_series(params, "values")?;
        let period = params
            .get("period")
            .and_then(Value::as_u64)
            .context("'period' must be a positive integer")? as usize;

        if period == 0 {
            bail!("'period' must be at least 1");
        }
        if values.len() < period * 2 {
            bail!(
                "need at least two full cycles ({} points) to detect seasonality",
                period * 2
            );
        }

        let mut sums = vec![0.0; period];
        let mut counts = vec![0usize; period];
        for (i, v) in values.iter().enumerate() {
            sums[i % period] += v;
            counts[i % period] += 1;
        }
        let means: Vec<f64> = sums
            .iter()
            .zip(&counts)
            .map(|(s, c)| s / *c as f64)
            .collect();

        let peak = means
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let trough = means
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);

        Ok(json!({
            "period": period,
            "per_period_mean": means,
            "peak_offset": peak,
            "trough_offset": trough,
            "amplitude": means[peak] - means[trough]
        }))
    }
}
