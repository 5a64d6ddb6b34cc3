//! Metric-based promotion gate.
//!
//! A candidate replaces the serving model only when it improves on both R²
//! and RMSE by at least the configured margins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionPolicy {
    /// Minimum increase of `r2` over the current model.
    pub r2_min_gain: f64,
    /// Minimum decrease of `rmse` below the current model.
    pub rmse_min_drop: f64,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            r2_min_gain: 0.01,
            rmse_min_drop: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub improved: bool,
    pub reasons: Vec<String>,
}

fn metric(metrics: &BTreeMap<String, Value>, name: &str, missing: f64) -> f64 {
    metrics.get(name).and_then(Value::as_f64).unwrap_or(missing)
}

impl PromotionPolicy {
    pub fn with_r2_min_gain(mut self, gain: f64) -> Self {
        self.r2_min_gain = gain;
        self
    }

    pub fn with_rmse_min_drop(mut self, drop: f64) -> Self {
        self.rmse_min_drop = drop;
        self
    }

    /// Compare `candidate` against the `current` serving model's metrics.
    ///
    /// No candidate metrics means no promotion; no current metrics means the
    /// candidate wins by default. A missing `r2` reads as 0 and a missing
    /// `rmse` as infinity.
    pub fn evaluate(
        &self,
        current: &BTreeMap<String, Value>,
        candidate: &BTreeMap<String, Value>,
    ) -> PolicyVerdict {
        if candidate.is_empty() {
            return PolicyVerdict {
                improved: false,
                reasons: vec!["candidate metrics unavailable".to_string()],
            };
        }
        if current.is_empty() {
            return PolicyVerdict {
                improved: true,
                reasons: vec!["no current model".to_string()],
            };
        }

        let r2_gain = metric(candidate, "r2", 0.0) - metric(current, "r2", 0.0);
        let rmse_delta =
            metric(candidate, "rmse", f64::INFINITY) - metric(current, "rmse", f64::INFINITY);
        let rmse_drop = -rmse_delta;

        PolicyVerdict {
            improved: r2_gain >= self.r2_min_gain && rmse_drop >= self.rmse_min_drop,
            reasons: vec![format!("r2 {r2_gain:+.4}"), format!("rmse {rmse_delta:+.4}")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metrics(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn clear_improvement_passes() {
        let verdict = PromotionPolicy::default().evaluate(
            &metrics(json!({"r2": 0.80, "rmse": 5200.0})),
            &metrics(json!({"r2": 0.85, "rmse": 4900.0})),
        );
        assert!(verdict.improved);
        assert_eq!(verdict.reasons, vec!["r2 +0.0500", "rmse -300.0000"]);
    }

    #[test]
    fn both_margins_are_required() {
        let policy = PromotionPolicy::default();
        let current = metrics(json!({"r2": 0.80, "rmse": 5200.0}));
        let small_rmse_drop = metrics(json!({"r2": 0.90, "rmse": 5150.0}));
        let small_r2_gain = metrics(json!({"r2": 0.805, "rmse": 4000.0}));
        assert!(!policy.evaluate(&current, &small_rmse_drop).improved);
        assert!(!policy.evaluate(&current, &small_r2_gain).improved);
    }

    #[test]
    fn empty_sides() {
        let policy = PromotionPolicy::default();
        let some = metrics(json!({"r2": 0.8}));
        let none = BTreeMap::new();

        let verdict = policy.evaluate(&some, &none);
        assert!(!verdict.improved);
        assert_eq!(verdict.reasons, vec!["candidate metrics unavailable"]);

        let verdict = policy.evaluate(&none, &some);
        assert!(verdict.improved);
        assert_eq!(verdict.reasons, vec!["no current model"]);
    }

    #[test]
    fn thresholds_can_be_relaxed() {
        let policy = PromotionPolicy::default()
            .with_r2_min_gain(0.0)
            .with_rmse_min_drop(0.0);
        let current = metrics(json!({"r2": 0.8, "rmse": 100.0}));
        let candidate = metrics(json!({"r2": 0.8, "rmse": 100.0}));
        assert!(policy.evaluate(&current, &candidate).improved);
    }
}
