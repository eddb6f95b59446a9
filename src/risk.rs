use chrono::{DateTime, Utc};

use crate::models::{CustomerRecord, DerivedMetrics, RiskResult, RiskWeights};
use crate::renewal::{normalize_dates, resolve_renewal};
use crate::report::encode_results;
use crate::trend::extract_trend;

const DAYS_PER_YEAR: f64 = 365.0;
const TREND_SENSITIVITY: f64 = 0.1;
const UI_SCALE: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct ScoredBatch {
    pub metrics: Vec<DerivedMetrics>,
    pub results: Vec<RiskResult>,
}

/// Scores every record against the batch-wide maxima. Output order follows input order.
pub fn score_batch(
    records: &[CustomerRecord],
    as_of: DateTime<Utc>,
    weights: &RiskWeights,
) -> ScoredBatch {
    let today = as_of.date_naive();

    let per_record: Vec<DerivedMetrics> = records
        .iter()
        .map(|record| {
            let metrics = extract_trend(record, DerivedMetrics::seed(record));
            let metrics = normalize_dates(record, metrics);
            with_usage_per_user(resolve_renewal(metrics, today))
        })
        .collect();

    let max_usage = max_usage_per_user(&per_record);
    tracing::debug!(max_usage, "usage reduced");

    let composed: Vec<DerivedMetrics> = per_record
        .into_iter()
        .map(|metrics| {
            let metrics = compose_usage(metrics, max_usage, weights.usage);
            let metrics = compose_renewal(metrics, weights.renewal);
            compose_trend(metrics, weights.trend)
        })
        .collect();

    let max_risk = max_risk_score(&composed);
    tracing::debug!(?max_risk, "risk reduced");

    let metrics: Vec<DerivedMetrics> = composed
        .into_iter()
        .map(|metrics| normalize_score(metrics, max_risk))
        .collect();

    let results = encode_results(&metrics, as_of);
    let scored = metrics.iter().filter(|m| m.ui_risk.is_some()).count();
    tracing::info!(
        records = metrics.len(),
        scored,
        unscored = metrics.len() - scored,
        "batch scored"
    );

    ScoredBatch { metrics, results }
}

pub fn with_usage_per_user(metrics: DerivedMetrics) -> DerivedMetrics {
    let usage_per_user = if metrics.active_users == 0 {
        0.0
    } else {
        metrics.activity_total / metrics.active_users as f64
    };
    DerivedMetrics {
        usage_per_user,
        ..metrics
    }
}

pub fn max_usage_per_user(metrics: &[DerivedMetrics]) -> f64 {
    metrics
        .iter()
        .map(|m| m.usage_per_user)
        .fold(0.0, f64::max)
}

/// Lower usage relative to the busiest customer means higher risk.
pub fn compose_usage(metrics: DerivedMetrics, max_usage: f64, weight: f64) -> DerivedMetrics {
    let usage_factor = if max_usage == 0.0 {
        0.0
    } else {
        metrics.usage_per_user / max_usage
    };
    DerivedMetrics {
        usage_factor,
        risk_usage: (1.0 - usage_factor) * weight,
        ..metrics
    }
}

/// Closeness of the renewal, floored at zero once it is more than a year away.
pub fn days_to_renew_factor(days_remaining: i64) -> f64 {
    (1.0 - days_remaining as f64 / DAYS_PER_YEAR).max(0.0)
}

pub fn compose_renewal(metrics: DerivedMetrics, weight: f64) -> DerivedMetrics {
    let factor = metrics.days_remaining.map(days_to_renew_factor);
    DerivedMetrics {
        days_to_renew_factor: factor,
        risk_renewal: factor.map(|factor| metrics.risk_usage * factor * weight),
        ..metrics
    }
}

/// Growing activity lowers the factor and may push it below zero.
pub fn compose_trend(metrics: DerivedMetrics, weight: f64) -> DerivedMetrics {
    let trend_factor = metrics
        .activity_slope
        .map(|slope| 1.0 - TREND_SENSITIVITY * slope);
    let risk_score = match (metrics.risk_renewal, trend_factor) {
        (Some(risk_renewal), Some(trend_factor)) => Some(risk_renewal * trend_factor * weight),
        _ => None,
    };
    DerivedMetrics {
        trend_factor,
        risk_score,
        ..metrics
    }
}

pub fn max_risk_score(metrics: &[DerivedMetrics]) -> Option<f64> {
    metrics
        .iter()
        .filter_map(|m| m.risk_score)
        .filter(|score| !score.is_nan())
        .fold(None, |max: Option<f64>, score| {
            Some(max.map_or(score, |max| max.max(score)))
        })
}

/// Rescales to 0-10 against the batch maximum. A negative maximum is divided through as-is,
/// which flips signs and can push scores above 10.
pub fn normalize_score(metrics: DerivedMetrics, max_risk: Option<f64>) -> DerivedMetrics {
    let ui_risk = metrics.risk_score.map(|score| match max_risk {
        Some(max) if max != 0.0 => score / max * UI_SCALE,
        _ => 0.0,
    });
    DerivedMetrics { ui_risk, ..metrics }
}
