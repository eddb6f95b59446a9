use crate::error::{ScoringError, ScoringResult};
use crate::models::{CustomerRecord, DerivedMetrics};

/// Least-squares slope of `counts` against their positional index (0, 1, 2, ...).
pub fn activity_slope(counts: &[f64]) -> ScoringResult<f64> {
    if counts.len() < 2 {
        return Err(ScoringError::InsufficientData {
            points: counts.len(),
        });
    }
    // A flat window has slope 0 exactly, regardless of float noise in the mean.
    if counts.windows(2).all(|pair| pair[0] == pair[1]) {
        return Ok(0.0);
    }

    let n = counts.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = counts.iter().sum::<f64>() / n;

    let (covariance, variance) = counts
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(cov, var), (index, count)| {
            let dx = index as f64 - mean_x;
            (cov + dx * (count - mean_y), var + dx * dx)
        });

    Ok(covariance / variance)
}

pub fn extract_trend(record: &CustomerRecord, metrics: DerivedMetrics) -> DerivedMetrics {
    let counts: Vec<f64> = record.activity.values().copied().collect();
    let activity_slope = match activity_slope(&counts) {
        Ok(slope) => Some(slope),
        Err(err) => {
            tracing::warn!(uuid = %record.uuid, error = %err, "no activity trend");
            None
        }
    };

    DerivedMetrics {
        activity_slope,
        activity_total: counts.iter().sum(),
        ..metrics
    }
}
