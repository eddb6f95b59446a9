use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::error::ScoringResult;
use crate::models::{DerivedMetrics, RiskResult};

/// `round(ui_risk, 5) * 1000`, truncated. Unscored and zero scores both encode as 0.
pub fn encode_score(ui_risk: Option<f64>) -> i64 {
    match ui_risk {
        Some(ui) if !ui.is_nan() && ui != 0.0 => ((ui * 1e5).round() / 1e5 * 1000.0) as i64,
        _ => 0,
    }
}

pub fn encode_results(metrics: &[DerivedMetrics], as_of: DateTime<Utc>) -> Vec<RiskResult> {
    let timestamp = as_of.timestamp_millis().to_string();

    metrics
        .iter()
        .map(|m| {
            let scored = m.ui_risk.is_some_and(|ui| !ui.is_nan());
            RiskResult {
                uuid: m.uuid.clone(),
                risk_score: encode_score(m.ui_risk).to_string(),
                risk_score_ts: if scored {
                    timestamp.clone()
                } else {
                    String::new()
                },
            }
        })
        .collect()
}

/// Writes the intermediate table, one row per customer.
pub fn write_metrics_csv<W: std::io::Write>(
    writer: W,
    metrics: &[DerivedMetrics],
) -> ScoringResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in metrics {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn build_report(metrics: &[DerivedMetrics], as_of: DateTime<Utc>, limit: usize) -> String {
    let mut ranked: Vec<&DerivedMetrics> = metrics.iter().filter(|m| m.ui_risk.is_some()).collect();
    ranked.sort_by(|a, b| {
        b.ui_risk
            .partial_cmp(&a.ui_risk)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let unresolved: Vec<&DerivedMetrics> = metrics
        .iter()
        .filter(|m| m.effective_renewal.is_none())
        .collect();

    let mut output = String::new();

    let _ = writeln!(output, "# Customer Renewal Risk Report");
    let _ = writeln!(output, "Generated as of {}", as_of.date_naive());
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "{} customers, {} scored, {} unscored",
        metrics.len(),
        ranked.len(),
        metrics.len() - ranked.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Customers");

    if ranked.is_empty() {
        let _ = writeln!(output, "No customers could be scored.");
    } else {
        for m in ranked.iter().take(limit) {
            let _ = writeln!(
                output,
                "- {} ({}) risk {:.2}, renews in {} days, trend {:+.3}",
                m.name,
                m.uuid,
                m.ui_risk.unwrap_or_default(),
                m.days_remaining.unwrap_or_default(),
                m.activity_slope.unwrap_or_default()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Unknown Renewal Date");

    if unresolved.is_empty() {
        let _ = writeln!(output, "Every customer has a renewal date.");
    } else {
        for m in unresolved {
            let _ = writeln!(output, "- {} ({})", m.name, m.uuid);
        }
    }

    output
}
