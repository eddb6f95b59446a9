use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ScoringError, ScoringResult};

/// One customer as supplied by the caller. Timestamps are ms since the epoch, 0 = not set.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    pub uuid: String,
    pub name: String,
    pub customer_type: String,
    pub first_invoice_ts: i64,
    pub next_renewal_ts: i64,
    pub active_users: u64,
    pub activity: BTreeMap<NaiveDate, f64>,
}

/// Wire shape of a request row. Date-named keys land in `extra`.
#[derive(Debug, Deserialize)]
struct RawCustomerRecord {
    #[serde(default)]
    uuid: Value,
    #[serde(rename = "fName", default)]
    name: Value,
    #[serde(rename = "fCustomerType", default)]
    customer_type: Value,
    #[serde(rename = "fFirstInvoiceDateTs", default)]
    first_invoice_ts: Value,
    #[serde(rename = "fNextRenewalDateTs", default)]
    next_renewal_ts: Value,
    #[serde(rename = "ActiveUniqueUsers", default)]
    active_users: Value,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl CustomerRecord {
    pub fn from_value(index: usize, value: Value) -> ScoringResult<Self> {
        let raw: RawCustomerRecord =
            serde_json::from_value(value).map_err(|err| ScoringError::MalformedRecord {
                index,
                reason: err.to_string(),
            })?;

        let uuid = match raw.uuid {
            Value::String(uuid) => uuid,
            Value::Number(uuid) => uuid.to_string(),
            Value::Null => {
                return Err(ScoringError::MalformedRecord {
                    index,
                    reason: "missing uuid".to_string(),
                })
            }
            other => {
                return Err(ScoringError::MalformedRecord {
                    index,
                    reason: format!("uuid is not a string: {other}"),
                })
            }
        };

        let mut activity = BTreeMap::new();
        for (key, count) in raw.extra {
            let Ok(date) = NaiveDate::parse_from_str(&key, "%Y-%m-%d") else {
                continue;
            };
            match count.as_f64() {
                Some(count) if count >= 0.0 => {
                    activity.insert(date, count);
                }
                _ => {
                    return Err(ScoringError::MalformedRecord {
                        index,
                        reason: format!("activity for {key} is not a non-negative number: {count}"),
                    })
                }
            }
        }

        Ok(Self {
            first_invoice_ts: timestamp_or_unset(&uuid, "fFirstInvoiceDateTs", &raw.first_invoice_ts),
            next_renewal_ts: timestamp_or_unset(&uuid, "fNextRenewalDateTs", &raw.next_renewal_ts),
            active_users: count_or_zero(&uuid, &raw.active_users),
            uuid,
            name: text_or_empty(raw.name),
            customer_type: text_or_empty(raw.customer_type),
            activity,
        })
    }
}

/// Parses a JSON array of request rows. A row without identity aborts the batch.
pub fn parse_batch(input: &str) -> ScoringResult<Vec<CustomerRecord>> {
    let rows: Vec<Value> = serde_json::from_str(input)?;
    let records = rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| CustomerRecord::from_value(index, row))
        .collect::<ScoringResult<Vec<_>>>()?;

    if let Some(first) = records.first() {
        for record in records.iter().skip(1) {
            if !record.activity.keys().eq(first.activity.keys()) {
                tracing::warn!(
                    uuid = %record.uuid,
                    "activity window differs from the first record in the batch"
                );
            }
        }
    }

    Ok(records)
}

pub fn parse_timestamp(field: &'static str, value: &Value) -> ScoringResult<i64> {
    let invalid = || ScoringError::InvalidTimestamp {
        field,
        value: value.to_string(),
    };

    match value {
        Value::Null => Ok(0),
        Value::Number(number) => {
            if let Some(ms) = number.as_i64() {
                return if ms < 0 { Err(invalid()) } else { Ok(ms) };
            }
            match number.as_f64() {
                Some(ms) if ms >= 0.0 && ms.fract() == 0.0 && ms <= i64::MAX as f64 => {
                    Ok(ms as i64)
                }
                _ => Err(invalid()),
            }
        }
        _ => Err(invalid()),
    }
}

fn timestamp_or_unset(uuid: &str, field: &'static str, value: &Value) -> i64 {
    parse_timestamp(field, value).unwrap_or_else(|err| {
        tracing::warn!(%uuid, error = %err, "treating timestamp as unset");
        0
    })
}

/// Non-negative whole number, accepting integral floats such as `3.0`.
pub fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Null => Some(0),
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|count| *count >= 0.0 && count.fract() == 0.0 && *count <= u64::MAX as f64)
                .map(|count| count as u64)
        }),
        _ => None,
    }
}

fn count_or_zero(uuid: &str, value: &Value) -> u64 {
    parse_count(value).unwrap_or_else(|| {
        tracing::warn!(%uuid, %value, "treating ActiveUniqueUsers as 0");
        0
    })
}

fn text_or_empty(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Per-stage multipliers for the risk factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub usage: f64,
    pub renewal: f64,
    pub trend: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            usage: 1.0,
            renewal: 1.0,
            trend: 1.0,
        }
    }
}

/// Working state for one record. Each stage returns a copy with its own fields filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub uuid: String,
    pub name: String,
    pub customer_type: String,
    pub active_users: u64,
    pub activity_slope: Option<f64>,
    pub activity_total: f64,
    pub first_invoice: Option<NaiveDate>,
    pub next_renewal: Option<NaiveDate>,
    pub renewal_date: Option<NaiveDate>,
    pub effective_renewal: Option<NaiveDate>,
    pub days_used: Option<i64>,
    pub days_remaining: Option<i64>,
    pub usage_per_user: f64,
    pub usage_factor: f64,
    pub risk_usage: f64,
    pub days_to_renew_factor: Option<f64>,
    pub risk_renewal: Option<f64>,
    pub trend_factor: Option<f64>,
    pub risk_score: Option<f64>,
    pub ui_risk: Option<f64>,
}

impl DerivedMetrics {
    pub fn seed(record: &CustomerRecord) -> Self {
        Self {
            uuid: record.uuid.clone(),
            name: record.name.clone(),
            customer_type: record.customer_type.clone(),
            active_users: record.active_users,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskResult {
    pub uuid: String,
    #[serde(rename = "fRiskScore")]
    pub risk_score: String,
    #[serde(rename = "fRiskScoreTs")]
    pub risk_score_ts: String,
}
