use std::cmp::Ordering;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::error::{ScoringError, ScoringResult};
use crate::models::{CustomerRecord, DerivedMetrics};

/// Converts a millisecond epoch timestamp to a UTC calendar date. `0` means "not set".
pub fn to_calendar_date(field: &'static str, ms: i64) -> ScoringResult<Option<NaiveDate>> {
    if ms == 0 {
        return Ok(None);
    }
    let invalid = || ScoringError::InvalidTimestamp {
        field,
        value: ms.to_string(),
    };
    if ms < 0 {
        return Err(invalid());
    }
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|instant| Some(instant.date_naive()))
        .ok_or_else(invalid)
}

pub fn normalize_dates(record: &CustomerRecord, metrics: DerivedMetrics) -> DerivedMetrics {
    let date_or_unknown = |field, ms| {
        to_calendar_date(field, ms).unwrap_or_else(|err| {
            tracing::warn!(uuid = %record.uuid, error = %err, "treating date as unknown");
            None
        })
    };

    DerivedMetrics {
        first_invoice: date_or_unknown("fFirstInvoiceDateTs", record.first_invoice_ts),
        next_renewal: date_or_unknown("fNextRenewalDateTs", record.next_renewal_ts),
        ..metrics
    }
}

/// Next anniversary of the first invoice strictly after `today`.
pub fn infer_renewal(first_invoice: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    let month_order = first_invoice.month().cmp(&today.month());
    let day_order = first_invoice.day().cmp(&today.day());

    let year = match (month_order, day_order) {
        (Ordering::Less, _) => today.year() + 1,
        (Ordering::Greater, _) => today.year(),
        (Ordering::Equal, Ordering::Greater) => today.year(),
        (Ordering::Equal, Ordering::Less | Ordering::Equal) => today.year() + 1,
    };

    clamp_to_month_end(year, first_invoice.month(), first_invoice.day())
}

/// Feb 29 anniversaries land on Feb 28 in common years.
fn clamp_to_month_end(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    (1..=day)
        .rev()
        .find_map(|day| NaiveDate::from_ymd_opt(year, month, day))
}

pub fn resolve_renewal(metrics: DerivedMetrics, today: NaiveDate) -> DerivedMetrics {
    let renewal_date = metrics
        .first_invoice
        .and_then(|first_invoice| infer_renewal(first_invoice, today));

    // An explicit renewal only wins while it is still ahead of us.
    let effective_renewal = match metrics.next_renewal {
        Some(explicit) if explicit > today => Some(explicit),
        _ => renewal_date,
    };

    DerivedMetrics {
        days_used: metrics
            .first_invoice
            .map(|first_invoice| (today - first_invoice).num_days()),
        days_remaining: effective_renewal.map(|renewal| (renewal - today).num_days()),
        renewal_date,
        effective_renewal,
        ..metrics
    }
}
