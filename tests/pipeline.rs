use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};

use renewal_risk::{parse_batch, report, score_batch, RiskWeights, ScoringError};

fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 9, 20, 8, 30, 0).unwrap()
}

fn request_row(uuid: &str, first_invoice: i64, next_renewal: i64, users: u64, counts: &[u64]) -> Value {
    let mut row = Map::new();
    row.insert("uuid".into(), json!(uuid));
    row.insert("fName".into(), json!(format!("Customer {uuid}")));
    row.insert("fCustomerType".into(), json!("paying_customer"));
    row.insert("fFirstInvoiceDateTs".into(), json!(first_invoice));
    row.insert("fNextRenewalDateTs".into(), json!(next_renewal));
    row.insert("ActiveUniqueUsers".into(), json!(users));
    for (day, count) in counts.iter().enumerate() {
        row.insert(format!("2023-08-{:02}", day + 1), json!(count));
    }
    Value::Object(row)
}

fn batch_json(rows: Vec<Value>) -> String {
    Value::Array(rows).to_string()
}

#[test]
fn scores_request_rows_end_to_end() {
    let input = batch_json(vec![
        // 2021-04-01, anniversary 2024-04-01
        request_row("vienna_woods_hotel", 1617235200000, 0, 0, &[0, 0, 0, 0]),
        // explicit renewal 2023-09-30
        request_row("harbour_inn", 1617235200000, 1696071876000, 2, &[4, 3, 1, 0]),
        request_row("alpine_lodge", 1617235200000, 0, 1, &[2, 2, 3, 3]),
    ]);

    let records = parse_batch(&input).unwrap();
    let batch = score_batch(&records, as_of(), &RiskWeights::default());

    assert_eq!(batch.results.len(), 3);
    let ids: Vec<&str> = batch.results.iter().map(|r| r.uuid.as_str()).collect();
    assert_eq!(ids, vec!["vienna_woods_hotel", "harbour_inn", "alpine_lodge"]);

    let vienna = &batch.metrics[0];
    assert_eq!(vienna.activity_slope, Some(0.0));
    assert_eq!(vienna.usage_factor, 0.0);
    assert_eq!(vienna.days_remaining, Some(194));

    let harbour = &batch.metrics[1];
    assert_eq!(harbour.days_remaining, Some(10));
    assert!(harbour.activity_slope.unwrap() < 0.0);

    let alpine = &batch.metrics[2];
    assert_eq!(alpine.risk_usage, 0.0);
    assert_eq!(batch.results[2].risk_score, "0");

    // Declining usage and a renewal ten days out make harbour_inn the riskiest.
    assert!((harbour.ui_risk.unwrap() - 10.0).abs() < 1e-9);
    assert_eq!(batch.results[1].risk_score, "10000");

    let stamp = as_of().timestamp_millis().to_string();
    for result in &batch.results {
        assert_eq!(result.risk_score_ts, stamp);
    }
}

#[test]
fn unscorable_rows_do_not_abort_the_batch() {
    let input = batch_json(vec![
        request_row("no_dates", 0, 0, 1, &[1, 2, 3]),
        request_row("one_day", 1617235200000, 0, 1, &[5]),
        request_row("fine", 1617235200000, 0, 3, &[1, 0, 1]),
    ]);

    let records = parse_batch(&input).unwrap();
    let batch = score_batch(&records, as_of(), &RiskWeights::default());

    assert_eq!(batch.results[0].risk_score, "0");
    assert_eq!(batch.results[0].risk_score_ts, "");
    assert_eq!(batch.results[1].risk_score_ts, "");
    assert_eq!(batch.results[2].risk_score, "10000");
    assert!(!batch.results[2].risk_score_ts.is_empty());
}

#[test]
fn malformed_identity_aborts_the_batch() {
    let mut orphan = request_row("x", 0, 0, 1, &[1, 2]);
    if let Value::Object(row) = &mut orphan {
        row.remove("uuid");
    }
    let input = batch_json(vec![request_row("ok", 0, 0, 1, &[1, 2]), orphan]);

    let err = parse_batch(&input).unwrap_err();
    assert!(matches!(err, ScoringError::MalformedRecord { index: 1, .. }));
}

#[test]
fn metrics_export_has_one_row_per_customer() {
    let input = batch_json(vec![
        request_row("a", 1617235200000, 0, 1, &[1, 2]),
        request_row("b", 0, 0, 2, &[2, 1]),
    ]);
    let records = parse_batch(&input).unwrap();
    let batch = score_batch(&records, as_of(), &RiskWeights::default());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.csv");
    let file = std::fs::File::create(&path).unwrap();
    report::write_metrics_csv(file, &batch.metrics).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert!(headers.iter().any(|h| h == "days_remaining"));
    assert!(headers.iter().any(|h| h == "ui_risk"));

    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][0], "a");
    let renewal_column = headers.iter().position(|h| h == "effective_renewal").unwrap();
    assert_eq!(&rows[0][renewal_column], "2024-04-01");
    assert_eq!(&rows[1][renewal_column], "");
}
