//! Batch churn-risk scoring for subscription customers.
//!
//! Records flow through trend extraction, date normalization, renewal
//! resolution and three chained risk factors before being rescaled to a
//! 0-10 range against the riskiest customer in the batch.

pub mod error;
pub mod models;
pub mod renewal;
pub mod report;
pub mod risk;
pub mod trend;

pub use error::{ScoringError, ScoringResult};
pub use models::{parse_batch, CustomerRecord, DerivedMetrics, RiskResult, RiskWeights};
pub use risk::{score_batch, ScoredBatch};
