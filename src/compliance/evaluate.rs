//! Per-sample compliance evaluation.
//!
//! Every rule in the table is checked; a sample breaching several
//! parameters records all of them rather than stopping at the first.

use crate::compliance::thresholds::ThresholdTable;
use crate::model::{EvaluationResult, Sample};

/// Checks one sample against every rule in `table`.
///
/// Breaches are listed in table order. Pure: no logging, no I/O.
pub fn evaluate_sample(sample: &Sample, table: &ThresholdTable) -> EvaluationResult {
    let breaches = table
        .rules
        .iter()
        .filter(|rule| rule.kind.is_breached_by(sample.value(rule.parameter)))
        .map(|rule| rule.parameter)
        .collect();

    EvaluationResult {
        sample_id: sample.id,
        site: sample.site.clone(),
        breaches,
    }
}

/// Evaluates every sample, preserving input order (one result per sample).
pub fn evaluate_all(samples: &[Sample], table: &ThresholdTable) -> Vec<EvaluationResult> {
    samples.iter().map(|s| evaluate_sample(s, table)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
