//! Reconciliation of rule-based breaches with model-flagged anomalies.
//!
//! Samples the model flags but the threshold table passes ("ML-only") are
//! candidates for failure modes the static limits do not capture.

use std::collections::HashMap;

use crate::model::{AnomalyFlag, EvaluationResult, ModelFitError, SampleId};

/// Partition of the sample set by (rule verdict, model flag).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconciliation {
    /// Flagged by the model, compliant under the rules.
    pub ml_only: Vec<SampleId>,
    /// Breached a rule, not flagged by the model.
    pub rule_only: Vec<SampleId>,
    /// Breached a rule and flagged by the model.
    pub both: Vec<SampleId>,
    pub anomaly_count: usize,
    pub breach_count: usize,
}

impl Reconciliation {
    /// Fraction of model-flagged samples that the rules also caught.
    pub fn rule_agreement(&self) -> Option<f64> {
        if self.anomaly_count == 0 {
            None
        } else {
            Some(self.both.len() as f64 / self.anomaly_count as f64)
        }
    }
}

/// Joins evaluations and anomaly flags by sample id.
///
/// Both inputs must describe the same sample set; a missing or extra flag
/// is a contract violation reported as `ModelFitError`. Output id lists
/// are sorted ascending.
pub fn reconcile(
    evaluations: &[EvaluationResult],
    flags: &[AnomalyFlag],
) -> Result<Reconciliation, ModelFitError> {
    if evaluations.len() != flags.len() {
        return Err(ModelFitError::ScoreCountMismatch {
            expected: evaluations.len(),
            actual: flags.len(),
        });
    }

    let by_id: HashMap<SampleId, &AnomalyFlag> = flags.iter().map(|f| (f.sample_id, f)).collect();
    let mut out = Reconciliation::default();

    for eval in evaluations {
        let flag = by_id
            .get(&eval.sample_id)
            .ok_or(ModelFitError::MissingFlag(eval.sample_id))?;

        if flag.is_anomaly {
            out.anomaly_count += 1;
        }
        if !eval.passed() {
            out.breach_count += 1;
        }

        match (flag.is_anomaly, eval.passed()) {
            (true, true) => out.ml_only.push(eval.sample_id),
            (true, false) => out.both.push(eval.sample_id),
            (false, false) => out.rule_only.push(eval.sample_id),
            (false, true) => {}
        }
    }

    out.ml_only.sort_unstable();
    out.rule_only.sort_unstable();
    out.both.sort_unstable();
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Parameter;

    fn eval(id: usize, breaches: &[Parameter]) -> EvaluationResult {
        EvaluationResult {
            sample_id: SampleId(id),
            site: "Site D".to_string(),
            breaches: breaches.to_vec(),
        }
    }

    fn flag(id: usize, is_anomaly: bool) -> AnomalyFlag {
        AnomalyFlag {
            sample_id: SampleId(id),
            is_anomaly,
            score: if is_anomaly { 0.8 } else { 0.4 },
        }
    }

    #[test]
    fn test_partitions_samples_by_verdict_and_flag() {
        let evals = vec![
            eval(0, &[]),
            eval(1, &[Parameter::Turbidity]),
            eval(2, &[]),
            eval(3, &[Parameter::Lead]),
        ];
        // Flags deliberately out of order: the join is by id.
        let flags = vec![flag(3, false), flag(2, true), flag(1, true), flag(0, false)];
        let r = reconcile(&evals, &flags).expect("same sample set");

        assert_eq!(r.ml_only, vec![SampleId(2)]);
        assert_eq!(r.both, vec![SampleId(1)]);
        assert_eq!(r.rule_only, vec![SampleId(3)]);
        assert_eq!(r.anomaly_count, 2);
        assert_eq!(r.breach_count, 2);
        assert_eq!(r.rule_agreement(), Some(0.5));
    }

    #[test]
    fn test_ml_only_is_subset_of_flagged_and_disjoint_from_breaches() {
        let evals: Vec<EvaluationResult> = (0..30)
            .map(|i| if i % 4 == 0 { eval(i, &[Parameter::Ph]) } else { eval(i, &[]) })
            .collect();
        let flags: Vec<AnomalyFlag> = (0..30).map(|i| flag(i, i % 3 == 0)).collect();
        let r = reconcile(&evals, &flags).expect("reconcile");

        for id in &r.ml_only {
            assert!(flags[id.0].is_anomaly, "{} in ML-only but not flagged", id);
            assert!(evals[id.0].passed(), "{} in ML-only but breached a rule", id);
        }
        assert_eq!(r.ml_only.len() + r.both.len(), r.anomaly_count);
        assert_eq!(r.rule_only.len() + r.both.len(), r.breach_count);
    }

    #[test]
    fn test_missing_flag_is_rejected() {
        let evals = vec![eval(0, &[]), eval(1, &[])];
        let flags = vec![flag(0, false), flag(5, true)];
        assert_eq!(
            reconcile(&evals, &flags),
            Err(ModelFitError::MissingFlag(SampleId(1)))
        );
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let evals = vec![eval(0, &[])];
        assert!(reconcile(&evals, &[]).is_err());
    }

    #[test]
    fn test_no_anomalies_has_no_agreement_ratio() {
        let r = reconcile(&[eval(0, &[])], &[flag(0, false)]).expect("reconcile");
        assert_eq!(r.rule_agreement(), None);
        assert!(r.ml_only.is_empty());
    }
}
