//! Multi-parameter anomaly detection.
//!
//! The detector standardises the per-sample feature matrix, asks an
//! `AnomalyModel` for one score per row, and flags the highest-scoring
//! `round(n × contamination)` rows. Flagging lives here rather than in the
//! model so every model implementation designates the same fraction.

use crate::analysis::describe::{mean, population_std};
use crate::model::{AnomalyFlag, ModelFitError, Parameter, Sample, SampleId};

/// Column name for the optional bacteria feature.
pub const BACTERIA_FEATURE: &str = "Bacteria";

// ---------------------------------------------------------------------------
// Feature matrix
// ---------------------------------------------------------------------------

/// Row-major numeric matrix with named columns. Always non-empty,
/// rectangular, and finite.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, ModelFitError> {
        if rows.is_empty() || columns.is_empty() {
            return Err(ModelFitError::EmptyMatrix);
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ModelFitError::RaggedRow {
                    row: i,
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
            if let Some(j) = row.iter().position(|v| !v.is_finite()) {
                return Err(ModelFitError::NonFinite(columns[j].clone()));
            }
        }
        Ok(Self { columns, rows })
    }

    /// One row per sample: the five regulated parameters, plus bacteria
    /// when every sample carries a bacteria count.
    pub fn from_samples(samples: &[Sample]) -> Result<Self, ModelFitError> {
        let with_bacteria = !samples.is_empty() && samples.iter().all(|s| s.bacteria_cfu.is_some());

        let mut columns: Vec<String> = Parameter::ALL.iter().map(|p| p.name().to_string()).collect();
        if with_bacteria {
            columns.push(BACTERIA_FEATURE.to_string());
        }

        let rows = samples
            .iter()
            .map(|s| {
                let mut row: Vec<f64> = Parameter::ALL.iter().map(|&p| s.value(p)).collect();
                if let (true, Some(b)) = (with_bacteria, s.bacteria_cfu) {
                    row.push(b);
                }
                row
            })
            .collect();

        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    fn column(&self, j: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[j]).collect()
    }

    /// Rescales every column to zero mean and unit (population) variance.
    ///
    /// A constant column carries no information and is mapped to all zeros.
    /// If every column is constant no row can be told apart from another,
    /// which is a fit error.
    pub fn standardized(&self) -> Result<Self, ModelFitError> {
        let mut params = Vec::with_capacity(self.columns.len());
        let mut constant = Vec::new();
        for (j, name) in self.columns.iter().enumerate() {
            let values = self.column(j);
            let m = mean(&values).ok_or(ModelFitError::EmptyMatrix)?;
            let sd = population_std(&values).ok_or(ModelFitError::EmptyMatrix)?;
            if sd <= f64::EPSILON * m.abs().max(1.0) {
                constant.push(name.clone());
                params.push((m, None));
            } else {
                params.push((m, Some(sd)));
            }
        }
        if constant.len() == self.columns.len() {
            return Err(ModelFitError::ZeroVariance(constant.join(", ")));
        }

        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&params)
                    .map(|(v, (m, sd))| match sd {
                        Some(sd) => (v - m) / sd,
                        None => 0.0,
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            columns: self.columns.clone(),
            rows,
        })
    }
}

// ---------------------------------------------------------------------------
// Model interface
// ---------------------------------------------------------------------------

/// Unsupervised anomaly scorer: fit on a matrix and score every row of it.
///
/// Higher scores mean more anomalous. Implementations must return exactly
/// one score per row and must be deterministic for a given configuration.
pub trait AnomalyModel {
    fn name(&self) -> &str;
    fn fit_score(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ModelFitError>;
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Number of rows flagged for `n` samples at `contamination`.
pub fn flagged_count(n: usize, contamination: f64) -> usize {
    ((n as f64 * contamination).round() as usize).min(n)
}

/// Turns per-sample scores into flags, marking the top `flagged_count`
/// scores. Ties are broken toward the lower sample id.
pub fn flag_top_fraction(ids: &[SampleId], scores: &[f64], contamination: f64) -> Vec<AnomalyFlag> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(ids[a].cmp(&ids[b])));

    let mut flagged = vec![false; scores.len()];
    for &i in order.iter().take(flagged_count(scores.len(), contamination)) {
        flagged[i] = true;
    }

    ids.iter()
        .zip(scores)
        .zip(flagged)
        .map(|((&sample_id, &score), is_anomaly)| AnomalyFlag {
            sample_id,
            is_anomaly,
            score,
        })
        .collect()
}

/// Scores every sample with `model` and flags the most anomalous fraction.
///
/// Returns one flag per sample, in input order.
pub fn detect_anomalies(
    samples: &[Sample],
    model: &dyn AnomalyModel,
    contamination: f64,
) -> Result<Vec<AnomalyFlag>, ModelFitError> {
    if !(contamination > 0.0 && contamination <= 0.5) {
        return Err(ModelFitError::InvalidContamination(contamination));
    }

    let matrix = FeatureMatrix::from_samples(samples)?.standardized()?;
    let scores = model.fit_score(&matrix)?;
    if scores.len() != samples.len() {
        return Err(ModelFitError::ScoreCountMismatch {
            expected: samples.len(),
            actual: scores.len(),
        });
    }

    let ids: Vec<SampleId> = samples.iter().map(|s| s.id).collect();
    Ok(flag_top_fraction(&ids, &scores, contamination))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::isolation_forest::IsolationForest;
    use crate::config::AnomalyConfig;
    use chrono::NaiveDate;

    /// Test double returning canned scores regardless of input.
    struct FixedScores(Vec<f64>);

    impl AnomalyModel for FixedScores {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fit_score(&self, _matrix: &FeatureMatrix) -> Result<Vec<f64>, ModelFitError> {
            Ok(self.0.clone())
        }
    }

    fn sample(id: usize, ph: f64, turbidity: f64) -> Sample {
        Sample {
            id: SampleId(id),
            site: "Site E".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            ph,
            turbidity_ntu: turbidity,
            chlorine_mgl: 0.4 + (id % 5) as f64 * 0.05,
            nitrate_mgl: 3.0 + (id % 7) as f64 * 0.3,
            lead_ugl: 1.0 + (id % 3) as f64 * 0.5,
            bacteria_cfu: None,
        }
    }

    fn varied_samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| sample(i, 7.0 + (i % 9) as f64 * 0.1, 0.5 + (i % 11) as f64 * 0.2))
            .collect()
    }

    #[test]
    fn test_flagged_count_rounds_to_nearest() {
        assert_eq!(flagged_count(250, 0.05), 13);
        assert_eq!(flagged_count(100, 0.05), 5);
        assert_eq!(flagged_count(5, 0.05), 0);
    }

    #[test]
    fn test_top_scores_are_flagged_with_id_tie_break() {
        let ids: Vec<SampleId> = (0..4).map(SampleId).collect();
        let flags = flag_top_fraction(&ids, &[0.2, 0.9, 0.9, 0.1], 0.25);
        let flagged: Vec<usize> = flags
            .iter()
            .filter(|f| f.is_anomaly)
            .map(|f| f.sample_id.0)
            .collect();
        assert_eq!(flagged, vec![1], "equal scores resolve to the lower id");
    }

    #[test]
    fn test_detector_uses_model_scores() {
        let samples = varied_samples(20);
        let mut scores = vec![0.3; 20];
        scores[7] = 0.95;
        let flags = detect_anomalies(&samples, &FixedScores(scores), 0.05).expect("detect");
        assert_eq!(flags.len(), 20);
        let flagged: Vec<SampleId> = flags.iter().filter(|f| f.is_anomaly).map(|f| f.sample_id).collect();
        assert_eq!(flagged, vec![SampleId(7)]);
    }

    #[test]
    fn test_wrong_score_count_is_rejected() {
        let samples = varied_samples(10);
        let result = detect_anomalies(&samples, &FixedScores(vec![0.5; 9]), 0.05);
        assert_eq!(
            result,
            Err(ModelFitError::ScoreCountMismatch {
                expected: 10,
                actual: 9
            })
        );
    }

    #[test]
    fn test_constant_feature_is_zeroed_not_fatal() {
        let samples: Vec<Sample> = (0..10).map(|i| sample(i, 7.0, 1.0 + i as f64)).collect();
        let matrix = FeatureMatrix::from_samples(&samples)
            .expect("matrix")
            .standardized()
            .expect("one constant column is allowed");
        assert!(matrix.column(0).iter().all(|&v| v == 0.0), "pH column is constant");
        assert!((population_std(&matrix.column(1)).expect("std") - 1.0).abs() < 1e-9);

        let flags = detect_anomalies(&samples, &FixedScores(vec![0.5; 10]), 0.1).expect("detect");
        assert_eq!(flags.len(), 10);
    }

    #[test]
    fn test_all_zero_bacteria_counts_are_not_fatal() {
        let mut samples = varied_samples(40);
        for s in &mut samples {
            s.bacteria_cfu = Some(0.0);
        }
        let flags = detect_anomalies(&samples, &IsolationForest::from_config(&AnomalyConfig::default()), 0.05).expect("detect");
        assert_eq!(flags.iter().filter(|f| f.is_anomaly).count(), 2);
    }

    #[test]
    fn test_all_constant_features_are_fit_error() {
        let cols = vec!["a".to_string(), "b".to_string()];
        let matrix = FeatureMatrix::new(cols, vec![vec![1.0, 3.0]; 5]).expect("matrix");
        assert_eq!(
            matrix.standardized(),
            Err(ModelFitError::ZeroVariance("a, b".to_string()))
        );
    }

    #[test]
    fn test_invalid_contamination_is_rejected() {
        let samples = varied_samples(10);
        let result = detect_anomalies(&samples, &FixedScores(vec![0.5; 10]), 0.0);
        assert_eq!(result, Err(ModelFitError::InvalidContamination(0.0)));
    }

    #[test]
    fn test_bacteria_feature_only_when_every_sample_has_it() {
        let mut samples = varied_samples(4);
        for s in &mut samples {
            s.bacteria_cfu = Some(1.0);
        }
        let full = FeatureMatrix::from_samples(&samples).expect("matrix");
        assert_eq!(full.columns().len(), 6);
        assert_eq!(full.columns()[5], BACTERIA_FEATURE);

        samples[2].bacteria_cfu = None;
        let partial = FeatureMatrix::from_samples(&samples).expect("matrix");
        assert_eq!(partial.columns().len(), 5);
    }

    #[test]
    fn test_standardized_columns_have_zero_mean_unit_variance() {
        let matrix = FeatureMatrix::from_samples(&varied_samples(50))
            .expect("matrix")
            .standardized()
            .expect("scaled");
        for j in 0..matrix.columns().len() {
            let col = matrix.column(j);
            assert!(mean(&col).expect("mean").abs() < 1e-9);
            assert!((population_std(&col).expect("std") - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ragged_and_non_finite_matrices_are_rejected() {
        let cols = vec!["a".to_string(), "b".to_string()];
        assert!(matches!(
            FeatureMatrix::new(cols.clone(), vec![vec![1.0, 2.0], vec![1.0]]),
            Err(ModelFitError::RaggedRow { row: 1, .. })
        ));
        assert_eq!(
            FeatureMatrix::new(cols.clone(), vec![vec![1.0, f64::NAN]]),
            Err(ModelFitError::NonFinite("b".to_string()))
        );
        assert_eq!(FeatureMatrix::new(cols, vec![]), Err(ModelFitError::EmptyMatrix));
    }

    #[test]
    fn test_isolation_forest_flags_are_deterministic() {
        let samples = varied_samples(120);
        let model = IsolationForest {
            n_trees: 100,
            max_samples: 256,
            seed: 42,
        };
        let first = detect_anomalies(&samples, &model, 0.05).expect("first run");
        let second = detect_anomalies(&samples, &model, 0.05).expect("second run");
        let ids = |flags: &[AnomalyFlag]| -> Vec<SampleId> {
            flags.iter().filter(|f| f.is_anomaly).map(|f| f.sample_id).collect()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(ids(&first).len(), 6);
    }
}
