//! Descriptive statistics over the loaded samples.
//!
//! Also home to the small numeric helpers (mean, standard deviation) shared
//! by the scaler and the control chart.

use chrono::NaiveDateTime;

use crate::model::{Parameter, Sample};

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n − 1 denominator). `None` for fewer than
/// two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Population standard deviation (n denominator). `None` for an empty slice.
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / values.len() as f64).sqrt())
}

/// Summary of one parameter's values across the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStats {
    pub parameter: Parameter,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; 0 when only one value exists.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Shape of the loaded dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetOverview {
    pub sample_count: usize,
    pub site_count: usize,
    pub first_timestamp: NaiveDateTime,
    pub last_timestamp: NaiveDateTime,
    pub parameters: Vec<ParameterStats>,
}

/// Describes a non-empty sample set. Returns `None` when `samples` is empty.
pub fn describe(samples: &[Sample]) -> Option<DatasetOverview> {
    let first_timestamp = samples.iter().map(|s| s.timestamp).min()?;
    let last_timestamp = samples.iter().map(|s| s.timestamp).max()?;

    let mut sites: Vec<&str> = samples.iter().map(|s| s.site.as_str()).collect();
    sites.sort_unstable();
    sites.dedup();

    let parameters = Parameter::ALL
        .iter()
        .filter_map(|&parameter| {
            let values: Vec<f64> = samples.iter().map(|s| s.value(parameter)).collect();
            Some(ParameterStats {
                parameter,
                count: values.len(),
                mean: mean(&values)?,
                std: sample_std(&values).unwrap_or(0.0),
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            })
        })
        .collect();

    Some(DatasetOverview {
        sample_count: samples.len(),
        site_count: sites.len(),
        first_timestamp,
        last_timestamp,
        parameters,
    })
}
