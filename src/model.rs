/// Core data types for the water quality compliance analysis.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no I/O; only types, their display names, and the error
/// taxonomy used across the pipeline.

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// The five regulated water quality parameters, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    Ph,
    Turbidity,
    Chlorine,
    Nitrate,
    Lead,
}

impl Parameter {
    /// All regulated parameters in their fixed display order.
    pub const ALL: [Parameter; 5] = [
        Parameter::Ph,
        Parameter::Turbidity,
        Parameter::Chlorine,
        Parameter::Nitrate,
        Parameter::Lead,
    ];

    /// Short name used in breach lists and the console report.
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::Ph => "pH",
            Parameter::Turbidity => "Turbidity",
            Parameter::Chlorine => "Chlorine",
            Parameter::Nitrate => "Nitrate",
            Parameter::Lead => "Lead",
        }
    }

    /// Unit of measure, empty for pH.
    pub fn unit(&self) -> &'static str {
        match self {
            Parameter::Ph => "",
            Parameter::Turbidity => "NTU",
            Parameter::Chlorine | Parameter::Nitrate => "mg/L",
            Parameter::Lead => "µg/L",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Sample types
// ---------------------------------------------------------------------------

/// Stable identity of a sample: its 0-based row position in the input file.
///
/// Every derived record (evaluation, anomaly flag) carries the id of the
/// sample it came from so stages can be joined without relying on order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleId(pub usize);

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single water quality measurement event at one treatment site.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: SampleId,
    pub site: String,
    pub timestamp: NaiveDateTime,
    pub ph: f64,
    pub turbidity_ntu: f64,
    pub chlorine_mgl: f64,
    pub nitrate_mgl: f64,
    pub lead_ugl: f64,
    /// Bacteria count (CFU). Not threshold-checked; only used as an extra
    /// anomaly feature when every sample in the dataset carries it.
    pub bacteria_cfu: Option<f64>,
}

impl Sample {
    /// Returns the measured value for a regulated parameter.
    pub fn value(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Ph => self.ph,
            Parameter::Turbidity => self.turbidity_ntu,
            Parameter::Chlorine => self.chlorine_mgl,
            Parameter::Nitrate => self.nitrate_mgl,
            Parameter::Lead => self.lead_ugl,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived records
// ---------------------------------------------------------------------------

/// Outcome of checking one sample against the threshold table.
///
/// `breaches` is in threshold-table order and is empty iff the sample passed.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub sample_id: SampleId,
    pub site: String,
    pub breaches: Vec<Parameter>,
}

impl EvaluationResult {
    pub fn passed(&self) -> bool {
        self.breaches.is_empty()
    }

    /// Human-readable status in the style of the compliance log:
    /// `Compliant` or `Non-Compliant: pH, Turbidity`.
    pub fn status_label(&self) -> String {
        if self.passed() {
            "Compliant".to_string()
        } else {
            let names: Vec<&str> = self.breaches.iter().map(|p| p.name()).collect();
            format!("Non-Compliant: {}", names.join(", "))
        }
    }
}

/// Per-sample output of the anomaly detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyFlag {
    pub sample_id: SampleId,
    pub is_anomaly: bool,
    /// Higher means more anomalous.
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Problems with the input table. All of these abort the run before any
/// artifact is written.
#[derive(Debug, Error, PartialEq)]
pub enum DataQualityError {
    #[error("input file not found: {0}")]
    FileNotFound(String),
    #[error("could not read input file {path}: {message}")]
    Unreadable { path: String, message: String },
    #[error("required column '{0}' is missing from the input header")]
    MissingColumn(String),
    #[error("row {row}: column '{column}' is empty")]
    MissingValue { row: usize, column: String },
    #[error("row {row}: column '{column}' has non-numeric value '{value}'")]
    NonNumeric {
        row: usize,
        column: String,
        value: String,
    },
    #[error("row {row}: unparseable timestamp '{value}'")]
    BadTimestamp { row: usize, value: String },
    #[error("row {row}: unknown site '{site}'")]
    UnknownSite { row: usize, site: String },
    #[error("input dataset contains no samples")]
    EmptyDataset,
}

/// Failures of the anomaly model or of joining its output back to the
/// rule-based evaluation.
#[derive(Debug, Error, PartialEq)]
pub enum ModelFitError {
    #[error("feature matrix is empty")]
    EmptyMatrix,
    #[error("feature matrix row {row} has {actual} values, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("feature '{0}' contains a non-finite value")]
    NonFinite(String),
    #[error("every feature is constant ({0}); the model cannot separate samples")]
    ZeroVariance(String),
    #[error("contamination must be in (0, 0.5], got {0}")]
    InvalidContamination(f64),
    #[error("model returned {actual} scores for {expected} samples")]
    ScoreCountMismatch { expected: usize, actual: usize },
    #[error("no anomaly flag for sample {0}")]
    MissingFlag(SampleId),
}

/// Problems with the optional configuration file.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("could not read config file {path}: {message}")]
    Unreadable { path: String, message: String },
    #[error("could not parse config file {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// A single image could not be produced. Never fatal.
#[derive(Debug, Error)]
#[error("could not render {image}: {message}")]
pub struct RenderError {
    pub image: String,
    pub message: String,
}

/// Any fatal failure of the analysis run.
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("data quality error: {0}")]
    DataQuality(#[from] DataQualityError),
    #[error("model fit error: {0}")]
    ModelFit(#[from] ModelFitError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
