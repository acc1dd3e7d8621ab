//! Analysis configuration.
//!
//! Every tunable of the run lives in `AnalysisConfig` and is passed
//! explicitly into the component that needs it. Defaults reproduce the
//! reference report; an optional `water_quality.toml` in the working
//! directory overrides any subset of fields.
//!
//! ```toml
//! compliance_target = 0.95
//!
//! [anomaly]
//! contamination = 0.05
//! seed = 42
//!
//! [control_chart]
//! subgroup_size = 1
//! sigma_multiplier = 3.0
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::compliance::ThresholdTable;
use crate::model::ConfigError;
use crate::sites;

/// Name of the optional config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "water_quality.toml";

/// Name of the input table looked up in the working directory.
pub const INPUT_FILE_NAME: &str = "water_quality_analysis.csv";

// ---------------------------------------------------------------------------
// Config sections
// ---------------------------------------------------------------------------

/// Isolation forest settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Fraction of samples designated anomalous.
    pub contamination: f64,
    /// Seed for tree construction; fixed so flagged sets are reproducible.
    pub seed: u64,
    pub n_trees: usize,
    /// Upper bound on the per-tree sub-sample size.
    pub max_samples: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            contamination: 0.05,
            seed: 42,
            n_trees: 100,
            max_samples: 256,
        }
    }
}

/// Shewhart chart settings for the turbidity series.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControlChartConfig {
    /// Samples per rational subgroup; 1 means an individuals chart.
    pub subgroup_size: usize,
    /// Width of the control band in standard errors.
    pub sigma_multiplier: f64,
    /// Turbidity cannot be negative, so the LCL is floored at zero.
    pub clamp_lcl_at_zero: bool,
}

impl Default for ControlChartConfig {
    fn default() -> Self {
        Self {
            subgroup_size: 1,
            sigma_multiplier: 3.0,
            clamp_lcl_at_zero: true,
        }
    }
}

/// Where the rendered images go and what they are called.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub compliance_overview: String,
    pub turbidity_spc: String,
    pub parameter_distributions: String,
    /// Bins per parameter histogram.
    pub histogram_bins: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            compliance_overview: "water_compliance_overview.png".to_string(),
            turbidity_spc: "turbidity_spc.png".to_string(),
            parameter_distributions: "water_param_distributions.png".to_string(),
            histogram_bins: 12,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub input_path: PathBuf,
    /// Site identifiers accepted by the loader.
    pub known_sites: Vec<String>,
    pub thresholds: ThresholdTable,
    /// Sites whose compliance rate falls below this are marked for action.
    pub compliance_target: f64,
    pub anomaly: AnomalyConfig,
    pub control_chart: ControlChartConfig,
    pub output: OutputConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from(INPUT_FILE_NAME),
            known_sites: sites::all_site_codes(),
            thresholds: ThresholdTable::default(),
            compliance_target: 0.90,
            anomaly: AnomalyConfig::default(),
            control_chart: ControlChartConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parses a config from TOML text and validates it.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Rejects values that would make a stage meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;

        if self.known_sites.is_empty() {
            return Err(invalid("known_sites", "at least one site is required"));
        }
        if !(0.0..=1.0).contains(&self.compliance_target) {
            return Err(invalid("compliance_target", "must be within [0, 1]"));
        }
        let contamination = self.anomaly.contamination;
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(invalid("anomaly.contamination", "must be within (0, 0.5]"));
        }
        if self.anomaly.n_trees == 0 {
            return Err(invalid("anomaly.n_trees", "must be at least 1"));
        }
        if self.anomaly.max_samples < 2 {
            return Err(invalid("anomaly.max_samples", "must be at least 2"));
        }
        if self.control_chart.subgroup_size == 0 {
            return Err(invalid("control_chart.subgroup_size", "must be at least 1"));
        }
        if !(self.control_chart.sigma_multiplier > 0.0) {
            return Err(invalid("control_chart.sigma_multiplier", "must be positive"));
        }
        if self.output.histogram_bins == 0 {
            return Err(invalid("output.histogram_bins", "must be at least 1"));
        }
        Ok(())
    }

    pub fn compliance_overview_path(&self) -> PathBuf {
        self.output.directory.join(&self.output.compliance_overview)
    }

    pub fn turbidity_spc_path(&self) -> PathBuf {
        self.output.directory.join(&self.output.turbidity_spc)
    }

    pub fn parameter_distributions_path(&self) -> PathBuf {
        self.output.directory.join(&self.output.parameter_distributions)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
