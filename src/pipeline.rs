//! The analysis run as explicit stages.
//!
//!   load → evaluate → aggregate → detect → reconcile → chart → report
//!
//! Each stage is a function from typed input to typed output so it can be
//! tested alone. `analyze` chains the analytic stages over an in-memory
//! dataset; `run` adds loading, the console summary, and image rendering.

use std::path::PathBuf;

use crate::analysis::anomaly::{self, AnomalyModel};
use crate::analysis::control_chart::{self, ControlChart};
use crate::analysis::describe::{self, DatasetOverview};
use crate::analysis::isolation_forest::IsolationForest;
use crate::analysis::reconcile::{self, Reconciliation};
use crate::analysis::site_summary::{self, ComplianceSummary};
use crate::compliance;
use crate::config::AnalysisConfig;
use crate::ingest;
use crate::logging::{self, Stage};
use crate::model::{
    AnalysisError, AnomalyFlag, ConfigError, DataQualityError, EvaluationResult, ModelFitError, Parameter,
    RenderError, Sample,
};
use crate::report;

// ---------------------------------------------------------------------------
// Stage outputs
// ---------------------------------------------------------------------------

/// Samples as loaded, with their descriptive overview.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDataset {
    pub samples: Vec<Sample>,
    pub overview: DatasetOverview,
}

impl LoadedDataset {
    /// Wraps already-validated samples. Empty input is a data-quality error.
    pub fn from_samples(samples: Vec<Sample>) -> Result<Self, DataQualityError> {
        let overview = describe::describe(&samples).ok_or(DataQualityError::EmptyDataset)?;
        Ok(Self { samples, overview })
    }
}

/// Everything the analytic stages produce.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub samples: Vec<Sample>,
    pub overview: DatasetOverview,
    pub evaluations: Vec<EvaluationResult>,
    pub compliance: ComplianceSummary,
    pub model_name: String,
    pub anomalies: Vec<AnomalyFlag>,
    pub reconciliation: Reconciliation,
    pub turbidity_chart: ControlChart,
    pub site_charts: Vec<ControlChart>,
}

impl AnalysisReport {
    pub fn anomaly_count(&self) -> usize {
        self.anomalies.iter().filter(|f| f.is_anomaly).count()
    }

    /// Samples flagged by the model but compliant under the rules.
    pub fn ml_only_samples(&self) -> Vec<&Sample> {
        self.reconciliation
            .ml_only
            .iter()
            .filter_map(|id| self.samples.iter().find(|s| s.id == *id))
            .collect()
    }
}

/// A finished run: the report plus which images were and were not written.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: AnalysisReport,
    pub written: Vec<PathBuf>,
    pub render_failures: Vec<RenderError>,
}

impl RunOutcome {
    pub fn charts_attempted(&self) -> usize {
        self.written.len() + self.render_failures.len()
    }

    /// One-line note on failed images, or `None` if every image was written.
    pub fn render_failure_note(&self) -> Option<String> {
        if self.render_failures.is_empty() {
            return None;
        }
        Some(format!(
            "{} of {} charts could not be rendered",
            self.render_failures.len(),
            self.charts_attempted()
        ))
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

pub fn load_stage(config: &AnalysisConfig) -> Result<LoadedDataset, DataQualityError> {
    let samples = ingest::load_samples(&config.input_path, &config.known_sites)?;
    let dataset = LoadedDataset::from_samples(samples)?;

    let o = &dataset.overview;
    logging::info(
        Stage::Load,
        None,
        &format!(
            "Loaded {} samples from {} treatment sites ({} → {})",
            o.sample_count,
            o.site_count,
            o.first_timestamp.date(),
            o.last_timestamp.date()
        ),
    );
    for stats in &o.parameters {
        logging::debug(
            Stage::Load,
            None,
            &format!(
                "{}: mean {:.3} std {:.3} min {:.3} max {:.3}",
                stats.parameter, stats.mean, stats.std, stats.min, stats.max
            ),
        );
    }
    Ok(dataset)
}

pub fn evaluate_stage(samples: &[Sample], config: &AnalysisConfig) -> Vec<EvaluationResult> {
    let evaluations = compliance::evaluate_all(samples, &config.thresholds);
    let failing = evaluations.iter().filter(|e| !e.passed()).count();
    for e in evaluations.iter().filter(|e| !e.passed()) {
        logging::debug(
            Stage::Evaluate,
            Some(&e.site),
            &format!("{} {}", e.sample_id, e.status_label()),
        );
    }
    logging::log_stage_summary(Stage::Evaluate, "non-compliant samples", evaluations.len(), failing);
    evaluations
}

pub fn aggregate_stage(evaluations: &[EvaluationResult], config: &AnalysisConfig) -> ComplianceSummary {
    let summary = site_summary::summarize(evaluations, config.compliance_target);
    for site in summary.sites_requiring_action() {
        logging::warn(
            Stage::Aggregate,
            Some(&site.site),
            &format!(
                "compliance {:.1}% is below the {:.0}% target",
                site.compliance_rate().as_percent(),
                config.compliance_target * 100.0
            ),
        );
    }
    summary
}

pub fn detect_stage(
    samples: &[Sample],
    model: &dyn AnomalyModel,
    config: &AnalysisConfig,
) -> Result<Vec<AnomalyFlag>, ModelFitError> {
    logging::debug(
        Stage::Anomaly,
        None,
        &format!(
            "fitting {} (contamination {}, seed {})",
            model.name(),
            config.anomaly.contamination,
            config.anomaly.seed
        ),
    );
    let flags = anomaly::detect_anomalies(samples, model, config.anomaly.contamination)?;
    let flagged = flags.iter().filter(|f| f.is_anomaly).count();
    logging::log_stage_summary(Stage::Anomaly, "anomalous samples", flags.len(), flagged);
    Ok(flags)
}

pub fn reconcile_stage(
    evaluations: &[EvaluationResult],
    flags: &[AnomalyFlag],
) -> Result<Reconciliation, ModelFitError> {
    let reconciliation = reconcile::reconcile(evaluations, flags)?;
    logging::info(
        Stage::Reconcile,
        None,
        &format!(
            "ML-only {}, rule-only {}, both {}",
            reconciliation.ml_only.len(),
            reconciliation.rule_only.len(),
            reconciliation.both.len()
        ),
    );
    Ok(reconciliation)
}

/// Global turbidity chart plus one chart per site.
///
/// Sites with fewer samples than one subgroup get no chart. If the whole
/// dataset cannot fill one subgroup the subgroup size is unusable.
pub fn chart_stage(
    samples: &[Sample],
    config: &AnalysisConfig,
) -> Result<(ControlChart, Vec<ControlChart>), AnalysisError> {
    if samples.is_empty() {
        return Err(DataQualityError::EmptyDataset.into());
    }
    let rule = config
        .thresholds
        .rule_for(Parameter::Turbidity)
        .map(|r| r.kind);
    let global = control_chart::build_global_chart(samples, &config.control_chart, rule).ok_or_else(|| {
        ConfigError::Invalid {
            field: "control_chart.subgroup_size".to_string(),
            reason: format!(
                "subgroup size {} exceeds the {} available samples",
                config.control_chart.subgroup_size,
                samples.len()
            ),
        }
    })?;
    let per_site = control_chart::build_site_charts(samples, &config.control_chart, rule);

    let ooc = global.out_of_control_points().count();
    logging::log_stage_summary(Stage::ControlChart, "out-of-control points", global.points.len(), ooc);
    for chart in &per_site {
        let site_ooc = chart.out_of_control_points().count();
        if site_ooc > 0 {
            logging::warn(
                Stage::ControlChart,
                Some(&chart.label),
                &format!("{} out-of-control turbidity points", site_ooc),
            );
        }
    }
    Ok((global, per_site))
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Runs every analytic stage over an already-loaded dataset.
pub fn analyze(
    dataset: LoadedDataset,
    config: &AnalysisConfig,
    model: &dyn AnomalyModel,
) -> Result<AnalysisReport, AnalysisError> {
    let evaluations = evaluate_stage(&dataset.samples, config);
    let compliance = aggregate_stage(&evaluations, config);
    let anomalies = detect_stage(&dataset.samples, model, config)?;
    let reconciliation = reconcile_stage(&evaluations, &anomalies)?;
    let (turbidity_chart, site_charts) = chart_stage(&dataset.samples, config)?;

    Ok(AnalysisReport {
        samples: dataset.samples,
        overview: dataset.overview,
        evaluations,
        compliance,
        model_name: model.name().to_string(),
        anomalies,
        reconciliation,
        turbidity_chart,
        site_charts,
    })
}

/// Loads the input named in `config` and runs every analytic stage.
/// Writes nothing.
pub fn run_analysis(
    config: &AnalysisConfig,
    model: &dyn AnomalyModel,
) -> Result<AnalysisReport, AnalysisError> {
    config.validate()?;
    let dataset = load_stage(config)?;
    analyze(dataset, config, model)
}

/// Full run with the isolation forest: analysis, console summary, images.
///
/// Fatal errors return before any image is written. Image failures are
/// logged and collected; the remaining images are still attempted.
pub fn run(config: &AnalysisConfig) -> Result<RunOutcome, AnalysisError> {
    let model = IsolationForest::from_config(&config.anomaly);
    let report = run_analysis(config, &model)?;

    report::print_summary(&report, config);

    let (written, render_failures) = report::charts::render_all(&report, config);
    for path in &written {
        logging::info(Stage::Report, None, &format!("saved → {}", path.display()));
    }
    for failure in &render_failures {
        logging::log_render_failure(failure);
    }

    Ok(RunOutcome {
        report,
        written,
        render_failures,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
