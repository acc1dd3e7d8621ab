/// Statistical analysis over evaluated samples.
///
/// Submodules:
/// - `describe`: per-parameter descriptive statistics and shared helpers.
/// - `site_summary`: per-site compliance rates, breach causes, ranking.
/// - `anomaly`: feature matrix, model interface, contamination flagging.
/// - `isolation_forest`: the default anomaly model.
/// - `reconcile`: rule breaches vs. model anomalies.
/// - `control_chart`: turbidity Shewhart chart.

pub mod anomaly;
pub mod control_chart;
pub mod describe;
pub mod isolation_forest;
pub mod reconcile;
pub mod site_summary;
