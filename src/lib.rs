/// Water quality compliance analysis.
///
/// Loads a snapshot of treatment-site samples, checks each against the
/// regulatory threshold table, ranks sites by compliance, flags
/// statistically unusual samples with an isolation forest, reconciles the
/// two views, and builds a turbidity control chart. `pipeline::run` ties
/// the stages together; `report` renders the console summary and images.

pub mod analysis;
pub mod compliance;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod sites;
