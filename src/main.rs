/// Batch entry point: analyse `water_quality_analysis.csv` in the working
/// directory and write the summary and charts next to it.
///
/// An optional `water_quality.toml` in the same directory overrides the
/// defaults. Exit status is non-zero on any fatal analysis error.

use std::path::Path;
use std::process::ExitCode;

use wq_compliance::config::{AnalysisConfig, CONFIG_FILE_NAME};
use wq_compliance::logging::{self, LogLevel, Stage};
use wq_compliance::pipeline;

fn main() -> ExitCode {
    logging::init_logger(LogLevel::Info, false);

    let config = match AnalysisConfig::load_or_default(Path::new(CONFIG_FILE_NAME)) {
        Ok(config) => config,
        Err(e) => {
            logging::log_fatal(&e);
            return ExitCode::FAILURE;
        }
    };

    match pipeline::run(&config) {
        Ok(outcome) => {
            if let Some(note) = outcome.render_failure_note() {
                logging::warn(Stage::Report, None, &note);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            logging::log_fatal(&e);
            ExitCode::FAILURE
        }
    }
}
