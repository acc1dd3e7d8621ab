/// Input loading for the compliance analysis.
///
/// Submodules:
/// - `samples`: CSV sample table → validated `Sample`s.

pub mod samples;

pub use samples::{load_samples, load_samples_from_reader, parse_timestamp};
