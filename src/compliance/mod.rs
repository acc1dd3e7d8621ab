/// Rule-based compliance checking.
///
/// Submodules:
/// - `thresholds`: the regulatory threshold table and rule semantics.
/// - `evaluate`: applies the table to samples, recording every breach.

pub mod evaluate;
pub mod thresholds;

pub use evaluate::{evaluate_all, evaluate_sample};
pub use thresholds::{RuleKind, ThresholdRule, ThresholdTable};
