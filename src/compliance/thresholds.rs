//! Regulatory threshold table.
//!
//! Each regulated parameter has one rule describing its acceptable values.
//! The default table carries the limits of the Water Supply (Water Quality)
//! Regulations 2016; alternate tables can be supplied through
//! `AnalysisConfig` for testing or other regimes.

use serde::Deserialize;

use crate::model::{ConfigError, Parameter};

// ---------------------------------------------------------------------------
// Rule types
// ---------------------------------------------------------------------------

/// How a parameter's value is compared against its bounds.
///
/// Boundary semantics differ per kind:
///   inclusive_range → fail if value < min or value > max (bounds pass)
///   max_only        → fail if value >= max (bound fails)
///   min_only        → fail if value <= min (bound fails)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    InclusiveRange { min: f64, max: f64 },
    MaxOnly { max: f64 },
    MinOnly { min: f64 },
}

impl RuleKind {
    /// Returns `true` if `value` breaches this rule.
    pub fn is_breached_by(&self, value: f64) -> bool {
        match *self {
            RuleKind::InclusiveRange { min, max } => value < min || value > max,
            RuleKind::MaxOnly { max } => value >= max,
            RuleKind::MinOnly { min } => value <= min,
        }
    }

    /// The upper bound, if the rule has one. Used for chart reference lines.
    pub fn upper_bound(&self) -> Option<f64> {
        match *self {
            RuleKind::InclusiveRange { max, .. } | RuleKind::MaxOnly { max } => Some(max),
            RuleKind::MinOnly { .. } => None,
        }
    }
}

/// One row of the threshold table.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ThresholdRule {
    pub parameter: Parameter,
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// The full rule set applied to every sample, in evaluation order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThresholdTable {
    pub rules: Vec<ThresholdRule>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::uk_2016()
    }
}

impl ThresholdTable {
    /// Water Supply (Water Quality) Regulations 2016 limits.
    pub fn uk_2016() -> Self {
        Self {
            rules: vec![
                ThresholdRule {
                    parameter: Parameter::Ph,
                    kind: RuleKind::InclusiveRange { min: 6.5, max: 9.5 },
                },
                ThresholdRule {
                    parameter: Parameter::Turbidity,
                    kind: RuleKind::MaxOnly { max: 4.0 },
                },
                ThresholdRule {
                    parameter: Parameter::Chlorine,
                    kind: RuleKind::MinOnly { min: 0.2 },
                },
                ThresholdRule {
                    parameter: Parameter::Nitrate,
                    kind: RuleKind::MaxOnly { max: 11.3 },
                },
                ThresholdRule {
                    parameter: Parameter::Lead,
                    kind: RuleKind::MaxOnly { max: 10.0 },
                },
            ],
        }
    }

    /// Looks up the rule for a parameter. Returns `None` if the table does
    /// not regulate it.
    pub fn rule_for(&self, parameter: Parameter) -> Option<&ThresholdRule> {
        self.rules.iter().find(|r| r.parameter == parameter)
    }

    /// Rejects tables with duplicate parameters, non-finite bounds, or
    /// inverted ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            if seen.contains(&rule.parameter) {
                return Err(invalid(rule.parameter, "parameter appears more than once"));
            }
            seen.push(rule.parameter);

            match rule.kind {
                RuleKind::InclusiveRange { min, max } => {
                    if !min.is_finite() || !max.is_finite() {
                        return Err(invalid(rule.parameter, "bounds must be finite"));
                    }
                    if min > max {
                        return Err(invalid(rule.parameter, "min must not exceed max"));
                    }
                }
                RuleKind::MaxOnly { max: bound } | RuleKind::MinOnly { min: bound } => {
                    if !bound.is_finite() {
                        return Err(invalid(rule.parameter, "bound must be finite"));
                    }
                }
            }
        }
        Ok(())
    }
}

fn invalid(parameter: Parameter, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: format!("thresholds.{}", parameter.name()),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_regulates_every_parameter_once() {
        let table = ThresholdTable::default();
        assert_eq!(table.rules.len(), Parameter::ALL.len());
        for parameter in Parameter::ALL {
            assert!(
                table.rule_for(parameter).is_some(),
                "default table missing rule for {}",
                parameter
            );
        }
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_inclusive_range_bounds_pass() {
        let rule = RuleKind::InclusiveRange { min: 6.5, max: 9.5 };
        assert!(!rule.is_breached_by(6.5), "lower bound itself is compliant");
        assert!(!rule.is_breached_by(9.5), "upper bound itself is compliant");
        assert!(rule.is_breached_by(6.49));
        assert!(rule.is_breached_by(9.51));
    }

    #[test]
    fn test_max_only_bound_fails() {
        let rule = RuleKind::MaxOnly { max: 4.0 };
        assert!(rule.is_breached_by(4.0), "value at the max bound is a breach");
        assert!(!rule.is_breached_by(3.99));
    }

    #[test]
    fn test_min_only_bound_fails() {
        let rule = RuleKind::MinOnly { min: 0.2 };
        assert!(rule.is_breached_by(0.2), "value at the min bound is a breach");
        assert!(!rule.is_breached_by(0.21));
    }

    #[test]
    fn test_upper_bound_for_each_kind() {
        assert_eq!(RuleKind::MaxOnly { max: 4.0 }.upper_bound(), Some(4.0));
        assert_eq!(
            RuleKind::InclusiveRange { min: 1.0, max: 2.0 }.upper_bound(),
            Some(2.0)
        );
        assert_eq!(RuleKind::MinOnly { min: 0.2 }.upper_bound(), None);
    }

    #[test]
    fn test_validate_rejects_duplicate_parameter() {
        let mut table = ThresholdTable::uk_2016();
        table.rules.push(ThresholdRule {
            parameter: Parameter::Lead,
            kind: RuleKind::MaxOnly { max: 5.0 },
        });
        assert!(matches!(
            table.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "thresholds.Lead"
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let table = ThresholdTable {
            rules: vec![ThresholdRule {
                parameter: Parameter::Ph,
                kind: RuleKind::InclusiveRange { min: 9.5, max: 6.5 },
            }],
        };
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_rules_deserialize_from_toml() {
        let text = r#"
            [[rules]]
            parameter = "turbidity"
            kind = "max_only"
            max = 1.0

            [[rules]]
            parameter = "ph"
            kind = "inclusive_range"
            min = 6.0
            max = 9.0
        "#;
        let table: ThresholdTable = toml::from_str(text).expect("valid threshold TOML");
        assert_eq!(table.rules.len(), 2);
        assert_eq!(table.rules[0].parameter, Parameter::Turbidity);
        assert_eq!(table.rules[0].kind, RuleKind::MaxOnly { max: 1.0 });
        assert_eq!(
            table.rules[1].kind,
            RuleKind::InclusiveRange { min: 6.0, max: 9.0 }
        );
    }
}
