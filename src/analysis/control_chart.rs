//! Shewhart X̄ control chart for turbidity.
//!
//! Conventions:
//!   center = mean of the individual values
//!   sigma  = sample standard deviation (n − 1) of the individual values
//!   limits = center ± k · sigma / √m, with k the sigma multiplier and m the
//!            subgroup size
//!
//! With m = 1 (one sample per event, the default) every sample is a point.
//! With m > 1 points are means of consecutive subgroups of m samples in
//! time order; a trailing partial subgroup is dropped.
//!
//! Limits are inclusive: a point exactly on UCL or LCL is in control.
//! Special-cause signals are independent of regulatory breaches; both are
//! recorded per point.

use chrono::NaiveDateTime;

use crate::analysis::describe::{mean, sample_std};
use crate::compliance::RuleKind;
use crate::config::ControlChartConfig;
use crate::model::{Sample, SampleId};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlLimits {
    pub center: f64,
    pub ucl: f64,
    pub lcl: f64,
    /// Standard deviation of the individual values.
    pub sigma: f64,
    pub subgroup_size: usize,
}

impl ControlLimits {
    /// Computes limits from individual values. `None` for an empty series.
    ///
    /// Fewer than two values have no spread, so the limits collapse onto
    /// the mean.
    pub fn from_values(values: &[f64], config: &ControlChartConfig) -> Option<Self> {
        let center = mean(values)?;
        let sigma = sample_std(values).unwrap_or(0.0);
        let m = config.subgroup_size.max(1);
        let half_width = config.sigma_multiplier * sigma / (m as f64).sqrt();

        let mut lcl = center - half_width;
        if config.clamp_lcl_at_zero {
            lcl = lcl.max(0.0).min(center);
        }

        Some(Self {
            center,
            ucl: center + half_width,
            lcl,
            sigma,
            subgroup_size: m,
        })
    }

    /// `true` if `value` lies strictly outside [LCL, UCL].
    pub fn is_out_of_control(&self, value: f64) -> bool {
        value > self.ucl || value < self.lcl
    }
}

// ---------------------------------------------------------------------------
// Chart
// ---------------------------------------------------------------------------

/// One plotted point: a single sample, or a subgroup mean.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPoint {
    /// Position along the chart's x axis, from 0.
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub sample_ids: Vec<SampleId>,
    pub out_of_control: bool,
    /// At least one contributing sample breaches the regulatory limit.
    pub regulatory_breach: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlChart {
    /// "All Sites" or a site code.
    pub label: String,
    pub limits: ControlLimits,
    pub points: Vec<ControlPoint>,
    /// Regulatory rule drawn alongside the statistical limits.
    pub regulatory_rule: Option<RuleKind>,
}

impl ControlChart {
    pub fn out_of_control_points(&self) -> impl Iterator<Item = &ControlPoint> {
        self.points.iter().filter(|p| p.out_of_control)
    }

    pub fn regulatory_breach_points(&self) -> impl Iterator<Item = &ControlPoint> {
        self.points.iter().filter(|p| p.regulatory_breach)
    }

    /// The regulatory upper limit, if the rule has one.
    pub fn regulatory_limit(&self) -> Option<f64> {
        self.regulatory_rule.and_then(|r| r.upper_bound())
    }
}

/// Label used for the chart covering every sample.
pub const ALL_SITES_LABEL: &str = "All Sites";

/// Builds a turbidity chart over `samples`, ordered by timestamp (ties keep
/// input order). Returns `None` when there are not enough samples to form
/// a single point.
pub fn build_turbidity_chart(
    samples: &[&Sample],
    label: &str,
    config: &ControlChartConfig,
    regulatory_rule: Option<RuleKind>,
) -> Option<ControlChart> {
    let mut ordered: Vec<&Sample> = samples.to_vec();
    ordered.sort_by_key(|s| s.timestamp);

    let values: Vec<f64> = ordered.iter().map(|s| s.turbidity_ntu).collect();
    let limits = ControlLimits::from_values(&values, config)?;
    let breaches = |s: &Sample| {
        regulatory_rule
            .map(|r| r.is_breached_by(s.turbidity_ntu))
            .unwrap_or(false)
    };

    let points: Vec<ControlPoint> = ordered
        .chunks_exact(limits.subgroup_size)
        .enumerate()
        .filter_map(|(index, group)| {
            let group_values: Vec<f64> = group.iter().map(|s| s.turbidity_ntu).collect();
            let value = mean(&group_values)?;
            Some(ControlPoint {
                index,
                timestamp: group[0].timestamp,
                value,
                sample_ids: group.iter().map(|s| s.id).collect(),
                out_of_control: limits.is_out_of_control(value),
                regulatory_breach: group.iter().any(|s| breaches(*s)),
            })
        })
        .collect();

    if points.is_empty() {
        return None;
    }

    Some(ControlChart {
        label: label.to_string(),
        limits,
        points,
        regulatory_rule,
    })
}

/// Chart over the whole dataset.
pub fn build_global_chart(
    samples: &[Sample],
    config: &ControlChartConfig,
    regulatory_rule: Option<RuleKind>,
) -> Option<ControlChart> {
    let all: Vec<&Sample> = samples.iter().collect();
    build_turbidity_chart(&all, ALL_SITES_LABEL, config, regulatory_rule)
}

/// One chart per site, in site-code order. Each site gets its own limits.
pub fn build_site_charts(
    samples: &[Sample],
    config: &ControlChartConfig,
    regulatory_rule: Option<RuleKind>,
) -> Vec<ControlChart> {
    let mut sites: Vec<&str> = samples.iter().map(|s| s.site.as_str()).collect();
    sites.sort_unstable();
    sites.dedup();

    sites
        .into_iter()
        .filter_map(|site| {
            let members: Vec<&Sample> = samples.iter().filter(|s| s.site == site).collect();
            build_turbidity_chart(&members, site, config, regulatory_rule)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
