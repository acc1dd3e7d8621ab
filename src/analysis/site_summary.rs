//! Per-site compliance aggregation and ranking.
//!
//! Rates are exact fractions of integer counts (`ComplianceRate`), so
//! `rate × sample_count == compliant_count` holds with no rounding drift.
//! Floating point is used only for display.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::model::{EvaluationResult, Parameter};

// ---------------------------------------------------------------------------
// Exact rate
// ---------------------------------------------------------------------------

/// Resolution used to turn a fractional target into an exact ratio.
const TARGET_SCALE: u128 = 1_000_000;

/// A compliance rate held as `compliant / total` counts.
///
/// Equality and ordering compare the fractions exactly, so 1/2 == 2/4.
/// A rate over zero samples is treated as 0.
#[derive(Debug, Clone, Copy)]
pub struct ComplianceRate {
    pub compliant: usize,
    pub total: usize,
}

impl ComplianceRate {
    pub fn new(compliant: usize, total: usize) -> Self {
        Self { compliant, total }
    }

    /// Applies the rate to `count` samples. `Some` only when the product is
    /// a whole number of samples.
    pub fn applied_to(&self, count: usize) -> Option<usize> {
        if self.total == 0 {
            return Some(0);
        }
        let product = self.compliant as u128 * count as u128;
        let total = self.total as u128;
        (product % total == 0).then(|| (product / total) as usize)
    }

    /// `true` if the rate is strictly below `target`, a fraction in [0, 1]
    /// compared at six decimal places.
    pub fn is_below(&self, target: f64) -> bool {
        let target = (target.clamp(0.0, 1.0) * TARGET_SCALE as f64).round() as u128;
        (self.compliant as u128) * TARGET_SCALE < target * self.total as u128
    }

    /// Display value in [0, 1].
    pub fn as_f64(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.compliant as f64 / self.total as f64
        }
    }

    /// Display value in [0, 100].
    pub fn as_percent(&self) -> f64 {
        self.as_f64() * 100.0
    }

    // Zero-sample rates normalise to 0/1.
    fn cross_terms(&self, other: &Self) -> (u128, u128) {
        let (a, b) = if self.total == 0 { (0, 1) } else { (self.compliant, self.total) };
        let (c, d) = if other.total == 0 { (0, 1) } else { (other.compliant, other.total) };
        (a as u128 * d as u128, c as u128 * b as u128)
    }
}

impl PartialEq for ComplianceRate {
    fn eq(&self, other: &Self) -> bool {
        let (lhs, rhs) = self.cross_terms(other);
        lhs == rhs
    }
}

impl Eq for ComplianceRate {}

impl PartialOrd for ComplianceRate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComplianceRate {
    fn cmp(&self, other: &Self) -> Ordering {
        let (lhs, rhs) = self.cross_terms(other);
        lhs.cmp(&rhs)
    }
}

// ---------------------------------------------------------------------------
// Summary types
// ---------------------------------------------------------------------------

/// Compliance record for one site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSummary {
    pub site: String,
    pub sample_count: usize,
    pub compliant_count: usize,
    /// Occurrences of each breached parameter across this site's failing
    /// samples. A multi-breach sample counts toward every parameter it
    /// breached.
    pub breach_counts: BTreeMap<Parameter, usize>,
    /// Compliance rate is below the configured target.
    pub action_required: bool,
}

impl SiteSummary {
    pub fn compliance_rate(&self) -> ComplianceRate {
        ComplianceRate::new(self.compliant_count, self.sample_count)
    }

    pub fn non_compliant_count(&self) -> usize {
        self.sample_count - self.compliant_count
    }

    /// Orders by descending compliance rate, then ascending site code.
    /// Equal fractions tie exactly.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .compliance_rate()
            .cmp(&self.compliance_rate())
            .then_with(|| self.site.cmp(&other.site))
    }
}

/// One row of the dataset-wide breach breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct BreachCause {
    pub parameter: Parameter,
    pub count: usize,
    /// Fraction of all recorded breaches attributable to this parameter.
    pub share: f64,
}

/// Dataset-wide compliance picture.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplianceSummary {
    /// Ranked best to worst.
    pub sites: Vec<SiteSummary>,
    pub total_samples: usize,
    pub compliant_samples: usize,
    /// Sorted by descending count, then parameter order.
    pub breach_causes: Vec<BreachCause>,
}

impl ComplianceSummary {
    pub fn overall_rate(&self) -> ComplianceRate {
        ComplianceRate::new(self.compliant_samples, self.total_samples)
    }

    pub fn total_breaches(&self) -> usize {
        self.breach_causes.iter().map(|c| c.count).sum()
    }

    pub fn site(&self, code: &str) -> Option<&SiteSummary> {
        self.sites.iter().find(|s| s.site == code)
    }

    pub fn sites_requiring_action(&self) -> impl Iterator<Item = &SiteSummary> {
        self.sites.iter().filter(|s| s.action_required)
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Groups evaluation results by site and ranks the sites.
///
/// Produces exactly one summary per distinct site present in `results`.
pub fn summarize_sites(results: &[EvaluationResult], compliance_target: f64) -> Vec<SiteSummary> {
    let mut by_site: BTreeMap<&str, SiteSummary> = BTreeMap::new();

    for result in results {
        let summary = by_site
            .entry(result.site.as_str())
            .or_insert_with(|| SiteSummary {
                site: result.site.clone(),
                sample_count: 0,
                compliant_count: 0,
                breach_counts: BTreeMap::new(),
                action_required: false,
            });

        summary.sample_count += 1;
        if result.passed() {
            summary.compliant_count += 1;
        }
        for &parameter in &result.breaches {
            *summary.breach_counts.entry(parameter).or_insert(0) += 1;
        }
    }

    let mut sites: Vec<SiteSummary> = by_site
        .into_values()
        .map(|mut s| {
            s.action_required = s.compliance_rate().is_below(compliance_target);
            s
        })
        .collect();
    sites.sort_by(SiteSummary::rank_cmp);
    sites
}

/// Breach counts across all sites with each parameter's share of the total.
pub fn breach_causes(results: &[EvaluationResult]) -> Vec<BreachCause> {
    let mut counts: BTreeMap<Parameter, usize> = BTreeMap::new();
    for result in results {
        for &parameter in &result.breaches {
            *counts.entry(parameter).or_insert(0) += 1;
        }
    }

    let total: usize = counts.values().sum();
    let mut causes: Vec<BreachCause> = counts
        .into_iter()
        .map(|(parameter, count)| BreachCause {
            parameter,
            count,
            share: count as f64 / total as f64,
        })
        .collect();
    causes.sort_by(|a, b| b.count.cmp(&a.count).then(a.parameter.cmp(&b.parameter)));
    causes
}

/// Builds the full compliance summary from every evaluation result.
pub fn summarize(results: &[EvaluationResult], compliance_target: f64) -> ComplianceSummary {
    ComplianceSummary {
        sites: summarize_sites(results, compliance_target),
        total_samples: results.len(),
        compliant_samples: results.iter().filter(|r| r.passed()).count(),
        breach_causes: breach_causes(results),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SampleId;

    fn result(id: usize, site: &str, breaches: &[Parameter]) -> EvaluationResult {
        EvaluationResult {
            sample_id: SampleId(id),
            site: site.to_string(),
            breaches: breaches.to_vec(),
        }
    }

    fn fixture() -> Vec<EvaluationResult> {
        vec![
            result(0, "Site A", &[]),
            result(1, "Site A", &[]),
            result(2, "Site A", &[Parameter::Turbidity]),
            result(3, "Site B", &[]),
            result(4, "Site B", &[Parameter::Ph, Parameter::Turbidity, Parameter::Chlorine]),
            result(5, "Site C", &[]),
            result(6, "Site C", &[]),
            result(7, "Site C", &[]),
        ]
    }

    #[test]
    fn test_one_summary_per_site_and_no_dropped_samples() {
        let sites = summarize_sites(&fixture(), 0.9);
        assert_eq!(sites.len(), 3);
        let total: usize = sites.iter().map(|s| s.sample_count).sum();
        assert_eq!(total, fixture().len(), "every sample must land in exactly one site");
    }

    #[test]
    fn test_ranked_by_descending_rate() {
        let sites = summarize_sites(&fixture(), 0.9);
        let order: Vec<&str> = sites.iter().map(|s| s.site.as_str()).collect();
        assert_eq!(order, ["Site C", "Site A", "Site B"]);
        assert_eq!(sites[0].compliance_rate(), ComplianceRate::new(1, 1));
        assert_eq!(sites[2].compliance_rate(), ComplianceRate::new(1, 2));
        assert_eq!(sites[2].compliance_rate().as_f64(), 0.5);
    }

    #[test]
    fn test_equal_rates_tie_break_on_site_code() {
        let results = vec![
            result(0, "Site D", &[]),
            result(1, "Site D", &[Parameter::Lead]),
            result(2, "Site B", &[]),
            result(3, "Site B", &[]),
            result(4, "Site B", &[Parameter::Lead]),
            result(5, "Site B", &[Parameter::Nitrate]),
        ];
        let sites = summarize_sites(&results, 0.9);
        let order: Vec<&str> = sites.iter().map(|s| s.site.as_str()).collect();
        assert_eq!(order, ["Site B", "Site D"], "1/2 and 2/4 are the same rate");
    }

    #[test]
    fn test_multi_breach_sample_counts_toward_every_parameter() {
        let sites = summarize_sites(&fixture(), 0.9);
        let site_b = sites.iter().find(|s| s.site == "Site B").expect("Site B");
        assert_eq!(site_b.non_compliant_count(), 1);
        assert_eq!(site_b.breach_counts.get(&Parameter::Ph), Some(&1));
        assert_eq!(site_b.breach_counts.get(&Parameter::Turbidity), Some(&1));
        assert_eq!(site_b.breach_counts.get(&Parameter::Chlorine), Some(&1));
        assert_eq!(site_b.breach_counts.get(&Parameter::Lead), None);
    }

    #[test]
    fn test_rate_times_count_is_compliant_count() {
        for site in summarize_sites(&fixture(), 0.9) {
            let rate = site.compliance_rate();
            assert!((0.0..=1.0).contains(&rate.as_f64()));
            assert_eq!(
                rate.applied_to(site.sample_count),
                Some(site.compliant_count),
                "rate drift at {}",
                site.site
            );
        }
    }

    #[test]
    fn test_rate_is_exact_where_floats_drift() {
        // 15/22 × 22 is 14.999999999999998 in f64.
        let site = SiteSummary {
            site: "Site E".to_string(),
            sample_count: 22,
            compliant_count: 15,
            breach_counts: BTreeMap::new(),
            action_required: true,
        };
        assert_eq!(site.compliance_rate().applied_to(22), Some(15));
        assert_eq!(site.compliance_rate().applied_to(44), Some(30));
        assert_eq!(site.compliance_rate().applied_to(7), None, "not a whole count");
    }

    #[test]
    fn test_rate_equality_and_order_are_exact() {
        assert_eq!(ComplianceRate::new(1, 2), ComplianceRate::new(2, 4));
        assert!(ComplianceRate::new(2, 3) > ComplianceRate::new(13, 20));
        assert_eq!(ComplianceRate::new(0, 0), ComplianceRate::new(0, 5));
    }

    #[test]
    fn test_target_comparison_at_the_boundary() {
        // Exactly on target is not below it.
        assert!(!ComplianceRate::new(9, 10).is_below(0.9));
        assert!(!ComplianceRate::new(27, 30).is_below(0.9));
        assert!(ComplianceRate::new(26, 30).is_below(0.9));
        assert!(!ComplianceRate::new(0, 4).is_below(0.0));
        assert!(ComplianceRate::new(99, 100).is_below(1.0));
    }

    #[test]
    fn test_action_required_below_target() {
        let sites = summarize_sites(&fixture(), 0.9);
        let flagged: Vec<&str> = sites
            .iter()
            .filter(|s| s.action_required)
            .map(|s| s.site.as_str())
            .collect();
        assert_eq!(flagged, ["Site A", "Site B"]);
    }

    #[test]
    fn test_breach_causes_shares_sum_to_one() {
        let causes = breach_causes(&fixture());
        assert_eq!(causes[0].parameter, Parameter::Turbidity);
        assert_eq!(causes[0].count, 2);
        let total_share: f64 = causes.iter().map(|c| c.share).sum();
        assert!((total_share - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_summary_overall_rate() {
        let summary = summarize(&fixture(), 0.9);
        assert_eq!(summary.total_samples, 8);
        assert_eq!(summary.compliant_samples, 6);
        assert_eq!(summary.overall_rate(), ComplianceRate::new(3, 4));
        assert_eq!(summary.total_breaches(), 4);
        assert_eq!(summary.sites_requiring_action().count(), 2);
        assert!(summary.site("Site C").is_some());
    }

    #[test]
    fn test_no_breaches_gives_empty_cause_list() {
        let results = vec![result(0, "Site A", &[])];
        assert!(breach_causes(&results).is_empty());
    }
}
