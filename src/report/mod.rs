/// Human-facing output of an analysis run.
///
/// The console summary is built as a string by `format_summary` so tests
/// can inspect it; `print_summary` writes it to stdout. Image rendering
/// lives in `charts`.

pub mod charts;

use std::fmt::Write;

use crate::analysis::control_chart::ControlChart;
use crate::config::AnalysisConfig;
use crate::model::Parameter;
use crate::pipeline::AnalysisReport;
use crate::sites;

const RULE: &str = "═══════════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────────";

/// Marker appended to sites below the compliance target.
pub const ACTION_REQUIRED: &str = "⚠️  ACTION REQUIRED";

pub fn print_summary(report: &AnalysisReport, config: &AnalysisConfig) {
    print!("{}", format_summary(report, config));
}

/// The full console summary.
pub fn format_summary(report: &AnalysisReport, config: &AnalysisConfig) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_summary(&mut out, report, config);
    out
}

fn write_summary(out: &mut String, report: &AnalysisReport, config: &AnalysisConfig) -> std::fmt::Result {
    let o = &report.overview;
    let c = &report.compliance;

    writeln!(out)?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "💧 WATER QUALITY COMPLIANCE ANALYSIS")?;
    writeln!(out, "{}", RULE)?;
    writeln!(
        out,
        "Loaded {} samples from {} treatment sites",
        o.sample_count, o.site_count
    )?;
    writeln!(
        out,
        "Date range: {} → {}",
        o.first_timestamp.date(),
        o.last_timestamp.date()
    )?;
    writeln!(out)?;

    writeln!(out, "{:<12} {:>9} {:>9} {:>9} {:>9}", "Parameter", "Mean", "Std", "Min", "Max")?;
    writeln!(out, "{}", THIN_RULE)?;
    for stats in &o.parameters {
        writeln!(
            out,
            "{:<12} {:>9.3} {:>9.3} {:>9.3} {:>9.3}",
            stats.parameter.name(),
            stats.mean,
            stats.std,
            stats.min,
            stats.max
        )?;
    }
    writeln!(out)?;

    // ── Compliance ──────────────────────────────────────────────────────
    writeln!(
        out,
        "OVERALL COMPLIANCE RATE: {:.1}% ({}/{})",
        c.overall_rate().as_percent(),
        c.compliant_samples,
        c.total_samples
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "Compliance by site (target {:.0}%):",
        config.compliance_target * 100.0
    )?;
    for site in &c.sites {
        let marker = if site.action_required { ACTION_REQUIRED } else { "" };
        writeln!(
            out,
            "  {:<8} {:<24} {:>5.1}%  ({}/{}, {} failing)  {}",
            site.site,
            sites::display_name(&site.site),
            site.compliance_rate().as_percent(),
            site.compliant_count,
            site.sample_count,
            site.non_compliant_count(),
            marker
        )?;
    }
    writeln!(out)?;

    if c.breach_causes.is_empty() {
        writeln!(out, "No threshold breaches recorded.")?;
    } else {
        writeln!(out, "Breach causes ({} breaches):", c.total_breaches())?;
        for cause in &c.breach_causes {
            writeln!(
                out,
                "  {:<12} {:>4}  ({:.1}%)",
                cause.parameter.name(),
                cause.count,
                cause.share * 100.0
            )?;
        }
    }
    writeln!(out)?;

    // ── Anomalies ───────────────────────────────────────────────────────
    let r = &report.reconciliation;
    writeln!(
        out,
        "Anomalies detected ({}): {}",
        report.model_name,
        report.anomaly_count()
    )?;
    writeln!(
        out,
        "  also breaching a rule: {}   rule breaches missed by model: {}",
        r.both.len(),
        r.rule_only.len()
    )?;
    if let Some(agreement) = r.rule_agreement() {
        writeln!(
            out,
            "  rules agree with {:.0}% of model flags",
            agreement * 100.0
        )?;
    }
    writeln!(
        out,
        "  ML-only (anomalous but rule-compliant): {}",
        r.ml_only.len()
    )?;
    let ml_only = report.ml_only_samples();
    if !ml_only.is_empty() {
        writeln!(
            out,
            "    {:<10} {:<8} {:>5} {:>7} {:>6} {:>6} {:>6}",
            "Date", "Site", "pH", "Turb", "Cl", "NO3", "Pb"
        )?;
        for s in ml_only {
            writeln!(
                out,
                "    {:<10} {:<8} {:>5.2} {:>7.2} {:>6.2} {:>6.2} {:>6.2}",
                s.timestamp.date(),
                s.site,
                s.ph,
                s.turbidity_ntu,
                s.chlorine_mgl,
                s.nitrate_mgl,
                s.lead_ugl
            )?;
        }
    }
    writeln!(out)?;

    // ── SPC ─────────────────────────────────────────────────────────────
    write_chart_block(out, &report.turbidity_chart)?;
    for chart in &report.site_charts {
        let ooc = chart.out_of_control_points().count();
        writeln!(
            out,
            "  {:<8} mean {:>6.3}  UCL {:>6.3}  LCL {:>6.3}  out-of-control {}",
            chart.label, chart.limits.center, chart.limits.ucl, chart.limits.lcl, ooc
        )?;
    }
    writeln!(out, "{}", RULE)?;
    Ok(())
}

fn write_chart_block(out: &mut String, chart: &ControlChart) -> std::fmt::Result {
    let l = &chart.limits;
    writeln!(
        out,
        "{} SPC ({}, subgroup size {}):",
        Parameter::Turbidity.name(),
        chart.label,
        l.subgroup_size
    )?;
    writeln!(
        out,
        "  Mean {:.3} {}  UCL {:.3}  LCL {:.3}",
        l.center,
        Parameter::Turbidity.unit(),
        l.ucl,
        l.lcl
    )?;
    if let Some(limit) = chart.regulatory_limit() {
        writeln!(
            out,
            "  Regulatory limit {:.1} {}  ({} points at or above)",
            limit,
            Parameter::Turbidity.unit(),
            chart.regulatory_breach_points().count()
        )?;
    }
    writeln!(
        out,
        "  Out-of-control points: {}",
        chart.out_of_control_points().count()
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
