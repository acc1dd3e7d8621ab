//! PNG charts for an analysis run.
//!
//! Three images: site compliance with breach causes, the turbidity control
//! chart, and per-parameter distributions by site. Each renderer returns a
//! `RenderError` on failure; `render_all` attempts every image regardless.

use std::error::Error;
use std::ops::Range;
use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::analysis::anomaly::BACTERIA_FEATURE;
use crate::config::AnalysisConfig;
use crate::model::{Parameter, RenderError, Sample};
use crate::pipeline::AnalysisReport;

type DrawResult = Result<(), Box<dyn Error>>;
type Panel<'a> = DrawingArea<BitMapBackend<'a>, Shift>;
type Renderer = fn(&Path, &AnalysisReport, &AnalysisConfig) -> Result<(), RenderError>;

const PASS: RGBColor = RGBColor(16, 185, 129);
const FAIL: RGBColor = RGBColor(239, 68, 68);
const AMBER: RGBColor = RGBColor(245, 158, 11);
const SERIES: RGBColor = RGBColor(37, 99, 235);
const CENTER: RGBColor = RGBColor(5, 150, 105);

const SITE_COLORS: [RGBColor; 6] = [
    RGBColor(0, 200, 255),
    RGBColor(16, 185, 129),
    RGBColor(245, 158, 11),
    RGBColor(239, 68, 68),
    RGBColor(139, 92, 246),
    RGBColor(236, 72, 153),
];

fn site_color(index: usize) -> RGBColor {
    SITE_COLORS[index % SITE_COLORS.len()]
}

/// Half the width of a category bar, in category units.
const BAR_HALF_WIDTH: f64 = 0.35;

/// X range for `n` categories centred on 0..n-1, with no empty slot after
/// the last one.
fn category_axis(n: usize) -> Range<f64> {
    -0.5..n.max(1) as f64 - 0.5
}

/// Tick label for a category axis: the label of the category at `x`, or
/// nothing between categories.
fn category_label(labels: &[String], x: f64) -> String {
    let nearest = x.round();
    if (x - nearest).abs() > 1e-6 || nearest < 0.0 {
        return String::new();
    }
    labels.get(nearest as usize).cloned().unwrap_or_default()
}

fn category_bar(i: usize, height: f64, color: RGBColor) -> Rectangle<(f64, f64)> {
    let x = i as f64;
    Rectangle::new(
        [(x - BAR_HALF_WIDTH, 0.0), (x + BAR_HALF_WIDTH, height)],
        color.filled(),
    )
}

/// Plot-area height of the SPC chart, in pixels.
const SPC_PLOT_HEIGHT: f64 = 400.0;
const LEGEND_ROW_HEIGHT: f64 = 20.0;

/// Upper y bound that leaves the top band of the plot clear for a legend
/// of `legend_rows` entries, so no data point sits under it.
fn y_max_with_legend_band(data_max: f64, legend_rows: usize) -> f64 {
    let band = ((legend_rows as f64 + 1.0) * LEGEND_ROW_HEIGHT / SPC_PLOT_HEIGHT).min(0.6);
    data_max.max(1.0) * 1.05 / (1.0 - band)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Renders every chart into the configured output directory.
///
/// Returns the paths written and the failures, in that order.
pub fn render_all(report: &AnalysisReport, config: &AnalysisConfig) -> (Vec<PathBuf>, Vec<RenderError>) {
    let jobs: [(PathBuf, Renderer); 3] = [
        (config.compliance_overview_path(), render_compliance_overview),
        (config.turbidity_spc_path(), render_turbidity_spc),
        (config.parameter_distributions_path(), render_parameter_distributions),
    ];

    let mut written = Vec::new();
    let mut failures = Vec::new();
    for (path, render) in jobs {
        match render(&path, report, config) {
            Ok(()) => written.push(path),
            Err(e) => failures.push(e),
        }
    }
    (written, failures)
}

pub fn render_compliance_overview(
    path: &Path,
    report: &AnalysisReport,
    config: &AnalysisConfig,
) -> Result<(), RenderError> {
    draw_compliance_overview(path, report, config).map_err(|e| render_error(path, e))
}

pub fn render_turbidity_spc(
    path: &Path,
    report: &AnalysisReport,
    config: &AnalysisConfig,
) -> Result<(), RenderError> {
    draw_turbidity_spc(path, report, config).map_err(|e| render_error(path, e))
}

pub fn render_parameter_distributions(
    path: &Path,
    report: &AnalysisReport,
    config: &AnalysisConfig,
) -> Result<(), RenderError> {
    draw_parameter_distributions(path, report, config).map_err(|e| render_error(path, e))
}

fn render_error(path: &Path, err: Box<dyn Error>) -> RenderError {
    RenderError {
        image: path.display().to_string(),
        message: err.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Compliance overview
// ---------------------------------------------------------------------------

fn draw_compliance_overview(path: &Path, report: &AnalysisReport, config: &AnalysisConfig) -> DrawResult {
    let root = BitMapBackend::new(path, (1400, 520)).into_drawing_area();
    root.fill(&WHITE)?;
    let (left, right) = root.split_horizontally(760);

    draw_site_rates(&left, report, config)?;
    draw_breach_causes(&right, report)?;

    root.present()?;
    Ok(())
}

fn draw_site_rates(area: &Panel<'_>, report: &AnalysisReport, config: &AnalysisConfig) -> DrawResult {
    let sites = &report.compliance.sites;
    let n = sites.len();
    let labels: Vec<String> = sites.iter().map(|s| s.site.clone()).collect();

    let mut chart = ChartBuilder::on(area)
        .caption("Compliance rate by site", ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(category_axis(n), 0f64..110f64)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_desc("Site")
        .y_desc("Compliant samples (%)")
        .x_label_formatter(&|x: &f64| category_label(&labels, *x))
        .draw()?;

    chart.draw_series(sites.iter().enumerate().map(|(i, s)| {
        let color = if s.action_required { FAIL } else { PASS };
        category_bar(i, s.compliance_rate().as_percent(), color)
    }))?;

    chart.draw_series(sites.iter().enumerate().map(|(i, s)| {
        let rate = s.compliance_rate().as_percent();
        Text::new(
            format!("{:.0}%", rate),
            (i as f64 - BAR_HALF_WIDTH / 2.0, rate + 4.0),
            ("sans-serif", 14),
        )
    }))?;

    let target = config.compliance_target * 100.0;
    let x_range = category_axis(n);
    chart
        .draw_series(LineSeries::new(
            vec![(x_range.start, target), (x_range.end, target)],
            AMBER.stroke_width(2),
        ))?
        .label(format!("Target {:.0}%", target))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], AMBER.stroke_width(2)));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

fn draw_breach_causes(area: &Panel<'_>, report: &AnalysisReport) -> DrawResult {
    let causes = &report.compliance.breach_causes;
    if causes.is_empty() {
        area.draw(&Text::new(
            "No threshold breaches",
            (200, 240),
            ("sans-serif", 22),
        ))?;
        return Ok(());
    }

    let n = causes.len();
    let labels: Vec<String> = causes.iter().map(|c| c.parameter.name().to_string()).collect();
    let y_max = causes.iter().map(|c| c.count).max().unwrap_or(1) as f64 * 1.25;

    let mut chart = ChartBuilder::on(area)
        .caption("Breach causes", ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(category_axis(n), 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .y_desc("Breaches")
        .x_label_formatter(&|x: &f64| category_label(&labels, *x))
        .draw()?;

    chart.draw_series(
        causes
            .iter()
            .enumerate()
            .map(|(i, c)| category_bar(i, c.count as f64, parameter_color(c.parameter))),
    )?;

    chart.draw_series(causes.iter().enumerate().map(|(i, c)| {
        Text::new(
            format!("{} ({:.0}%)", c.count, c.share * 100.0),
            (i as f64 - BAR_HALF_WIDTH, c.count as f64 + y_max * 0.06),
            ("sans-serif", 14),
        )
    }))?;
    Ok(())
}

fn parameter_color(parameter: Parameter) -> RGBColor {
    let index = Parameter::ALL.iter().position(|p| *p == parameter).unwrap_or(0);
    site_color(index)
}

// ---------------------------------------------------------------------------
// Turbidity SPC
// ---------------------------------------------------------------------------

fn draw_turbidity_spc(path: &Path, report: &AnalysisReport, config: &AnalysisConfig) -> DrawResult {
    let spc = &report.turbidity_chart;
    let limits = &spc.limits;
    let points = &spc.points;
    let regulatory = spc.regulatory_limit();

    let data_max = points
        .iter()
        .map(|p| p.value)
        .fold(limits.ucl, f64::max)
        .max(regulatory.unwrap_or(0.0));
    // Series, mean, UCL, LCL, out-of-control, breach, plus the regulatory line.
    let legend_rows = 6 + usize::from(regulatory.is_some());
    let y_max = y_max_with_legend_band(data_max, legend_rows);
    let x_max = (points.len() as f64 - 1.0).max(1.0);

    let root = BitMapBackend::new(path, (1500, 520)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!(
                "Turbidity control chart ({}), {}-sigma limits",
                spc.label, config.control_chart.sigma_multiplier
            ),
            ("sans-serif", 24),
        )
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..x_max, 0f64..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Sample (time order)")
        .y_desc("Turbidity (NTU)")
        .x_label_formatter(&|x: &f64| {
            points
                .get(x.round() as usize)
                .map(|p| p.timestamp.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        })
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            points.iter().map(|p| (p.index as f64, p.value)),
            SERIES.stroke_width(1),
        ))?
        .label("Turbidity")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], SERIES));

    let horizontal = |y: f64| vec![(0.0, y), (x_max, y)];

    chart
        .draw_series(LineSeries::new(horizontal(limits.center), CENTER.stroke_width(2)))?
        .label(format!("Mean {:.3}", limits.center))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], CENTER.stroke_width(2)));

    chart
        .draw_series(LineSeries::new(horizontal(limits.ucl), FAIL.stroke_width(2)))?
        .label(format!("UCL {:.3}", limits.ucl))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], FAIL.stroke_width(2)));

    chart
        .draw_series(LineSeries::new(horizontal(limits.lcl), FAIL.mix(0.6).stroke_width(2)))?
        .label(format!("LCL {:.3}", limits.lcl))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], FAIL.mix(0.6).stroke_width(2)));

    if let Some(limit) = regulatory {
        chart
            .draw_series(LineSeries::new(horizontal(limit), AMBER.stroke_width(3)))?
            .label(format!("Regulatory limit {:.1}", limit))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], AMBER.stroke_width(3)));
    }

    chart
        .draw_series(
            spc.out_of_control_points()
                .map(|p| Circle::new((p.index as f64, p.value), 6, FAIL.filled())),
        )?
        .label("Out of control")
        .legend(|(x, y)| Circle::new((x + 10, y), 5, FAIL.filled()));

    chart
        .draw_series(
            spc.regulatory_breach_points()
                .map(|p| Cross::new((p.index as f64, p.value), 7, BLACK.stroke_width(2))),
        )?
        .label("Regulatory breach")
        .legend(|(x, y)| Cross::new((x + 10, y), 5, BLACK.stroke_width(2)));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Parameter distributions
// ---------------------------------------------------------------------------

/// One histogram panel: a title and per-site value lists.
struct Distribution {
    title: String,
    by_site: Vec<(String, Vec<f64>)>,
}

fn distributions(samples: &[Sample]) -> Vec<Distribution> {
    let mut sites: Vec<&str> = samples.iter().map(|s| s.site.as_str()).collect();
    sites.sort_unstable();
    sites.dedup();

    let per_site = |value: &dyn Fn(&Sample) -> Option<f64>| -> Vec<(String, Vec<f64>)> {
        sites
            .iter()
            .map(|site| {
                let values = samples
                    .iter()
                    .filter(|s| s.site == *site)
                    .filter_map(value)
                    .collect();
                (site.to_string(), values)
            })
            .collect()
    };

    let mut out: Vec<Distribution> = Parameter::ALL
        .iter()
        .map(|&p| Distribution {
            title: if p.unit().is_empty() {
                p.name().to_string()
            } else {
                format!("{} ({})", p.name(), p.unit())
            },
            by_site: per_site(&|s: &Sample| Some(s.value(p))),
        })
        .collect();

    if samples.iter().any(|s| s.bacteria_cfu.is_some()) {
        out.push(Distribution {
            title: format!("{} (CFU/100mL)", BACTERIA_FEATURE),
            by_site: per_site(&|s: &Sample| s.bacteria_cfu),
        });
    }
    out
}

fn draw_parameter_distributions(path: &Path, report: &AnalysisReport, config: &AnalysisConfig) -> DrawResult {
    let root = BitMapBackend::new(path, (1500, 900)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((2, 3));

    let dists = distributions(&report.samples);
    let last = dists.len().saturating_sub(1);
    for (i, (panel, dist)) in panels.iter().zip(&dists).enumerate() {
        draw_histogram(panel, dist, config.output.histogram_bins, i == last)?;
    }

    root.present()?;
    Ok(())
}

fn draw_histogram(area: &Panel<'_>, dist: &Distribution, bins: usize, with_legend: bool) -> DrawResult {
    let all: Vec<f64> = dist.by_site.iter().flat_map(|(_, v)| v.iter().copied()).collect();
    let lo = all.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = all.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() {
        return Ok(());
    }
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };

    let bin_of = |v: f64| (((v - lo) / width).floor() as usize).min(bins - 1);
    let counts: Vec<Vec<usize>> = dist
        .by_site
        .iter()
        .map(|(_, values)| {
            let mut c = vec![0usize; bins];
            for &v in values {
                c[bin_of(v)] += 1;
            }
            c
        })
        .collect();
    let y_max = counts.iter().flatten().copied().max().unwrap_or(0).max(1) as f64 * 1.15;

    let mut chart = ChartBuilder::on(area)
        .caption(&dist.title, ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(lo..lo + width * bins as f64, 0f64..y_max)?;

    chart.configure_mesh().disable_x_mesh().y_desc("Count").draw()?;

    for (k, ((site, _), site_counts)) in dist.by_site.iter().zip(&counts).enumerate() {
        let color = site_color(k);
        chart
            .draw_series(site_counts.iter().enumerate().filter(|(_, c)| **c > 0).map(|(b, &c)| {
                let x0 = lo + b as f64 * width;
                Rectangle::new([(x0, 0.0), (x0 + width, c as f64)], color.mix(0.45).filled())
            }))?
            .label(site.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], color.mix(0.45).filled()));
    }

    if with_legend {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SampleId;
    use chrono::NaiveDate;

    fn sample(id: usize, site: &str, bacteria: Option<f64>) -> Sample {
        Sample {
            id: SampleId(id),
            site: site.to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            ph: 7.0 + id as f64 * 0.1,
            turbidity_ntu: 1.0,
            chlorine_mgl: 0.5,
            nitrate_mgl: 6.0,
            lead_ugl: 3.0,
            bacteria_cfu: bacteria,
        }
    }

    #[test]
    fn test_distributions_group_values_by_site() {
        let samples = vec![
            sample(0, "Site B", None),
            sample(1, "Site A", None),
            sample(2, "Site B", None),
        ];
        let dists = distributions(&samples);
        assert_eq!(dists.len(), 5, "no bacteria panel without bacteria data");
        assert_eq!(dists[0].title, "pH");
        assert_eq!(dists[1].title, "Turbidity (NTU)");

        let sites: Vec<&str> = dists[0].by_site.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(sites, vec!["Site A", "Site B"]);
        assert_eq!(dists[0].by_site[1].1.len(), 2);
    }

    #[test]
    fn test_bacteria_panel_added_when_present() {
        let samples = vec![sample(0, "Site A", Some(3.0)), sample(1, "Site A", None)];
        let dists = distributions(&samples);
        assert_eq!(dists.len(), 6);
        assert_eq!(dists[5].by_site[0].1, vec![3.0], "missing counts are skipped");
    }

    #[test]
    fn test_category_axis_has_no_trailing_slot() {
        let axis = category_axis(6);
        assert_eq!(axis.start, -0.5);
        assert_eq!(axis.end, 5.5, "last bar is centred half a slot from the edge");
        assert_eq!(category_axis(1), -0.5..0.5);
    }

    #[test]
    fn test_category_labels_only_at_centres() {
        let labels: Vec<String> = ["Site A", "Site B"].iter().map(|s| s.to_string()).collect();
        assert_eq!(category_label(&labels, 0.0), "Site A");
        assert_eq!(category_label(&labels, 1.0), "Site B");
        assert_eq!(category_label(&labels, 0.5), "");
        assert_eq!(category_label(&labels, 2.0), "", "no label past the last category");
        assert_eq!(category_label(&labels, -1.0), "");
    }

    #[test]
    fn test_spc_legend_band_stays_above_data() {
        for rows in [6, 7] {
            let y_max = y_max_with_legend_band(5.5, rows);
            let band = (rows as f64 + 1.0) * LEGEND_ROW_HEIGHT / SPC_PLOT_HEIGHT;
            let band_floor = y_max * (1.0 - band);
            assert!(band_floor > 5.5, "{} rows: legend starts at {} over data max 5.5", rows, band_floor);
        }
    }

    #[test]
    fn test_parameter_colors_are_distinct() {
        let colors: Vec<(u8, u8, u8)> = Parameter::ALL
            .iter()
            .map(|&p| {
                let c = parameter_color(p);
                (c.0, c.1, c.2)
            })
            .collect();
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
