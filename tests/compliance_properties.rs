use chrono::NaiveDate;
use proptest::prelude::*;

use wq_compliance::analysis::anomaly::{flag_top_fraction, flagged_count};
use wq_compliance::analysis::control_chart::ControlLimits;
use wq_compliance::analysis::site_summary::{ComplianceRate, summarize};
use wq_compliance::compliance::{ThresholdTable, evaluate_all, evaluate_sample};
use wq_compliance::config::ControlChartConfig;
use wq_compliance::model::{Parameter, Sample, SampleId};

fn sample(id: usize, site: &str, values: [f64; 5]) -> Sample {
    Sample {
        id: SampleId(id),
        site: site.to_string(),
        timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
        ph: values[0],
        turbidity_ntu: values[1],
        chlorine_mgl: values[2],
        nitrate_mgl: values[3],
        lead_ugl: values[4],
        bacteria_cfu: None,
    }
}

fn values() -> impl Strategy<Value = [f64; 5]> {
    (
        4.0f64..11.0,
        0.0f64..8.0,
        0.0f64..1.5,
        0.0f64..20.0,
        0.0f64..20.0,
    )
        .prop_map(|(a, b, c, d, e)| [a, b, c, d, e])
}

proptest! {
    #[test]
    fn breach_iff_outside_regulatory_bounds(v in values()) {
        let table = ThresholdTable::default();
        let result = evaluate_sample(&sample(0, "Site A", v), &table);

        let expected = [
            (Parameter::Ph, v[0] < 6.5 || v[0] > 9.5),
            (Parameter::Turbidity, v[1] >= 4.0),
            (Parameter::Chlorine, v[2] <= 0.2),
            (Parameter::Nitrate, v[3] >= 11.3),
            (Parameter::Lead, v[4] >= 10.0),
        ];
        for (parameter, breached) in expected {
            prop_assert_eq!(result.breaches.contains(&parameter), breached, "{}", parameter);
        }
    }

    #[test]
    fn passed_iff_no_breaches(v in values()) {
        let result = evaluate_sample(&sample(0, "Site B", v), &ThresholdTable::default());
        prop_assert_eq!(result.passed(), result.breaches.is_empty());
    }

    #[test]
    fn breaches_follow_table_order_without_duplicates(v in values()) {
        let result = evaluate_sample(&sample(0, "Site C", v), &ThresholdTable::default());
        let mut sorted = result.breaches.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted, result.breaches);
    }

    #[test]
    fn site_counts_are_conserved(rows in prop::collection::vec((0usize..6, values()), 1..80)) {
        let sites = ["Site A", "Site B", "Site C", "Site D", "Site E", "Site F"];
        let samples: Vec<Sample> = rows
            .iter()
            .enumerate()
            .map(|(i, (s, v))| sample(i, sites[*s], *v))
            .collect();
        let summary = summarize(&evaluate_all(&samples, &ThresholdTable::default()), 0.9);

        let per_site: usize = summary.sites.iter().map(|s| s.sample_count).sum();
        prop_assert_eq!(per_site, samples.len());
        let compliant: usize = summary.sites.iter().map(|s| s.compliant_count).sum();
        prop_assert_eq!(compliant, summary.compliant_samples);

        for site in &summary.sites {
            let rate = site.compliance_rate();
            prop_assert!((0.0..=1.0).contains(&rate.as_f64()));
            prop_assert_eq!(site.action_required, site.compliant_count * 10 < site.sample_count * 9);
            prop_assert_eq!(rate.applied_to(site.sample_count), Some(site.compliant_count));
        }
        for pair in summary.sites.windows(2) {
            prop_assert!(pair[0].compliance_rate() >= pair[1].compliance_rate());
        }
    }

    #[test]
    fn rate_times_count_is_compliant_count(compliant in 0usize..500, extra in 0usize..500, scale in 1usize..20) {
        let total = compliant + extra;
        let rate = ComplianceRate::new(compliant, total);
        prop_assert_eq!(rate.applied_to(total), Some(compliant));
        prop_assert_eq!(rate.applied_to(total * scale), Some(compliant * scale));
        prop_assert_eq!(rate, ComplianceRate::new(compliant * scale, total * scale));
    }

    #[test]
    fn exactly_rounded_fraction_is_flagged(
        scores in prop::collection::vec(0.0f64..1.0, 1..200),
        contamination in 0.01f64..0.5,
    ) {
        let ids: Vec<SampleId> = (0..scores.len()).map(SampleId).collect();
        let flags = flag_top_fraction(&ids, &scores, contamination);

        prop_assert_eq!(flags.len(), scores.len());
        let flagged = flags.iter().filter(|f| f.is_anomaly).count();
        prop_assert_eq!(flagged, flagged_count(scores.len(), contamination));

        // No unflagged sample outscores a flagged one.
        let min_flagged = flags.iter().filter(|f| f.is_anomaly).map(|f| f.score).fold(f64::INFINITY, f64::min);
        for f in flags.iter().filter(|f| !f.is_anomaly) {
            prop_assert!(f.score <= min_flagged);
        }
    }

    #[test]
    fn control_limits_are_ordered(
        values in prop::collection::vec(0.0f64..10.0, 1..100),
        subgroup_size in 1usize..5,
    ) {
        let config = ControlChartConfig {
            subgroup_size,
            ..ControlChartConfig::default()
        };
        let limits = ControlLimits::from_values(&values, &config).expect("non-empty");
        prop_assert!(limits.lcl >= 0.0);
        prop_assert!(limits.lcl <= limits.center);
        prop_assert!(limits.center <= limits.ucl);
        prop_assert!(!limits.is_out_of_control(limits.center));
    }
}
