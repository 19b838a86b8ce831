use chrono::{Duration, NaiveDate};
use ops_report::{
    dataset::Dataset,
    filter::{self, DateSelection, PeriodSelection, PeriodSubset},
    insight::{self, InsightConfig},
    schema::{self, ClassifierOptions},
    stats,
};
use proptest::prelude::*;

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn dataset_from(values: &[(u8, i32)]) -> Dataset {
    let rows = values
        .iter()
        .map(|(offset, value)| {
            let date = base() + Duration::days(i64::from(*offset));
            vec![date.format("%Y-%m-%d").to_string(), value.to_string()]
        })
        .collect();
    Dataset::from_text_rows("prop", vec!["date".into(), "value".into()], rows).unwrap()
}

fn selection(start: u8, len: u8) -> DateSelection {
    let start_date = base() + Duration::days(i64::from(start));
    let end_date = start_date + Duration::days(i64::from(len));
    DateSelection::range(start_date, end_date).unwrap()
}

proptest! {
    #[test]
    fn date_filter_is_inclusive_and_idempotent(
        values in prop::collection::vec((0u8..40, -1000i32..1000), 1..60),
        start in 0u8..40,
        len in 0u8..10,
    ) {
        let dataset = dataset_from(&values);
        let profiles = schema::classify_columns(&dataset, &ClassifierOptions::default());
        let window = selection(start, len);

        let subset = filter::filter_by_date(&dataset, &profiles, "date", &window).unwrap();
        let expected = values
            .iter()
            .filter(|(offset, _)| *offset >= start && u16::from(*offset) <= u16::from(start) + u16::from(len))
            .count();
        prop_assert_eq!(subset.len(), expected);

        let narrowed = subset.materialize(&dataset);
        let again = filter::filter_by_date(&narrowed, &profiles, "date", &window).unwrap();
        prop_assert_eq!(again.len(), narrowed.row_count());
    }

    #[test]
    fn summary_statistics_are_ordered(values in prop::collection::vec(-1.0e6f64..1.0e6, 1..50)) {
        let rows = values
            .iter()
            .map(|v| vec!["2024-01-01".to_string(), format!("{v}")])
            .collect();
        let dataset = Dataset::from_text_rows("prop", vec!["date".into(), "value".into()], rows).unwrap();
        let all = (0..values.len()).collect::<Vec<_>>();
        let summary = stats::summarize_column(&dataset, 1, &all).unwrap();

        prop_assert!(summary.min <= summary.mean && summary.mean <= summary.max);
        prop_assert!(summary.min <= summary.median && summary.median <= summary.max);
        if let Some(std_dev) = summary.std_dev {
            prop_assert!(std_dev >= 0.0);
        } else {
            prop_assert_eq!(values.len(), 1);
        }
    }

    #[test]
    fn delta_present_only_with_both_aggregates(
        current in prop::collection::vec(-500i32..500, 0..6),
        previous in prop::collection::vec(-500i32..500, 0..6),
    ) {
        let mut values = previous.iter().map(|v| (0u8, *v)).collect::<Vec<_>>();
        values.extend(current.iter().map(|v| (1u8, *v)));
        values.push((5, 0));
        let dataset = dataset_from(&values);
        let profiles = schema::classify_columns(&dataset, &ClassifierOptions::default());
        let rows_on = |day: u8| {
            values
                .iter()
                .enumerate()
                .filter(|(_, (offset, _))| *offset == day)
                .map(|(idx, _)| idx)
                .collect::<Vec<_>>()
        };
        let periods = PeriodSelection {
            current: PeriodSubset { selection: selection(1, 0), rows: rows_on(1) },
            previous: Some(PeriodSubset { selection: selection(0, 0), rows: rows_on(0) }),
        };
        let metrics = stats::compute_metrics(&dataset, &profiles, &periods, &["value".to_string()]).unwrap();

        if current.is_empty() {
            prop_assert!(metrics.records.is_empty());
        } else {
            let record = metrics.record("value").unwrap();
            let previous_mean = record.previous.as_ref().map(|s| s.mean);
            let expected = record.current.is_some()
                && previous_mean.is_some_and(|mean| mean != 0.0);
            prop_assert_eq!(record.delta_pct.is_some(), expected);
            prop_assert_eq!(record.previous.is_some(), !previous.is_empty());
        }
    }

    #[test]
    fn no_insight_without_comparison_or_history(values in prop::collection::vec(-500i32..500, 1..6)) {
        let rows = values.iter().map(|v| (0u8, *v)).collect::<Vec<_>>();
        let dataset = dataset_from(&rows);
        let profiles = schema::classify_columns(&dataset, &ClassifierOptions::default());
        let single = selection(0, 0);
        let periods = filter::select_periods(&dataset, &profiles, "date", &single).unwrap();
        prop_assert!(periods.previous.is_none());

        let metrics = stats::compute_metrics(&dataset, &profiles, &periods, &[]).unwrap();
        let histories = insight::build_history(
            &dataset, &profiles, "date", &single, &["value".to_string()], 7,
        ).unwrap();
        let insights = insight::generate_insights(&metrics, &single, &histories, &InsightConfig::default());
        prop_assert!(insights.is_empty());
    }
}
