//! Integration test: joining cleaned sources

use airquality_automl::data::{
    column_names, date_values, float_values, int_values, normalize, text_frame, text_values, unify,
    DatasetUnifier, JoinKind, NormalizationRules, Source, SourceRole,
};
use airquality_automl::PipelineError;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::collections::HashSet;

fn cleaned(name: &str, columns: &[&str], rows: Vec<Vec<String>>) -> DataFrame {
    let columns: Vec<String> = columns.iter().map(|s| s.to_string()).collect();
    let raw = text_frame(&columns, &rows).unwrap();
    normalize(name, &raw, &NormalizationRules::default()).unwrap().0
}

fn hourly(name: &str, value_column: &str, days: &[u32], hours: std::ops::Range<i64>, value: impl Fn(u32, i64) -> f64) -> DataFrame {
    let mut rows = Vec::new();
    for &day in days {
        for hour in hours.clone() {
            rows.push(vec![
                format!("2024-05-{:02}", day),
                hour.to_string(),
                value(day, hour).to_string(),
            ]);
        }
    }
    cleaned(name, &["fecha", "hora", value_column], rows)
}

/// (fecha, hora) of every row, in frame order
fn key_column(frame: &DataFrame) -> Vec<(NaiveDate, i64)> {
    let dates = date_values(frame, "fecha").unwrap();
    let hours = int_values(frame, "hora").unwrap();
    dates
        .into_iter()
        .zip(hours)
        .map(|(d, h)| (d.unwrap(), h.unwrap()))
        .collect()
}

fn keys(frame: &DataFrame) -> HashSet<(NaiveDate, i64)> {
    key_column(frame).into_iter().collect()
}

#[test]
fn test_inner_join_invariant() {
    let flujo = hourly("flujo_vehicular", "flujo", &[1, 2, 3], 0..24, |d, h| (d * 100) as f64 + h as f64);
    let contaminantes = hourly("contaminantes", "pm2_5", &[2, 3, 4], 0..24, |_, h| h as f64);
    let clima = hourly("clima", "temperatura", &[1, 2, 3, 4], 6..18, |_, h| 20.0 + h as f64);

    let sources = vec![
        Source::required("flujo_vehicular", flujo.clone()),
        Source::required("contaminantes", contaminantes.clone()),
        Source::required("clima", clima.clone()),
    ];
    let (unified, report) = unify(&sources).unwrap();

    let expected: HashSet<_> = keys(&flujo)
        .intersection(&keys(&contaminantes))
        .cloned()
        .collect::<HashSet<_>>()
        .intersection(&keys(&clima))
        .cloned()
        .collect();

    // days 2 and 3, hours 6..18
    assert_eq!(unified.height(), 24);
    assert_eq!(keys(&unified), expected);
    assert_eq!(column_names(&unified), &["fecha", "hora", "flujo", "pm2_5", "temperatura"]);

    let ordered = key_column(&unified);
    let mut sorted = ordered.clone();
    sorted.sort();
    assert_eq!(ordered, sorted);

    // values travel with their key
    let flujo_values = float_values(&unified, "flujo").unwrap();
    let temperatures = float_values(&unified, "temperatura").unwrap();
    for (i, (date, hour)) in ordered.iter().enumerate() {
        assert_eq!(flujo_values[i], Some(date.day() as f64 * 100.0 + *hour as f64));
        assert_eq!(temperatures[i], Some(20.0 + *hour as f64));
    }

    let steps: Vec<_> = report.steps.iter().map(|s| (s.source.as_str(), s.kind)).collect();
    assert_eq!(
        steps,
        vec![
            ("flujo_vehicular", JoinKind::Base),
            ("contaminantes", JoinKind::Inner),
            ("clima", JoinKind::Inner),
        ]
    );
    let step = report.step("contaminantes").unwrap();
    assert_eq!(step.rows_before, 72);
    assert_eq!(step.rows_after, 48);
    assert_eq!(step.rows_dropped, 24);
    assert_eq!(report.output_rows, 24);
}

#[test]
fn test_duplicates_keep_first_occurrence() {
    let flujo = cleaned(
        "flujo_vehicular",
        &["fecha", "hora", "flujo"],
        vec![
            vec!["2024-05-01".into(), "0".into(), "10".into()],
            vec!["01/05/2024".into(), "0".into(), "99".into()],
            vec!["2024-05-01".into(), "1".into(), "11".into()],
        ],
    );
    let contaminantes = hourly("contaminantes", "pm2_5", &[1], 0..2, |_, _| 5.0);

    let (unified, report) = unify(&[
        Source::required("flujo_vehicular", flujo),
        Source::required("contaminantes", contaminantes),
    ])
    .unwrap();
    assert_eq!(unified.height(), 2);
    assert_eq!(int_values(&unified, "flujo").unwrap(), vec![Some(10), Some(11)]);
    assert_eq!(report.duplicates_dropped(), 1);
}

#[test]
fn test_collisions_and_optional_left_join() {
    let contaminantes = hourly("contaminantes", "pm2_5", &[1, 2], 0..3, |_, h| h as f64);
    let clima = hourly("clima", "temperatura", &[1, 2], 0..3, |_, _| 21.0);
    // optional hourly feed with one date missing; pm2_5 collides
    let air_quality = hourly("air_quality", "pm2_5", &[1], 0..4, |_, h| 10.0 + h as f64);
    let historico = cleaned(
        "clima_historico",
        &["time", "temperatura", "condicion"],
        vec![
            vec!["2024-05-01T00:00".into(), "18".into(), "nublado".into()],
            vec!["2024-05-02T00:00".into(), "19".into(), "".into()],
            vec!["2024-05-02T12:00".into(), "23".into(), "soleado".into()],
        ],
    );

    let unifier = DatasetUnifier::new()
        .with_source("contaminantes", contaminantes, SourceRole::Required)
        .with_source("air_quality", air_quality, SourceRole::Optional)
        .with_source("clima", clima, SourceRole::Required)
        .with_source("clima_historico", historico, SourceRole::Optional);
    let (unified, report) = unifier.unify().unwrap();

    assert_eq!(
        column_names(&unified),
        &[
            "fecha",
            "hora",
            "pm2_5",
            "temperatura",
            "pm2_5_air_quality",
            "temperatura_clima_historico",
            "condicion",
        ]
    );
    // left joins never change the row count
    assert_eq!(unified.height(), 6);

    // day 1: mean of 10..13 is 11.5; day 2 absent
    let external = float_values(&unified, "pm2_5_air_quality").unwrap();
    assert_eq!(external[0], Some(11.5));
    assert_eq!(external[5], None);

    // day 2: temperatures averaged, first non-null text kept
    assert_eq!(float_values(&unified, "temperatura_clima_historico").unwrap()[4], Some(21.0));
    assert_eq!(text_values(&unified, "condicion").unwrap()[4].as_deref(), Some("soleado"));

    let left = report.step("air_quality").unwrap();
    assert_eq!(left.kind, JoinKind::Left);
    assert_eq!(left.matched_rows, 3);
    assert_eq!(left.rows_dropped, 0);
}

#[test]
fn test_join_failures() {
    let contaminantes = hourly("contaminantes", "pm2_5", &[1], 0..3, |_, _| 1.0);

    let only_optional = vec![Source::optional("contaminantes", contaminantes.clone())];
    assert!(matches!(unify(&only_optional), Err(PipelineError::JoinError(_))));

    let empty = cleaned("clima", &["fecha", "hora", "temperatura"], Vec::new());
    let with_empty = vec![
        Source::required("contaminantes", contaminantes.clone()),
        Source::required("clima", empty),
    ];
    assert!(matches!(unify(&with_empty), Err(PipelineError::JoinError(_))));

    let disjoint = hourly("clima", "temperatura", &[9], 0..3, |_, _| 20.0);
    let no_overlap = vec![
        Source::required("contaminantes", contaminantes.clone()),
        Source::required("clima", disjoint),
    ];
    assert!(matches!(unify(&no_overlap), Err(PipelineError::JoinError(_))));

    let no_hour = cleaned("clima", &["fecha", "temperatura"], vec![vec!["2024-05-01".into(), "20".into()]]);
    let missing_hour = vec![
        Source::required("contaminantes", contaminantes),
        Source::required("clima", no_hour),
    ];
    assert!(matches!(unify(&missing_hour), Err(PipelineError::SchemaError { .. })));
}
