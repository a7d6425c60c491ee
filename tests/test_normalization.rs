//! Integration test: record normalization

use airquality_automl::data::{
    column_names, date_values, float_values, int_values, normalize, text_frame, text_values, NormalizationRules,
    Violation,
};
use airquality_automl::PipelineError;
use chrono::NaiveDate;
use polars::prelude::*;

fn raw(columns: &[&str], rows: &[&[&str]]) -> DataFrame {
    let rows: Vec<Vec<&str>> = rows.iter().map(|r| r.to_vec()).collect();
    text_frame(columns, &rows).unwrap()
}

fn clima() -> DataFrame {
    raw(
        &["Fecha", " Hora ", "Temperatura", "Humedad", "Ubicación"],
        &[
            &["2024-03-01", "0", "18.5", "60", "Centro Histórico"],
            &["01/03/2024", "1", "18.0", "101", "Norte"],
            &["2024/03/01", "2", "17.5", "-1", "Norte"],
            &["no es fecha", "3", "17.0", "50", "Norte"],
            &["2024-03-01 04:00:00", "x", "16.5", "55", "SUR "],
            &["2024-03-01T05:00", "24", "16.0", "55", "Sur"],
            &["01-03-2024", "6.5", "16.0", "55", "Sur"],
            &["2024-03-01", "7", "15.5", "", "Sur"],
        ],
    )
}

#[test]
fn test_counts_and_survivors() {
    let (clean, counts) = normalize("clima", &clima(), &NormalizationRules::default()).unwrap();

    assert_eq!(column_names(&clean), &["fecha", "hora", "temperatura", "humedad", "ubicacion"]);
    assert_eq!(counts.rows_in, 8);
    assert_eq!(counts.rows_out, 2);
    assert_eq!(counts.count(Violation::InvalidDate), 1);
    assert_eq!(counts.count(Violation::HumidityOutOfRange), 3);
    assert_eq!(counts.count(Violation::HourOutOfRange), 2);
    assert_eq!(counts.hours_defaulted, 1);
    assert_eq!(counts.total_dropped() + counts.rows_out, counts.rows_in);

    let date = NaiveDate::from_ymd_opt(2024, 3, 1);
    assert_eq!(date_values(&clean, "fecha").unwrap(), vec![date, date]);
    // unparseable hour kept as 0
    assert_eq!(int_values(&clean, "hora").unwrap(), vec![Some(0), Some(0)]);
    assert_eq!(
        text_values(&clean, "ubicacion").unwrap(),
        vec![Some("centro historico".to_string()), Some("sur".to_string())]
    );
}

#[test]
fn test_normalization_is_idempotent() {
    let rules = NormalizationRules::default();
    let (once, _) = normalize("clima", &clima(), &rules).unwrap();
    let (twice, counts) = normalize("clima", &once, &rules).unwrap();

    assert!(once.equals_missing(&twice));
    assert_eq!(counts.total_dropped(), 0);
    assert_eq!(counts.hours_defaulted, 0);
}

#[test]
fn test_range_invariants_hold_on_output() {
    let contaminantes = raw(
        &["fecha", "hora", "PM2_5", "NO2", "Humedad"],
        &[
            &["2024-03-01", "0", "12.0", "3", "0"],
            &["2024-03-01", "1", "-0.5", "3", "50"],
            &["2024-03-01", "2", "40", "-2", "50"],
            &["2024-03-01", "3", "0", "0", "100"],
            &["2024-03-01", "4", "nan", "1", "50"],
            &["2024-03-01", "5", "80.2", "1", "100.5"],
        ],
    );
    let (clean, counts) = normalize("contaminantes", &contaminantes, &NormalizationRules::default()).unwrap();
    assert_eq!(clean.height(), 2);
    assert_eq!(counts.count(Violation::PollutantOutOfRange), 3);
    assert_eq!(counts.count(Violation::HumidityOutOfRange), 1);

    assert_eq!(clean.column("hora").unwrap().dtype(), &DataType::Int64);
    for hour in int_values(&clean, "hora").unwrap() {
        assert!((0..=23).contains(&hour.unwrap()));
    }
    for column in ["pm2_5", "no2"] {
        assert!(float_values(&clean, column).unwrap().iter().all(|v| v.unwrap() >= 0.0));
    }
    for humidity in float_values(&clean, "humedad").unwrap() {
        assert!((0.0..=100.0).contains(&humidity.unwrap()));
    }
}

#[test]
fn test_missing_or_unusable_date_column() {
    let no_date = raw(&["hora", "flujo"], &[&["1", "10"]]);
    match normalize("flujo", &no_date, &NormalizationRules::default()) {
        Err(PipelineError::SchemaError { source_name, .. }) => assert_eq!(source_name, "flujo"),
        other => panic!("expected schema error, got {:?}", other),
    }

    let bad_dates = raw(&["fecha", "hora"], &[&["ayer", "1"], &["hoy", "2"]]);
    assert!(matches!(
        normalize("flujo", &bad_dates, &NormalizationRules::default()),
        Err(PipelineError::SchemaError { .. })
    ));

    // an empty source is not a schema failure
    let empty = raw(&["fecha", "hora"], &[]);
    let (clean, counts) = normalize("flujo", &empty, &NormalizationRules::default()).unwrap();
    assert_eq!(clean.height(), 0);
    assert_eq!(counts.rows_in, 0);
}

#[test]
fn test_external_feed_time_column() {
    let feed = raw(
        &["time", "pm2_5", "carbon_monoxide"],
        &[&["2024-03-01T00:00", "8.1", "120.0"], &["2024-03-02T00:00", "9.4", "130.5"]],
    );
    let (clean, counts) = normalize("air_quality", &feed, &NormalizationRules::default()).unwrap();
    assert_eq!(column_names(&clean), &["fecha", "pm2_5", "carbon_monoxide"]);
    assert_eq!(counts.rows_out, 2);
    assert_eq!(
        date_values(&clean, "fecha").unwrap()[1],
        NaiveDate::from_ymd_opt(2024, 3, 2)
    );
}

#[test]
fn test_unparseable_dates_fail_whatever_the_column_order() {
    // humidity is checked after the date even though it comes first
    let frame = text_frame(&["humedad", "fecha", "hora"], &[vec!["150", "x", "1"], vec!["50", "y", "2"]]).unwrap();
    match normalize("clima", &frame, &NormalizationRules::default()) {
        Err(PipelineError::SchemaError { source_name, .. }) => assert_eq!(source_name, "clima"),
        other => panic!("expected schema error, got {:?}", other),
    }
}
