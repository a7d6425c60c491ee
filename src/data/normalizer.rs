//! Per-source record normalization
//!
//! Turns one raw [`DataFrame`] into a cleaned one:
//! - canonical column names (diacritic-free, trimmed, lower-case)
//! - `fecha` parsed to a calendar date, rows with unusable dates dropped
//! - `hora` coerced to an hour of day, unparseable values defaulting to 0
//! - humidity kept within [0, 100] and pollutant concentrations non-negative
//! - categorical free text canonicalized so joins and groupings line up
//!
//! Row-level violations are counted in [`DropCounts`] and never fatal. A source
//! whose date column is missing, or whose every row fails date parsing, is
//! rejected with a schema error.
//!
//! Cells are read as text whatever the input dtype, so a cleaned frame can be
//! fed back in and comes out unchanged.

use super::frame::{column_names, date_column, is_missing, text_values, DATE_COLUMN, HOUR_COLUMN};
use super::text::canonicalize;
use crate::error::{PipelineError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%Y%m%d"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Row-level invariant violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Violation {
    InvalidDate,
    HourOutOfRange,
    HumidityOutOfRange,
    PollutantOutOfRange,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Violation::InvalidDate => "invalid_date",
            Violation::HourOutOfRange => "hour_out_of_range",
            Violation::HumidityOutOfRange => "humidity_out_of_range",
            Violation::PollutantOutOfRange => "pollutant_out_of_range",
        };
        f.write_str(label)
    }
}

/// Rules applied by [`normalize`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationRules {
    /// Canonical column renames applied after canonicalization (`time` -> `fecha`)
    pub renames: BTreeMap<String, String>,
    /// Columns that must lie in [0, 100] when present
    pub humidity_columns: Vec<String>,
    /// Columns that must be non-negative when present
    pub pollutant_columns: Vec<String>,
    /// Free-text columns canonicalized like column names
    pub categorical_columns: Vec<String>,
    /// Largest valid hour of day
    pub max_hour: i64,
}

impl Default for NormalizationRules {
    fn default() -> Self {
        let mut renames = BTreeMap::new();
        renames.insert("time".to_string(), DATE_COLUMN.to_string());

        Self {
            renames,
            humidity_columns: vec!["humedad".to_string(), "relative_humidity_2m".to_string()],
            pollutant_columns: [
                "pm2_5",
                "pm10",
                "co",
                "no2",
                "o3",
                "carbon_monoxide",
                "nitrogen_dioxide",
                "ozone",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            categorical_columns: vec!["ubicacion".to_string(), "zona".to_string()],
            max_hour: 23,
        }
    }
}

impl NormalizationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renames.insert(from.into(), to.into());
        self
    }

    pub fn with_humidity_column(mut self, column: impl Into<String>) -> Self {
        self.humidity_columns.push(column.into());
        self
    }

    pub fn with_pollutant_column(mut self, column: impl Into<String>) -> Self {
        self.pollutant_columns.push(column.into());
        self
    }

    pub fn with_categorical_column(mut self, column: impl Into<String>) -> Self {
        self.categorical_columns.push(column.into());
        self
    }
}

/// Audit counts produced by one normalization pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DropCounts {
    pub rows_in: usize,
    pub rows_out: usize,
    /// Dropped rows keyed by their violation: an unusable date first, otherwise
    /// the first failing column in column order
    pub by_violation: BTreeMap<Violation, usize>,
    /// Rows kept with `hora` defaulted to 0
    pub hours_defaulted: usize,
}

impl DropCounts {
    pub fn total_dropped(&self) -> usize {
        self.by_violation.values().sum()
    }

    pub fn count(&self, violation: Violation) -> usize {
        self.by_violation.get(&violation).copied().unwrap_or(0)
    }

    fn record(&mut self, violation: Violation) {
        *self.by_violation.entry(violation).or_insert(0) += 1;
    }
}

/// How each column of a source is treated
#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnRole {
    Date,
    Hour,
    Humidity,
    Pollutant,
    Categorical,
    Plain,
}

/// Normalize the source `name` according to `rules`
pub fn normalize(name: &str, raw: &DataFrame, rules: &NormalizationRules) -> Result<(DataFrame, DropCounts)> {
    let columns = canonical_columns(name, raw, rules)?;
    let date_pos = columns
        .iter()
        .position(|c| c == DATE_COLUMN)
        .ok_or_else(|| PipelineError::schema(name, format!("missing required column '{}'", DATE_COLUMN)))?;
    let roles: Vec<ColumnRole> = columns.iter().map(|c| column_role(c, rules)).collect();

    let cells: Vec<Vec<Option<String>>> = column_names(raw)
        .iter()
        .map(|c| {
            Ok(text_values(raw, c)?
                .into_iter()
                .map(|cell| cell.filter(|v| !is_missing(v)).map(|v| v.trim().to_string()))
                .collect())
        })
        .collect::<Result<_>>()?;

    let n_rows = raw.height();
    let dates: Vec<Option<NaiveDate>> = cells[date_pos]
        .iter()
        .map(|cell| cell.as_deref().and_then(parse_date))
        .collect();
    if n_rows > 0 && dates.iter().all(Option::is_none) {
        return Err(PipelineError::schema(
            name,
            format!("no usable '{}' column: every row failed date parsing", DATE_COLUMN),
        ));
    }

    // the date decides first; other columns only explain rows with a usable date
    let mut reasons: Vec<Option<Violation>> = dates
        .iter()
        .map(|d| d.is_none().then_some(Violation::InvalidDate))
        .collect();
    for (role, column) in roles.iter().zip(&cells) {
        for (reason, cell) in reasons.iter_mut().zip(column) {
            if reason.is_none() {
                *reason = check_cell(*role, cell.as_deref(), rules);
            }
        }
    }

    let mut counts = DropCounts {
        rows_in: n_rows,
        ..Default::default()
    };
    let kept: Vec<usize> = reasons
        .iter()
        .enumerate()
        .filter_map(|(i, reason)| match reason {
            Some(violation) => {
                counts.record(*violation);
                None
            }
            None => Some(i),
        })
        .collect();
    counts.rows_out = kept.len();

    let mut output = Vec::with_capacity(columns.len());
    for ((column, role), values) in columns.iter().zip(&roles).zip(&cells) {
        let values: Vec<Option<&str>> = kept.iter().map(|&i| values[i].as_deref()).collect();
        let built = match role {
            ColumnRole::Date => {
                let kept_dates: Vec<Option<NaiveDate>> = kept.iter().map(|&i| dates[i]).collect();
                date_column(column, &kept_dates)?
            }
            ColumnRole::Hour => {
                let hours: Vec<i64> = values
                    .iter()
                    .map(|cell| match parse_hour(*cell) {
                        HourParse::Valid(h) => h,
                        HourParse::NotIntegral | HourParse::Unparseable => {
                            counts.hours_defaulted += 1;
                            0
                        }
                    })
                    .collect();
                Column::new(column.as_str().into(), hours)
            }
            ColumnRole::Humidity | ColumnRole::Pollutant => {
                let numbers: Vec<Option<f64>> = values.iter().map(|cell| cell.and_then(parse_number)).collect();
                Column::new(column.as_str().into(), numbers)
            }
            ColumnRole::Categorical => {
                let text: Vec<Option<String>> = values.iter().map(|cell| cell.map(canonicalize)).collect();
                let text: Vec<Option<&str>> = text.iter().map(|t| t.as_deref()).collect();
                Column::new(column.as_str().into(), text)
            }
            ColumnRole::Plain => infer_column(column, &values),
        };
        output.push(built);
    }
    let cleaned = DataFrame::new(output)?;

    if counts.total_dropped() > 0 {
        warn!(
            source = %name,
            dropped = counts.total_dropped(),
            rows_in = counts.rows_in,
            "Rows dropped during normalization"
        );
    }
    debug!(
        source = %name,
        rows_out = counts.rows_out,
        hours_defaulted = counts.hours_defaulted,
        "Normalized source"
    );

    Ok((cleaned, counts))
}

fn canonical_columns(name: &str, raw: &DataFrame, rules: &NormalizationRules) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(raw.width());

    for original in column_names(raw) {
        let mut canonical = canonicalize(&original);
        if let Some(renamed) = rules.renames.get(&canonical) {
            canonical = renamed.clone();
        }
        if !seen.insert(canonical.clone()) {
            return Err(PipelineError::schema(
                name,
                format!("column '{}' collides with another column after canonicalization", original),
            ));
        }
        columns.push(canonical);
    }

    Ok(columns)
}

fn column_role(name: &str, rules: &NormalizationRules) -> ColumnRole {
    let listed = |list: &[String]| list.iter().any(|c| c == name);

    if name == DATE_COLUMN {
        ColumnRole::Date
    } else if name == HOUR_COLUMN {
        ColumnRole::Hour
    } else if listed(&rules.humidity_columns) {
        ColumnRole::Humidity
    } else if listed(&rules.pollutant_columns) {
        ColumnRole::Pollutant
    } else if listed(&rules.categorical_columns) {
        ColumnRole::Categorical
    } else {
        ColumnRole::Plain
    }
}

/// The violation a single cell causes, if any
fn check_cell(role: ColumnRole, cell: Option<&str>, rules: &NormalizationRules) -> Option<Violation> {
    match role {
        ColumnRole::Hour => match parse_hour(cell) {
            HourParse::Valid(h) if (0..=rules.max_hour).contains(&h) => None,
            HourParse::Valid(_) | HourParse::NotIntegral => Some(Violation::HourOutOfRange),
            HourParse::Unparseable => None,
        },
        ColumnRole::Humidity => match cell.and_then(parse_number) {
            Some(v) if (0.0..=100.0).contains(&v) => None,
            _ => Some(Violation::HumidityOutOfRange),
        },
        ColumnRole::Pollutant => match cell.and_then(parse_number) {
            Some(v) if v >= 0.0 => None,
            _ => Some(Violation::PollutantOutOfRange),
        },
        ColumnRole::Date | ColumnRole::Categorical | ColumnRole::Plain => None,
    }
}

/// Parse a date cell; datetimes keep only their date part
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

enum HourParse {
    Valid(i64),
    NotIntegral,
    Unparseable,
}

fn parse_hour(cell: Option<&str>) -> HourParse {
    let Some(s) = cell else {
        return HourParse::Unparseable;
    };
    if let Ok(i) = s.parse::<i64>() {
        return HourParse::Valid(i);
    }
    match parse_number(s) {
        Some(f) if f.fract() == 0.0 => HourParse::Valid(f as i64),
        Some(_) => HourParse::NotIntegral,
        None => HourParse::Unparseable,
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Type a free column from its surviving cells: integers, then floats, then text
fn infer_column(name: &str, cells: &[Option<&str>]) -> Column {
    let present = || cells.iter().flatten();

    if present().all(|c| c.parse::<i64>().is_ok()) {
        let ints: Vec<Option<i64>> = cells.iter().map(|c| c.and_then(|v| v.parse().ok())).collect();
        Column::new(name.into(), ints)
    } else if present().all(|c| parse_number(c).is_some()) {
        let floats: Vec<Option<f64>> = cells.iter().map(|c| c.and_then(parse_number)).collect();
        Column::new(name.into(), floats)
    } else {
        Column::new(name.into(), cells.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::{date_values, float_values, int_values, text_frame};

    fn raw(columns: &[&str], rows: &[Vec<&str>]) -> DataFrame {
        text_frame(columns, rows).unwrap()
    }

    fn clean(df: &DataFrame) -> (DataFrame, DropCounts) {
        normalize("test", df, &NormalizationRules::default()).unwrap()
    }

    #[test]
    fn test_column_names_canonicalized() {
        let (df, _) = clean(&raw(&[" Fecha", "HORA", "Ubicación"], &[vec!["2024-01-01", "3", "San José"]]));
        assert_eq!(column_names(&df), vec!["fecha", "hora", "ubicacion"]);
        assert_eq!(text_values(&df, "ubicacion").unwrap(), vec![Some("san jose".to_string())]);
        assert_eq!(df.column("fecha").unwrap().dtype(), &DataType::Date);
        assert_eq!(df.column("hora").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_invalid_dates_dropped_and_counted() {
        let (df, counts) = clean(&raw(
            &["fecha", "hora"],
            &[vec!["2024-01-01", "1"], vec!["not a date", "2"], vec!["2024-02-30", "3"]],
        ));
        assert_eq!(df.height(), 1);
        assert_eq!(counts.count(Violation::InvalidDate), 2);
        assert_eq!(counts.rows_out, 1);
    }

    #[test]
    fn test_all_dates_invalid_is_schema_error() {
        let df = raw(&["fecha", "hora"], &[vec!["x", "1"], vec!["y", "2"]]);
        let err = normalize("test", &df, &NormalizationRules::default()).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaError { .. }));
    }

    #[test]
    fn test_bad_dates_win_over_earlier_range_columns() {
        let df = raw(&["humedad", "fecha", "hora"], &[vec!["150", "x", "1"], vec!["50", "y", "2"]]);
        let err = normalize("clima", &df, &NormalizationRules::default()).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaError { .. }));

        let df = raw(
            &["humedad", "fecha", "hora"],
            &[vec!["150", "x", "1"], vec!["150", "2024-01-01", "2"], vec!["50", "2024-01-01", "3"]],
        );
        let (kept, counts) = clean(&df);
        assert_eq!(kept.height(), 1);
        assert_eq!(counts.count(Violation::InvalidDate), 1);
        assert_eq!(counts.count(Violation::HumidityOutOfRange), 1);
    }

    #[test]
    fn test_missing_date_column_is_schema_error() {
        let df = raw(&["hora", "pm10"], &[vec!["1", "20"]]);
        let err = normalize("test", &df, &NormalizationRules::default()).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaError { .. }));
    }

    #[test]
    fn test_hour_defaults_to_zero() {
        let (df, counts) = clean(&raw(
            &["fecha", "hora"],
            &[vec!["2024-01-01", "abc"], vec!["2024-01-01", ""], vec!["2024-01-01", "7"]],
        ));
        assert_eq!(df.height(), 3);
        assert_eq!(counts.hours_defaulted, 2);
        assert_eq!(int_values(&df, "hora").unwrap(), vec![Some(0), Some(0), Some(7)]);
    }

    #[test]
    fn test_hour_out_of_range_dropped() {
        let (df, counts) = clean(&raw(
            &["fecha", "hora"],
            &[vec!["2024-01-01", "24"], vec!["2024-01-01", "-1"], vec!["2024-01-01", "7.5"]],
        ));
        assert_eq!(df.height(), 0);
        assert_eq!(counts.count(Violation::HourOutOfRange), 3);
    }

    #[test]
    fn test_range_filters() {
        let (df, counts) = clean(&raw(
            &["fecha", "hora", "humedad", "pm2_5"],
            &[
                vec!["2024-01-01", "0", "50", "10"],
                vec!["2024-01-01", "1", "101", "10"],
                vec!["2024-01-01", "2", "60", "-3"],
                vec!["2024-01-01", "3", "", "5"],
            ],
        ));
        assert_eq!(df.height(), 1);
        assert_eq!(counts.count(Violation::HumidityOutOfRange), 2);
        assert_eq!(counts.count(Violation::PollutantOutOfRange), 1);
        assert_eq!(float_values(&df, "humedad").unwrap(), vec![Some(50.0)]);
    }

    #[test]
    fn test_absent_range_columns_not_an_error() {
        let (df, counts) = clean(&raw(&["fecha", "hora", "flujo_vehicular"], &[vec!["2024-01-01", "0", "1500"]]));
        assert_eq!(df.height(), 1);
        assert_eq!(counts.total_dropped(), 0);
        assert_eq!(df.column("flujo_vehicular").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_time_renamed_to_fecha() {
        let (df, _) = clean(&raw(&["time", "pm10"], &[vec!["2024-08-15T00:00", "12.5"]]));
        assert_eq!(column_names(&df), vec!["fecha", "pm10"]);
        assert_eq!(
            date_values(&df, "fecha").unwrap(),
            vec![NaiveDate::from_ymd_opt(2024, 8, 15)]
        );
    }

    #[test]
    fn test_colliding_columns_rejected() {
        let df = raw(&["Fecha", "fecha "], &[vec!["2024-01-01", "2024-01-02"]]);
        assert!(normalize("test", &df, &NormalizationRules::default()).is_err());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let df = raw(
            &["Fecha", "Hora", "Humedad", "PM2_5", "Zona", "Viento"],
            &[
                vec!["15/08/2024", "x", "55", "12.0", "Área Norte", "3"],
                vec!["2024-08-15", "5", "120", "3", "Sur", "4"],
                vec!["2024-08-16", "6", "40", "35.4", " CENTRO ", "2.5"],
            ],
        );
        let rules = NormalizationRules::default();
        let (once, first) = normalize("test", &df, &rules).unwrap();
        let (twice, second) = normalize("test", &once, &rules).unwrap();
        assert_eq!(first.total_dropped(), 1);
        assert_eq!(second.total_dropped(), 0);
        assert_eq!(second.hours_defaulted, 0);
        assert!(once.equals_missing(&twice));
        assert_eq!(once.column("viento").unwrap().dtype(), &DataType::Float64);
    }
}
