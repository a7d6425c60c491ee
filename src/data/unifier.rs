//! Joining normalized sources into one table keyed by (fecha, hora)
//!
//! Required sources are inner-joined with polars on both keys; optional
//! sources are collapsed to one row per date with a `group_by` and
//! left-joined on `fecha`. The [`JoinReport`] is derived from frame heights
//! around each join.

use super::frame::{column_names, require_column, DATE_COLUMN, HOUR_COLUMN};
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

/// Marks left-joined rows that found a partner; never part of the output
const MATCH_MARKER: &str = "__matched";

/// How a source takes part in unification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRole {
    /// Inner-joined on (fecha, hora); every unified row exists here
    Required,
    /// Left-joined on fecha after per-date aggregation
    Optional,
}

impl fmt::Display for SourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRole::Required => write!(f, "required"),
            SourceRole::Optional => write!(f, "optional"),
        }
    }
}

/// A cleaned frame tagged with its source name and join role
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub frame: DataFrame,
    pub role: SourceRole,
}

impl Source {
    pub fn new(name: impl Into<String>, frame: DataFrame, role: SourceRole) -> Self {
        Self {
            name: name.into(),
            frame,
            role,
        }
    }

    pub fn required(name: impl Into<String>, frame: DataFrame) -> Self {
        Self::new(name, frame, SourceRole::Required)
    }

    pub fn optional(name: impl Into<String>, frame: DataFrame) -> Self {
        Self::new(name, frame, SourceRole::Optional)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// First required source, which seeds the key set
    Base,
    Inner,
    Left,
}

/// Audit entry for one join step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinStep {
    pub source: String,
    pub kind: JoinKind,
    /// Rows in the source being joined
    pub source_rows: usize,
    /// Rows in the accumulated table before this step
    pub rows_before: usize,
    pub rows_after: usize,
    /// Accumulated rows lost in this step (for the base step: rows without a usable key)
    pub rows_dropped: usize,
    /// Accumulated rows that found a partner in this source
    pub matched_rows: usize,
    pub duplicates_dropped: usize,
}

/// Ordered audit of a unification run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinReport {
    pub steps: Vec<JoinStep>,
    pub output_rows: usize,
}

impl JoinReport {
    pub fn duplicates_dropped(&self) -> usize {
        self.steps.iter().map(|s| s.duplicates_dropped).sum()
    }

    pub fn step(&self, source: &str) -> Option<&JoinStep> {
        self.steps.iter().find(|s| s.source == source)
    }
}

/// Collects sources in registration order and joins them
#[derive(Debug, Clone, Default)]
pub struct DatasetUnifier {
    sources: Vec<Source>,
}

impl DatasetUnifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, frame: DataFrame, role: SourceRole) -> &mut Self {
        self.sources.push(Source::new(name, frame, role));
        self
    }

    pub fn with_source(mut self, name: impl Into<String>, frame: DataFrame, role: SourceRole) -> Self {
        self.register(name, frame, role);
        self
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn unify(&self) -> Result<(DataFrame, JoinReport)> {
        unify(&self.sources)
    }
}

/// Join `sources` into one table sorted by (fecha, hora).
///
/// Required sources are inner-joined on (fecha, hora) and optional sources
/// left-joined on fecha, each group in the order given.
pub fn unify(sources: &[Source]) -> Result<(DataFrame, JoinReport)> {
    let required: Vec<&Source> = sources
        .iter()
        .filter(|s| s.role == SourceRole::Required)
        .collect();
    let optional: Vec<&Source> = sources
        .iter()
        .filter(|s| s.role == SourceRole::Optional)
        .collect();

    if required.is_empty() {
        return Err(PipelineError::JoinError(
            "no required source registered".to_string(),
        ));
    }

    let hourly_keys = [col(DATE_COLUMN), col(HOUR_COLUMN)];
    let mut names = ColumnNamer::new();
    let mut columns = vec![DATE_COLUMN.to_string(), HOUR_COLUMN.to_string()];
    let mut report = JoinReport::default();
    let mut joined: Option<DataFrame> = None;

    for source in required {
        let keyed = keyed_frame(source)?;
        let (right, added) = rename_values(&keyed.frame, source.name(), &mut names)?;
        columns.extend(added);

        let step = match joined.take() {
            None => {
                let rows_after = right.height();
                joined = Some(right);
                JoinStep {
                    source: source.name().to_string(),
                    kind: JoinKind::Base,
                    source_rows: source.frame.height(),
                    rows_before: source.frame.height(),
                    rows_after,
                    rows_dropped: keyed.unkeyed,
                    matched_rows: rows_after,
                    duplicates_dropped: keyed.duplicates,
                }
            }
            Some(left) => {
                let rows_before = left.height();
                let next = left
                    .lazy()
                    .join(
                        right.lazy(),
                        hourly_keys.clone(),
                        hourly_keys.clone(),
                        JoinArgs::new(JoinType::Inner),
                    )
                    .collect()?;
                let rows_after = next.height();
                joined = Some(next);
                JoinStep {
                    source: source.name().to_string(),
                    kind: JoinKind::Inner,
                    source_rows: source.frame.height(),
                    rows_before,
                    rows_after,
                    rows_dropped: rows_before - rows_after,
                    matched_rows: rows_after,
                    duplicates_dropped: keyed.duplicates,
                }
            }
        };

        info!(
            source = %step.source,
            rows_before = step.rows_before,
            rows_after = step.rows_after,
            duplicates = step.duplicates_dropped,
            "Joined required source"
        );
        report.steps.push(step);
    }

    let mut joined = match joined {
        Some(frame) if frame.height() > 0 => frame,
        _ => {
            return Err(PipelineError::JoinError(
                "required sources share no (fecha, hora) keys".to_string(),
            ))
        }
    };

    for source in optional {
        let daily = daily_frame(source)?;
        let (right, added) = rename_values(&daily, source.name(), &mut names)?;
        columns.extend(added);

        let rows_before = joined.height();
        let next = joined
            .lazy()
            .join(
                right.lazy().with_column(lit(true).alias(MATCH_MARKER)),
                [col(DATE_COLUMN)],
                [col(DATE_COLUMN)],
                JoinArgs::new(JoinType::Left),
            )
            .collect()?;
        let matched = next.height() - next.column(MATCH_MARKER)?.null_count();
        joined = next.drop(MATCH_MARKER)?;

        let step = JoinStep {
            source: source.name().to_string(),
            kind: JoinKind::Left,
            source_rows: source.frame.height(),
            rows_before,
            rows_after: joined.height(),
            rows_dropped: rows_before.saturating_sub(joined.height()),
            matched_rows: matched,
            duplicates_dropped: 0,
        };
        info!(
            source = %step.source,
            matched = step.matched_rows,
            rows = step.rows_after,
            "Joined optional source"
        );
        report.steps.push(step);
    }

    let ordered: Vec<Expr> = columns.iter().map(|c| col(c.as_str())).collect();
    let unified = joined
        .lazy()
        .select(ordered)
        .sort_by_exprs(hourly_keys, SortMultipleOptions::default())
        .collect()?;

    report.output_rows = unified.height();
    debug!(
        rows = unified.height(),
        columns = unified.width(),
        "Unified table built"
    );
    Ok((unified, report))
}

/// Resolves column-name collisions across sources
struct ColumnNamer {
    used: HashSet<String>,
}

impl ColumnNamer {
    fn new() -> Self {
        let used = [DATE_COLUMN, HOUR_COLUMN]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self { used }
    }

    fn assign(&mut self, column: &str, source: &str) -> String {
        let mut name = column.to_string();
        if self.used.contains(&name) {
            let base = format!("{}_{}", column, source);
            name = base.clone();
            let mut n = 2;
            while self.used.contains(&name) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
        }
        self.used.insert(name.clone());
        name
    }
}

/// Give every non-key column its unified name; returns the new names in order
fn rename_values(frame: &DataFrame, source: &str, names: &mut ColumnNamer) -> Result<(DataFrame, Vec<String>)> {
    let mut added = Vec::new();
    let mut renamed = Vec::with_capacity(frame.width());
    for column in frame.get_columns() {
        let mut column = column.clone();
        let current = column.name().to_string();
        if current != DATE_COLUMN && current != HOUR_COLUMN {
            let assigned = names.assign(&current, source);
            column.rename(assigned.as_str().into());
            added.push(assigned);
        }
        renamed.push(column);
    }
    Ok((DataFrame::new(renamed)?, added))
}

/// A required source reduced to one row per (fecha, hora), first occurrence kept
struct KeyedFrame {
    frame: DataFrame,
    duplicates: usize,
    unkeyed: usize,
}

fn keyed_frame(source: &Source) -> Result<KeyedFrame> {
    require_column(&source.frame, source.name(), DATE_COLUMN)?;
    require_column(&source.frame, source.name(), HOUR_COLUMN)?;
    if source.frame.height() == 0 {
        return Err(PipelineError::JoinError(format!(
            "required source '{}' is empty",
            source.name()
        )));
    }

    let keyed = source
        .frame
        .clone()
        .lazy()
        .with_columns([
            col(DATE_COLUMN).cast(DataType::Date),
            col(HOUR_COLUMN).cast(DataType::Int64),
        ])
        .filter(col(DATE_COLUMN).is_not_null().and(col(HOUR_COLUMN).is_not_null()))
        .collect()?;
    let unkeyed = source.frame.height() - keyed.height();

    let unique = keyed.unique_stable(
        Some(&[DATE_COLUMN.to_string(), HOUR_COLUMN.to_string()]),
        UniqueKeepStrategy::First,
        None,
    )?;
    let duplicates = keyed.height() - unique.height();
    if duplicates > 0 {
        debug!(
            source = %source.name(),
            duplicates,
            "Duplicate keys dropped, first occurrence kept"
        );
    }

    Ok(KeyedFrame {
        frame: unique,
        duplicates,
        unkeyed,
    })
}

/// An optional source collapsed to one row per date: numeric columns are
/// averaged, anything else keeps its first non-null value. `hora` is dropped.
fn daily_frame(source: &Source) -> Result<DataFrame> {
    require_column(&source.frame, source.name(), DATE_COLUMN)?;

    let aggregations: Vec<Expr> = source
        .frame
        .get_columns()
        .iter()
        .filter(|c| c.name().as_str() != DATE_COLUMN && c.name().as_str() != HOUR_COLUMN)
        .map(|c| {
            let name = c.name().as_str();
            if is_numeric(c.dtype()) {
                col(name).cast(DataType::Float64).mean()
            } else {
                col(name).drop_nulls().first()
            }
        })
        .collect();

    let mut daily = source
        .frame
        .clone()
        .lazy()
        .with_column(col(DATE_COLUMN).cast(DataType::Date))
        .filter(col(DATE_COLUMN).is_not_null())
        .group_by_stable([col(DATE_COLUMN)])
        .agg(aggregations)
        .collect()?;

    // group_by emits the key first; restore the source's column order
    let order: Vec<String> = column_names(&source.frame)
        .into_iter()
        .filter(|c| c != HOUR_COLUMN)
        .collect();
    daily = daily.select(order)?;
    Ok(daily)
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int32 | DataType::Int64 | DataType::UInt32 | DataType::UInt64 | DataType::Float32 | DataType::Float64
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::{date_column, float_values, int_values, text_values};
    use chrono::NaiveDate;

    fn date(d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 1, d)
    }

    /// A cleaned hourly frame with one integer value column
    fn hourly(value: &str, rows: &[(u32, i64, i64)]) -> DataFrame {
        let dates: Vec<Option<NaiveDate>> = rows.iter().map(|r| date(r.0)).collect();
        let hours: Vec<i64> = rows.iter().map(|r| r.1).collect();
        let values: Vec<i64> = rows.iter().map(|r| r.2).collect();
        DataFrame::new(vec![
            date_column("fecha", &dates).unwrap(),
            Column::new("hora".into(), hours),
            Column::new(value.into(), values),
        ])
        .unwrap()
    }

    #[test]
    fn test_inner_join_keeps_common_keys() {
        let a = hourly("x", &[(1, 0, 1), (1, 1, 2)]);
        let b = hourly("y", &[(1, 1, 20), (1, 2, 30)]);
        let (table, report) = DatasetUnifier::new()
            .with_source("a", a, SourceRole::Required)
            .with_source("b", b, SourceRole::Required)
            .unify()
            .unwrap();

        assert_eq!(column_names(&table), vec!["fecha", "hora", "x", "y"]);
        assert_eq!(table.height(), 1);
        assert_eq!(int_values(&table, "y").unwrap(), vec![Some(20)]);
        assert_eq!(report.step("b").unwrap().rows_dropped, 1);
    }

    #[test]
    fn test_collisions_suffixed_by_source() {
        let a = hourly("t", &[(1, 0, 1)]);
        let b = hourly("t", &[(1, 0, 2)]);
        let (table, _) = unify(&[Source::required("a", a), Source::required("b", b)]).unwrap();
        assert_eq!(column_names(&table), vec!["fecha", "hora", "t", "t_b"]);
        assert_eq!(int_values(&table, "t_b").unwrap(), vec![Some(2)]);
    }

    #[test]
    fn test_duplicates_first_wins() {
        let a = hourly("x", &[(1, 0, 1), (1, 0, 99)]);
        let (table, report) = unify(&[Source::required("a", a)]).unwrap();
        assert_eq!(table.height(), 1);
        assert_eq!(int_values(&table, "x").unwrap(), vec![Some(1)]);
        assert_eq!(report.duplicates_dropped(), 1);
    }

    #[test]
    fn test_optional_left_join_aggregates_per_date() {
        let a = DataFrame::new(vec![
            date_column("fecha", &[date(1), date(1), date(2)]).unwrap(),
            Column::new("hora".into(), &[0i64, 1, 0]),
        ])
        .unwrap();
        let ext = DataFrame::new(vec![
            date_column("fecha", &[date(1), date(1)]).unwrap(),
            Column::new("hora".into(), &[0i64, 1]),
            Column::new("ozone".into(), &[10.0, 20.0]),
            Column::new("station".into(), &[None, Some("s1")]),
        ])
        .unwrap();
        let (table, report) = unify(&[Source::optional("ext", ext), Source::required("a", a)]).unwrap();

        assert_eq!(column_names(&table), vec!["fecha", "hora", "ozone", "station"]);
        assert_eq!(table.height(), 3);
        assert_eq!(float_values(&table, "ozone").unwrap(), vec![Some(15.0), Some(15.0), None]);
        assert_eq!(text_values(&table, "station").unwrap()[1].as_deref(), Some("s1"));
        assert_eq!(report.step("ext").unwrap().matched_rows, 2);
        assert!(table.column(MATCH_MARKER).is_err());
    }

    #[test]
    fn test_join_errors() {
        let empty = hourly("x", &[]);
        assert!(matches!(
            unify(&[Source::required("e", empty)]),
            Err(PipelineError::JoinError(_))
        ));

        assert!(matches!(unify(&[]), Err(PipelineError::JoinError(_))));

        let a = hourly("x", &[(1, 0, 1)]);
        let b = hourly("y", &[(2, 0, 1)]);
        assert!(matches!(
            unify(&[Source::required("a", a), Source::required("b", b)]),
            Err(PipelineError::JoinError(_))
        ));
    }

    #[test]
    fn test_required_source_without_hour_rejected() {
        let a = DataFrame::new(vec![
            date_column("fecha", &[date(1)]).unwrap(),
            Column::new("x".into(), &[0i64]),
        ])
        .unwrap();
        assert!(matches!(
            unify(&[Source::required("a", a)]),
            Err(PipelineError::SchemaError { .. })
        ));
    }
}
