//! Polars helpers shared by the data and training stages
//!
//! Cleaned sources and the unified table are plain [`DataFrame`]s. These
//! helpers read typed columns out of them and build the few column kinds the
//! normalizer emits.

use crate::error::{PipelineError, Result};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

/// Name of the calendar-date key column
pub const DATE_COLUMN: &str = "fecha";
/// Name of the hour-of-day key column
pub const HOUR_COLUMN: &str = "hora";

/// Days from 0001-01-01 to 1970-01-01, the origin of polars `Date` values
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const NULL_TOKENS: &[&str] = &["nan", "null", "none", "na", "n/a"];

/// Whether a raw text cell stands for a missing value
pub fn is_missing(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || NULL_TOKENS.iter().any(|t| trimmed.eq_ignore_ascii_case(t))
}

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
}

/// Build a frame of string columns, the way the CSV loader reads a file.
///
/// Blank cells become nulls.
pub fn text_frame<S: AsRef<str>>(columns: &[S], rows: &[Vec<S>]) -> Result<DataFrame> {
    let width = columns.len();
    if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(PipelineError::ShapeError {
            expected: format!("{} cells per row", width),
            actual: format!("{} cells in row {}", row.len(), idx),
        });
    }

    let built: Vec<Column> = columns
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let cells: Vec<Option<&str>> = rows
                .iter()
                .map(|row| Some(row[j].as_ref()).filter(|c| !c.trim().is_empty()))
                .collect();
            Column::new(name.as_ref().into(), cells)
        })
        .collect();

    Ok(DataFrame::new(built)?)
}

/// A `Date` column from optional calendar dates
pub fn date_column(name: &str, dates: &[Option<NaiveDate>]) -> Result<Column> {
    let days: Vec<Option<i32>> = dates.iter().map(|d| d.map(date_to_days)).collect();
    let series = Series::new(name.into(), days).cast(&DataType::Date)?;
    Ok(Column::from(series))
}

/// Look a column up, reporting its absence as a schema error of `source`
pub fn require_column<'a>(frame: &'a DataFrame, source: &str, column: &str) -> Result<&'a Column> {
    frame
        .column(column)
        .map_err(|_| PipelineError::schema(source, format!("missing column '{}'", column)))
}

/// Every cell of `column` as text; nulls stay `None`
pub fn text_values(frame: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let series = frame
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|cell| cell.map(str::to_string))
        .collect())
}

/// Every cell of `column` as `f64`; nulls and non-numeric cells are `None`
pub fn float_values(frame: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let series = frame
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

/// Every cell of `column` as `i64`
pub fn int_values(frame: &DataFrame, column: &str) -> Result<Vec<Option<i64>>> {
    let series = frame
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

/// Every cell of a `Date` (or ISO-formatted text) column as a calendar date
pub fn date_values(frame: &DataFrame, column: &str) -> Result<Vec<Option<NaiveDate>>> {
    let days = frame
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Date)?
        .cast(&DataType::Int32)?;
    Ok(days
        .i32()?
        .into_iter()
        .map(|d| d.and_then(days_to_date))
        .collect())
}

/// Column names in frame order
pub fn column_names(frame: &DataFrame) -> Vec<String> {
    frame
        .get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect()
}
