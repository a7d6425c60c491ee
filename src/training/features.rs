//! Design-matrix construction from the unified table

use super::category::AirQualityCategory;
use super::config::TaskType;
use crate::data::{column_names, date_values, float_values, text_values, DATE_COLUMN};
use crate::error::{PipelineError, Result};
use chrono::Datelike;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::collections::BTreeSet;
use tracing::debug;

/// Calendar feature names derived from `fecha`
pub const MONTH_FEATURE: &str = "mes";
pub const WEEKDAY_FEATURE: &str = "dia_semana";

/// Numeric features, target, and the ordered feature names
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub schema: Vec<String>,
}

/// One output column, materialized over every table row
#[derive(Debug, Clone)]
struct FeatureColumn {
    name: String,
    values: Vec<f64>,
}

impl FeatureColumn {
    fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Turns the unified table into a numeric design matrix for one task.
///
/// Numeric columns pass through with nulls as 0, text columns are one-hot
/// encoded as `<column>_<value>` with values sorted, and `fecha` contributes
/// `mes` and `dia_semana` when calendar features are enabled. Rows without a
/// numeric target are skipped.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    task_type: TaskType,
    target_column: String,
    exclude: Vec<String>,
    calendar_features: bool,
}

impl FeatureBuilder {
    pub fn new(task_type: TaskType, target_column: impl Into<String>) -> Self {
        Self {
            task_type,
            target_column: target_column.into(),
            exclude: Vec::new(),
            calendar_features: true,
        }
    }

    pub fn with_excluded(mut self, columns: &[String]) -> Self {
        self.exclude.extend(columns.iter().cloned());
        self
    }

    pub fn with_calendar_features(mut self, enabled: bool) -> Self {
        self.calendar_features = enabled;
        self
    }

    pub fn build(&self, table: &DataFrame) -> Result<DesignMatrix> {
        if table.column(&self.target_column).is_err() {
            return Err(PipelineError::TrainingError(format!(
                "target column '{}' not found in table",
                self.target_column
            )));
        }

        let columns = self.plan(table)?;
        if columns.is_empty() {
            return Err(PipelineError::TrainingError(
                "no usable feature column".to_string(),
            ));
        }

        let labelled: Vec<(usize, f64)> = float_values(table, &self.target_column)?
            .into_iter()
            .enumerate()
            .filter_map(|(row, target)| target.map(|t| (row, t)))
            .collect();

        let targets: Vec<f64> = labelled
            .iter()
            .map(|&(_, raw)| match self.task_type {
                TaskType::Regression => raw,
                TaskType::Classification => AirQualityCategory::from_concentration(raw).code() as f64,
            })
            .collect();
        let x = Array2::from_shape_fn((labelled.len(), columns.len()), |(i, j)| {
            columns[j].values[labelled[i].0]
        });

        debug!(
            target = %self.target_column,
            rows = labelled.len(),
            skipped = table.height() - labelled.len(),
            features = columns.len(),
            "Built design matrix"
        );

        Ok(DesignMatrix {
            x,
            y: Array1::from_vec(targets),
            schema: columns.into_iter().map(|c| c.name).collect(),
        })
    }

    fn plan(&self, table: &DataFrame) -> Result<Vec<FeatureColumn>> {
        let mut columns = Vec::new();
        let mut calendar = None;

        for name in column_names(table) {
            if name == self.target_column || self.exclude.contains(&name) {
                continue;
            }
            match table.column(&name)?.dtype() {
                DataType::Date => {
                    if name == DATE_COLUMN {
                        calendar = Some(date_values(table, &name)?);
                    }
                }
                DataType::String => {
                    let cells = text_values(table, &name)?;
                    let categories: BTreeSet<&str> = cells.iter().flatten().map(String::as_str).collect();
                    for category in categories {
                        let values = cells
                            .iter()
                            .map(|c| if c.as_deref() == Some(category) { 1.0 } else { 0.0 })
                            .collect();
                        columns.push(FeatureColumn::new(format!("{}_{}", name, category), values));
                    }
                }
                _ => {
                    let cells = float_values(table, &name)?;
                    if cells.iter().any(Option::is_some) {
                        let values = cells.into_iter().map(|c| c.unwrap_or(0.0)).collect();
                        columns.push(FeatureColumn::new(name, values));
                    }
                }
            }
        }

        if let (true, Some(dates)) = (self.calendar_features, calendar) {
            let month: Vec<f64> = dates.iter().map(|d| d.map_or(0.0, |d| d.month() as f64)).collect();
            let weekday: Vec<f64> = dates
                .iter()
                .map(|d| d.map_or(0.0, |d| d.weekday().num_days_from_monday() as f64))
                .collect();
            for (feature, values) in [(MONTH_FEATURE, month), (WEEKDAY_FEATURE, weekday)] {
                if !columns.iter().any(|c| c.name == feature) {
                    columns.push(FeatureColumn::new(feature, values));
                }
            }
        }

        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::date_column;
    use chrono::NaiveDate;

    fn table() -> DataFrame {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day);
        DataFrame::new(vec![
            date_column("fecha", &[d(1), d(2), d(3)]).unwrap(),
            Column::new("hora".into(), &[0i64, 1, 2]),
            Column::new("zona".into(), &[Some("sur"), Some("norte"), None]),
            Column::new("pm2_5".into(), &[Some(10.0), Some(40.0), None]),
            Column::new("temperatura".into(), &[Some(20.0), None, Some(22.0)]),
        ])
        .unwrap()
    }
    #[test]
    fn test_schema_layout() {
        let dm = FeatureBuilder::new(TaskType::Regression, "pm2_5").build(&table()).unwrap();
        assert_eq!(
            dm.schema,
            vec!["hora", "zona_norte", "zona_sur", "temperatura", "mes", "dia_semana"]
        );
        // third row has no target
        assert_eq!(dm.x.nrows(), 2);
        assert_eq!(dm.y.to_vec(), vec![10.0, 40.0]);
        // 2024-01-02 is a Tuesday
        assert_eq!(dm.x.row(1).to_vec(), vec![1.0, 1.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_classification_target_is_category_code() {
        let dm = FeatureBuilder::new(TaskType::Classification, "pm2_5")
            .with_calendar_features(false)
            .build(&table())
            .unwrap();
        assert_eq!(dm.y.to_vec(), vec![0.0, 2.0]);
        assert!(!dm.schema.contains(&"mes".to_string()));
    }

    #[test]
    fn test_exclusions_and_missing_target() {
        let dm = FeatureBuilder::new(TaskType::Regression, "pm2_5")
            .with_excluded(&["zona".to_string(), "hora".to_string()])
            .build(&table())
            .unwrap();
        assert_eq!(dm.schema, vec!["temperatura", "mes", "dia_semana"]);

        let err = FeatureBuilder::new(TaskType::Regression, "pm10").build(&table());
        assert!(matches!(err, Err(PipelineError::TrainingError(_))));
    }
}
