//! Tabular file I/O through polars
//!
//! CSV cells are read as text and typed later by the normalizer, so the
//! loader never guesses column dtypes.

use crate::error::Result;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Data loader for CSV and Parquet sources
pub struct DataLoader {
    delimiter: u8,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    /// Set the CSV field separator
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Load a CSV file with every column as String
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let start = Instant::now();
        let file = File::open(path)?;

        let parse_opts = CsvParseOptions::default().with_separator(self.delimiter);
        let df = CsvReadOptions::default()
            .with_has_header(true)
            // zero-length inference reads every column as String
            .with_infer_schema_length(Some(0))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()?;

        debug!(
            path = %path.display(),
            rows = df.height(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded CSV"
        );
        Ok(df)
    }

    /// Load a Parquet file; column dtypes are kept and re-read as text by the normalizer
    pub fn load_parquet(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let file = File::open(path.as_ref())?;
        Ok(ParquetReader::new(file).finish()?)
    }

    /// Detect the format from the extension and load
    pub fn load_auto(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "parquet" | "pq" => self.load_parquet(path),
            "tsv" => DataLoader::new().with_delimiter(b'\t').load_csv(path),
            _ => self.load_csv(path),
        }
    }
}

/// Writes frames back to disk
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV with a header row, nulls as empty fields
    pub fn save_csv(frame: &DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut df = frame.clone();
        let mut file = File::create(path.as_ref())?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;
    use crate::data::frame::{column_names, text_frame, text_values};
    use std::io::Write;

    #[test]
    fn test_csv_cells_read_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clima.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "fecha,hora,temperatura,zona").unwrap();
        writeln!(file, "2024-01-01,0,21.5,Norte").unwrap();
        writeln!(file, "2024-01-01,1,,Sur").unwrap();
        drop(file);

        let df = DataLoader::new().load_auto(&path).unwrap();
        assert_eq!(df.height(), 2);
        for column in df.get_columns() {
            assert_eq!(column.dtype(), &DataType::String);
        }
        assert_eq!(text_values(&df, "hora").unwrap()[0].as_deref(), Some("0"));
        assert_eq!(text_values(&df, "temperatura").unwrap(), vec![Some("21.5".to_string()), None]);
        assert_eq!(text_values(&df, "zona").unwrap()[1].as_deref(), Some("Sur"));
    }

    #[test]
    fn test_csv_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let df = text_frame(
            &["fecha", "pm10"],
            &[vec!["2024-01-01", "3.5"], vec!["2024-01-02", ""]],
        )
        .unwrap();

        DataSaver::save_csv(&df, &path).unwrap();
        let loaded = DataLoader::new().load_csv(&path).unwrap();
        assert_eq!(column_names(&loaded), column_names(&df));
        assert!(loaded.equals_missing(&df));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = DataLoader::new().load_csv("/nonexistent/contaminantes.csv");
        assert!(matches!(result, Err(PipelineError::IoError(_))));
    }
}
