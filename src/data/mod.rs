//! Raw source handling: loading, normalization, and unification

pub mod frame;
pub mod loader;
pub mod normalizer;
pub mod text;
pub mod unifier;

pub use frame::{
    column_names, date_column, date_values, float_values, int_values, text_frame, text_values, DATE_COLUMN,
    HOUR_COLUMN,
};
pub use loader::{DataLoader, DataSaver};
pub use normalizer::{normalize, DropCounts, NormalizationRules, Violation};
pub use text::canonicalize;
pub use unifier::{unify, DatasetUnifier, JoinKind, JoinReport, JoinStep, Source, SourceRole};
