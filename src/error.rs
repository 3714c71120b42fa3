//! Error types for loading trend files and driving the dashboard.

use thiserror::Error;

/// Errors raised while turning a file into a [`TrendDataset`](crate::data::model::TrendDataset).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),

    #[error("not a readable workbook: {0}")]
    Workbook(String),

    #[error("sheet not found: {0}")]
    SheetNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(String),

    #[error("sheet '{0}' is empty")]
    EmptySheet(String),

    #[error("no timestamp data found in '{0}'")]
    NoTimestampData(String),
}

impl From<calamine::Error> for LoadError {
    fn from(err: calamine::Error) -> Self {
        LoadError::Workbook(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for LoadError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        LoadError::Parquet(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for LoadError {
    fn from(err: arrow::error::ArrowError) -> Self {
        LoadError::Parquet(err.to_string())
    }
}

/// Errors from the saved-setup store.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Enter a name first.")]
    EmptyName,

    #[error("Select a setup to delete.")]
    NothingSelected,

    #[error("unknown setup \"{0}\"")]
    NotFound(String),

    #[error("setups file {path}: {message}")]
    Storage { path: String, message: String },
}

/// Errors from dashboard operations. Each maps onto one HTTP status in the server.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("no file loaded")]
    NoFile,

    #[error("no sheet data loaded")]
    NoData,

    #[error("unknown chart {0}")]
    UnknownChart(usize),

    #[error("chart {chart} is locked to chart {master}")]
    ChartLocked { chart: usize, master: usize },

    #[error("unknown chart package {0}")]
    UnknownPackage(String),

    #[error("{field} must be between 0 and {max} minutes, got {value}")]
    InvalidWindow {
        field: &'static str,
        value: f64,
        max: i64,
    },

    #[error("the file changed while the sheet was loading")]
    SourceChanged,

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Setup(#[from] SetupError),
}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;
