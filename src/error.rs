//! Error types for the dashboard pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("could not decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("unexpected payload shape: {0}")]
    UnexpectedShape(String),

    #[error("column not found: {0}")]
    MissingColumn(String),

    #[error("invalid column {column}: {reason}")]
    InvalidColumn { column: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("JSON error: {0}")]
    Json(#[source] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
