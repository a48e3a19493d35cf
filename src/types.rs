// Core error types for fitrep-rv
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FitrepError {
    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("config error in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("report {0} not found")]
    ReportNotFound(i64),

    #[error("invalid trait grades: {0}")]
    InvalidGrades(String),
}

impl FitrepError {
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        FitrepError::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

impl From<lopdf::Error> for FitrepError {
    fn from(err: lopdf::Error) -> Self {
        FitrepError::Pdf(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FitrepError>;
