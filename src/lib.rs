// fitrep-rv: FITREP field extraction and relative-value scoring
pub mod batch;
pub mod config;
pub mod fitrep;
pub mod pdf_extraction;
pub mod scoring;
pub mod storage;
pub mod types;

pub use batch::{extract_batch, BatchReport, FileOutcome};
pub use config::AppConfig;
pub use fitrep::{ExtractedReport, ExtractionFailure, FitrepExtractor};
pub use scoring::{compute_fra, compute_rv, predict_impact, Fra};
pub use types::{FitrepError, Result};
