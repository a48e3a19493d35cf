// Configuration for fitrep-rv, loaded from TOML with env overrides
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{FitrepError, Result};

pub const CONFIG_ENV: &str = "FITREP_CONFIG";
pub const PDFTOTEXT_ENV: &str = "FITREP_PDFTOTEXT";
pub const PDFTOPPM_ENV: &str = "FITREP_PDFTOPPM";
pub const TESSERACT_ENV: &str = "FITREP_TESSERACT";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Text-layer settings and the thresholds that decide when to fall back to OCR.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_pdftotext")]
    pub pdftotext_bin: String,
    /// Only the first pages of a FITREP carry data we locate.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_min_quality")]
    pub min_quality: f32,
    #[serde(default = "default_keywords")]
    pub expected_keywords: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            pdftotext_bin: default_pdftotext(),
            max_pages: default_max_pages(),
            min_chars: default_min_chars(),
            min_words: default_min_words(),
            min_quality: default_min_quality(),
            expected_keywords: default_keywords(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm_bin: String,
    #[serde(default = "default_tesseract")]
    pub tesseract_bin: String,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default = "default_psm")]
    pub psm: u8,
    #[serde(default = "default_min_confidence")]
    pub min_word_confidence: f32,
    /// Luma cutoff for binarizing the rendered page; `None` keeps grayscale.
    #[serde(default = "default_binarize")]
    pub binarize_threshold: Option<u8>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pdftoppm_bin: default_pdftoppm(),
            tesseract_bin: default_tesseract(),
            dpi: default_dpi(),
            psm: default_psm(),
            min_word_confidence: default_min_confidence(),
            binarize_threshold: default_binarize(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workers: default_workers() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    /// Occasion codes that never join an RV cohort (end of service).
    #[serde(default = "default_excluded_occasions")]
    pub excluded_occasions: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            excluded_occasions: default_excluded_occasions(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }
}

fn default_true() -> bool { true }
fn default_pdftotext() -> String { "pdftotext".to_string() }
fn default_pdftoppm() -> String { "pdftoppm".to_string() }
fn default_tesseract() -> String { "tesseract".to_string() }
fn default_max_pages() -> usize { 4 }
fn default_min_chars() -> usize { 40 }
fn default_min_words() -> usize { 8 }
fn default_min_quality() -> f32 { 0.4 }
fn default_dpi() -> u32 { 300 }
fn default_psm() -> u8 { 6 }
fn default_min_confidence() -> f32 { 30.0 }
fn default_binarize() -> Option<u8> { Some(160) }
fn default_workers() -> usize { 4 }
fn default_excluded_occasions() -> Vec<String> { vec!["EN".to_string()] }

fn default_keywords() -> Vec<String> {
    [
        "FITNESS", "REPORT", "MARINE", "GRADE", "OCC", "REPORTING", "SENIOR",
        "REVIEWING", "MISSION", "PROFICIENCY", "LEADERSHIP", "INTELLECT",
        "JUDGMENT", "EVALUATIONS", "CHARACTER", "INITIATIVE",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fitrep-rv")
        .join("reports.db")
}

impl AppConfig {
    /// Load from an explicit path, else `FITREP_CONFIG`, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var(CONFIG_ENV).ok().map(PathBuf::from));

        let mut config = match path {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|source| FitrepError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bin) = env::var(PDFTOTEXT_ENV) {
            self.extraction.pdftotext_bin = bin;
        }
        if let Ok(bin) = env::var(PDFTOPPM_ENV) {
            self.ocr.pdftoppm_bin = bin;
        }
        if let Ok(bin) = env::var(TESSERACT_ENV) {
            self.ocr.tesseract_bin = bin;
        }
    }
}
