// Single-document pipeline: validate, read pages, locate fields, score FRA
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::labels::FormTables;
use super::locator::FieldLocator;
use super::normalize::Normalizer;
use super::report::{ExtractedReport, PageReport};
use crate::config::{AppConfig, ExtractionConfig};
use crate::pdf_extraction::lopdf_helper::{load_pdf_bytes, page_count, page_dimensions, with_pdf};
use crate::pdf_extraction::{ExtractionRouter, PageOutcome, PageLayout, PageSource, PopplerTesseract};

/// Per-file failures. Anything short of these degrades to a partial report.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionFailure {
    #[error("not a PDF: {0}")]
    NotAPdf(String),

    #[error("none of {pages} page(s) could be read")]
    Unreadable { pages: usize },

    #[error("cannot read input: {0}")]
    Io(#[from] std::io::Error),
}

/// FITREP extractor, shared by the single-file and batch paths.
pub struct FitrepExtractor<S = PopplerTesseract> {
    router: ExtractionRouter<S>,
    tables: Arc<FormTables>,
    normalizer: Normalizer,
}

impl FitrepExtractor<PopplerTesseract> {
    pub fn from_config(config: &AppConfig) -> Self {
        let source = PopplerTesseract::new(&config.extraction, &config.ocr);
        Self::new(
            source,
            config.extraction.clone(),
            Arc::new(FormTables::default()),
            Normalizer::default(),
        )
    }
}

impl<S: PageSource> FitrepExtractor<S> {
    pub fn new(source: S, config: ExtractionConfig, tables: Arc<FormTables>, normalizer: Normalizer) -> Self {
        Self {
            router: ExtractionRouter::new(source, config),
            tables,
            normalizer,
        }
    }

    /// Extract from PDF bytes. The external tools need a file, so valid input
    /// is spooled to a temporary one.
    pub fn extract(&self, pdf_bytes: &[u8]) -> Result<ExtractedReport, ExtractionFailure> {
        let document = load_pdf_bytes(pdf_bytes).map_err(|e| ExtractionFailure::NotAPdf(e.to_string()))?;
        let sizes = self.page_sizes(&document);

        let mut spool = tempfile::Builder::new().prefix("fitrep-").suffix(".pdf").tempfile()?;
        spool.write_all(pdf_bytes)?;
        spool.flush()?;
        self.extract_document(spool.path(), &sizes)
    }

    pub fn extract_path(&self, path: &Path) -> Result<ExtractedReport, ExtractionFailure> {
        if !path.is_file() {
            return Err(ExtractionFailure::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a file", path.display()),
            )));
        }
        let sizes = with_pdf(path, |document| Ok(self.page_sizes(document)))
            .map_err(|e| ExtractionFailure::NotAPdf(format!("{}: {}", path.display(), e)))?;
        self.extract_document(path, &sizes)
    }

    /// Run the tiers and the locator over an already validated document.
    pub fn extract_document(
        &self,
        pdf_path: &Path,
        page_sizes: &[(f32, f32)],
    ) -> Result<ExtractedReport, ExtractionFailure> {
        let start = Instant::now();
        let outcomes = self.router.read_pages(pdf_path, page_sizes);

        let readable: Vec<&PageLayout> = outcomes.iter().filter_map(PageOutcome::layout).collect();
        if readable.is_empty() {
            warn!("{}: no readable page", pdf_path.display());
            return Err(ExtractionFailure::Unreadable { pages: outcomes.len() });
        }

        let locator = FieldLocator::new(&self.tables, &self.normalizer);
        let mut report = locator.locate(&readable);
        report.pages = outcomes.iter().map(page_report).collect();
        report.refresh_fra();
        report.status = report.derive_status();

        info!(
            "{}: {:?} with {} issue(s), FRA {} in {}ms",
            pdf_path.display(),
            report.status,
            report.issues.len(),
            report.fra.map_or_else(|| "-".to_string(), |f| f.to_string()),
            start.elapsed().as_millis()
        );
        Ok(report)
    }

    fn page_sizes(&self, document: &lopdf::Document) -> Vec<(f32, f32)> {
        let pages = page_count(document).min(self.router.config().max_pages);
        (0..pages).map(|i| page_dimensions(document, i)).collect()
    }
}

fn page_report(outcome: &PageOutcome) -> PageReport {
    let page = outcome.page_index() + 1;
    match outcome {
        PageOutcome::Read { layout, fingerprint, .. } => PageReport {
            page,
            tier: Some(layout.tier),
            word_count: fingerprint.word_count,
            unreadable: None,
        },
        PageOutcome::Unreadable { reason, .. } => PageReport {
            page,
            tier: None,
            word_count: 0,
            unreadable: Some(reason.clone()),
        },
    }
}
