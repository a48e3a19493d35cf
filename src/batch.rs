// Batch extraction: one task per file, bounded by a semaphore, results in input order
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::fitrep::{ExtractedReport, ExtractionStatus, FitrepExtractor};
use crate::pdf_extraction::PageSource;

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: ExtractionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ExtractedReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl FileOutcome {
    fn failed(path: PathBuf, error: String, elapsed_ms: u64) -> Self {
        Self {
            path,
            status: ExtractionStatus::Failed,
            report: None,
            error: Some(error),
            elapsed_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
}

impl BatchReport {
    fn from_outcomes(outcomes: Vec<FileOutcome>) -> Self {
        let count = |status: ExtractionStatus| outcomes.iter().filter(|o| o.status == status).count();
        Self {
            succeeded: count(ExtractionStatus::Success),
            partial: count(ExtractionStatus::Partial),
            failed: count(ExtractionStatus::Failed),
            outcomes,
        }
    }

    pub fn reports(&self) -> impl Iterator<Item = (&PathBuf, &ExtractedReport)> {
        self.outcomes.iter().filter_map(|o| o.report.as_ref().map(|r| (&o.path, r)))
    }
}

/// Extract every file with at most `workers` extractions in flight.
/// Always returns one outcome per input path, in input order.
pub async fn extract_batch<S>(extractor: Arc<FitrepExtractor<S>>, paths: Vec<PathBuf>, workers: usize) -> BatchReport
where
    S: PageSource + 'static,
{
    let started = Instant::now();
    let total = paths.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    info!("batch of {} file(s) with {} worker(s)", total, workers.max(1));

    let mut handles = Vec::with_capacity(total);
    for path in paths {
        let semaphore = semaphore.clone();
        let extractor = extractor.clone();
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let file_start = Instant::now();
            let result = tokio::task::spawn_blocking(move || extractor.extract_path(&task_path)).await;
            (result, file_start.elapsed().as_millis() as u64)
        });
        handles.push((path, handle));
    }

    let mut outcomes = Vec::with_capacity(total);
    for (index, (path, handle)) in handles.into_iter().enumerate() {
        let outcome = match handle.await {
            Ok((Ok(Ok(report)), elapsed_ms)) => {
                debug!("[{}/{}] {}: {:?}", index + 1, total, path.display(), report.status);
                FileOutcome {
                    path,
                    status: report.status,
                    report: Some(report),
                    error: None,
                    elapsed_ms,
                }
            }
            Ok((Ok(Err(failure)), elapsed_ms)) => {
                warn!("[{}/{}] {}: {}", index + 1, total, path.display(), failure);
                FileOutcome::failed(path, failure.to_string(), elapsed_ms)
            }
            Ok((Err(join_error), elapsed_ms)) => {
                warn!("[{}/{}] {}: extraction panicked", index + 1, total, path.display());
                FileOutcome::failed(path, format!("extraction panicked: {}", join_error), elapsed_ms)
            }
            Err(join_error) => {
                warn!("[{}/{}] {}: task lost", index + 1, total, path.display());
                FileOutcome::failed(path, format!("task failed: {}", join_error), 0)
            }
        };
        outcomes.push(outcome);
    }

    let report = BatchReport::from_outcomes(outcomes);
    info!(
        "batch done in {}ms: {} success, {} partial, {} failed",
        started.elapsed().as_millis(),
        report.succeeded,
        report.partial,
        report.failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::fitrep::locator::tests::form_pages;
    use crate::fitrep::{FormTables, Normalizer};
    use crate::pdf_extraction::extraction_router::tests::CannedSource;
    use crate::pdf_extraction::lopdf_helper::tests::blank_pdf;
    use crate::pdf_extraction::PageLayout;
    use crate::types::Result;
    use std::path::Path;

    fn lax_config() -> ExtractionConfig {
        ExtractionConfig {
            expected_keywords: Vec::new(),
            min_chars: 1,
            min_words: 1,
            min_quality: 0.0,
            ..ExtractionConfig::default()
        }
    }

    fn extractor_over<S: PageSource>(source: S) -> Arc<FitrepExtractor<S>> {
        Arc::new(FitrepExtractor::new(
            source,
            lax_config(),
            Arc::new(FormTables::default()),
            Normalizer::default(),
        ))
    }

    struct PanickingSource;

    impl PageSource for PanickingSource {
        fn text_layer(&self, _pdf_path: &Path, _max_pages: usize) -> Result<Vec<PageLayout>> {
            panic!("text layer exploded")
        }

        fn ocr_page(&self, _pdf_path: &Path, _page_index: usize, _size: (f32, f32)) -> Result<PageLayout> {
            panic!("ocr exploded")
        }
    }

    #[tokio::test]
    async fn test_batch_keeps_order_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pdf");
        let junk = dir.path().join("junk.pdf");
        std::fs::write(&good, blank_pdf(3)).unwrap();
        std::fs::write(&junk, b"not a pdf").unwrap();
        let missing = dir.path().join("missing.pdf");

        let extractor = extractor_over(CannedSource::new(form_pages(), Vec::new()));
        let paths = vec![junk.clone(), good.clone(), missing.clone(), good.clone()];
        let batch = extract_batch(extractor, paths, 2).await;

        assert_eq!(batch.outcomes.len(), 4);
        let order: Vec<&PathBuf> = batch.outcomes.iter().map(|o| &o.path).collect();
        assert_eq!(order, vec![&junk, &good, &missing, &good]);
        assert_eq!(batch.outcomes[0].status, ExtractionStatus::Failed);
        assert_eq!(batch.outcomes[1].status, ExtractionStatus::Success);
        assert_eq!(batch.outcomes[2].status, ExtractionStatus::Failed);
        assert_eq!((batch.succeeded, batch.partial, batch.failed), (2, 0, 2));
        assert_eq!(batch.reports().count(), 2);
    }

    #[tokio::test]
    async fn test_panicking_extraction_becomes_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.pdf");
        std::fs::write(&file, blank_pdf(1)).unwrap();

        let batch = extract_batch(extractor_over(PanickingSource), vec![file.clone(), file], 1).await;
        assert_eq!(batch.outcomes.len(), 2);
        assert!(batch.outcomes.iter().all(|o| o.status == ExtractionStatus::Failed));
        assert!(batch.outcomes[0].error.as_deref().unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let batch = extract_batch(extractor_over(CannedSource::new(Vec::new(), Vec::new())), Vec::new(), 4).await;
        assert!(batch.outcomes.is_empty());
    }
}
