// Two-tier page reading: the cheap text layer first, OCR only when it falls short
//
// Source forms are a mix of digitally filled and scanned documents. The text
// layer is exact when present; OCR is slow and only runs for pages whose
// fingerprint says the text layer is empty or unusable.

use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::document_analyzer::PageFingerprint;
use super::layout::{PageLayout, TextTier};
use super::ocr_engine::OcrEngine;
use super::text_layer::extract_text_layer;
use crate::config::{ExtractionConfig, OcrConfig};
use crate::types::Result;

/// Extraction method chosen for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    TextLayer,
    Ocr,
}

/// Where page text comes from. Implemented over poppler + tesseract in
/// production and over canned layouts in tests.
pub trait PageSource: Send + Sync {
    /// Text-layer layouts for the first `max_pages` pages.
    fn text_layer(&self, pdf_path: &Path, max_pages: usize) -> Result<Vec<PageLayout>>;

    fn ocr_page(&self, pdf_path: &Path, page_index: usize, page_size: (f32, f32)) -> Result<PageLayout>;

    fn ocr_enabled(&self) -> bool {
        true
    }
}

pub struct PopplerTesseract {
    pdftotext_bin: String,
    ocr: OcrEngine,
}

impl PopplerTesseract {
    pub fn new(extraction: &ExtractionConfig, ocr: &OcrConfig) -> Self {
        Self {
            pdftotext_bin: extraction.pdftotext_bin.clone(),
            ocr: OcrEngine::new(ocr.clone()),
        }
    }
}

impl PageSource for PopplerTesseract {
    fn text_layer(&self, pdf_path: &Path, max_pages: usize) -> Result<Vec<PageLayout>> {
        extract_text_layer(&self.pdftotext_bin, pdf_path, max_pages)
    }

    fn ocr_page(&self, pdf_path: &Path, page_index: usize, page_size: (f32, f32)) -> Result<PageLayout> {
        self.ocr.extract_page(pdf_path, page_index, page_size)
    }

    fn ocr_enabled(&self) -> bool {
        self.ocr.is_enabled()
    }
}

/// Result of reading one page through the tiers.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    Read {
        layout: PageLayout,
        fingerprint: PageFingerprint,
        elapsed_ms: u64,
    },
    Unreadable {
        page_index: usize,
        reason: String,
    },
}

impl PageOutcome {
    pub fn page_index(&self) -> usize {
        match self {
            PageOutcome::Read { layout, .. } => layout.page_index,
            PageOutcome::Unreadable { page_index, .. } => *page_index,
        }
    }

    pub fn layout(&self) -> Option<&PageLayout> {
        match self {
            PageOutcome::Read { layout, .. } => Some(layout),
            PageOutcome::Unreadable { .. } => None,
        }
    }
}

pub struct ExtractionRouter<S> {
    source: S,
    config: ExtractionConfig,
}

impl<S: PageSource> ExtractionRouter<S> {
    pub fn new(source: S, config: ExtractionConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Determine extraction strategy for a page from its text-layer fingerprint
    pub fn determine_strategy(&self, fingerprint: &PageFingerprint) -> ExtractionMethod {
        if fingerprint.passes(&self.config) {
            ExtractionMethod::TextLayer
        } else {
            ExtractionMethod::Ocr
        }
    }

    /// Read every page, one outcome per entry in `page_sizes`. Never fails as a
    /// whole; a page nobody can read becomes `Unreadable`.
    pub fn read_pages(&self, pdf_path: &Path, page_sizes: &[(f32, f32)]) -> Vec<PageOutcome> {
        let wanted = page_sizes.len();
        let mut text_pages = match self.source.text_layer(pdf_path, wanted) {
            Ok(pages) => pages,
            Err(e) => {
                warn!("text layer unavailable for {}: {}", pdf_path.display(), e);
                Vec::new()
            }
        };
        text_pages.truncate(wanted);

        let mut by_index: Vec<Option<PageLayout>> = vec![None; wanted];
        for (i, mut page) in text_pages.into_iter().enumerate() {
            page.page_index = i;
            by_index[i] = Some(page);
        }

        by_index
            .into_iter()
            .enumerate()
            .map(|(i, text_page)| self.read_page(pdf_path, i, page_sizes[i], text_page))
            .collect()
    }

    fn read_page(
        &self,
        pdf_path: &Path,
        page_index: usize,
        page_size: (f32, f32),
        text_page: Option<PageLayout>,
    ) -> PageOutcome {
        let start = Instant::now();
        let text_fp = text_page
            .as_ref()
            .map(|p| PageFingerprint::analyze(p, &self.config))
            .unwrap_or_default();

        if let Some(page) = &text_page {
            if self.determine_strategy(&text_fp) == ExtractionMethod::TextLayer {
                debug!("page {} read from text layer", page_index + 1);
                return PageOutcome::Read {
                    layout: page.clone(),
                    fingerprint: text_fp,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                };
            }
        }

        let ocr_result = if self.source.ocr_enabled() {
            info!("page {} falling back to OCR", page_index + 1);
            match self.source.ocr_page(pdf_path, page_index, page_size) {
                Ok(page) => Some(page),
                Err(e) => {
                    warn!("OCR failed on page {}: {}", page_index + 1, e);
                    None
                }
            }
        } else {
            None
        };

        let ocr_candidate = ocr_result
            .map(|p| {
                let fp = PageFingerprint::analyze(&p, &self.config);
                (p, fp)
            })
            .filter(|(_, fp)| !fp.is_empty());
        let text_candidate = text_page.filter(|_| !text_fp.is_empty()).map(|p| (p, text_fp));

        let chosen = match (ocr_candidate, text_candidate) {
            (Some(ocr), Some(text)) => Some(if ocr.1.score() >= text.1.score() { ocr } else { text }),
            (Some(ocr), None) => Some(ocr),
            (None, Some(text)) => Some(text),
            (None, None) => None,
        };

        match chosen {
            Some((mut layout, fingerprint)) => {
                layout.page_index = page_index;
                if layout.tier == TextTier::TextLayer {
                    debug!("page {} kept a weak text layer", page_index + 1);
                }
                PageOutcome::Read {
                    layout,
                    fingerprint,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                }
            }
            None => {
                warn!("page {} unreadable by both tiers", page_index + 1);
                PageOutcome::Unreadable {
                    page_index,
                    reason: "no text from text layer or OCR".to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pdf_extraction::layout::{BBox, Token};
    use crate::types::FitrepError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned page source: fixed text-layer pages and fixed OCR pages.
    pub(crate) struct CannedSource {
        pub text: Vec<PageLayout>,
        pub ocr: Vec<Option<PageLayout>>,
        pub ocr_calls: AtomicUsize,
    }

    impl CannedSource {
        pub(crate) fn new(text: Vec<PageLayout>, ocr: Vec<Option<PageLayout>>) -> Self {
            Self {
                text,
                ocr,
                ocr_calls: AtomicUsize::new(0),
            }
        }
    }

    impl PageSource for CannedSource {
        fn text_layer(&self, _pdf_path: &Path, max_pages: usize) -> Result<Vec<PageLayout>> {
            Ok(self.text.iter().take(max_pages).cloned().collect())
        }

        fn ocr_page(&self, _pdf_path: &Path, page_index: usize, _size: (f32, f32)) -> Result<PageLayout> {
            self.ocr_calls.fetch_add(1, Ordering::SeqCst);
            self.ocr
                .get(page_index)
                .cloned()
                .flatten()
                .ok_or_else(|| FitrepError::tool("tesseract", "no canned page"))
        }
    }

    pub(crate) fn words_page(index: usize, tier: TextTier, words: &[&str]) -> PageLayout {
        let tokens = words
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let x = (i % 6) as f32 * 90.0;
                let y = (i / 6) as f32 * 14.0;
                Token::new(*w, BBox::new(x, y, x + 80.0, y + 10.0))
            })
            .collect();
        PageLayout::new(index, 612.0, 792.0, tier, tokens)
    }

    const FORM_WORDS: &[&str] = &[
        "USMC", "FITNESS", "REPORT", "MARINE", "REPORTED", "ON", "LAST", "NAME", "GRADE",
        "OCC", "FROM", "TO",
    ];

    #[test]
    fn test_good_text_layer_skips_ocr() {
        let source = CannedSource::new(vec![words_page(0, TextTier::TextLayer, FORM_WORDS)], vec![]);
        let router = ExtractionRouter::new(source, ExtractionConfig::default());

        let outcomes = router.read_pages(Path::new("a.pdf"), &[(612.0, 792.0)]);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].layout().unwrap().tier, TextTier::TextLayer);
        assert_eq!(router.source.ocr_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_text_layer_falls_back_to_ocr() {
        let source = CannedSource::new(
            vec![words_page(0, TextTier::TextLayer, &[])],
            vec![Some(words_page(0, TextTier::Ocr, FORM_WORDS))],
        );
        let router = ExtractionRouter::new(source, ExtractionConfig::default());

        let outcomes = router.read_pages(Path::new("scan.pdf"), &[(612.0, 792.0)]);
        assert_eq!(outcomes[0].layout().unwrap().tier, TextTier::Ocr);
        assert_eq!(router.source.ocr_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_both_tiers_empty_is_unreadable_but_others_survive() {
        let source = CannedSource::new(
            vec![
                words_page(0, TextTier::TextLayer, &[]),
                words_page(1, TextTier::TextLayer, FORM_WORDS),
            ],
            vec![None, None],
        );
        let router = ExtractionRouter::new(source, ExtractionConfig::default());

        let outcomes = router.read_pages(Path::new("bad.pdf"), &[(612.0, 792.0), (612.0, 792.0)]);
        assert!(matches!(outcomes[0], PageOutcome::Unreadable { page_index: 0, .. }));
        assert!(outcomes[1].layout().is_some());
    }

    #[test]
    fn test_weak_text_layer_kept_when_ocr_fails() {
        let source = CannedSource::new(vec![words_page(0, TextTier::TextLayer, &["GRADE", "MAJ"])], vec![None]);
        let router = ExtractionRouter::new(source, ExtractionConfig::default());

        let outcomes = router.read_pages(Path::new("weak.pdf"), &[(612.0, 792.0)]);
        assert_eq!(outcomes[0].layout().unwrap().tier, TextTier::TextLayer);
    }
}
