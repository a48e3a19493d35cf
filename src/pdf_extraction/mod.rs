// PDF text/layout extraction: text layer first, OCR fallback
pub mod document_analyzer;
pub mod extraction_router;
pub mod layout;
pub mod lopdf_helper;
pub mod ocr_engine;
pub mod text_layer;

pub use document_analyzer::PageFingerprint;
pub use extraction_router::{ExtractionMethod, ExtractionRouter, PageOutcome, PageSource, PopplerTesseract};
pub use layout::{BBox, PageLayout, TextLine, TextTier, Token};
