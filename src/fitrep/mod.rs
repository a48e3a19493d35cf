// FITREP form understanding: vocabularies, label tables, field location, extraction
pub mod codes;
pub mod extractor;
pub mod labels;
pub mod locator;
pub mod normalize;
pub mod report;

pub use codes::{OccasionCode, Rank, TraitGrade};
pub use extractor::{ExtractionFailure, FitrepExtractor};
pub use labels::{FieldId, FormTables, TRAIT_NAMES};
pub use normalize::{ConfusableTable, Normalizer};
pub use report::{ExtractedReport, ExtractionStatus, FieldIssue, FieldIssueKind, OfficerIdentity, PageReport, TraitScore};
