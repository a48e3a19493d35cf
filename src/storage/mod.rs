// Storage layer: embedded SQLite report store and cohort recomputation
pub mod recalculator;
pub mod sqlite_storage;

pub use recalculator::{CohortRecalculator, RecomputeSummary, RegradeOutcome};
pub use sqlite_storage::{CachedRv, CohortEntry, ReportStore, StoreStats, StoredReport};
