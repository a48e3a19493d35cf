// FRA, Relative Value and What-If scoring. Pure functions over FRAs.
pub mod cohort;
pub mod fra;
pub mod relative_value;
pub mod what_if;

pub use cohort::{score_cohort, CohortKey, CohortMember, CohortScores, Eligibility, ExclusionReason};
pub use fra::{compute_fra, compute_fra_from_letters, validate_trait_grades, Fra, TraitValidation};
pub use relative_value::{assign_relative_values, compute_rv, CohortRv, RvAnchors, MIN_COHORT_SIZE};
pub use what_if::{predict_impact, CohortSummary, HypotheticalReport, ImpactPrediction};
