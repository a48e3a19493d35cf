// Extraction output: one ExtractedReport per processed PDF
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::codes::{OccasionCode, Rank, TraitGrade};
use super::labels::{FieldId, TRAIT_NAMES};
use crate::pdf_extraction::TextTier;
use crate::scoring::fra::{compute_fra, Fra};

/// Reporting senior or reviewing officer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficerIdentity {
    pub last_name: Option<String>,
    pub rank: Option<Rank>,
    pub edipi: Option<String>,
}

impl OfficerIdentity {
    /// Stable identity: EDIPI when known, else the upper-cased last name.
    pub fn identity(&self) -> Option<String> {
        self.edipi
            .clone()
            .or_else(|| self.last_name.as_ref().map(|n| n.trim().to_uppercase()))
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitScore {
    pub name: String,
    pub grade: Option<TraitGrade>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FieldIssueKind {
    NotFound,
    /// A candidate was found but did not normalize.
    InvalidToken { raw: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: FieldId,
    #[serde(flatten)]
    pub kind: FieldIssueKind,
}

impl FieldIssue {
    pub fn not_found(field: FieldId) -> Self {
        Self {
            field,
            kind: FieldIssueKind::NotFound,
        }
    }

    pub fn invalid(field: FieldId, raw: impl Into<String>) -> Self {
        Self {
            field,
            kind: FieldIssueKind::InvalidToken { raw: raw.into() },
        }
    }
}

/// Per-page diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    /// One-based page number.
    pub page: usize,
    pub tier: Option<TextTier>,
    pub word_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unreadable: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedReport {
    pub fitrep_id: Option<String>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub edipi: Option<String>,
    pub rank: Option<Rank>,
    pub occasion: Option<OccasionCode>,
    pub period_from: Option<NaiveDate>,
    pub period_to: Option<NaiveDate>,
    pub organization: Option<String>,
    pub reporting_senior: OfficerIdentity,
    pub reviewing_officer: OfficerIdentity,
    pub not_observed: bool,
    pub traits: Vec<TraitScore>,
    pub fra: Option<Fra>,
    pub pages: Vec<PageReport>,
    pub issues: Vec<FieldIssue>,
    pub status: ExtractionStatus,
}

impl Default for ExtractedReport {
    fn default() -> Self {
        Self {
            fitrep_id: None,
            last_name: None,
            first_name: None,
            edipi: None,
            rank: None,
            occasion: None,
            period_from: None,
            period_to: None,
            organization: None,
            reporting_senior: OfficerIdentity::default(),
            reviewing_officer: OfficerIdentity::default(),
            not_observed: false,
            traits: TRAIT_NAMES
                .iter()
                .map(|name| TraitScore {
                    name: name.to_string(),
                    grade: None,
                })
                .collect(),
            fra: None,
            pages: Vec::new(),
            issues: Vec::new(),
            status: ExtractionStatus::Partial,
        }
    }
}

impl ExtractedReport {
    pub fn grades(&self) -> impl Iterator<Item = TraitGrade> + '_ {
        self.traits.iter().filter_map(|t| t.grade)
    }

    pub fn refresh_fra(&mut self) {
        self.fra = compute_fra(self.grades());
    }

    /// Success only when every administrative field and all 14 grades are present.
    pub fn derive_status(&self) -> ExtractionStatus {
        let admin_complete = self.fitrep_id.is_some()
            && self.last_name.is_some()
            && self.first_name.is_some()
            && self.edipi.is_some()
            && self.rank.is_some()
            && self.occasion.is_some()
            && self.period_from.is_some()
            && self.period_to.is_some()
            && self.organization.is_some()
            && self.reporting_senior.last_name.is_some()
            && self.reporting_senior.rank.is_some()
            && self.reporting_senior.edipi.is_some();
        let grades_complete = self.traits.len() == TRAIT_NAMES.len() && self.traits.iter().all(|t| t.grade.is_some());

        if admin_complete && grades_complete {
            ExtractionStatus::Success
        } else {
            ExtractionStatus::Partial
        }
    }

    pub fn has_issue(&self, field: FieldId) -> bool {
        self.issues.iter().any(|i| i.field == field)
    }
}
