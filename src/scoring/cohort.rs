// Cohorts: reports sharing a rank and a reporting senior
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use super::fra::Fra;
use super::relative_value::{assign_relative_values, RvAnchors};
use crate::config::ScoringConfig;
use crate::fitrep::codes::{OccasionCode, Rank};
use crate::fitrep::report::ExtractedReport;

/// (rank, reporting-senior identity). Derived from reports, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CohortKey {
    pub rank: Rank,
    pub reporting_senior: String,
}

impl CohortKey {
    pub fn new(rank: Rank, reporting_senior: impl Into<String>) -> Self {
        Self {
            rank,
            reporting_senior: reporting_senior.into().trim().to_uppercase(),
        }
    }

    /// `None` when the report lacks a rank or any reporting-senior identity.
    pub fn for_report(report: &ExtractedReport) -> Option<Self> {
        let rank = report.rank?;
        let identity = report.reporting_senior.identity()?;
        Some(Self::new(rank, identity))
    }
}

impl fmt::Display for CohortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.rank, self.reporting_senior)
    }
}

/// Scoring view of one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortMember<Id> {
    pub id: Id,
    pub fra: Option<Fra>,
    pub occasion: Option<OccasionCode>,
    #[serde(default)]
    pub not_observed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "occasion")]
pub enum ExclusionReason {
    Occasion(OccasionCode),
    NoFra,
    NotObserved,
    InvalidGrades,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::Occasion(code) => write!(f, "occasion {}", code),
            ExclusionReason::NoFra => f.write_str("no FRA"),
            ExclusionReason::NotObserved => f.write_str("not observed"),
            ExclusionReason::InvalidGrades => f.write_str("invalid trait grades"),
        }
    }
}

/// Who may join a cohort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    excluded_occasions: Vec<OccasionCode>,
}

impl Default for Eligibility {
    fn default() -> Self {
        Self::new(vec![OccasionCode::EndOfService])
    }
}

impl Eligibility {
    pub fn new(excluded_occasions: Vec<OccasionCode>) -> Self {
        Self { excluded_occasions }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        let codes = config
            .excluded_occasions
            .iter()
            .filter_map(|code| {
                let parsed = OccasionCode::from_code(code);
                if parsed.is_none() {
                    warn!("ignoring unknown excluded occasion code {:?}", code);
                }
                parsed
            })
            .collect();
        Self::new(codes)
    }

    pub fn exclusion<Id>(&self, member: &CohortMember<Id>) -> Option<ExclusionReason> {
        if let Some(code) = member.occasion.filter(|c| self.excluded_occasions.contains(c)) {
            return Some(ExclusionReason::Occasion(code));
        }
        if member.not_observed {
            return Some(ExclusionReason::NotObserved);
        }
        if member.fra.is_none() {
            return Some(ExclusionReason::NoFra);
        }
        None
    }

    pub fn is_eligible<Id>(&self, member: &CohortMember<Id>) -> bool {
        self.exclusion(member).is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredMember<Id> {
    pub id: Id,
    pub fra: Fra,
    pub rv: Option<u8>,
}

/// Result of scoring one cohort. Excluded members carry no new RV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CohortScores<Id> {
    pub anchors: Option<RvAnchors>,
    pub scored: Vec<ScoredMember<Id>>,
    pub excluded: Vec<(Id, ExclusionReason)>,
}

impl<Id: PartialEq> CohortScores<Id> {
    pub fn rv_of(&self, id: &Id) -> Option<u8> {
        self.scored.iter().find(|m| &m.id == id).and_then(|m| m.rv)
    }
}

/// Split members into eligible and excluded, then score the eligible ones.
pub fn score_cohort<Id: Clone>(members: &[CohortMember<Id>], eligibility: &Eligibility) -> CohortScores<Id> {
    let mut eligible: Vec<(Id, Fra)> = Vec::new();
    let mut excluded = Vec::new();

    for member in members {
        match (eligibility.exclusion(member), member.fra) {
            (None, Some(fra)) => eligible.push((member.id.clone(), fra)),
            (Some(reason), _) => excluded.push((member.id.clone(), reason)),
            (None, None) => excluded.push((member.id.clone(), ExclusionReason::NoFra)),
        }
    }

    let fras: Vec<Fra> = eligible.iter().map(|(_, f)| *f).collect();
    let result = assign_relative_values(&fras);
    let scored = eligible
        .into_iter()
        .zip(result.values)
        .map(|((id, fra), rv)| ScoredMember { id, fra, rv })
        .collect();

    CohortScores {
        anchors: result.anchors,
        scored,
        excluded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: u32, fra: Option<i64>, occasion: OccasionCode) -> CohortMember<u32> {
        CohortMember {
            id,
            fra: fra.map(Fra::from_hundredths),
            occasion: Some(occasion),
            not_observed: false,
        }
    }

    #[test]
    fn test_key_from_report_prefers_edipi() {
        let mut report = ExtractedReport::default();
        assert_eq!(CohortKey::for_report(&report), None);

        report.rank = Some(Rank::Capt);
        report.reporting_senior.last_name = Some("Jones".to_string());
        assert_eq!(CohortKey::for_report(&report), Some(CohortKey::new(Rank::Capt, "JONES")));

        report.reporting_senior.edipi = Some("1234567890".to_string());
        let key = CohortKey::for_report(&report).unwrap();
        assert_eq!(key.to_string(), "CAPT/1234567890");
    }

    #[test]
    fn test_end_of_service_is_excluded_from_anchors() {
        let members = vec![
            member(1, Some(400), OccasionCode::Annual),
            member(2, Some(300), OccasionCode::Annual),
            member(3, Some(200), OccasionCode::Transfer),
            member(4, Some(700), OccasionCode::EndOfService),
        ];
        let scores = score_cohort(&members, &Eligibility::default());

        assert_eq!(scores.anchors.unwrap().max_fra, Fra::from_hundredths(400));
        assert_eq!(scores.rv_of(&1), Some(100));
        assert_eq!(scores.rv_of(&4), None);
        assert_eq!(scores.excluded, vec![(4, ExclusionReason::Occasion(OccasionCode::EndOfService))]);
    }

    #[test]
    fn test_missing_fra_and_not_observed_are_excluded() {
        let mut not_observed = member(3, Some(500), OccasionCode::Annual);
        not_observed.not_observed = true;
        let members = vec![
            member(1, Some(400), OccasionCode::Annual),
            member(2, None, OccasionCode::Annual),
            not_observed,
        ];
        let scores = score_cohort(&members, &Eligibility::default());

        assert_eq!(scores.anchors, None);
        assert_eq!(scores.scored.len(), 1);
        assert_eq!(scores.excluded.len(), 2);
        assert!(scores.excluded.contains(&(2, ExclusionReason::NoFra)));
        assert!(scores.excluded.contains(&(3, ExclusionReason::NotObserved)));
    }

    #[test]
    fn test_config_codes_are_parsed() {
        let config = ScoringConfig {
            excluded_occasions: vec!["en".to_string(), "TD".to_string(), "??".to_string()],
        };
        let eligibility = Eligibility::from_config(&config);
        assert!(!eligibility.is_eligible(&member(1, Some(400), OccasionCode::ToTemporaryDuty)));
        assert!(eligibility.is_eligible(&member(1, Some(400), OccasionCode::Annual)));
    }
}
