// What-If: predicted RVs for a cohort after adding hypothetical reports
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::cohort::{score_cohort, CohortMember, Eligibility, ExclusionReason};
use super::fra::{compute_fra_from_letters, div_round_half_up, validate_trait_grades, Fra};
use super::relative_value::RvAnchors;
use crate::fitrep::codes::OccasionCode;

/// A report that does not exist yet, given as trait name to letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypotheticalReport {
    pub label: String,
    pub grades: BTreeMap<String, String>,
    #[serde(default)]
    pub occasion: Option<OccasionCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistingImpact {
    pub id: i64,
    pub fra: Option<Fra>,
    pub old_rv: Option<u8>,
    pub new_rv: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HypotheticalImpact {
    pub label: String,
    pub fra: Option<Fra>,
    pub predicted_rv: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded: Option<ExclusionReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CohortSummary {
    pub total_reports: usize,
    pub average_fra: Option<Fra>,
    pub highest_fra: Option<Fra>,
    pub lowest_fra: Option<Fra>,
    pub anchors: Option<RvAnchors>,
}

impl CohortSummary {
    fn from_fras(fras: &[Fra], anchors: Option<RvAnchors>) -> Self {
        let average_fra = (!fras.is_empty()).then(|| {
            let sum: i64 = fras.iter().map(|f| f.hundredths()).sum();
            Fra::from_hundredths(div_round_half_up(sum, fras.len() as i64))
        });
        Self {
            total_reports: fras.len(),
            average_fra,
            highest_fra: fras.iter().max().copied(),
            lowest_fra: fras.iter().min().copied(),
            anchors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactPrediction {
    pub current: CohortSummary,
    pub predicted: CohortSummary,
    /// Predicted average minus current average.
    pub fra_change: Option<Fra>,
    pub existing: Vec<ExistingImpact>,
    pub hypotheticals: Vec<HypotheticalImpact>,
}

/// Enum id so existing and hypothetical members share one scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberId {
    Existing(i64),
    Hypothetical(usize),
}

/// Pure prediction over a snapshot; nothing is written.
pub fn predict_impact(
    existing: &[CohortMember<i64>],
    hypotheticals: &[HypotheticalReport],
    eligibility: &Eligibility,
) -> ImpactPrediction {
    let current_members: Vec<CohortMember<MemberId>> = existing
        .iter()
        .map(|m| CohortMember {
            id: MemberId::Existing(m.id),
            fra: m.fra,
            occasion: m.occasion,
            not_observed: m.not_observed,
        })
        .collect();

    // Unreadable or missing letters keep a hypothetical out instead of scoring what is left.
    let malformed: Vec<bool> = hypotheticals
        .iter()
        .map(|h| !validate_trait_grades(&h.grades).is_well_formed())
        .collect();

    let mut union_members = current_members.clone();
    union_members.extend(hypotheticals.iter().enumerate().map(|(i, h)| CohortMember {
        id: MemberId::Hypothetical(i),
        fra: if malformed[i] { None } else { compute_fra_from_letters(h.grades.values()) },
        occasion: h.occasion,
        not_observed: false,
    }));

    let before = score_cohort(&current_members, eligibility);
    let after = score_cohort(&union_members, eligibility);

    let existing_impacts = existing
        .iter()
        .map(|m| ExistingImpact {
            id: m.id,
            fra: m.fra,
            old_rv: before.rv_of(&MemberId::Existing(m.id)),
            new_rv: after.rv_of(&MemberId::Existing(m.id)),
        })
        .collect();

    let hypothetical_impacts = union_members
        .iter()
        .filter_map(|m| match m.id {
            MemberId::Hypothetical(i) => Some((i, m)),
            MemberId::Existing(_) => None,
        })
        .map(|(i, m)| HypotheticalImpact {
            label: hypotheticals[i].label.clone(),
            fra: m.fra,
            predicted_rv: after.rv_of(&m.id),
            excluded: if malformed[i] {
                Some(ExclusionReason::InvalidGrades)
            } else {
                eligibility.exclusion(m)
            },
        })
        .collect();

    let before_fras: Vec<Fra> = before.scored.iter().map(|s| s.fra).collect();
    let after_fras: Vec<Fra> = after.scored.iter().map(|s| s.fra).collect();
    let current = CohortSummary::from_fras(&before_fras, before.anchors);
    let predicted = CohortSummary::from_fras(&after_fras, after.anchors);
    let fra_change = match (current.average_fra, predicted.average_fra) {
        (Some(old), Some(new)) => Some(Fra::from_hundredths(new.hundredths() - old.hundredths())),
        (None, Some(new)) => Some(new),
        _ => None,
    };

    ImpactPrediction {
        current,
        predicted,
        fra_change,
        existing: existing_impacts,
        hypotheticals: hypothetical_impacts,
    }
}
