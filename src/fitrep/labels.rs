// Declarative label tables for the NAVMC 10835 fitness report form
//
// New form variants are added as data here; the locator only interprets
// these tables.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The 14 performance traits, in form order.
pub const TRAIT_NAMES: [&str; 14] = [
    "Mission Accomplishment",
    "Proficiency",
    "Individual Character",
    "Effectiveness Under Stress",
    "Initiative",
    "Leadership",
    "Developing Subordinates",
    "Setting the Example",
    "Ensuring Well-being of Subordinates",
    "Communication Skills",
    "Intellect and Wisdom",
    "Decision Making Ability",
    "Judgment",
    "Fulfillment of Evaluation Responsibilities",
];

/// Every field the locator can report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldId {
    FitrepId,
    LastName,
    FirstName,
    Edipi,
    Rank,
    Occasion,
    PeriodFrom,
    PeriodTo,
    Organization,
    RsLastName,
    RsRank,
    RsEdipi,
    RoLastName,
    RoRank,
    RoEdipi,
    /// Zero-based index into `TRAIT_NAMES`.
    Trait(usize),
}

/// Kind of value a field holds, which is also its candidate filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Name,
    Rank,
    Occasion,
    Date,
    Edipi,
    FitrepId,
    Text,
}

/// Vertical band of page 1 a field lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Marine,
    ReportingSenior,
    ReviewingOfficer,
    Any,
}

/// Spatial neighbourhood of a label, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchRule {
    pub max_dx: f32,
    pub max_dy: f32,
    pub column_slack: f32,
}

impl Default for SearchRule {
    fn default() -> Self {
        Self {
            max_dx: 200.0,
            max_dy: 30.0,
            column_slack: 20.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub field: FieldId,
    pub labels: Vec<String>,
    pub kind: ValueKind,
    pub section: Section,
    pub rule: SearchRule,
}

impl FieldSpec {
    fn new(field: FieldId, labels: &[&str], kind: ValueKind, section: Section) -> Self {
        Self {
            field,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            kind,
            section,
            rule: SearchRule::default(),
        }
    }

    fn with_rule(mut self, rule: SearchRule) -> Self {
        self.rule = rule;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TraitSpec {
    pub name: &'static str,
    pub aliases: Vec<String>,
}

/// Immutable form description shared by every extraction.
#[derive(Debug, Clone)]
pub struct FormTables {
    pub fields: Vec<FieldSpec>,
    pub traits: Vec<TraitSpec>,
    pub reporting_senior_anchors: Vec<String>,
    pub reviewing_officer_anchors: Vec<String>,
    pub not_observed_labels: Vec<String>,
    /// Upper-case words printed on the form that are never values.
    pub label_words: HashSet<String>,
    /// Minimum grade-header letters for a row to count as the A..H header.
    pub min_header_letters: usize,
}

impl Default for FormTables {
    fn default() -> Self {
        Self::navmc_10835()
    }
}

impl FormTables {
    pub fn navmc_10835() -> Self {
        use FieldId::*;
        use Section::*;

        let wide = SearchRule {
            max_dx: 260.0,
            max_dy: 24.0,
            column_slack: 20.0,
        };

        let fields = vec![
            FieldSpec::new(FitrepId, &["FITREP ID", "FITREP ID #", "REPORT ID"], ValueKind::FitrepId, Any)
                .with_rule(wide),
            FieldSpec::new(LastName, &["LAST NAME"], ValueKind::Name, Marine),
            FieldSpec::new(FirstName, &["FIRST NAME"], ValueKind::Name, Marine),
            FieldSpec::new(Edipi, &["EDIPI", "DOD ID", "SSN"], ValueKind::Edipi, Marine),
            FieldSpec::new(Rank, &["GRADE", "RANK"], ValueKind::Rank, Marine),
            FieldSpec::new(Occasion, &["OCC", "OCCASION"], ValueKind::Occasion, Marine),
            FieldSpec::new(PeriodFrom, &["FROM"], ValueKind::Date, Marine),
            FieldSpec::new(PeriodTo, &["TO"], ValueKind::Date, Marine),
            FieldSpec::new(Organization, &["ORGANIZATION", "REPORTING UNIT", "UNIT"], ValueKind::Text, Marine)
                .with_rule(wide),
            FieldSpec::new(RsLastName, &["LAST NAME"], ValueKind::Name, ReportingSenior),
            FieldSpec::new(RsRank, &["GRADE", "RANK"], ValueKind::Rank, ReportingSenior),
            FieldSpec::new(RsEdipi, &["EDIPI", "DOD ID", "SSN"], ValueKind::Edipi, ReportingSenior),
            FieldSpec::new(RoLastName, &["LAST NAME"], ValueKind::Name, ReviewingOfficer),
            FieldSpec::new(RoRank, &["GRADE", "RANK"], ValueKind::Rank, ReviewingOfficer),
            FieldSpec::new(RoEdipi, &["EDIPI", "DOD ID", "SSN"], ValueKind::Edipi, ReviewingOfficer),
        ];

        let aliases: [&[&str]; 14] = [
            &["MISSION ACCOMPLISHMENT", "PERFORMANCE"],
            &["PROFICIENCY"],
            &["INDIVIDUAL CHARACTER", "COURAGE"],
            &["EFFECTIVENESS UNDER STRESS"],
            &["INITIATIVE"],
            &["LEADERSHIP", "LEADING SUBORDINATES"],
            &["DEVELOPING SUBORDINATES"],
            &["SETTING THE EXAMPLE"],
            &["ENSURING WELL-BEING OF SUBORDINATES", "ENSURING WELL-BEING"],
            &["COMMUNICATION SKILLS"],
            &["INTELLECT AND WISDOM", "PROFESSIONAL MILITARY EDUCATION"],
            &["DECISION MAKING ABILITY", "DECISION MAKING"],
            &["JUDGMENT", "JUDGEMENT"],
            &["FULFILLMENT OF EVALUATION RESPONSIBILITIES", "EVALUATIONS"],
        ];
        let traits = TRAIT_NAMES
            .iter()
            .zip(aliases)
            .map(|(&name, extra)| {
                let mut all = vec![name.to_uppercase()];
                all.extend(extra.iter().map(|a| a.to_string()));
                all.dedup();
                TraitSpec { name, aliases: all }
            })
            .collect();

        let label_words = [
            "DUTY", "ASSIGNMENT", "GRADE", "SERVICE", "LAST", "NAME", "FIRST", "INITIALS", "COMMANDER",
            "OFFICER", "SENIOR", "REPORTING", "REVIEWING", "USMC", "ANG", "USA", "AFNG", "USAF", "USN",
            "FMS", "USCG", "USSF", "EDIPI", "MARINE", "REPORTED", "FROM", "TO", "OCC", "MI", "DOR",
            "PMOS", "BILMOS", "RANK", "UNIT", "ORGANIZATION",
        ]
        .iter()
        .map(|w| w.to_string())
        .collect();

        Self {
            fields,
            traits,
            reporting_senior_anchors: vec!["REPORTING SENIOR".to_string()],
            reviewing_officer_anchors: vec!["REVIEWING OFFICER".to_string()],
            not_observed_labels: vec!["NOT OBSERVED".to_string()],
            label_words,
            min_header_letters: 6,
        }
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.field == id)
    }

    pub fn is_label_word(&self, word: &str) -> bool {
        self.label_words.contains(&word.to_uppercase())
    }
}

/// Comparison key: upper-case letters and digits only.
pub fn match_key(text: &str) -> String {
    text.chars().filter(|c| c.is_alphanumeric()).flat_map(|c| c.to_uppercase()).collect()
}

/// Edit budget for a label of `len` key characters.
pub fn allowed_edits(len: usize) -> usize {
    len * 12 / 100
}

/// Levenshtein distance over chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            cur[j + 1] = substitution.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trait_table_is_complete_and_ordered() {
        let tables = FormTables::default();
        assert_eq!(tables.traits.len(), 14);
        for (spec, name) in tables.traits.iter().zip(TRAIT_NAMES) {
            assert_eq!(spec.name, name);
            assert_eq!(spec.aliases[0], name.to_uppercase());
        }
    }

    #[test]
    fn test_every_admin_field_has_a_spec() {
        let tables = FormTables::default();
        assert_eq!(tables.fields.len(), 15);
        assert_eq!(tables.field(FieldId::RsEdipi).unwrap().section, Section::ReportingSenior);
        assert!(tables.field(FieldId::Trait(0)).is_none());
    }

    #[test]
    fn test_fuzzy_budget_keeps_short_labels_exact() {
        assert_eq!(allowed_edits(match_key("GRADE").len()), 0);
        assert_eq!(allowed_edits(match_key("PROFICIENCY").len()), 1);
        assert_eq!(allowed_edits(match_key("FULFILLMENT OF EVALUATION RESPONSIBILITIES").len()), 4);
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("PROFICIENCY", "PROFICIENCY"), 0);
        assert_eq!(edit_distance("PROFICIENCY", "PR0FICIENCY"), 1);
        assert_eq!(edit_distance("JUDGMENT", "JUDGEMENT"), 1);
        assert_eq!(edit_distance("", "ABC"), 3);
    }

    #[test]
    fn test_match_key_drops_punctuation() {
        assert_eq!(match_key("Fitrep ID #:"), "FITREPID");
        assert_eq!(match_key("Well-being"), "WELLBEING");
    }
}
