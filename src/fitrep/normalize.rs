// Grade normalizer: raw OCR/text tokens to canonical ranks, letters, codes, dates, ids
use chrono::NaiveDate;

use super::codes::{OccasionCode, Rank, TraitGrade};

pub const EDIPI_LEN: usize = 10;
pub const FITREP_ID_LEN: usize = 7;

/// Letter/digit pairs OCR routinely confuses.
#[derive(Debug, Clone)]
pub struct ConfusableTable {
    pairs: Vec<(char, char)>,
}

impl Default for ConfusableTable {
    fn default() -> Self {
        Self::new(vec![('O', '0'), ('I', '1'), ('L', '1'), ('S', '5'), ('Z', '2'), ('B', '8')])
    }
}

impl ConfusableTable {
    /// `pairs` are `(letter, digit)`.
    pub fn new(pairs: Vec<(char, char)>) -> Self {
        Self { pairs }
    }

    /// True when `a` and `b` are equal or a confusable pair, in either order.
    pub fn confusable(&self, a: char, b: char) -> bool {
        a == b
            || self
                .pairs
                .iter()
                .any(|&(letter, digit)| (a == letter && b == digit) || (a == digit && b == letter))
    }

    pub fn to_digit(&self, c: char) -> Option<char> {
        if c.is_ascii_digit() {
            return Some(c);
        }
        self.pairs.iter().find(|(letter, _)| *letter == c).map(|&(_, digit)| digit)
    }

    /// First letter paired with the digit; `'1'` maps to `'I'`.
    pub fn to_letter(&self, c: char) -> Option<char> {
        if c.is_ascii_alphabetic() {
            return Some(c);
        }
        self.pairs.iter().find(|(_, digit)| *digit == c).map(|&(letter, _)| letter)
    }
}

/// Pure token normalizer. Every mode returns `None` for "unrecognized".
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    table: ConfusableTable,
}

impl Normalizer {
    pub fn new(table: ConfusableTable) -> Self {
        Self { table }
    }

    /// Trim surrounding punctuation, drop interior dots, upper-case.
    pub fn clean(raw: &str) -> String {
        raw.trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .chars()
            .filter(|c| *c != '.')
            .collect::<String>()
            .to_uppercase()
    }

    pub fn rank(&self, raw: &str) -> Option<Rank> {
        let token = Self::clean(raw);
        if token.is_empty() {
            return None;
        }
        if let Some(rank) = Rank::from_code(&token) {
            return Some(rank);
        }

        let chars: Vec<char> = token.chars().collect();
        let mut matches = Rank::ALL.iter().copied().filter(|rank| {
            let code: Vec<char> = rank.code().chars().collect();
            code.len() == chars.len() && chars.iter().zip(&code).all(|(&a, &b)| self.table.confusable(a, b))
        });

        match (matches.next(), matches.next()) {
            (Some(rank), None) => Some(rank),
            _ => None,
        }
    }

    pub fn grade(&self, raw: &str) -> Option<TraitGrade> {
        TraitGrade::from_letter(&Self::clean(raw))
    }

    pub fn occasion(&self, raw: &str) -> Option<OccasionCode> {
        let token: Option<String> = Self::clean(raw).chars().map(|c| self.table.to_letter(c)).collect();
        OccasionCode::from_code(&token?)
    }

    /// Exactly `len` digits after letter-to-digit repair.
    pub fn digits(&self, raw: &str, len: usize) -> Option<String> {
        let token = Self::clean(raw);
        if token.chars().count() != len {
            return None;
        }
        token.chars().map(|c| self.table.to_digit(c)).collect()
    }

    pub fn edipi(&self, raw: &str) -> Option<String> {
        self.digits(raw, EDIPI_LEN)
    }

    pub fn fitrep_id(&self, raw: &str) -> Option<String> {
        self.digits(raw, FITREP_ID_LEN)
    }

    /// `YYYYMMDD`, calendar-checked.
    pub fn date(&self, raw: &str) -> Option<NaiveDate> {
        let digits = self.digits(raw, 8)?;
        NaiveDate::parse_from_str(&digits, "%Y%m%d").ok()
    }

    /// Alphabetic name token, apostrophes and hyphens allowed.
    pub fn name(&self, raw: &str, min_len: usize) -> Option<String> {
        let token = raw.trim().trim_matches(|c: char| !c.is_alphabetic()).to_uppercase();
        let letters = token.chars().filter(|c| c.is_alphabetic()).count();
        let allowed = token.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-');
        (allowed && letters >= min_len).then_some(token)
    }

    /// Check marks as they come out of either tier.
    pub fn is_check_mark(raw: &str) -> bool {
        matches!(
            raw.trim().trim_matches(|c: char| matches!(c, '[' | ']' | '(' | ')')),
            "X" | "x" | "☒" | "✓" | "✔" | "✗" | "✘"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("MAJ", Some(Rank::Maj))]
    #[case("maj.", Some(Rank::Maj))]
    #[case("1STLT", Some(Rank::FirstLt))]
    #[case("ISTLT", Some(Rank::FirstLt))]
    #[case("C0L", Some(Rank::Col))]
    #[case("5GT", Some(Rank::Sgt))]
    #[case("CW03", Some(Rank::Cwo3))]
    #[case("CAPTAIN", None)]
    #[case("", None)]
    fn test_rank_mode(#[case] raw: &str, #[case] expected: Option<Rank>) {
        assert_eq!(Normalizer::default().rank(raw), expected);
    }

    #[test]
    fn test_rank_keeps_leading_digit() {
        let rank = Normalizer::default().rank("1STLT").unwrap();
        assert_eq!(rank.code(), "1STLT");
    }

    #[test]
    fn test_ambiguous_rank_is_unrecognized() {
        let normalizer = Normalizer::new(ConfusableTable::new(vec![('X', '2'), ('X', '3')]));
        assert_eq!(normalizer.rank("CWOX"), None);
        assert_eq!(normalizer.rank("CWO2"), Some(Rank::Cwo2));
    }

    #[rstest]
    #[case("A", Some(TraitGrade::A))]
    #[case("g", Some(TraitGrade::G))]
    #[case("(D)", Some(TraitGrade::D))]
    #[case("O", None)]
    #[case("0", None)]
    #[case("8", None)]
    #[case("AB", None)]
    #[case("I", None)]
    fn test_grade_mode(#[case] raw: &str, #[case] expected: Option<TraitGrade>) {
        assert_eq!(Normalizer::default().grade(raw), expected);
    }

    #[test]
    fn test_numeric_modes_repair_letters() {
        let n = Normalizer::default();
        assert_eq!(n.edipi("12345678O9").as_deref(), Some("1234567809"));
        assert_eq!(n.edipi("123456789").as_deref(), None);
        assert_eq!(n.fitrep_id("I234567").as_deref(), Some("1234567"));
        assert_eq!(n.date("2O240131"), NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(n.date("20241331"), None);
    }

    #[test]
    fn test_occasion_mode_repairs_digits() {
        let n = Normalizer::default();
        assert_eq!(n.occasion("AN"), Some(OccasionCode::Annual));
        assert_eq!(n.occasion("5A"), Some(OccasionCode::SemiAnnual));
        assert_eq!(n.occasion("TO"), None);
    }

    #[test]
    fn test_name_and_check_marks() {
        let n = Normalizer::default();
        assert_eq!(n.name("O'Brien,", 2).as_deref(), Some("O'BRIEN"));
        assert_eq!(n.name("SM1TH", 2), None);
        assert!(Normalizer::is_check_mark("[X]"));
        assert!(!Normalizer::is_check_mark("XX"));
    }
}
