// Fitness Report Average: mean of observed trait values, two fixed decimals
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::fitrep::codes::TraitGrade;
use crate::fitrep::labels::TRAIT_NAMES;

/// Fixed-point score in hundredths: `Fra(400)` is 4.00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fra(i64);

impl Fra {
    pub const fn from_hundredths(hundredths: i64) -> Self {
        Fra(hundredths)
    }

    pub const fn hundredths(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Nearest hundredth, halves away from zero.
    pub fn from_f64(value: f64) -> Self {
        Fra((value * 100.0).round() as i64)
    }
}

/// `numerator / denominator` rounded half-up, for a positive denominator.
pub(crate) fn div_round_half_up(numerator: i64, denominator: i64) -> i64 {
    (2 * numerator + denominator).div_euclid(2 * denominator)
}

/// `numerator / denominator` rounded half to even, for a positive denominator.
pub(crate) fn div_round_half_even(numerator: i64, denominator: i64) -> i64 {
    let quotient = numerator.div_euclid(denominator);
    let twice_rest = 2 * numerator.rem_euclid(denominator);
    match twice_rest.cmp(&denominator) {
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal => quotient + quotient.rem_euclid(2),
        std::cmp::Ordering::Less => quotient,
    }
}

impl fmt::Display for Fra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid FRA value: {0:?}")]
pub struct ParseFraError(String);

impl FromStr for Fra {
    type Err = ParseFraError;

    /// Exact decimal parse, rounded half-up past the second decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseFraError(s.to_string());
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = body.split_once('.').unwrap_or((body, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(err());
        }
        if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(err());
        }

        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| err())? };
        let digits: Vec<i64> = frac.chars().filter_map(|c| c.to_digit(10)).map(i64::from).collect();
        let tenths = digits.first().copied().unwrap_or(0);
        let hundredths = digits.get(1).copied().unwrap_or(0);
        let round_up = i64::from(digits.get(2).map_or(false, |d| *d >= 5));

        // Bounded to i32 hundredths so cohort arithmetic stays inside i64.
        let value = whole
            .checked_mul(100)
            .and_then(|v| v.checked_add(tenths * 10 + hundredths + round_up))
            .filter(|v| *v <= i64::from(i32::MAX))
            .ok_or_else(err)?;
        Ok(Fra(if negative { -value } else { value }))
    }
}

impl Serialize for Fra {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Fra {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Fra::from_f64)
    }
}

/// FRA over trait grades. H is skipped; no observed grade gives `None`.
pub fn compute_fra<I>(grades: I) -> Option<Fra>
where
    I: IntoIterator<Item = TraitGrade>,
{
    let (sum, count) = grades
        .into_iter()
        .filter_map(TraitGrade::numeric)
        .fold((0i64, 0i64), |(sum, count), v| (sum + i64::from(v), count + 1));

    if count == 0 {
        return None;
    }
    Some(Fra(div_round_half_up(sum * 100, count)))
}

/// FRA over raw letters; anything that is not a single A-H letter is skipped.
pub fn compute_fra_from_letters<I, S>(letters: I) -> Option<Fra>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    compute_fra(letters.into_iter().filter_map(|l| TraitGrade::from_letter(l.as_ref())))
}

/// Problems found in a trait-name to letter map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraitValidation {
    pub missing: Vec<String>,
    pub invalid: Vec<(String, String)>,
    pub all_not_observed: bool,
}

impl TraitValidation {
    pub fn is_valid(&self) -> bool {
        self.is_well_formed() && !self.all_not_observed
    }

    /// Every trait present with a readable letter; H throughout still counts.
    pub fn is_well_formed(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.missing.is_empty() {
            out.push(format!("missing trait grades: {}", self.missing.join(", ")));
        }
        for (name, letter) in &self.invalid {
            out.push(format!("invalid letter grade '{}' for trait '{}'", letter, name));
        }
        if self.all_not_observed {
            out.push("every trait is marked not observed".to_string());
        }
        out
    }
}

/// Check a trait map against the 14 canonical names. Names match case-insensitively.
pub fn validate_trait_grades(grades: &BTreeMap<String, String>) -> TraitValidation {
    let present: Vec<String> = grades.keys().map(|k| k.trim().to_lowercase()).collect();
    let missing = TRAIT_NAMES
        .iter()
        .filter(|name| !present.contains(&name.to_lowercase()))
        .map(|name| name.to_string())
        .collect();

    let mut invalid = Vec::new();
    let mut parsed = Vec::new();
    for (name, letter) in grades {
        match TraitGrade::from_letter(letter) {
            Some(grade) => parsed.push(grade),
            None => invalid.push((name.clone(), letter.clone())),
        }
    }

    TraitValidation {
        missing,
        invalid,
        all_not_observed: !parsed.is_empty() && parsed.iter().all(|g| !g.is_observed()),
    }
}
