use serde::Serialize;

use super::layout::PageLayout;
use crate::config::ExtractionConfig;

/// Page content fingerprint for routing decisions
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageFingerprint {
    pub char_count: usize,
    pub word_count: usize,
    pub text_quality: f32, // 0.0-1.0 quality score
    pub keyword_hits: usize,
}

impl PageFingerprint {
    pub fn analyze(page: &PageLayout, config: &ExtractionConfig) -> Self {
        let text = page.text();
        let upper = text.to_uppercase();
        let keyword_hits = config
            .expected_keywords
            .iter()
            .filter(|kw| upper.contains(kw.to_uppercase().as_str()))
            .count();

        Self {
            char_count: text.chars().filter(|c| !c.is_whitespace()).count(),
            word_count: page.word_count(),
            text_quality: calculate_quality_score(&text),
            keyword_hits,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.char_count == 0
    }

    /// Whether the cheap text layer is good enough to skip OCR.
    pub fn passes(&self, config: &ExtractionConfig) -> bool {
        let has_keywords = config.expected_keywords.is_empty() || self.keyword_hits > 0;
        self.char_count >= config.min_chars
            && self.word_count >= config.min_words
            && self.text_quality >= config.min_quality
            && has_keywords
    }

    /// Ordering used when both tiers produced something.
    pub fn score(&self) -> f32 {
        self.text_quality + self.keyword_hits as f32 * 0.1 + (self.word_count as f32).ln_1p() * 0.05
    }
}

/// Calculate quality score for extracted text
pub fn calculate_quality_score(text: &str) -> f32 {
    if text.trim().is_empty() {
        return 0.0;
    }

    let checks = [
        text.len() > 10,                  // Has content
        !is_mostly_gibberish(text),       // Not gibberish
        has_dictionary_words(text),       // Has real words
        has_reasonable_whitespace(text),  // Proper formatting
    ];

    let passed = checks.iter().filter(|&&x| x).count() as f32;
    passed / checks.len() as f32
}

/// Check if text is mostly gibberish
fn is_mostly_gibberish(text: &str) -> bool {
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    if letters == 0 {
        return true;
    }

    // Check vowel ratio among letters; form text is mostly upper-case words
    let vowel_count = text.chars().filter(|c| "aeiouAEIOU".contains(*c)).count();
    let vowel_ratio = vowel_count as f32 / letters as f32;

    !(0.15..=0.7).contains(&vowel_ratio)
}

/// Check if text has dictionary words
fn has_dictionary_words(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }

    // Simple check: words should be mostly alphabetic and reasonable length
    let valid_words = words
        .iter()
        .filter(|w| w.len() >= 2 && w.len() <= 20)
        .filter(|w| {
            let alpha_ratio = w.chars().filter(|c| c.is_alphabetic()).count() as f32 / w.len() as f32;
            alpha_ratio > 0.7
        })
        .count();

    valid_words as f32 / words.len() as f32 > 0.4
}

/// Check if text has reasonable whitespace
fn has_reasonable_whitespace(text: &str) -> bool {
    let whitespace_count = text.chars().filter(|c| c.is_whitespace()).count();
    let whitespace_ratio = whitespace_count as f32 / text.len() as f32;

    whitespace_ratio > 0.05 && whitespace_ratio < 0.5
}
