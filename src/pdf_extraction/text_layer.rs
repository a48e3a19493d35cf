// Direct text-layer extraction using `pdftotext -bbox`
//
// pdftotext emits an XHTML document with one <page> element per page and one
// <word> element per word, each carrying its box in points:
//
//   <page width="612.000000" height="792.000000">
//     <word xMin="56.8" yMin="57.1" xMax="88.9" yMax="69.1">USMC</word>
//
// We keep only those two elements; everything else is ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::process::Command;
use std::time::Instant;
use tracing::debug;

use super::layout::{BBox, PageLayout, TextTier, Token};
use crate::types::{FitrepError, Result};

static PAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<page\s+width="([0-9.]+)"\s+height="([0-9.]+)"\s*>"#).expect("page regex")
});

static WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<word\s+xMin="(-?[0-9.]+)"\s+yMin="(-?[0-9.]+)"\s+xMax="(-?[0-9.]+)"\s+yMax="(-?[0-9.]+)"\s*>(.*?)</word>"#,
    )
    .expect("word regex")
});

/// Run pdftotext over the first `max_pages` pages and return their layouts.
pub fn extract_text_layer(pdftotext_bin: &str, pdf_path: &Path, max_pages: usize) -> Result<Vec<PageLayout>> {
    let start = Instant::now();
    let last_page = max_pages.max(1).to_string();

    let output = Command::new(pdftotext_bin)
        .arg("-f")
        .arg("1")
        .arg("-l")
        .arg(&last_page)
        .arg("-bbox")
        .arg(pdf_path)
        .arg("-")
        .output()
        .map_err(|e| FitrepError::tool(pdftotext_bin, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FitrepError::tool(pdftotext_bin, stderr.trim().to_string()));
    }

    let html = String::from_utf8_lossy(&output.stdout);
    let pages = parse_bbox_html(&html);
    debug!(
        "pdftotext produced {} page(s) in {}ms",
        pages.len(),
        start.elapsed().as_millis()
    );
    Ok(pages)
}

/// Parse `pdftotext -bbox` output into one layout per page, in page order.
pub fn parse_bbox_html(html: &str) -> Vec<PageLayout> {
    let page_starts: Vec<(usize, f32, f32)> = PAGE_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let start = caps.get(0)?.end();
            let width = caps[1].parse().ok()?;
            let height = caps[2].parse().ok()?;
            Some((start, width, height))
        })
        .collect();

    page_starts
        .iter()
        .enumerate()
        .map(|(index, &(start, width, height))| {
            let end = page_starts.get(index + 1).map_or(html.len(), |next| next.0);
            let tokens = parse_words(&html[start..end]);
            PageLayout::new(index, width, height, TextTier::TextLayer, tokens)
        })
        .collect()
}

fn parse_words(segment: &str) -> Vec<Token> {
    WORD_RE
        .captures_iter(segment)
        .filter_map(|caps| {
            let x0: f32 = caps[1].parse().ok()?;
            let y0: f32 = caps[2].parse().ok()?;
            let x1: f32 = caps[3].parse().ok()?;
            let y1: f32 = caps[4].parse().ok()?;
            let text = decode_entities(&caps[5]);
            if text.trim().is_empty() {
                return None;
            }
            Some(Token::new(text, BBox::new(x0, y0, x1, y1)))
        })
        .collect()
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
