// lopdf helper - Pure Rust PDF validation and page geometry
use lopdf::{Dictionary, Document, Object};
use std::path::Path;

use crate::types::Result;

/// US Letter, used when a page carries no readable MediaBox.
pub const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// Parse PDF bytes; anything lopdf rejects is not a PDF for our purposes.
pub fn load_pdf_bytes(bytes: &[u8]) -> Result<Document> {
    Ok(Document::load_mem(bytes)?)
}

pub fn load_pdf(path: &Path) -> Result<Document> {
    Ok(Document::load(path)?)
}

/// Execute an operation with a PDF document
pub fn with_pdf<F, R>(path: &Path, f: F) -> Result<R>
where
    F: FnOnce(&Document) -> Result<R>,
{
    let document = load_pdf(path)?;
    f(&document)
}

pub fn page_count(document: &Document) -> usize {
    document.get_pages().len()
}

/// Page width and height in points for a zero-based page index.
pub fn page_dimensions(document: &Document, page_index: usize) -> (f32, f32) {
    let pages = document.get_pages();
    let Some(page_id) = pages.get(&((page_index + 1) as u32)) else {
        return DEFAULT_PAGE_SIZE;
    };

    match document.get_object(*page_id).and_then(Object::as_dict) {
        Ok(page) => media_box(document, page).unwrap_or(DEFAULT_PAGE_SIZE),
        Err(_) => DEFAULT_PAGE_SIZE,
    }
}

fn media_box(document: &Document, page: &Dictionary) -> Option<(f32, f32)> {
    let media_box = page.get(b"MediaBox").ok()?;
    let array = match media_box {
        Object::Reference(id) => document.get_object(*id).ok()?.as_array().ok()?,
        Object::Array(arr) => arr,
        _ => return None,
    };

    let bounds: Vec<f32> = array
        .iter()
        .filter_map(|obj| match obj {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(f) => Some(*f),
            _ => None,
        })
        .collect();

    if bounds.len() == 4 {
        Some((bounds[2] - bounds[0], bounds[3] - bounds[1]))
    } else {
        None
    }
}
