// Page layout primitives: tokens with bounding boxes, grouped into lines
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Axis-aligned box in PDF points, origin at the top-left of the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn center_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Length of the shared x-range, negative when the boxes are apart.
    pub fn horizontal_overlap(&self, other: &BBox) -> f32 {
        self.x1.min(other.x1) - self.x0.max(other.x0)
    }

    pub fn scaled(&self, factor: f32) -> BBox {
        BBox {
            x0: self.x0 * factor,
            y0: self.y0 * factor,
            x1: self.x1 * factor,
            y1: self.y1 * factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub bbox: BBox,
}

impl Token {
    pub fn new(text: impl Into<String>, bbox: BBox) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }
}

/// Which extraction tier produced a page's tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextTier {
    TextLayer,
    Ocr,
}

/// Tokens of one visual line, left to right.
#[derive(Debug, Clone)]
pub struct TextLine {
    pub tokens: Vec<usize>,
    pub bbox: BBox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub width: f32,
    pub height: f32,
    pub tier: TextTier,
    pub tokens: Vec<Token>,
}

impl PageLayout {
    pub fn new(page_index: usize, width: f32, height: f32, tier: TextTier, tokens: Vec<Token>) -> Self {
        Self {
            page_index,
            width,
            height,
            tier,
            tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.iter().all(|t| t.text.trim().is_empty())
    }

    /// Group tokens into lines by vertical center, top to bottom.
    pub fn lines(&self) -> Vec<TextLine> {
        let mut order: Vec<usize> = (0..self.tokens.len()).collect();
        order.sort_by(|&a, &b| {
            let (ba, bb) = (&self.tokens[a].bbox, &self.tokens[b].bbox);
            ba.center_y()
                .partial_cmp(&bb.center_y())
                .unwrap_or(Ordering::Equal)
                .then(ba.x0.partial_cmp(&bb.x0).unwrap_or(Ordering::Equal))
        });

        let mut lines: Vec<TextLine> = Vec::new();
        for idx in order {
            let bbox = self.tokens[idx].bbox;
            let joins_current = lines.last().map_or(false, |line| {
                let tolerance = 0.5 * line.bbox.height().max(bbox.height()).max(1.0);
                (bbox.center_y() - line.bbox.center_y()).abs() <= tolerance
            });

            if joins_current {
                if let Some(line) = lines.last_mut() {
                    line.tokens.push(idx);
                    line.bbox = line.bbox.union(&bbox);
                }
            } else {
                lines.push(TextLine { tokens: vec![idx], bbox });
            }
        }

        for line in &mut lines {
            let tokens = &self.tokens;
            line.tokens.sort_by(|&a, &b| {
                tokens[a].bbox.x0.partial_cmp(&tokens[b].bbox.x0).unwrap_or(Ordering::Equal)
            });
        }
        lines
    }

    /// Full page text, one line per visual line.
    pub fn text(&self) -> String {
        self.lines()
            .iter()
            .map(|line| {
                line.tokens
                    .iter()
                    .map(|&i| self.tokens[i].text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn word_count(&self) -> usize {
        self.tokens.iter().filter(|t| !t.text.trim().is_empty()).count()
    }
}
