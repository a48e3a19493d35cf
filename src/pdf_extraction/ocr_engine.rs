// OCR fallback: rasterize with pdftoppm, clean up with `image`, read with tesseract
use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use tracing::debug;

use super::layout::{BBox, PageLayout, TextTier, Token};
use crate::config::OcrConfig;
use crate::types::{FitrepError, Result};

/// Tesseract TSV level for a single word.
const WORD_LEVEL: &str = "5";

pub struct OcrEngine {
    config: OcrConfig,
}

impl OcrEngine {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// OCR one page. `page_size` is the page's size in points, used when the
    /// rendered image cannot be measured.
    pub fn extract_page(&self, pdf_path: &Path, page_index: usize, page_size: (f32, f32)) -> Result<PageLayout> {
        let start = Instant::now();
        let workdir = tempfile::tempdir()?;

        let raster = self.rasterize(pdf_path, page_index, workdir.path())?;
        let prepared = workdir.path().join("page-prepared.png");
        let (px_width, px_height) = self.preprocess(&raster, &prepared)?;

        let tsv = self.run_tesseract(&prepared)?;
        let scale = 72.0 / self.config.dpi.max(1) as f32;
        let tokens = parse_tsv(&tsv, scale, self.config.min_word_confidence);

        let (width, height) = if px_width > 0 && px_height > 0 {
            (px_width as f32 * scale, px_height as f32 * scale)
        } else {
            page_size
        };

        debug!(
            "OCR page {} produced {} words in {}ms",
            page_index + 1,
            tokens.len(),
            start.elapsed().as_millis()
        );
        Ok(PageLayout::new(page_index, width, height, TextTier::Ocr, tokens))
    }

    fn rasterize(&self, pdf_path: &Path, page_index: usize, workdir: &Path) -> Result<PathBuf> {
        let page = (page_index + 1).to_string();
        let prefix = workdir.join("page");

        let output = Command::new(&self.config.pdftoppm_bin)
            .args(["-f", &page, "-l", &page])
            .args(["-r", &self.config.dpi.to_string()])
            .args(["-gray", "-singlefile", "-png"])
            .arg(pdf_path)
            .arg(&prefix)
            .output()
            .map_err(|e| FitrepError::tool(&self.config.pdftoppm_bin, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FitrepError::tool(&self.config.pdftoppm_bin, stderr.trim().to_string()));
        }

        let png = prefix.with_extension("png");
        if !png.exists() {
            return Err(FitrepError::tool(&self.config.pdftoppm_bin, "no image rendered"));
        }
        Ok(png)
    }

    /// Grayscale, stretch contrast, optionally binarize. Returns pixel size.
    fn preprocess(&self, input: &Path, output: &Path) -> Result<(u32, u32)> {
        let gray = image::open(input)?.to_luma8();
        let prepared = prepare_for_ocr(&gray, self.config.binarize_threshold);
        prepared.save(output)?;
        Ok(prepared.dimensions())
    }

    fn run_tesseract(&self, image_path: &Path) -> Result<String> {
        let output = Command::new(&self.config.tesseract_bin)
            .arg(image_path)
            .arg("stdout")
            .args(["--psm", &self.config.psm.to_string()])
            .args(["--dpi", &self.config.dpi.to_string()])
            .arg("tsv")
            .output()
            .map_err(|e| FitrepError::tool(&self.config.tesseract_bin, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FitrepError::tool(&self.config.tesseract_bin, stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Stretch the luma range to 0..=255, then threshold if asked.
pub fn prepare_for_ocr(gray: &GrayImage, threshold: Option<u8>) -> GrayImage {
    let (lo, hi) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), Luma([v])| (lo.min(*v), hi.max(*v)));
    let range = hi.saturating_sub(lo).max(1) as u32;

    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, Luma([v])) in gray.enumerate_pixels() {
        let stretched = ((v.saturating_sub(lo)) as u32 * 255 / range) as u8;
        let value = match threshold {
            Some(t) if stretched >= t => 255,
            Some(_) => 0,
            None => stretched,
        };
        out.put_pixel(x, y, Luma([value]));
    }
    out
}

/// Parse tesseract TSV into word tokens. Pixel boxes are multiplied by `scale`.
pub fn parse_tsv(tsv: &str, scale: f32, min_confidence: f32) -> Vec<Token> {
    tsv.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 || cols[0] != WORD_LEVEL {
                return None;
            }
            let text = cols[11].trim();
            if text.is_empty() {
                return None;
            }
            let conf: f32 = cols[10].parse().ok()?;
            if conf < min_confidence {
                return None;
            }
            let left: f32 = cols[6].parse().ok()?;
            let top: f32 = cols[7].parse().ok()?;
            let width: f32 = cols[8].parse().ok()?;
            let height: f32 = cols[9].parse().ok()?;
            let bbox = BBox::new(left, top, left + width, top + height).scaled(scale);
            Some(Token::new(text, bbox))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t2550\t3300\t-1\t
4\t1\t1\t1\t1\t0\t150\t300\t900\t50\t-1\t
5\t1\t1\t1\t1\t1\t150\t300\t300\t50\t91.5\tREPORTING
5\t1\t1\t1\t1\t2\t500\t300\t250\t50\t88.0\tSENIOR
5\t1\t1\t1\t1\t3\t800\t300\t40\t50\t12.0\t~
5\t1\t1\t1\t1\t4\t900\t300\t40\t50\t95.0\t ";

    #[test]
    fn test_parse_tsv_keeps_confident_words() {
        let tokens = parse_tsv(TSV, 72.0 / 300.0, 30.0);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "REPORTING");
        assert!((tokens[0].bbox.x0 - 36.0).abs() < 1e-3);
        assert!((tokens[0].bbox.y1 - 84.0).abs() < 1e-3);
    }

    #[test]
    fn test_prepare_for_ocr_stretches_and_binarizes() {
        let mut gray = GrayImage::new(2, 1);
        gray.put_pixel(0, 0, Luma([100]));
        gray.put_pixel(1, 0, Luma([150]));

        let stretched = prepare_for_ocr(&gray, None);
        assert_eq!(stretched.get_pixel(0, 0).0[0], 0);
        assert_eq!(stretched.get_pixel(1, 0).0[0], 255);

        let binary = prepare_for_ocr(&gray, Some(128));
        assert_eq!(binary.get_pixel(0, 0).0[0], 0);
        assert_eq!(binary.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn test_missing_rasterizer_is_tool_error() {
        let engine = OcrEngine::new(OcrConfig {
            pdftoppm_bin: "/nonexistent/pdftoppm".to_string(),
            ..OcrConfig::default()
        });
        let err = engine
            .extract_page(Path::new("missing.pdf"), 0, (612.0, 792.0))
            .unwrap_err();
        assert!(matches!(err, FitrepError::Tool { .. }));
    }
}
