//! Caption measurement, wrapping and rasterization.

use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont, point};
use std::path::Path;

use crate::error::{CarouselError, Result};
use crate::utils::convert::CoverageMask;

/// A font at a fixed size, as far as the compositor is concerned.
pub trait TextFace {
    /// Horizontal advance of `text` in pixels, kerning included.
    fn advance_width(&self, text: &str) -> f32;

    /// Baseline to the top of the glyph box (positive).
    fn ascent(&self) -> f32;

    /// Baseline to the bottom of the glyph box (negative).
    fn descent(&self) -> f32;

    /// Accumulate the coverage of `text` into `mask`, with the left edge at
    /// `x` and the baseline at `baseline` (mask coordinates).
    fn draw_line(&self, text: &str, x: f32, baseline: f32, mask: &mut CoverageMask);
}

/// A TrueType/OpenType face rendered with ab_glyph.
pub struct FontFace {
    font: FontArc,
    scale: PxScale,
    font_size: f32,
}

impl FontFace {
    /// `font_size` is the em size in pixels, the way a canvas font
    /// shorthand like `72px serif` is interpreted.
    pub fn new(font: FontArc, font_size: f32) -> Self {
        // ab_glyph scales by ascent - descent, not by the em square.
        let units_per_em = font.units_per_em().unwrap_or(1000.0);
        let scale = PxScale::from(font_size * font.height_unscaled() / units_per_em);
        FontFace {
            font,
            scale,
            font_size,
        }
    }

    pub fn from_bytes(data: Vec<u8>, font_size: f32) -> Result<Self> {
        let font = FontArc::try_from_vec(data).map_err(|e| CarouselError::Font(e.to_string()))?;
        Ok(Self::new(font, font_size))
    }

    pub fn from_file(path: impl AsRef<Path>, font_size: f32) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| CarouselError::Font(format!("{}: {}", path.display(), e)))?;
        Self::from_bytes(data, font_size)
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    /// Glyph ids paired with their pen x position, left edge at 0.
    fn layout_line(&self, text: &str) -> (Vec<(GlyphId, f32)>, f32) {
        let scaled = self.font.as_scaled(self.scale);
        let mut glyphs = Vec::with_capacity(text.len());
        let mut caret = 0.0f32;
        let mut last: Option<GlyphId> = None;

        for ch in text.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(prev) = last {
                caret += scaled.kern(prev, id);
            }
            glyphs.push((id, caret));
            caret += scaled.h_advance(id);
            last = Some(id);
        }

        (glyphs, caret)
    }
}

impl TextFace for FontFace {
    fn advance_width(&self, text: &str) -> f32 {
        self.layout_line(text).1
    }

    fn ascent(&self) -> f32 {
        self.font.as_scaled(self.scale).ascent()
    }

    fn descent(&self) -> f32 {
        self.font.as_scaled(self.scale).descent()
    }

    fn draw_line(&self, text: &str, x: f32, baseline: f32, mask: &mut CoverageMask) {
        let (width, height) = mask.dimensions();
        let (glyphs, _) = self.layout_line(text);

        for (id, pen_x) in glyphs {
            let glyph = id.with_scale_and_position(self.scale, point(x + pen_x, baseline));
            let Some(outlined) = self.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i64 + gx as i64;
                let py = bounds.min.y as i64 + gy as i64;
                if px < 0 || py < 0 || px >= width as i64 || py >= height as i64 {
                    return;
                }
                let cell = mask.get_pixel_mut(px as u32, py as u32);
                cell[0] = (cell[0] + coverage).min(1.0);
            });
        }
    }
}

/// Break `text` into lines no wider than `max_width`.
///
/// Explicit newlines always break. Inside a paragraph words are packed
/// greedily; a word that does not fit on its own is split between
/// characters. Leading and trailing blank lines are dropped.
pub fn wrap_text<F: TextFace + ?Sized>(face: &F, text: &str, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut line = String::new();

        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", line, word)
            };
            if face.advance_width(&candidate) <= max_width {
                line = candidate;
                continue;
            }

            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if face.advance_width(word) <= max_width {
                line = word.to_string();
            } else {
                let mut pieces = split_word(face, word, max_width);
                line = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
            }
        }

        lines.push(line);
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    let leading_blank = lines.iter().take_while(|l| l.is_empty()).count();
    lines.drain(..leading_blank);
    lines
}

fn split_word<F: TextFace + ?Sized>(face: &F, word: &str, max_width: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();

    for ch in word.chars() {
        let mut candidate = piece.clone();
        candidate.push(ch);
        if !piece.is_empty() && face.advance_width(&candidate) > max_width {
            pieces.push(std::mem::replace(&mut piece, ch.to_string()));
        } else {
            piece = candidate;
        }
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}
