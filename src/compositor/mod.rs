//! Burns caption text onto a background image at a fixed portrait size.
//!
//! The pipeline mirrors a 2D canvas: the background is drawn with a cover
//! fit, darkened by a flat overlay and a vertical gradient, and the wrapped
//! caption is painted white over a blurred drop shadow.

pub mod text;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbaImage};
use std::time::Duration;
use tracing::debug;

use crate::error::{CarouselError, Result};
use crate::export::Artifact;
use crate::image_handler::{self, ImageSource};
use crate::utils::convert::{self, BLACK, CoverageMask, WHITE};
use crate::utils::filename;

pub use text::{FontFace, TextFace, wrap_text};

// Largest surface we agree to allocate (8192 x 8192).
const MAX_CANVAS_PIXELS: u64 = 8192 * 8192;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextShadow {
    /// Opacity of the black shadow colour.
    pub alpha: f32,
    /// Canvas-style blur radius; the Gaussian sigma is half of it.
    pub blur: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// Geometry and styling of the output image.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasLayout {
    pub width: u32,
    pub height: u32,
    pub font_size: f32,
    /// Line height as a multiple of the font size.
    pub line_height_factor: f32,
    /// Maximum line width as a fraction of the canvas width.
    pub max_line_ratio: f32,
    /// Upward shift applied to the vertically centred text block.
    pub vertical_bias: f32,
    /// Opacity of the flat black overlay.
    pub overlay_alpha: f32,
    /// Black gradient stops as (position in [0, 1], opacity), top to bottom.
    pub gradient: Vec<(f32, f32)>,
    pub shadow: TextShadow,
}

impl Default for CanvasLayout {
    fn default() -> Self {
        CanvasLayout {
            width: 1080,
            height: 1920,
            font_size: 72.0,
            line_height_factor: 1.35,
            max_line_ratio: 0.82,
            vertical_bias: 50.0,
            overlay_alpha: 0.2,
            gradient: vec![(0.0, 0.4), (0.2, 0.0), (0.6, 0.1), (1.0, 0.6)],
            shadow: TextShadow {
                alpha: 0.7,
                blur: 20.0,
                offset_x: 0.0,
                offset_y: 4.0,
            },
        }
    }
}

impl CanvasLayout {
    pub fn line_height(&self) -> f32 {
        self.font_size * self.line_height_factor
    }

    pub fn max_line_width(&self) -> f32 {
        self.width as f32 * self.max_line_ratio
    }

    /// Gradient opacity at `t` (0 = top edge, 1 = bottom edge).
    pub fn gradient_alpha(&self, t: f32) -> f32 {
        let stops = &self.gradient;
        let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
            return 0.0;
        };
        if t <= first.0 {
            return first.1;
        }
        if t >= last.0 {
            return last.1;
        }

        for pair in stops.windows(2) {
            let (p0, a0) = pair[0];
            let (p1, a1) = pair[1];
            if t <= p1 {
                if p1 <= p0 {
                    return a1;
                }
                return a0 + (a1 - a0) * (t - p0) / (p1 - p0);
            }
        }
        last.1
    }

    /// Check that a surface of this size can be allocated.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CarouselError::CanvasUnavailable(format!(
                "{}x{} surface",
                self.width, self.height
            )));
        }
        if self.width as u64 * self.height as u64 > MAX_CANVAS_PIXELS {
            return Err(CarouselError::CanvasUnavailable(format!(
                "{}x{} exceeds the largest supported surface",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Placement of a background scaled to cover the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub scale: f32,
    /// Top-left of the scaled image relative to the canvas; never positive.
    pub offset_x: f32,
    pub offset_y: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

/// Uniformly scale `src` so it fills `dst` entirely, centred, cropping the
/// overflow on one axis.
pub fn cover_fit(src: (u32, u32), dst: (u32, u32)) -> CoverFit {
    let (src_w, src_h) = (src.0.max(1) as f32, src.1.max(1) as f32);
    let (dst_w, dst_h) = (dst.0 as f32, dst.1 as f32);

    let scale = (dst_w / src_w).max(dst_h / src_h);
    let exact_w = src_w * scale;
    let exact_h = src_h * scale;

    CoverFit {
        scale,
        offset_x: (dst_w - exact_w) / 2.0,
        offset_y: (dst_h - exact_h) / 2.0,
        scaled_width: (exact_w.round() as u32).max(dst.0),
        scaled_height: (exact_h.round() as u32).max(dst.1),
    }
}

impl CoverFit {
    /// The part of a `src` sized image that remains visible on a `dst`
    /// canvas, as `(x, y, width, height)` in source pixels.
    pub fn visible_source_rect(&self, src: (u32, u32), dst: (u32, u32)) -> (u32, u32, u32, u32) {
        let span = |src_len: u32, dst_len: u32| {
            let src_len = src_len.max(1);
            let visible = ((dst_len as f32 / self.scale).round() as u32).clamp(1, src_len);
            ((src_len - visible) / 2, visible)
        };
        let (x, width) = span(src.0, dst.0);
        let (y, height) = span(src.1, dst.1);
        (x, y, width, height)
    }
}

/// Wrapped caption lines and their vertical placement.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub line_height: f32,
    /// Top of the first line.
    pub start_y: f32,
}

impl TextBlock {
    pub fn height(&self) -> f32 {
        self.lines.len() as f32 * self.line_height
    }

    /// Vertical middle of line `index`, where the glyphs are centred.
    pub fn line_center(&self, index: usize) -> f32 {
        self.start_y + index as f32 * self.line_height + self.line_height / 2.0
    }
}

/// Everything about a composite that does not involve pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositePlan {
    pub fit: CoverFit,
    pub text: TextBlock,
}

pub struct Compositor<F> {
    face: F,
    layout: CanvasLayout,
}

impl<F: TextFace> Compositor<F> {
    pub fn new(face: F, layout: CanvasLayout) -> Self {
        Compositor { face, layout }
    }

    pub fn with_default_layout(face: F) -> Self {
        Self::new(face, CanvasLayout::default())
    }

    pub fn layout(&self) -> &CanvasLayout {
        &self.layout
    }

    pub fn face(&self) -> &F {
        &self.face
    }

    /// Wrap `text` and centre the block, nudged up by the vertical bias.
    pub fn layout_text(&self, text: &str) -> TextBlock {
        let lines = wrap_text(&self.face, text, self.layout.max_line_width());
        let line_height = self.layout.line_height();
        let block_height = lines.len() as f32 * line_height;
        let start_y =
            (self.layout.height as f32 - block_height) / 2.0 - self.layout.vertical_bias;

        TextBlock {
            lines,
            line_height,
            start_y,
        }
    }

    pub fn plan(&self, background: (u32, u32), text: &str) -> CompositePlan {
        CompositePlan {
            fit: cover_fit(background, (self.layout.width, self.layout.height)),
            text: self.layout_text(text),
        }
    }

    /// Render `text` over `background` into a new canvas-sized image.
    pub fn composite(&self, background: &DynamicImage, text: &str) -> Result<RgbaImage> {
        self.layout.validate()?;
        let (src_w, src_h) = background.dimensions();
        if src_w == 0 || src_h == 0 {
            return Err(CarouselError::ImageLoad("image has no pixels".into()));
        }

        let plan = self.plan((src_w, src_h), text);
        debug!(
            scale = plan.fit.scale,
            lines = plan.text.lines.len(),
            "compositing caption"
        );

        let mut canvas = self.draw_cover(background, &plan.fit);
        self.apply_overlays(&mut canvas);
        self.draw_text(&mut canvas, &plan.text);
        Ok(canvas)
    }

    /// Load `source`, composite `text` onto it and encode the result as a
    /// PNG named after `title` and `suffix`.
    ///
    /// Nothing is produced when the image cannot be loaded.
    #[tracing::instrument(skip(self, source, text, timeout))]
    pub fn render(
        &self,
        source: ImageSource,
        text: &str,
        title: &str,
        suffix: &str,
        timeout: Duration,
    ) -> Result<Artifact> {
        self.layout.validate()?;
        let background = image_handler::load_image(source, timeout)?;
        self.render_image(&background, text, title, suffix)
    }

    /// Same as [`Compositor::render`] for a background that is already decoded.
    pub fn render_image(
        &self,
        background: &DynamicImage,
        text: &str,
        title: &str,
        suffix: &str,
    ) -> Result<Artifact> {
        let canvas = self.composite(background, text)?;
        let png = image_handler::save_image_to_bytes(&DynamicImage::ImageRgba8(canvas))?;
        Ok(Artifact::new(filename::artifact_name(title, suffix), png))
    }

    fn draw_cover(&self, background: &DynamicImage, fit: &CoverFit) -> RgbaImage {
        let (width, height) = (self.layout.width, self.layout.height);
        // Crop in source space first; the only resized buffer is canvas sized.
        let (x, y, w, h) = fit.visible_source_rect(background.dimensions(), (width, height));
        let visible = background.crop_imm(x, y, w, h).to_rgba8();
        imageops::resize(&visible, width, height, FilterType::CatmullRom)
    }

    fn apply_overlays(&self, canvas: &mut RgbaImage) {
        convert::fill(canvas, BLACK, self.layout.overlay_alpha);

        let height = canvas.height() as f32;
        for (y, row) in canvas.enumerate_rows_mut() {
            let alpha = self.layout.gradient_alpha((y as f32 + 0.5) / height);
            for (_, _, pixel) in row {
                convert::blend_over(pixel, BLACK, alpha);
            }
        }
    }

    fn draw_text(&self, canvas: &mut RgbaImage, block: &TextBlock) {
        if block.lines.is_empty() {
            return;
        }
        let (width, height) = canvas.dimensions();
        let shadow = self.layout.shadow;

        // Rasterize only the band around the block, padded for the blur tail.
        let pad = shadow.blur * 1.5 + shadow.offset_x.abs().max(shadow.offset_y.abs());
        let top = (block.start_y - pad).floor().max(0.0) as u32;
        let bottom = ((block.start_y + block.height() + pad).ceil().max(0.0) as u32).min(height);
        if bottom <= top {
            return;
        }

        let mut mask = CoverageMask::new(width, bottom - top);
        let center_x = width as f32 / 2.0;
        let baseline_shift = (self.face.ascent() + self.face.descent()) / 2.0;

        for (i, line) in block.lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let left = center_x - self.face.advance_width(line) / 2.0;
            let baseline = block.line_center(i) + baseline_shift - top as f32;
            self.face.draw_line(line, left, baseline, &mut mask);
        }

        let band_origin = (0_i64, top as i64);
        if shadow.alpha > 0.0 {
            let sigma = shadow.blur / 2.0;
            let blurred = if sigma > 0.0 {
                imageops::blur(&mask, sigma)
            } else {
                mask.clone()
            };
            let shadow_origin = (
                band_origin.0 + shadow.offset_x.round() as i64,
                band_origin.1 + shadow.offset_y.round() as i64,
            );
            convert::blend_through_mask(canvas, &blurred, shadow_origin, BLACK, shadow.alpha);
        }
        convert::blend_through_mask(canvas, &mask, band_origin, WHITE, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::text::testing::{BlockFace, serif};
    use super::*;
    use image::{Rgba, RgbaImage};

    fn small_layout() -> CanvasLayout {
        CanvasLayout {
            width: 216,
            height: 384,
            font_size: 24.0,
            shadow: TextShadow {
                alpha: 0.7,
                blur: 4.0,
                offset_x: 0.0,
                offset_y: 4.0,
            },
            ..CanvasLayout::default()
        }
    }

    fn gradient_background(width: u32, height: u32) -> DynamicImage {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_cover_fit_square_source() {
        let fit = cover_fit((1000, 1000), (1080, 1920));
        assert!((fit.scale - 1.92).abs() < 1e-5);
        assert_eq!((fit.scaled_width, fit.scaled_height), (1920, 1920));
        assert!((fit.offset_x - -420.0).abs() < 1e-3);
        assert!(fit.offset_y.abs() < 1e-3);
    }

    #[test]
    fn test_cover_fit_always_covers() {
        for src in [(4000, 3000), (300, 2000), (1080, 1920), (1, 1), (5000, 100)] {
            let fit = cover_fit(src, (1080, 1920));
            assert!(fit.scaled_width >= 1080, "{:?}", src);
            assert!(fit.scaled_height >= 1920, "{:?}", src);
            assert!(fit.offset_x <= 1e-3 && fit.offset_y <= 1e-3);
        }
    }

    #[test]
    fn test_visible_rect_is_centred_in_source() {
        let fit = cover_fit((540, 480), (1080, 1920));
        assert_eq!(fit.scale, 4.0);
        assert_eq!(fit.visible_source_rect((540, 480), (1080, 1920)), (135, 0, 270, 480));

        let strip = cover_fit((4000, 1), (1080, 1920));
        assert_eq!(strip.visible_source_rect((4000, 1), (1080, 1920)), (1999, 0, 1, 1));
    }

    #[test]
    fn test_extreme_aspect_backgrounds_composite() {
        let compositor = Compositor::with_default_layout(BlockFace::new(72.0));
        for (w, h) in [(4000, 1), (1, 4000)] {
            let strip = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([30, 60, 90, 255])));
            let out = compositor.composite(&strip, "Respira.").unwrap();
            assert_eq!(out.dimensions(), (1080, 1920), "{}x{}", w, h);
        }
    }

    #[test]
    fn test_gradient_stops() {
        let layout = CanvasLayout::default();
        assert!((layout.gradient_alpha(0.0) - 0.4).abs() < 1e-6);
        assert!((layout.gradient_alpha(0.1) - 0.2).abs() < 1e-6);
        assert!(layout.gradient_alpha(0.2).abs() < 1e-6);
        assert!((layout.gradient_alpha(0.6) - 0.1).abs() < 1e-6);
        assert!((layout.gradient_alpha(0.8) - 0.35).abs() < 1e-6);
        assert!((layout.gradient_alpha(1.0) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_short_caption_is_centred_with_bias() {
        let compositor = Compositor::with_default_layout(BlockFace::new(72.0));
        let block = compositor.layout_text("Respira. Va tutto bene.");

        assert!(block.lines.len() <= 2);
        assert!((block.line_height - 97.2).abs() < 1e-4);
        let expected_start = (1920.0 - block.height()) / 2.0 - 50.0;
        assert!((block.start_y - expected_start).abs() < 1e-4);
        assert!((block.line_center(0) - (expected_start + 48.6)).abs() < 1e-4);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let compositor = Compositor::with_default_layout(BlockFace::new(72.0));
        let text = "Il tuo corpo non ti sta tradendo. Sta cercando di proteggerti.";
        assert_eq!(
            compositor.plan((1024, 1792), text),
            compositor.plan((1024, 1792), text)
        );
    }

    #[test]
    fn test_composite_is_canvas_sized_and_repeatable() {
        let compositor = Compositor::new(BlockFace::new(24.0), small_layout());
        let background = gradient_background(300, 200);

        let first = compositor.composite(&background, "Va tutto bene").unwrap();
        let second = compositor.composite(&background, "Va tutto bene").unwrap();
        assert_eq!(first.dimensions(), (216, 384));
        assert_eq!(first, second);
        assert!(first.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_overlays_darken_top_and_bottom() {
        let compositor = Compositor::new(BlockFace::new(24.0), small_layout());
        let white = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255; 4])));
        let out = compositor.composite(&white, "").unwrap();

        let top = out.get_pixel(100, 0)[0] as i32;
        let clear = out.get_pixel(100, 76)[0] as i32;
        let bottom = out.get_pixel(100, 383)[0] as i32;
        assert!((clear - 204).abs() <= 2, "clear band was {}", clear);
        assert!(top < clear);
        assert!(bottom < top);
    }

    #[test]
    fn test_caption_is_painted_white() {
        let layout = small_layout();
        let compositor = Compositor::new(BlockFace::new(24.0), layout);
        let black = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255])));
        let out = compositor.composite(&black, "AB").unwrap();

        let block = compositor.layout_text("AB");
        let middle = block.line_center(0);
        // "AB" is 24px wide and centred, so x 97..107 lies inside the "A" box.
        let inside = out.get_pixel(102, middle as u32);
        assert_eq!(inside, &Rgba([255, 255, 255, 255]));

        let outside = out.get_pixel(5, 300);
        assert_eq!(outside[0], 0);
    }

    #[test]
    fn test_empty_surface_is_unavailable() {
        let layout = CanvasLayout {
            width: 0,
            ..CanvasLayout::default()
        };
        let compositor = Compositor::new(BlockFace::new(72.0), layout);
        let err = compositor
            .composite(&gradient_background(4, 4), "ciao")
            .unwrap_err();
        assert!(matches!(err, CarouselError::CanvasUnavailable(_)));
    }

    #[test]
    fn test_render_fails_on_undecodable_source() {
        let compositor = Compositor::new(BlockFace::new(24.0), small_layout());
        let err = compositor
            .render(
                ImageSource::DataUrl("data:image/png;base64,AAAA".into()),
                "testo",
                "Titolo",
                "slide-1-completa",
                image_handler::DEFAULT_LOAD_TIMEOUT,
            )
            .unwrap_err();
        assert!(matches!(err, CarouselError::ImageLoad(_)));
    }

    #[test]
    fn test_render_names_artifact_from_title() {
        let compositor = Compositor::new(BlockFace::new(24.0), small_layout());
        let png = image_handler::save_image_to_bytes(&gradient_background(50, 80)).unwrap();
        let artifact = compositor
            .render(
                ImageSource::Bytes(png),
                "Respira",
                "Ansia Mattutina",
                "slide-1-completa",
                image_handler::DEFAULT_LOAD_TIMEOUT,
            )
            .unwrap();

        assert_eq!(artifact.file_name, "ansia_mattutina-slide-1-completa.png");
        let decoded = image::load_from_memory(&artifact.png).unwrap();
        assert_eq!(decoded.dimensions(), (216, 384));
    }

    #[test]
    fn test_real_font_caption_is_painted_around_line_middle() {
        let compositor = Compositor::with_default_layout(serif(72.0));
        let black = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255])));
        let text = "Respira. Va tutto bene.";
        let out = compositor.composite(&black, text).unwrap();

        let block = compositor.layout_text(text);
        assert_eq!(block.lines.len(), 1);

        let white: Vec<(u32, u32)> = out
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 250)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(white.len() > 1000, "only {} white pixels", white.len());

        for &(_, y) in &white {
            let y = y as f32;
            assert!(y >= block.start_y && y <= block.start_y + block.height(), "row {}", y);
        }
        let mean_y = white.iter().map(|&(_, y)| y as f32).sum::<f32>() / white.len() as f32;
        assert!((mean_y - block.line_center(0)).abs() < 15.0, "mean row {}", mean_y);

        let (min_x, max_x) = white
            .iter()
            .fold((u32::MAX, 0), |(lo, hi), &(x, _)| (lo.min(x), hi.max(x)));
        let centre = (min_x + max_x) as f32 / 2.0;
        assert!((centre - 540.0).abs() < 10.0, "text centred at {}", centre);
        assert!(((max_x - min_x) as f32) <= compositor.layout().max_line_width());
    }
}
