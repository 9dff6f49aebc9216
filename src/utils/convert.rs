use image::{ImageBuffer, Luma, Rgba, RgbaImage};

/// Per-pixel glyph coverage in [0, 1], as produced by the text rasterizer.
pub type CoverageMask = ImageBuffer<Luma<f32>, Vec<f32>>;

pub const BLACK: [f32; 3] = [0.0, 0.0, 0.0];
pub const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// Source-over blend of a straight-alpha colour (components in [0, 1])
/// onto an 8-bit RGBA pixel.
pub fn blend_over(dst: &mut Rgba<u8>, color: [f32; 3], alpha: f32) {
    let src_a = alpha.clamp(0.0, 1.0);
    if src_a <= 0.0 {
        return;
    }

    let dst_a = dst[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);

    for (c, src_c) in color.iter().enumerate() {
        let dst_c = dst[c] as f32 / 255.0;
        let out_c = (src_c * src_a + dst_c * dst_a * (1.0 - src_a)) / out_a;
        dst[c] = (out_c * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Cover the whole image with `color` at a constant opacity.
pub fn fill(image: &mut RgbaImage, color: [f32; 3], alpha: f32) {
    for pixel in image.pixels_mut() {
        blend_over(pixel, color, alpha);
    }
}

/// Blend `color` through `mask`, whose top-left corner sits at `origin`
/// in image coordinates. Mask pixels falling outside the image are skipped.
pub fn blend_through_mask(
    image: &mut RgbaImage,
    mask: &CoverageMask,
    origin: (i64, i64),
    color: [f32; 3],
    alpha: f32,
) {
    let (width, height) = image.dimensions();

    for (x, y, coverage) in mask.enumerate_pixels() {
        let c = coverage[0];
        if c <= 0.0 {
            continue;
        }
        let cx = origin.0 + x as i64;
        let cy = origin.1 + y as i64;
        if cx < 0 || cy < 0 || cx >= width as i64 || cy >= height as i64 {
            continue;
        }
        blend_over(image.get_pixel_mut(cx as u32, cy as u32), color, alpha * c);
    }
}
