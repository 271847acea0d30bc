// Image Augmentation: random transforms for the positive class
//
// All augmentations operate on decoded 8-bit RGB images (`image::RgbImage`,
// HWC layout) before any rescaling.  Colour adjustments are computed in
// [0, 1] float space and saturated back to u8.
//
// The ISIC sequence, in order:
//   hflip(0.5) → vflip(0.5) → brightness(±0.25) → contrast(0.6..1.6)
//   → rot90 → hue(±0.05) → transpose → rot90 × U{0..3}
//   → saturation(0.5..1.8) → jpeg quality(70..90)

use std::io::Cursor;
use std::sync::OnceLock;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ImageFormat, ImageResult, RgbImage};
use rand::{thread_rng, Rng, RngCore};

/// A random (or fixed) transform applied to a decoded image.
///
/// Implementations draw all randomness from `rng` so a seeded generator gives
/// reproducible output.
pub trait Augment: Send + Sync {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> ImageResult<RgbImage>;
}

// RandomHorizontalFlip

/// Flip left/right with probability `p`.
#[derive(Debug, Clone)]
pub struct RandomHorizontalFlip {
    pub p: f64,
}

impl RandomHorizontalFlip {
    pub fn new(p: f64) -> Self {
        Self { p }
    }
}

impl Augment for RandomHorizontalFlip {
    fn apply(&self, mut image: RgbImage, rng: &mut dyn RngCore) -> ImageResult<RgbImage> {
        if rng.gen::<f64>() < self.p {
            imageops::flip_horizontal_in_place(&mut image);
        }
        Ok(image)
    }
}

// RandomVerticalFlip

/// Flip top/bottom with probability `p`.
#[derive(Debug, Clone)]
pub struct RandomVerticalFlip {
    pub p: f64,
}

impl RandomVerticalFlip {
    pub fn new(p: f64) -> Self {
        Self { p }
    }
}

impl Augment for RandomVerticalFlip {
    fn apply(&self, mut image: RgbImage, rng: &mut dyn RngCore) -> ImageResult<RgbImage> {
        if rng.gen::<f64>() < self.p {
            imageops::flip_vertical_in_place(&mut image);
        }
        Ok(image)
    }
}

// RandomBrightness

/// Add `uniform(-max_delta, max_delta)` to every channel (in [0, 1] units).
#[derive(Debug, Clone)]
pub struct RandomBrightness {
    pub max_delta: f32,
}

impl RandomBrightness {
    pub fn new(max_delta: f32) -> Self {
        Self { max_delta }
    }
}

impl Augment for RandomBrightness {
    fn apply(&self, mut image: RgbImage, rng: &mut dyn RngCore) -> ImageResult<RgbImage> {
        if self.max_delta <= 0.0 {
            return Ok(image);
        }
        let delta = rng.gen_range(-self.max_delta..self.max_delta);
        for px in image.pixels_mut() {
            for c in px.0.iter_mut() {
                *c = to_u8(to_unit(*c) + delta);
            }
        }
        Ok(image)
    }
}

// RandomContrast

/// Scale each channel around its mean: `x' = (x - mean) * f + mean`,
/// with `f ~ uniform(lower, upper)`.
#[derive(Debug, Clone)]
pub struct RandomContrast {
    pub lower: f32,
    pub upper: f32,
}

impl RandomContrast {
    pub fn new(lower: f32, upper: f32) -> Self {
        Self { lower, upper }
    }
}

impl Augment for RandomContrast {
    fn apply(&self, mut image: RgbImage, rng: &mut dyn RngCore) -> ImageResult<RgbImage> {
        let factor = uniform(rng, self.lower, self.upper);
        let npix = (image.width() as usize * image.height() as usize).max(1) as f32;

        let mut mean = [0.0f32; 3];
        for px in image.pixels() {
            for (m, &c) in mean.iter_mut().zip(px.0.iter()) {
                *m += to_unit(c);
            }
        }
        for m in &mut mean {
            *m /= npix;
        }

        for px in image.pixels_mut() {
            for (c, &m) in px.0.iter_mut().zip(mean.iter()) {
                *c = to_u8((to_unit(*c) - m) * factor + m);
            }
        }
        Ok(image)
    }
}

// Rot90

/// Rotate counter-clockwise by `k * 90°` (fixed `k`).
#[derive(Debug, Clone)]
pub struct Rot90 {
    pub k: u8,
}

impl Rot90 {
    pub fn new(k: u8) -> Self {
        Self { k }
    }
}

impl Augment for Rot90 {
    fn apply(&self, image: RgbImage, _rng: &mut dyn RngCore) -> ImageResult<RgbImage> {
        Ok(rot90(image, self.k))
    }
}

/// Rotate counter-clockwise by `k * 90°`, `k ~ U{0, 1, 2, 3}`.
#[derive(Debug, Clone, Default)]
pub struct RandomRot90;

impl Augment for RandomRot90 {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> ImageResult<RgbImage> {
        let k = rng.gen_range(0..4u8);
        Ok(rot90(image, k))
    }
}

fn rot90(image: RgbImage, k: u8) -> RgbImage {
    // imageops rotates clockwise
    match k % 4 {
        0 => image,
        1 => imageops::rotate270(&image),
        2 => imageops::rotate180(&image),
        _ => imageops::rotate90(&image),
    }
}

// Transpose

/// Swap the spatial axes: `out[y][x] = in[x][y]`.
#[derive(Debug, Clone, Default)]
pub struct Transpose;

impl Augment for Transpose {
    fn apply(&self, image: RgbImage, _rng: &mut dyn RngCore) -> ImageResult<RgbImage> {
        let (w, h) = image.dimensions();
        Ok(RgbImage::from_fn(h, w, |x, y| *image.get_pixel(y, x)))
    }
}

// RandomHue

/// Shift hue by `uniform(-max_delta, max_delta)` turns, wrapping around.
#[derive(Debug, Clone)]
pub struct RandomHue {
    pub max_delta: f32,
}

impl RandomHue {
    pub fn new(max_delta: f32) -> Self {
        Self { max_delta }
    }
}

impl Augment for RandomHue {
    fn apply(&self, mut image: RgbImage, rng: &mut dyn RngCore) -> ImageResult<RgbImage> {
        if self.max_delta <= 0.0 {
            return Ok(image);
        }
        let delta = rng.gen_range(-self.max_delta..self.max_delta);
        for px in image.pixels_mut() {
            let [h, s, v] = rgb_to_hsv(px.0);
            px.0 = hsv_to_rgb([(h + delta).rem_euclid(1.0), s, v]);
        }
        Ok(image)
    }
}

// RandomSaturation

/// Scale HSV saturation by `uniform(lower, upper)`, clamped to [0, 1].
#[derive(Debug, Clone)]
pub struct RandomSaturation {
    pub lower: f32,
    pub upper: f32,
}

impl RandomSaturation {
    pub fn new(lower: f32, upper: f32) -> Self {
        Self { lower, upper }
    }
}

impl Augment for RandomSaturation {
    fn apply(&self, mut image: RgbImage, rng: &mut dyn RngCore) -> ImageResult<RgbImage> {
        let factor = uniform(rng, self.lower, self.upper);
        for px in image.pixels_mut() {
            let [h, s, v] = rgb_to_hsv(px.0);
            px.0 = hsv_to_rgb([h, (s * factor).clamp(0.0, 1.0), v]);
        }
        Ok(image)
    }
}

// RandomJpegQuality

/// Re-encode as JPEG at quality `U{min_quality..max_quality}` and decode again.
#[derive(Debug, Clone)]
pub struct RandomJpegQuality {
    pub min_quality: u8,
    pub max_quality: u8,
}

impl RandomJpegQuality {
    pub fn new(min_quality: u8, max_quality: u8) -> Self {
        Self {
            min_quality,
            max_quality,
        }
    }
}

impl Augment for RandomJpegQuality {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> ImageResult<RgbImage> {
        let quality = if self.max_quality > self.min_quality {
            rng.gen_range(self.min_quality..self.max_quality)
        } else {
            self.min_quality
        };
        let mut buf = Vec::new();
        image.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)))?;
        let decoded = image::load(Cursor::new(buf), ImageFormat::Jpeg)?;
        Ok(decoded.to_rgb8())
    }
}

// Compose

/// Chain augmentations, applied in order.
pub struct Compose {
    steps: Vec<Box<dyn Augment>>,
}

impl Compose {
    pub fn new(steps: Vec<Box<dyn Augment>>) -> Self {
        Self { steps }
    }

    /// The fixed ten-step ISIC positive-class sequence.
    pub fn isic() -> Self {
        Self::new(vec![
            Box::new(RandomHorizontalFlip::new(0.5)),
            Box::new(RandomVerticalFlip::new(0.5)),
            Box::new(RandomBrightness::new(0.25)),
            Box::new(RandomContrast::new(0.6, 1.6)),
            Box::new(Rot90::new(1)),
            Box::new(RandomHue::new(0.05)),
            Box::new(Transpose),
            Box::new(RandomRot90),
            Box::new(RandomSaturation::new(0.5, 1.8)),
            Box::new(RandomJpegQuality::new(70, 90)),
        ])
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step with the given RNG.
    pub fn apply_with(&self, mut image: RgbImage, rng: &mut dyn RngCore) -> ImageResult<RgbImage> {
        for step in &self.steps {
            image = step.apply(image, rng)?;
        }
        Ok(image)
    }
}

impl Augment for Compose {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> ImageResult<RgbImage> {
        self.apply_with(image, rng)
    }
}

/// Apply the ISIC sequence when `should_augment`, otherwise return `image` as is.
///
/// The caller decides the flag (positive label on a training stream).
pub fn apply_augmentation(image: RgbImage, should_augment: bool) -> ImageResult<RgbImage> {
    if !should_augment {
        return Ok(image);
    }
    static SEQUENCE: OnceLock<Compose> = OnceLock::new();
    let mut rng = thread_rng();
    SEQUENCE.get_or_init(Compose::isic).apply_with(image, &mut rng)
}

// Colour helpers

fn to_unit(c: u8) -> f32 {
    c as f32 / 255.0
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn uniform(rng: &mut dyn RngCore, lower: f32, upper: f32) -> f32 {
    if upper > lower {
        rng.gen_range(lower..upper)
    } else {
        lower
    }
}

/// RGB u8 → HSV with every component in [0, 1].
fn rgb_to_hsv(rgb: [u8; 3]) -> [f32; 3] {
    let [r, g, b] = rgb.map(to_unit);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;

    let sector = if chroma == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / chroma).rem_euclid(6.0)
    } else if max == g {
        (b - r) / chroma + 2.0
    } else {
        (r - g) / chroma + 4.0
    };
    let s = if max == 0.0 { 0.0 } else { chroma / max };
    [sector / 6.0, s, max]
}

fn hsv_to_rgb([h, s, v]: [f32; 3]) -> [u8; 3] {
    let chroma = v * s;
    let h6 = h.rem_euclid(1.0) * 6.0;
    let x = chroma * (1.0 - (h6 % 2.0 - 1.0).abs());
    let (r, g, b) = match h6 as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = v - chroma;
    [to_u8(r + m), to_u8(g + m), to_u8(b + m)]
}

// Tests
