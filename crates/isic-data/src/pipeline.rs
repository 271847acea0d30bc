// Image pipeline: one manifest record to one prepared sample
//
//   {base_dir}/{image_name}.jpg
//     → read bytes → strict JPEG decode → RGB8
//     → (Resize policy only) Lanczos3 resize to img_size × img_size
//     → shape check against [img_size, img_size, 3]
//     → augmentation iff `augment && label == 1`
//     → f32, divided by 255 unless `eff_net`
//
// Output pixels are HWC, row-major.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use crate::augment::apply_augmentation;
use crate::dataset::Sample;
use crate::error::{Error, Result};
use crate::manifest::{Label, POSITIVE};

/// Number of colour channels in every prepared sample.
pub const CHANNELS: usize = 3;

/// Input resolution EfficientNet-B2 expects.
pub const EFFNET_B2_SIZE: usize = 260;

/// What to do when a decoded image is not `img_size × img_size`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapePolicy {
    /// Fail with [`Error::ShapeMismatch`]. Images must be pre-resized on disk.
    #[default]
    Strict,
    /// Resize to `img_size × img_size` (Lanczos3) right after decoding.
    Resize,
}

/// Per-stream options for [`load_image`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Expected square side length.
    pub img_size: usize,
    /// Augment positive-labelled samples.
    pub augment: bool,
    /// Keep the label in the output.
    pub train: bool,
    /// Skip the /255 rescale (the model normalises internally).
    pub eff_net: bool,
    pub shape_policy: ShapePolicy,
}

impl PipelineOptions {
    pub fn new(img_size: usize) -> Self {
        Self {
            img_size,
            augment: false,
            train: true,
            eff_net: false,
            shape_policy: ShapePolicy::Strict,
        }
    }

    pub fn augment(mut self, a: bool) -> Self {
        self.augment = a;
        self
    }

    pub fn train(mut self, t: bool) -> Self {
        self.train = t;
        self
    }

    pub fn eff_net(mut self, e: bool) -> Self {
        self.eff_net = e;
        self
    }

    pub fn shape_policy(mut self, p: ShapePolicy) -> Self {
        self.shape_policy = p;
        self
    }

    /// The enforced output shape `[img_size, img_size, 3]`.
    pub fn output_shape(&self) -> [usize; 3] {
        [self.img_size, self.img_size, CHANNELS]
    }
}

/// `{base_dir}/{image_name}.jpg`
pub fn image_path(base_dir: &Path, image_name: &str) -> PathBuf {
    base_dir.join(format!("{image_name}.jpg"))
}

/// Read and decode a JPEG into 8-bit RGB.
///
/// Grayscale and CMYK JPEGs are coerced to three channels.
pub fn decode_jpeg(path: &Path) -> Result<RgbImage> {
    let bytes = std::fs::read(path).map_err(|source| Error::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;
    let img = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).map_err(|source| {
        Error::Decode {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(img.to_rgb8())
}

/// Convert to HWC f32, optionally rescaling 0–255 to 0–1.
pub fn to_pixels(image: &RgbImage, rescale: bool) -> Vec<f32> {
    let divisor = if rescale { 255.0 } else { 1.0 };
    image.as_raw().iter().map(|&v| v as f32 / divisor).collect()
}

/// Run the full pipeline for one record.
pub fn load_image(
    base_dir: &Path,
    image_name: &str,
    label: Option<Label>,
    options: &PipelineOptions,
) -> Result<Sample> {
    let path = image_path(base_dir, image_name);
    let mut image = decode_jpeg(&path)?;

    if options.shape_policy == ShapePolicy::Resize {
        let side = options.img_size as u32;
        if image.dimensions() != (side, side) {
            image = image::imageops::resize(&image, side, side, FilterType::Lanczos3);
        }
    }

    let (w, h) = image.dimensions();
    let got = [h as usize, w as usize, CHANNELS];
    let expected = options.output_shape();
    if got != expected {
        return Err(Error::ShapeMismatch {
            path,
            expected,
            got,
        });
    }

    // Square input, so the rotations and transpose keep the shape.
    let should_augment = options.augment && label == Some(POSITIVE);
    let image = apply_augmentation(image, should_augment).map_err(|source| Error::Augment {
        path: path.clone(),
        source,
    })?;

    Ok(Sample {
        id: image_name.to_string(),
        pixels: to_pixels(&image, !options.eff_net),
        shape: got,
        label: if options.train { label } else { None },
    })
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn image_path_appends_jpg() {
        let p = image_path(Path::new("/data/isic/train"), "ISIC_0015719");
        assert_eq!(p, PathBuf::from("/data/isic/train/ISIC_0015719.jpg"));
    }

    #[test]
    fn to_pixels_rescale() {
        let img = RgbImage::from_pixel(1, 1, Rgb([0, 51, 255]));
        assert_eq!(to_pixels(&img, false), vec![0.0, 51.0, 255.0]);
        let scaled = to_pixels(&img, true);
        assert!((scaled[1] - 0.2).abs() < 1e-6);
        assert!((scaled[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn to_pixels_is_hwc() {
        // 2 wide × 1 high: pixel 0 = [1,2,3], pixel 1 = [4,5,6]
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([1, 2, 3]));
        img.put_pixel(1, 0, Rgb([4, 5, 6]));
        assert_eq!(to_pixels(&img, false), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn options_builder() {
        let o = PipelineOptions::new(260)
            .augment(true)
            .train(false)
            .eff_net(true)
            .shape_policy(ShapePolicy::Resize);
        assert!(o.augment && !o.train && o.eff_net);
        assert_eq!(o.shape_policy, ShapePolicy::Resize);
        assert_eq!(o.output_shape(), [260, 260, 3]);
    }

    #[test]
    fn missing_file_is_image_read_error() {
        let err = load_image(
            Path::new("/no/such/dir"),
            "ISIC_0000000",
            Some(0),
            &PipelineOptions::new(8),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ImageRead { .. }));
    }

    #[test]
    fn shape_mismatch_reports_decoded_dims_for_augmented_positive() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::from_fn(12, 10, |x, y| Rgb([(x * 20) as u8, (y * 25) as u8, 90]));
        img.save_with_format(dir.path().join("p.jpg"), ImageFormat::Jpeg)
            .unwrap();

        let options = PipelineOptions::new(8).augment(true);
        for _ in 0..50 {
            let err = load_image(dir.path(), "p", Some(POSITIVE), &options).unwrap_err();
            match err {
                Error::ShapeMismatch { expected, got, .. } => {
                    assert_eq!(expected, [8, 8, 3]);
                    assert_eq!(got, [10, 12, 3]);
                }
                other => panic!("expected shape mismatch, got {other}"),
            }
        }
    }

    #[test]
    fn augmented_square_positive_keeps_shape() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, 60]));
        img.save_with_format(dir.path().join("p.jpg"), ImageFormat::Jpeg)
            .unwrap();

        let options = PipelineOptions::new(8).augment(true);
        for _ in 0..20 {
            let sample = load_image(dir.path(), "p", Some(POSITIVE), &options).unwrap();
            assert_eq!(sample.shape, [8, 8, 3]);
            assert_eq!(sample.pixels.len(), 8 * 8 * 3);
        }
    }
}
