// Dataset trait: indexed, lazily decoded collection of samples

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::manifest::{Label, Record};
use crate::pipeline::{load_image, PipelineOptions};

/// A single prepared sample.
///
/// Pixels are stored flattened in HWC order with their shape so they can be
/// collated into a batch later.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Image identifier (manifest `image_name` / `image`).
    pub id: String,
    /// Pixel values, `[H, W, C]` row-major.
    pub pixels: Vec<f32>,
    /// `[H, W, C]`.
    pub shape: [usize; 3],
    /// `Some` on train/validation streams, `None` on test.
    pub label: Option<Label>,
}

/// A dataset is an indexed collection of samples.
///
/// Implementations must be `Send + Sync` so the loader can read from its
/// worker threads.
pub trait Dataset: Send + Sync {
    /// Total number of samples in the dataset.
    fn len(&self) -> usize;

    /// Whether the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produce the sample at position `index`.
    ///
    /// # Panics
    /// May panic if `index >= self.len()`.
    fn get(&self, index: usize) -> Result<Sample>;

    /// Optional human-readable name.
    fn name(&self) -> &str {
        "dataset"
    }
}

/// Manifest records decoded from `base_dir` on demand.
///
/// Every `get` re-reads and re-decodes the file, so augmentation is redrawn
/// on each access.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    base_dir: PathBuf,
    records: Vec<Record>,
    options: PipelineOptions,
    name: String,
}

impl ImageDataset {
    pub fn new<P: AsRef<Path>>(
        name: &str,
        base_dir: P,
        records: Vec<Record>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            records,
            options,
            name: name.to_string(),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }
}

impl Dataset for ImageDataset {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let record = &self.records[index];
        load_image(
            &self.base_dir,
            &record.image_name,
            record.label,
            &self.options,
        )
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_dataset_basics() {
        let ds = ImageDataset::new(
            "valid",
            "/tmp/isic/train",
            vec![Record::labeled("a", 0), Record::labeled("b", 1)],
            PipelineOptions::new(32),
        );
        assert_eq!(ds.len(), 2);
        assert!(!ds.is_empty());
        assert_eq!(ds.name(), "valid");
        assert_eq!(ds.records()[1].image_name, "b");
        assert_eq!(ds.base_dir(), Path::new("/tmp/isic/train"));
        assert_eq!(ds.options().img_size, 32);
    }

    #[test]
    fn empty_image_dataset() {
        let ds = ImageDataset::new("test", "/tmp", Vec::new(), PipelineOptions::new(8));
        assert!(ds.is_empty());
    }
}
