// IsicDataLoader: train / validation / test streams for ISIC classification
//
// Expected layout:
//
//   dataset/
//     train/ISIC_xxxxxxx.jpg ...
//     test/ISIC_yyyyyyy.jpg ...
//   train.csv   image_name,target,...
//   test.csv    image,...
//
// USAGE:
//
//   let config = IsicConfig::new("data/isic", "data/train.csv", "data/test.csv", 32, 260)
//       .eff_net(true);
//   let (mut train, mut valid, mut test) = IsicDataLoader::new(config)?.load_data()?;
//   for batch in train.iter() {
//       let batch = batch?;
//       ...
//   }

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dataset::ImageDataset;
use crate::error::{Error, Result};
use crate::loader::{Loader, LoaderConfig, Order};
use crate::manifest::{read_test_manifest, read_train_manifest};
use crate::pipeline::{PipelineOptions, ShapePolicy, EFFNET_B2_SIZE};
use crate::split::stratified_split;

fn default_split() -> f64 {
    0.8
}
fn default_workers() -> usize {
    2
}
fn default_prefetch() -> usize {
    1
}
fn default_shuffle_buffer() -> usize {
    1000
}

/// Configuration for [`IsicDataLoader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsicConfig {
    /// Root directory holding `train/` and `test/`.
    pub dataset: PathBuf,
    /// Training manifest (`image_name`, `target`).
    pub csv_train: PathBuf,
    /// Test manifest (`image`).
    pub csv_test: PathBuf,
    pub batch_size: usize,
    /// Square side length every image must have (or be resized to).
    pub img_size: usize,
    /// Per-class fraction of the train manifest kept for training.
    #[serde(default = "default_split")]
    pub train_val_split: f64,
    /// Feed raw 0–255 pixels (EfficientNet rescales internally).
    #[serde(default)]
    pub eff_net: bool,
    #[serde(default)]
    pub shape_policy: ShapePolicy,
    #[serde(default = "default_workers")]
    pub num_workers: usize,
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,
    /// Shuffle-buffer size for the test stream.
    #[serde(default = "default_shuffle_buffer")]
    pub shuffle_buffer: usize,
    /// Seed for the split and the test shuffle. `None` draws from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl IsicConfig {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(
        dataset: P,
        csv_train: Q,
        csv_test: R,
        batch_size: usize,
        img_size: usize,
    ) -> Self {
        Self {
            dataset: dataset.as_ref().to_path_buf(),
            csv_train: csv_train.as_ref().to_path_buf(),
            csv_test: csv_test.as_ref().to_path_buf(),
            batch_size,
            img_size,
            train_val_split: default_split(),
            eff_net: false,
            shape_policy: ShapePolicy::Strict,
            num_workers: default_workers(),
            prefetch: default_prefetch(),
            shuffle_buffer: default_shuffle_buffer(),
            seed: None,
        }
    }

    /// Load a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn train_val_split(mut self, f: f64) -> Self {
        self.train_val_split = f;
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
    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }
    pub fn prefetch(mut self, p: usize) -> Self {
        self.prefetch = p;
        self
    }
    pub fn shuffle_buffer(mut self, n: usize) -> Self {
        self.shuffle_buffer = n;
        self
    }
    pub fn seed(mut self, s: u64) -> Self {
        self.seed = Some(s);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be > 0"));
        }
        if self.img_size == 0 {
            return Err(Error::config("img_size must be > 0"));
        }
        // Written so NaN fails too.
        if !(self.train_val_split > 0.0 && self.train_val_split < 1.0) {
            return Err(Error::config(format!(
                "train_val_split must be in (0, 1), got {}",
                self.train_val_split
            )));
        }
        if self.shuffle_buffer == 0 {
            return Err(Error::config("shuffle_buffer must be > 0"));
        }
        self.loader_config(Order::Sequential).validate()
    }

    fn loader_config(&self, order: Order) -> LoaderConfig {
        let config = LoaderConfig::default()
            .batch_size(self.batch_size)
            .num_workers(self.num_workers)
            .prefetch(self.prefetch)
            .order(order);
        match self.seed {
            Some(seed) => config.seed(seed),
            None => config,
        }
    }

    fn pipeline(&self) -> PipelineOptions {
        PipelineOptions::new(self.img_size)
            .eff_net(self.eff_net)
            .shape_policy(self.shape_policy)
    }
}

/// Builds the three ISIC batch streams.
#[derive(Debug, Clone)]
pub struct IsicDataLoader {
    config: IsicConfig,
}

impl IsicDataLoader {
    /// Validate `config` and wrap it.
    pub fn new(config: IsicConfig) -> Result<Self> {
        config.validate()?;
        if config.eff_net && config.img_size != EFFNET_B2_SIZE {
            tracing::warn!(
                img_size = config.img_size,
                expected = EFFNET_B2_SIZE,
                "eff_net is set but img_size is not the EfficientNet-B2 input size"
            );
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &IsicConfig {
        &self.config
    }

    /// Read the manifests, split, and return `(train, valid, test)` loaders.
    ///
    /// Manifests are fully parsed before any image is touched; images are
    /// decoded lazily as the loaders are iterated.
    pub fn load_data(&self) -> Result<(Loader, Loader, Loader)> {
        let cfg = &self.config;
        let train_records = read_train_manifest(&cfg.csv_train)?;
        let test_records = read_test_manifest(&cfg.csv_test)?;

        let split = stratified_split(train_records, cfg.train_val_split, cfg.seed);

        let train_dir = cfg.dataset.join("train");
        let test_dir = cfg.dataset.join("test");

        let train = ImageDataset::new(
            "train",
            &train_dir,
            split.train,
            cfg.pipeline().augment(true).train(true),
        );
        let valid = ImageDataset::new(
            "valid",
            &train_dir,
            split.valid,
            cfg.pipeline().augment(false).train(true),
        );
        let test = ImageDataset::new(
            "test",
            &test_dir,
            test_records,
            cfg.pipeline().augment(false).train(false),
        );

        tracing::info!(
            train = train.records().len(),
            valid = valid.records().len(),
            test = test.records().len(),
            batch_size = cfg.batch_size,
            "built ISIC datasets"
        );

        Ok((
            Loader::new(Arc::new(train), cfg.loader_config(Order::Sequential))?,
            Loader::new(Arc::new(valid), cfg.loader_config(Order::Sequential))?,
            Loader::new(
                Arc::new(test),
                cfg.loader_config(Order::ShuffleBuffer(cfg.shuffle_buffer)),
            )?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IsicConfig {
        IsicConfig::new("data", "train.csv", "test.csv", 16, 64)
    }

    #[test]
    fn defaults_match_reference_pipeline() {
        let c = config();
        assert_eq!(c.train_val_split, 0.8);
        assert!(!c.eff_net);
        assert_eq!(c.shape_policy, ShapePolicy::Strict);
        assert_eq!(c.num_workers, 2);
        assert_eq!(c.prefetch, 1);
        assert_eq!(c.shuffle_buffer, 1000);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(IsicConfig::new("d", "a", "b", 0, 64).validate().is_err());
        assert!(IsicConfig::new("d", "a", "b", 8, 0).validate().is_err());
        for f in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            let err = config().train_val_split(f).validate().unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{f}");
        }
        assert!(config().num_workers(0).validate().is_err());
        assert!(config().prefetch(0).validate().is_err());
        assert!(config().shuffle_buffer(0).validate().is_err());
    }

    #[test]
    fn new_validates() {
        assert!(IsicDataLoader::new(config().train_val_split(2.0)).is_err());
        assert!(IsicDataLoader::new(config().eff_net(true)).is_ok());
    }

    #[test]
    fn json_fills_defaults() {
        let json = r#"{
            "dataset": "data/isic",
            "csv_train": "data/train.csv",
            "csv_test": "data/test.csv",
            "batch_size": 32,
            "img_size": 260,
            "eff_net": true,
            "shape_policy": "resize"
        }"#;
        let c: IsicConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.batch_size, 32);
        assert!(c.eff_net);
        assert_eq!(c.shape_policy, ShapePolicy::Resize);
        assert_eq!(c.train_val_split, 0.8);
        assert_eq!(c.shuffle_buffer, 1000);
        assert_eq!(c.seed, None);
    }

    #[test]
    fn json_requires_sizes() {
        let json = r#"{"dataset": "d", "csv_train": "a", "csv_test": "b"}"#;
        assert!(serde_json::from_str::<IsicConfig>(json).is_err());
    }

    #[test]
    fn loader_config_carries_seed() {
        let lc = config().seed(11).loader_config(Order::ShuffleBuffer(5));
        assert_eq!(lc.seed, Some(11));
        assert_eq!(lc.order, Order::ShuffleBuffer(5));
        assert_eq!(lc.batch_size, 16);
    }
}
