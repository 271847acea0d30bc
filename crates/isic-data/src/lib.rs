//! # isic-data
//!
//! Data loading for ISIC-style binary skin lesion classification.
//!
//! This crate provides:
//! - [`manifest`]: typed CSV manifests (`image_name,target` / `image`)
//! - [`split`]: stratified train/validation split, per class
//! - [`pipeline`]: JPEG decode, positive-class augmentation, rescale, shape check
//! - [`augment`]: the fixed random augmentation sequence
//! - [`Dataset`] / [`ImageDataset`]: lazily decoded, indexed samples
//! - [`Loader`]: batching with a worker pool and bounded prefetch
//! - [`IsicDataLoader`]: wires everything into train / valid / test streams

pub mod augment;
pub mod dataset;
pub mod error;
pub mod isic;
pub mod loader;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod split;

pub use augment::{apply_augmentation, Augment, Compose};
pub use dataset::{Dataset, ImageDataset, Sample};
pub use error::{Error, ManifestError, Result};
pub use isic::{IsicConfig, IsicDataLoader};
pub use loader::{Batch, BatchIter, Loader, LoaderConfig, Order};
pub use manifest::{Label, Record, NEGATIVE, POSITIVE};
pub use pipeline::{load_image, PipelineOptions, ShapePolicy};
pub use split::{stratified_split, Split};
