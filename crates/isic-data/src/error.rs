use std::path::PathBuf;

/// Failures while reading a CSV manifest.
///
/// Every variant carries the manifest path so the caller can tell the train
/// manifest from the test manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest could not be opened or read.
    #[error("cannot read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The CSV itself is malformed (ragged rows, bad UTF-8, bad field).
    #[error("malformed manifest {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A required header is absent.
    #[error("manifest {path} has no `{column}` column")]
    MissingColumn { path: PathBuf, column: &'static str },

    /// A `target` value outside {0, 1}.
    #[error("manifest {path}, row {row}: label must be 0 or 1, got `{value}`")]
    InvalidLabel {
        path: PathBuf,
        row: usize,
        value: String,
    },
}

/// All errors produced while building or iterating the ISIC datasets.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unreadable or malformed manifest.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The image file could not be read from disk.
    #[error("cannot read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a decodable JPEG.
    #[error("cannot decode {path} as JPEG: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Decoded `[H, W, C]` differs from the configured size.
    #[error("shape mismatch for {path}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        path: PathBuf,
        expected: [usize; 3],
        got: [usize; 3],
    },

    /// The JPEG quality step failed to re-encode an augmented image.
    #[error("augmentation failed for {path}: {source}")]
    Augment {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The decode worker pool could not be started.
    #[error("cannot start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Create a configuration error from any string message.
    pub fn config(s: impl Into<String>) -> Self {
        Error::Config(s.into())
    }
}

/// Convenience Result type used throughout isic-data.
pub type Result<T> = std::result::Result<T, Error>;
