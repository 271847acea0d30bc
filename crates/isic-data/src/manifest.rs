// Manifest: CSV files pairing ISIC image names with binary targets
//
// Train manifest:  image_name,target[,...metadata columns]
// Test manifest:   image[,...metadata columns]
//
// Extra columns (patient id, sex, anatomy site, ...) are ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ManifestError, Result};

/// Binary class label: 0 = benign, 1 = malignant.
pub type Label = u8;

/// The rare class, and the only one that gets augmented.
pub const POSITIVE: Label = 1;
/// The majority class.
pub const NEGATIVE: Label = 0;

/// One manifest row: an image identifier (file stem) and its label.
///
/// Test records never carry a label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    pub image_name: String,
    pub label: Option<Label>,
}

impl Record {
    pub fn labeled(image_name: impl Into<String>, label: Label) -> Self {
        Self {
            image_name: image_name.into(),
            label: Some(label),
        }
    }

    pub fn unlabeled(image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            label: None,
        }
    }

    /// Whether this record belongs to the positive class.
    pub fn is_positive(&self) -> bool {
        self.label == Some(POSITIVE)
    }
}

#[derive(Debug, Deserialize)]
struct TrainRow {
    image_name: String,
    target: String,
}

#[derive(Debug, Deserialize)]
struct TestRow {
    image: String,
}

/// Read the training manifest (`image_name`, `target`) from disk.
pub fn read_train_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let file = open(path)?;
    train_from_reader(file, path)
}

/// Read the test manifest (`image`) from disk.
pub fn read_test_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let file = open(path)?;
    test_from_reader(file, path)
}

/// Parse a training manifest from any reader. `origin` is only used in errors.
pub fn train_from_reader<R: Read>(reader: R, origin: &Path) -> Result<Vec<Record>> {
    let mut rdr = csv::Reader::from_reader(reader);
    require_column(&mut rdr, origin, "image_name")?;
    require_column(&mut rdr, origin, "target")?;

    let mut records = Vec::new();
    for (i, row) in rdr.deserialize::<TrainRow>().enumerate() {
        let row = row.map_err(|source| ManifestError::Csv {
            path: origin.to_path_buf(),
            source,
        })?;
        let label = parse_label(&row.target).ok_or_else(|| ManifestError::InvalidLabel {
            path: origin.to_path_buf(),
            row: i + 1,
            value: row.target.clone(),
        })?;
        records.push(Record::labeled(row.image_name, label));
    }

    tracing::info!(
        manifest = %origin.display(),
        rows = records.len(),
        "loaded train manifest"
    );
    Ok(records)
}

/// Parse a test manifest from any reader. `origin` is only used in errors.
pub fn test_from_reader<R: Read>(reader: R, origin: &Path) -> Result<Vec<Record>> {
    let mut rdr = csv::Reader::from_reader(reader);
    require_column(&mut rdr, origin, "image")?;

    let records = rdr
        .deserialize::<TestRow>()
        .map(|row| {
            row.map(|r| Record::unlabeled(r.image))
                .map_err(|source| ManifestError::Csv {
                    path: origin.to_path_buf(),
                    source,
                })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    tracing::info!(
        manifest = %origin.display(),
        rows = records.len(),
        "loaded test manifest"
    );
    Ok(records)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| {
        ManifestError::Io {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

fn require_column<R: Read>(
    rdr: &mut csv::Reader<R>,
    origin: &Path,
    column: &'static str,
) -> Result<()> {
    let headers = rdr.headers().map_err(|source| ManifestError::Csv {
        path: origin.to_path_buf(),
        source,
    })?;
    if headers.iter().any(|h| h == column) {
        Ok(())
    } else {
        Err(ManifestError::MissingColumn {
            path: origin.to_path_buf(),
            column,
        }
        .into())
    }
}

/// Accepts `0`/`1` and their float spellings (`0.0`, `1.0`).
fn parse_label(raw: &str) -> Option<Label> {
    let v: f64 = raw.trim().parse().ok()?;
    if v == 0.0 {
        Some(NEGATIVE)
    } else if v == 1.0 {
        Some(POSITIVE)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn origin() -> &'static Path {
        Path::new("mem.csv")
    }

    #[test]
    fn train_manifest_with_extra_columns() {
        let csv = "image_name,patient_id,sex,target\n\
                   ISIC_0001,IP_1,male,0\n\
                   ISIC_0002,IP_2,female,1\n";
        let records = train_from_reader(csv.as_bytes(), origin()).unwrap();
        assert_eq!(
            records,
            vec![
                Record::labeled("ISIC_0001", 0),
                Record::labeled("ISIC_0002", 1),
            ]
        );
        assert!(records[1].is_positive());
    }

    #[test]
    fn train_manifest_float_labels() {
        let csv = "image_name,target\na,1.0\nb,0.0\n";
        let records = train_from_reader(csv.as_bytes(), origin()).unwrap();
        assert_eq!(records[0].label, Some(1));
        assert_eq!(records[1].label, Some(0));
    }

    #[test]
    fn train_manifest_missing_target_column() {
        let csv = "image_name,benign_malignant\na,benign\n";
        let err = train_from_reader(csv.as_bytes(), origin()).unwrap_err();
        assert!(matches!(
            err,
            Error::Manifest(ManifestError::MissingColumn { column: "target", .. })
        ));
    }

    #[test]
    fn train_manifest_invalid_label_reports_row() {
        let csv = "image_name,target\na,0\nb,2\n";
        let err = train_from_reader(csv.as_bytes(), origin()).unwrap_err();
        match err {
            Error::Manifest(ManifestError::InvalidLabel { row, value, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(value, "2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ragged_row_is_csv_error() {
        let csv = "image_name,target\na,0\nb,1,extra\n";
        let err = train_from_reader(csv.as_bytes(), origin()).unwrap_err();
        assert!(matches!(err, Error::Manifest(ManifestError::Csv { .. })));
    }

    #[test]
    fn test_manifest_has_no_labels() {
        let csv = "image,patient_id\nISIC_9000,IP_9\nISIC_9001,IP_9\n";
        let records = test_from_reader(csv.as_bytes(), origin()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.label.is_none()));
        assert_eq!(records[0].image_name, "ISIC_9000");
    }

    #[test]
    fn missing_file_is_manifest_io_error() {
        let err = read_train_manifest("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, Error::Manifest(ManifestError::Io { .. })));
    }

    #[test]
    fn empty_manifest_with_header_is_empty() {
        let records = test_from_reader("image\n".as_bytes(), origin()).unwrap();
        assert!(records.is_empty());
    }
}
