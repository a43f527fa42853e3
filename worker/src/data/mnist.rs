//! Reader for the MNIST IDX files.
//!
//! The files are looked up directly under the data directory first and then under
//! `MNIST/raw`, the layout torchvision leaves behind.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use ndarray::Array4;

use super::Dataset;
use crate::error::{Result, WorkerErr};

/// Mean pixel value of the training set, after scaling to `[0, 1]`.
pub const MEAN: f32 = 0.1307;
/// Pixel standard deviation of the training set, after scaling to `[0, 1]`.
pub const STD: f32 = 0.3081;

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    /// The images and labels file names.
    pub fn files(self) -> (&'static str, &'static str) {
        match self {
            Split::Train => ("train-images-idx3-ubyte", "train-labels-idx1-ubyte"),
            Split::Test => ("t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte"),
        }
    }
}

/// Loads and normalizes one split of MNIST from `dir`.
pub fn load(dir: &Path, split: Split) -> Result<Dataset> {
    let (images_file, labels_file) = split.files();

    let images_path = locate(dir, images_file);
    let labels_path = locate(dir, labels_file);
    debug!("reading {split:?} split from {}", images_path.display());

    let images = parse_images(&images_path, &read(&images_path)?)?;
    let labels = parse_labels(&labels_path, &read(&labels_path)?)?;

    if images.dim().0 != labels.len() {
        return Err(WorkerErr::dataset(
            labels_path,
            format!("{} labels for {} images", labels.len(), images.dim().0),
        ));
    }

    Dataset::new(images, labels)
}

fn locate(dir: &Path, name: &str) -> PathBuf {
    let flat = dir.join(name);
    if flat.exists() {
        return flat;
    }

    let raw = dir.join("MNIST").join("raw").join(name);
    if raw.exists() { raw } else { flat }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| WorkerErr::dataset(path, e.to_string()))
}

/// Parses an IDX3 image file into a normalized `(n, 1, rows, cols)` array.
fn parse_images(path: &Path, bytes: &[u8]) -> Result<Array4<f32>> {
    let header =
        |at| read_u32(bytes, at).ok_or_else(|| WorkerErr::dataset(path, "truncated header"));

    let magic = header(0)?;
    if magic != IMAGES_MAGIC {
        return Err(WorkerErr::dataset(
            path,
            format!("bad magic number {magic}, expected {IMAGES_MAGIC}"),
        ));
    }

    let (n, rows, cols) = (header(4)? as usize, header(8)? as usize, header(12)? as usize);
    let pixels = &bytes[16..];

    let expected = n.checked_mul(rows).and_then(|v| v.checked_mul(cols));
    if expected != Some(pixels.len()) {
        return Err(WorkerErr::dataset(
            path,
            format!(
                "expected {n} images of {rows}x{cols}, found {} pixels",
                pixels.len()
            ),
        ));
    }

    let values = pixels.iter().map(|&p| normalize(p)).collect();
    Array4::from_shape_vec((n, 1, rows, cols), values)
        .map_err(|e| WorkerErr::dataset(path, e.to_string()))
}

/// Parses an IDX1 label file.
fn parse_labels(path: &Path, bytes: &[u8]) -> Result<Vec<u32>> {
    let header =
        |at| read_u32(bytes, at).ok_or_else(|| WorkerErr::dataset(path, "truncated header"));

    let magic = header(0)?;
    if magic != LABELS_MAGIC {
        return Err(WorkerErr::dataset(
            path,
            format!("bad magic number {magic}, expected {LABELS_MAGIC}"),
        ));
    }

    let n = header(4)? as usize;
    let labels = &bytes[8..];

    if labels.len() != n {
        return Err(WorkerErr::dataset(
            path,
            format!("expected {n} labels, found {}", labels.len()),
        ));
    }

    Ok(labels.iter().map(|&l| l as u32).collect())
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline]
fn normalize(pixel: u8) -> f32 {
    (pixel as f32 / 255. - MEAN) / STD
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encodes `images` of `rows` by `cols` pixels and their labels as IDX files in `dir`.
    fn write_idx(
        dir: &Path,
        split: Split,
        rows: u32,
        cols: u32,
        images: &[u8],
        labels: &[u8],
    ) {
        let (images_file, labels_file) = split.files();

        let mut buf = Vec::new();
        for word in [IMAGES_MAGIC, labels.len() as u32, rows, cols] {
            buf.extend_from_slice(&word.to_be_bytes());
        }
        buf.extend_from_slice(images);
        fs::write(dir.join(images_file), &buf).unwrap();

        let mut buf = Vec::new();
        for word in [LABELS_MAGIC, labels.len() as u32] {
            buf.extend_from_slice(&word.to_be_bytes());
        }
        buf.extend_from_slice(labels);
        fs::write(dir.join(labels_file), &buf).unwrap();
    }

    #[test]
    fn loads_and_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        write_idx(dir.path(), Split::Test, 2, 2, &[0, 255, 0, 0, 255, 255, 255, 255], &[7, 1]);

        let ds = load(dir.path(), Split::Test).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.sample_dim(), (1, 2, 2));
        assert_eq!(ds.labels(), &[7, 1]);

        let batch = ds.batch(&[0]);
        assert!((batch.images[[0, 0, 0, 0]] - (-MEAN / STD)).abs() < 1e-6);
        assert!((batch.images[[0, 0, 0, 1]] - ((1. - MEAN) / STD)).abs() < 1e-6);
    }

    #[test]
    fn falls_back_to_the_torchvision_layout() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("MNIST").join("raw");
        fs::create_dir_all(&raw).unwrap();
        write_idx(&raw, Split::Train, 1, 1, &[10, 20, 30], &[0, 1, 2]);

        let ds = load(dir.path(), Split::Train).unwrap();
        assert_eq!(ds.len(), 3);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_idx(dir.path(), Split::Test, 1, 1, &[0], &[0]);

        let (images_file, _) = Split::Test.files();
        let path = dir.path().join(images_file);
        let mut bytes = fs::read(&path).unwrap();
        bytes[3] = 0;
        fs::write(&path, bytes).unwrap();

        let err = load(dir.path(), Split::Test).unwrap_err();
        assert!(matches!(err, WorkerErr::Dataset { .. }), "{err}");
    }

    #[test]
    fn truncated_pixels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_idx(dir.path(), Split::Test, 2, 2, &[0, 0, 0], &[0]);

        assert!(load(dir.path(), Split::Test).is_err());
    }

    #[test]
    fn missing_files_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path(), Split::Train).unwrap_err();

        assert!(err.to_string().contains("train-images-idx3-ubyte"));
    }
}
