use ndarray::{Array4, Axis};

use crate::error::{Result, WorkerErr};

/// A labeled image dataset held in memory.
///
/// Images are stored as a single `(samples, channels, height, width)` array.
#[derive(Debug, Clone)]
pub struct Dataset {
    images: Array4<f32>,
    labels: Vec<u32>,
}

impl Dataset {
    /// Creates a new dataset from owned buffers.
    ///
    /// # Errors
    /// `WorkerErr::Config` if the amount of images and labels differ or if the samples can't
    /// be addressed with 32 bit indices.
    pub fn new(images: Array4<f32>, labels: Vec<u32>) -> Result<Self> {
        let samples = images.len_of(Axis(0));

        if samples != labels.len() {
            return Err(WorkerErr::Config(format!(
                "dataset has {samples} images but {} labels",
                labels.len()
            )));
        }

        if u32::try_from(samples).is_err() {
            return Err(WorkerErr::Config(format!(
                "dataset of {samples} samples is too large"
            )));
        }

        Ok(Self { images, labels })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// The `(channels, height, width)` shape of a single image.
    pub fn sample_dim(&self) -> (usize, usize, usize) {
        let (_, c, h, w) = self.images.dim();
        (c, h, w)
    }

    #[inline]
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Copies the samples at `indices` into a batch, in that order.
    ///
    /// # Panics
    /// If any index is out of bounds.
    pub fn batch(&self, indices: &[usize]) -> Batch {
        Batch {
            images: self.images.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            indices: indices.iter().map(|&i| i as u32).collect(),
        }
    }
}

/// An owned batch of samples together with their positions in the dataset.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Array4<f32>,
    pub labels: Vec<u32>,
    pub indices: Vec<u32>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;

    fn dataset() -> Dataset {
        let images = Array::from_shape_fn((5, 1, 2, 2), |(n, _, i, j)| (n * 10 + i * 2 + j) as f32);
        Dataset::new(images, vec![4, 3, 2, 1, 0]).unwrap()
    }

    #[test]
    fn batch_follows_the_given_order() {
        let ds = dataset();
        assert_eq!(ds.len(), 5);
        assert_eq!(ds.sample_dim(), (1, 2, 2));

        let batch = ds.batch(&[3, 0]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.labels, vec![1, 4]);
        assert_eq!(batch.indices, vec![3, 0]);
        assert_eq!(batch.images.dim(), (2, 1, 2, 2));
        assert_eq!(batch.images[[0, 0, 1, 1]], 33.);
        assert_eq!(batch.images[[1, 0, 0, 1]], 1.);
    }

    #[test]
    fn mismatched_labels_are_rejected() {
        let images = Array4::zeros((3, 1, 2, 2));
        assert!(Dataset::new(images, vec![0, 1]).is_err());
    }
}
