//! Dense storage for the posterior responsibilities of each sample under each mixture component.
use std::ops::{Index, IndexMut};
use std::slice::{ChunksExact, ChunksExactMut};

use num_traits::Float;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::MixtureModelError;

/// An N × K row-major matrix where row `i` corresponds to sample `i` and
/// column `k` corresponds to mixture component `k`.
///
/// The shape is fixed at construction, the matrix is meant to be allocated once
/// for a fitting session and overwritten on every expectation step.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawAffiliationMatrix<F>"))]
pub struct AffiliationMatrix<F: Float> {
    n_samples: usize,
    n_components: usize,
    data: Vec<F>,
}

/// The unchecked serialized form of an [`AffiliationMatrix`]
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawAffiliationMatrix<F> {
    n_samples: usize,
    n_components: usize,
    data: Vec<F>,
}

#[cfg(feature = "serde")]
impl<F: Float> TryFrom<RawAffiliationMatrix<F>> for AffiliationMatrix<F> {
    type Error = MixtureModelError;

    fn try_from(value: RawAffiliationMatrix<F>) -> Result<Self, Self::Error> {
        let matrix = Self {
            n_samples: value.n_samples,
            n_components: value.n_components,
            data: value.data,
        };
        matrix.check_buffer()?;
        Ok(matrix)
    }
}

impl<F: Float> AffiliationMatrix<F> {
    /// Create a zero-filled matrix for `n_samples` samples and `n_components` components
    pub fn new(n_samples: usize, n_components: usize) -> Self {
        Self {
            n_samples,
            n_components,
            data: vec![F::zero(); n_samples * n_components],
        }
    }

    /// Check that the backing buffer holds exactly `n_samples * n_components` entries
    pub fn check_buffer(&self) -> Result<(), MixtureModelError> {
        let expected = self.n_samples.checked_mul(self.n_components);
        if expected == Some(self.data.len()) {
            Ok(())
        } else {
            Err(MixtureModelError::invalid_argument(
                "affiliations",
                format!(
                    "a {} x {} matrix cannot hold {} entries",
                    self.n_samples,
                    self.n_components,
                    self.data.len()
                ),
            ))
        }
    }

    /// The (rows, columns) shape of the matrix
    pub fn shape(&self) -> (usize, usize) {
        (self.n_samples, self.n_components)
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, sample: usize, component: usize) -> Option<F> {
        if sample < self.n_samples && component < self.n_components {
            Some(self.data[sample * self.n_components + component])
        } else {
            None
        }
    }

    /// The responsibilities of every component for `sample`
    pub fn row(&self, sample: usize) -> &[F] {
        let start = sample * self.n_components;
        &self.data[start..start + self.n_components]
    }

    pub fn row_mut(&mut self, sample: usize) -> &mut [F] {
        let start = sample * self.n_components;
        &mut self.data[start..start + self.n_components]
    }

    /// Iterate over the rows of the matrix in sample order.
    ///
    /// When there are no components, no rows are produced.
    pub fn rows(&self) -> ChunksExact<'_, F> {
        self.data.chunks_exact(self.n_components.max(1))
    }

    pub fn rows_mut(&mut self) -> ChunksExactMut<'_, F> {
        self.data.chunks_exact_mut(self.n_components.max(1))
    }

    /// The responsibilities of `component` for every sample
    pub fn column(&self, component: usize) -> impl Iterator<Item = F> + '_ {
        self.rows().map(move |row| row[component])
    }

    /// The total responsibility each component holds, the effective number of samples
    /// that component accounts for
    pub fn column_sums(&self) -> Vec<F> {
        let mut sums = vec![F::zero(); self.n_components];
        for row in self.rows() {
            for (acc, v) in sums.iter_mut().zip(row.iter()) {
                *acc = *acc + *v;
            }
        }
        sums
    }

    /// The component with the highest responsibility for `sample`, the first on ties.
    ///
    /// Returns `None` when `sample` is out of range or there are no components.
    pub fn argmax_row(&self, sample: usize) -> Option<usize> {
        if sample >= self.n_samples {
            return None;
        }
        let row = self.row(sample);
        let mut best: Option<(usize, F)> = None;
        for (k, v) in row.iter().copied().enumerate() {
            match best {
                Some((_, best_v)) if best_v >= v => {}
                _ => best = Some((k, v)),
            }
        }
        best.map(|(k, _)| k)
    }

    /// Set every entry to `value`
    pub fn fill(&mut self, value: F) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// The underlying row-major buffer
    pub fn as_slice(&self) -> &[F] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [F] {
        &mut self.data
    }
}

impl<F: Float> Index<(usize, usize)> for AffiliationMatrix<F> {
    type Output = F;

    fn index(&self, (sample, component): (usize, usize)) -> &Self::Output {
        assert!(
            component < self.n_components,
            "component index {component} out of bounds for {} components",
            self.n_components
        );
        &self.data[sample * self.n_components + component]
    }
}

impl<F: Float> IndexMut<(usize, usize)> for AffiliationMatrix<F> {
    fn index_mut(&mut self, (sample, component): (usize, usize)) -> &mut Self::Output {
        assert!(
            component < self.n_components,
            "component index {component} out of bounds for {} components",
            self.n_components
        );
        &mut self.data[sample * self.n_components + component]
    }
}

#[cfg(feature = "ndarray")]
impl<F: Float> From<AffiliationMatrix<F>> for ndarray::Array2<F> {
    fn from(value: AffiliationMatrix<F>) -> Self {
        ndarray::Array2::from_shape_vec((value.n_samples, value.n_components), value.data)
            .expect("The buffer length always matches the matrix shape")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shape_and_access() {
        let mut mat = AffiliationMatrix::<f64>::new(3, 2);
        assert_eq!(mat.shape(), (3, 2));
        assert_eq!(mat.as_slice().len(), 6);
        assert!(mat.as_slice().iter().all(|v| *v == 0.0));

        mat[(1, 0)] = 0.25;
        mat[(1, 1)] = 0.75;
        assert_eq!(mat.get(1, 1), Some(0.75));
        assert_eq!(mat.get(3, 0), None);
        assert_eq!(mat.get(0, 2), None);
        assert_eq!(mat.row(1), &[0.25, 0.75]);

        mat.row_mut(2).copy_from_slice(&[1.0, 0.0]);
        assert_eq!(mat.rows().count(), 3);
        assert_eq!(mat.column(0).collect::<Vec<_>>(), vec![0.0, 0.25, 1.0]);
        assert_eq!(mat.column_sums(), vec![1.25, 0.75]);
        assert_eq!(mat.argmax_row(1), Some(1));
        assert_eq!(mat.argmax_row(2), Some(0));
        // All-zero rows resolve to the first component
        assert_eq!(mat.argmax_row(0), Some(0));
        assert_eq!(mat.argmax_row(3), None);
        assert_eq!(mat.argmax_row(usize::MAX), None);
        assert!(mat.check_buffer().is_ok());

        mat.fill(0.5);
        assert_eq!(mat.column_sums(), vec![1.5, 1.5]);
    }

    #[test]
    fn test_empty() {
        let mat = AffiliationMatrix::<f32>::new(0, 4);
        assert!(mat.is_empty());
        assert_eq!(mat.rows().count(), 0);
        assert_eq!(mat.column_sums(), vec![0.0; 4]);

        let mat = AffiliationMatrix::<f32>::new(5, 0);
        assert_eq!(mat.rows().count(), 0);
        assert_eq!(mat.argmax_row(2), None);
    }

    #[test]
    #[should_panic]
    fn test_out_of_bounds_component() {
        let mat = AffiliationMatrix::<f64>::new(2, 2);
        let _ = mat[(0, 2)];
    }

    #[cfg(feature = "ndarray")]
    #[test]
    fn test_to_array2() {
        let mut mat = AffiliationMatrix::<f64>::new(2, 3);
        mat[(1, 2)] = 1.0;
        let arr: ndarray::Array2<f64> = mat.into();
        assert_eq!(arr.shape(), &[2, 3]);
        assert_eq!(arr[[1, 2]], 1.0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_checks_buffer() {
        let mut mat = AffiliationMatrix::<f64>::new(3, 2);
        mat[(2, 1)] = 1.0;
        let text = serde_json::to_string(&mat).unwrap();
        let back: AffiliationMatrix<f64> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, mat);

        let short = r#"{"n_samples":3,"n_components":2,"data":[7.0,7.0]}"#;
        assert!(serde_json::from_str::<AffiliationMatrix<f64>>(short).is_err());

        let long = r#"{"n_samples":1,"n_components":1,"data":[0.5,0.5]}"#;
        assert!(serde_json::from_str::<AffiliationMatrix<f64>>(long).is_err());
    }
}
