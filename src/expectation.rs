//! The expectation (E) step of Expectation-Maximization for univariate Gaussian mixtures.
//!
//! For every sample $`x_i`$ and every component $`k`$ the posterior responsibility is
//!
//! ```math
//! \gamma_{ik} = \frac{w_k N(x_i|\mu_k, \sigma_k)}{\sum_j w_j N(x_i|\mu_j, \sigma_j)}
//! ```
//!
//! Rows are independent of one another, so with the `parallelism` feature enabled they are
//! computed concurrently. Each row is always evaluated by the same sequential code, summing
//! component densities left to right, so serial and parallel results are bit-identical.
use cfg_if::cfg_if;
use num_traits::{Float, FromPrimitive};

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::affiliation::AffiliationMatrix;
use crate::error::MixtureModelError;
use crate::mixture::{GaussianComponent, MixtureModel};

/// Computes the posterior responsibility of each mixture component for each sample.
///
/// The runner holds no state between calls, the same runner may be re-used across
/// any number of iterations while the mixture is updated in between.
#[derive(Debug, Clone, Copy)]
pub struct ExpectationRunner<F: Float> {
    /// Weighted density sums at or below this value are treated as degenerate
    pub epsilon: F,
}

impl<F: Float> Default for ExpectationRunner<F> {
    fn default() -> Self {
        Self {
            epsilon: F::min_positive_value(),
        }
    }
}

impl<F: Float + FromPrimitive + Send + Sync> ExpectationRunner<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Weighted density sums at or below this value are treated as degenerate
    pub fn epsilon(mut self, epsilon: F) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Check every precondition of [`ExpectationRunner::compute_responsibilities`] before
    /// any output is written.
    fn validate(
        &self,
        samples: &[F],
        mixture: &MixtureModel<F>,
        affiliations: &AffiliationMatrix<F>,
    ) -> Result<(), MixtureModelError> {
        mixture.validate()?;
        let expected = (samples.len(), mixture.len());
        if affiliations.shape() != expected {
            return Err(MixtureModelError::DimensionMismatch {
                expected,
                found: affiliations.shape(),
            });
        }
        affiliations.check_buffer()?;
        self.validate_samples(samples)
    }

    fn validate_samples(&self, samples: &[F]) -> Result<(), MixtureModelError> {
        match samples.iter().position(|x| !x.is_finite()) {
            Some(i) => Err(MixtureModelError::invalid_argument(
                "samples",
                format!("sample {i} is not a finite number"),
            )),
            None => Ok(()),
        }
    }

    #[inline]
    fn is_degenerate(&self, denominator: F) -> bool {
        !(denominator > self.epsilon) || !denominator.is_finite()
    }

    /// Fill `row` with the responsibilities of `components` for the sample `x` at position `index`
    #[inline]
    fn fill_row(
        &self,
        index: usize,
        x: F,
        components: &[GaussianComponent<F>],
        row: &mut [F],
    ) -> Result<(), MixtureModelError> {
        let mut denominator = F::zero();
        for (gamma, component) in row.iter_mut().zip(components.iter()) {
            *gamma = component.density(x);
            denominator = denominator + *gamma;
        }
        if self.is_degenerate(denominator) {
            return Err(MixtureModelError::DegenerateDistribution { index });
        }
        for gamma in row.iter_mut() {
            *gamma = *gamma / denominator;
        }
        Ok(())
    }

    /// Fill `affiliations` with the probability that each sample was generated by each component of `mixture`.
    ///
    /// Row `i` of `affiliations` corresponds to `samples[i]` and column `k` to `mixture[k]`. On success every
    /// row sums to 1.
    ///
    /// # Errors
    /// - [`MixtureModelError::InvalidArgument`] if `mixture` is empty or a sample is not finite
    /// - [`MixtureModelError::InvalidParameter`] if a component deviation is not positive
    /// - [`MixtureModelError::DimensionMismatch`] if `affiliations` is not `samples.len()` × `mixture.len()`
    /// - [`MixtureModelError::DegenerateDistribution`] with the lowest index of a sample whose weighted density
    ///   sum is not above [`ExpectationRunner::epsilon`].
    ///
    /// Nothing is written when a precondition fails, but a degenerate sample leaves `affiliations`
    /// partially overwritten and its contents should be discarded.
    pub fn compute_responsibilities(
        &self,
        samples: &[F],
        mixture: &MixtureModel<F>,
        affiliations: &mut AffiliationMatrix<F>,
    ) -> Result<(), MixtureModelError> {
        cfg_if! {
            if #[cfg(feature = "parallelism")] {
                return self.compute_responsibilities_parallel(samples, mixture, affiliations);
            } else {
                return self.compute_responsibilities_serial(samples, mixture, affiliations);
            }
        }
    }

    /// A single-threaded version of [`ExpectationRunner::compute_responsibilities`]
    pub fn compute_responsibilities_serial(
        &self,
        samples: &[F],
        mixture: &MixtureModel<F>,
        affiliations: &mut AffiliationMatrix<F>,
    ) -> Result<(), MixtureModelError> {
        self.validate(samples, mixture, affiliations)?;
        for (i, (x, row)) in samples.iter().zip(affiliations.rows_mut()).enumerate() {
            self.fill_row(i, *x, mixture, row)?;
        }
        Ok(())
    }

    /// A row-parallel version of [`ExpectationRunner::compute_responsibilities`]
    #[cfg(feature = "parallelism")]
    pub fn compute_responsibilities_parallel(
        &self,
        samples: &[F],
        mixture: &MixtureModel<F>,
        affiliations: &mut AffiliationMatrix<F>,
    ) -> Result<(), MixtureModelError> {
        self.validate(samples, mixture, affiliations)?;
        let n_components = mixture.len();
        let components: &[GaussianComponent<F>] = mixture;
        let failure = affiliations
            .as_mut_slice()
            .par_chunks_mut(n_components)
            .zip(samples.par_iter())
            .enumerate()
            .find_map_first(|(i, (row, x))| self.fill_row(i, *x, components, row).err());
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Allocate a new [`AffiliationMatrix`] and fill it with [`ExpectationRunner::compute_responsibilities`]
    pub fn responsibilities(
        &self,
        samples: &[F],
        mixture: &MixtureModel<F>,
    ) -> Result<AffiliationMatrix<F>, MixtureModelError> {
        let mut affiliations = AffiliationMatrix::new(samples.len(), mixture.len());
        self.compute_responsibilities(samples, mixture, &mut affiliations)?;
        Ok(affiliations)
    }

    /// Compute the total log-likelihood of `samples` under `mixture`
    ///
    /// ```math
    /// \ell = \sum_i \log\sum_k w_k N(x_i|\mu_k, \sigma_k)
    /// ```
    pub fn log_likelihood(
        &self,
        samples: &[F],
        mixture: &MixtureModel<F>,
    ) -> Result<F, MixtureModelError> {
        mixture.validate()?;
        self.validate_samples(samples)?;
        samples
            .iter()
            .enumerate()
            .try_fold(F::zero(), |acc, (index, x)| {
                let denominator = mixture.density(*x);
                if self.is_degenerate(denominator) {
                    Err(MixtureModelError::DegenerateDistribution { index })
                } else {
                    Ok(acc + denominator.ln())
                }
            })
    }
}

/// A convenience function that uses a default [`ExpectationRunner`] to fill `affiliations`
/// with the responsibilities of each component in `mixture` for each of `samples`.
pub fn compute_responsibilities<F: Float + FromPrimitive + Send + Sync>(
    samples: &[F],
    mixture: &MixtureModel<F>,
    affiliations: &mut AffiliationMatrix<F>,
) -> Result<(), MixtureModelError> {
    ExpectationRunner::default().compute_responsibilities(samples, mixture, affiliations)
}
