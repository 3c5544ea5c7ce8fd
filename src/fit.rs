//! Drive an Expectation-Maximization fitting session.
//!
//! [`MixtureFitter`] owns the mixture being refined and the [`AffiliationMatrix`] that is
//! re-used across iterations. Each iteration refreshes the affiliations with an
//! [`ExpectationRunner`] and hands them to a [`Maximization`] implementation which rewrites
//! the component parameters. Iteration stops when the change in log-likelihood falls below
//! [`FitConfig::convergence`] or after [`FitConfig::max_iter`] iterations.
use std::sync::atomic::{AtomicBool, Ordering};

use num_traits::{Float, FromPrimitive};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::affiliation::AffiliationMatrix;
use crate::error::MixtureModelError;
use crate::expectation::ExpectationRunner;
use crate::mixture::MixtureModel;

/// The maximization (M) step of Expectation-Maximization.
///
/// Implementations read the affiliations computed for the current mixture and update the
/// weight, mean and deviation of each component of `mixture` in place. The number and order
/// of components must not change.
pub trait Maximization<F: Float> {
    fn maximize(
        &mut self,
        samples: &[F],
        affiliations: &AffiliationMatrix<F>,
        mixture: &mut MixtureModel<F>,
    ) -> Result<(), MixtureModelError>;
}

impl<F, T> Maximization<F> for T
where
    F: Float,
    T: FnMut(&[F], &AffiliationMatrix<F>, &mut MixtureModel<F>) -> Result<(), MixtureModelError>,
{
    fn maximize(
        &mut self,
        samples: &[F],
        affiliations: &AffiliationMatrix<F>,
        mixture: &mut MixtureModel<F>,
    ) -> Result<(), MixtureModelError> {
        (self)(samples, affiliations, mixture)
    }
}

/// Hyperparameters for an Expectation-Maximization session
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitConfig {
    /// The maximum number of iterations to run
    pub max_iter: usize,
    /// The absolute change in total log-likelihood below which the fit is considered converged
    pub convergence: f64,
    /// Override the degenerate density threshold of the [`ExpectationRunner`]
    pub epsilon: Option<f64>,
}

impl FitConfig {
    /// The maximum number of iterations to run
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// The absolute change in total log-likelihood below which the fit is considered converged
    pub fn convergence(mut self, convergence: f64) -> Self {
        self.convergence = convergence;
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = Some(epsilon);
        self
    }
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            convergence: 1e-9,
            epsilon: None,
        }
    }
}

/// Describe an Expectation-Maximization run's output
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelFitResult {
    /// The log-likelihood of the samples under the final mixture
    pub log_likelihood: f64,
    /// The number of iterations run
    pub iterations: usize,
    /// Whether the log-likelihood stabilized within the iteration limit
    pub converged: bool,
    /// Whether the run was stopped early by a cancellation request
    pub cancelled: bool,
}

/// Fit a [`MixtureModel`] to a borrowed sample sequence
#[derive(Debug, Clone)]
pub struct MixtureFitter<'a, F: Float> {
    pub samples: &'a [F],
    pub mixture: MixtureModel<F>,
    pub affiliations: AffiliationMatrix<F>,
    runner: ExpectationRunner<F>,
}

impl<'a, F: Float + FromPrimitive + Send + Sync> MixtureFitter<'a, F> {
    /// Start a session over `samples` from an initial `mixture`.
    ///
    /// The affiliation matrix is allocated here and keeps its shape for the life of the session.
    pub fn new(samples: &'a [F], mixture: MixtureModel<F>) -> Result<Self, MixtureModelError> {
        mixture.validate()?;
        if samples.is_empty() {
            return Err(MixtureModelError::invalid_argument(
                "samples",
                "cannot fit a mixture to zero samples",
            ));
        }
        let affiliations = AffiliationMatrix::new(samples.len(), mixture.len());
        Ok(Self {
            samples,
            mixture,
            affiliations,
            runner: ExpectationRunner::default(),
        })
    }

    /// Refresh the affiliation matrix from the current mixture
    pub fn expectation(&mut self) -> Result<(), MixtureModelError> {
        self.runner
            .compute_responsibilities(self.samples, &self.mixture, &mut self.affiliations)
    }

    /// The log-likelihood of the samples under the current mixture
    pub fn log_likelihood(&self) -> Result<F, MixtureModelError> {
        self.runner.log_likelihood(self.samples, &self.mixture)
    }

    /// Run a single expectation step followed by a single maximization step
    pub fn step<M: Maximization<F>>(&mut self, maximizer: &mut M) -> Result<(), MixtureModelError> {
        self.expectation()?;
        maximizer.maximize(self.samples, &self.affiliations, &mut self.mixture)?;
        let expected = self.affiliations.shape();
        if self.mixture.len() != expected.1 {
            return Err(MixtureModelError::DimensionMismatch {
                expected,
                found: (self.samples.len(), self.mixture.len()),
            });
        }
        Ok(())
    }

    /// Fit the mixture using `maximizer` with the default [`FitConfig`] settings
    pub fn fit<M: Maximization<F>>(
        &mut self,
        maximizer: &mut M,
    ) -> Result<ModelFitResult, MixtureModelError> {
        self.fit_with(maximizer, FitConfig::default())
    }

    /// Fit the mixture using `maximizer` with `config` options
    pub fn fit_with<M: Maximization<F>>(
        &mut self,
        maximizer: &mut M,
        config: FitConfig,
    ) -> Result<ModelFitResult, MixtureModelError> {
        let never = AtomicBool::new(false);
        self.fit_until(maximizer, config, &never)
    }

    /// Fit the mixture using `maximizer` with `config` options, checking `cancel` before
    /// every iteration and stopping early once it is set.
    ///
    /// On success the affiliation matrix reflects the final mixture. On error both the mixture
    /// and the affiliations are left as they were when the failure occurred.
    pub fn fit_until<M: Maximization<F>>(
        &mut self,
        maximizer: &mut M,
        config: FitConfig,
        cancel: &AtomicBool,
    ) -> Result<ModelFitResult, MixtureModelError> {
        if config.max_iter == 0 {
            return Err(MixtureModelError::invalid_argument(
                "max_iter",
                "at least one iteration is required",
            ));
        }
        self.runner = config
            .epsilon
            .and_then(F::from_f64)
            .map(|epsilon| ExpectationRunner::new().epsilon(epsilon))
            .unwrap_or_default();

        let mut last_log_likelihood = self.checked(|this| this.log_likelihood())?;
        let mut iterations = 0;
        let mut converged = false;
        let mut cancelled = false;

        for it in 0..config.max_iter {
            if cancel.load(Ordering::Relaxed) {
                log::warn!("{it}: Fit cancelled");
                cancelled = true;
                break;
            }
            iterations = it + 1;
            self.checked(|this| this.step(&mut *maximizer))?;
            let log_likelihood = self.checked(|this| this.log_likelihood())?;
            let delta = (log_likelihood - last_log_likelihood).abs();
            log::trace!(
                "{it}: Log-likelihood = {:0.6}: Delta = {:0.3e}",
                log_likelihood.to_f64().unwrap_or(f64::NAN),
                delta.to_f64().unwrap_or(f64::NAN)
            );
            last_log_likelihood = log_likelihood;
            if delta.to_f64().is_some_and(|d| d < config.convergence) {
                converged = true;
                break;
            }
        }

        if converged {
            log::debug!("Converged after {iterations} iterations");
        } else if !cancelled {
            log::debug!(
                "Did not converge within {} iterations",
                config.max_iter
            );
        }

        if iterations > 0 {
            self.checked(|this| this.expectation())?;
        }

        Ok(ModelFitResult {
            log_likelihood: last_log_likelihood.to_f64().unwrap_or(f64::NAN),
            iterations,
            converged,
            cancelled,
        })
    }

    fn checked<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, MixtureModelError>,
    ) -> Result<T, MixtureModelError> {
        f(self).map_err(|err| {
            log::warn!("Aborting fit: {err}");
            err
        })
    }

    /// Consume the session, returning the fitted mixture and its affiliations
    pub fn into_inner(self) -> (MixtureModel<F>, AffiliationMatrix<F>) {
        (self.mixture, self.affiliations)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mixture::GaussianComponent;

    /// Closed-form univariate Gaussian mixture parameter updates
    struct WeightedMoments;

    impl Maximization<f64> for WeightedMoments {
        fn maximize(
            &mut self,
            samples: &[f64],
            affiliations: &AffiliationMatrix<f64>,
            mixture: &mut MixtureModel<f64>,
        ) -> Result<(), MixtureModelError> {
            let n = samples.len() as f64;
            let counts = affiliations.column_sums();
            for (k, component) in mixture.iter_mut().enumerate() {
                let count = counts[k];
                if count <= 0.0 {
                    return Err(MixtureModelError::Maximization(format!(
                        "component {k} lost all of its samples"
                    )));
                }
                let mean = affiliations
                    .column(k)
                    .zip(samples.iter())
                    .map(|(g, x)| g * x)
                    .sum::<f64>()
                    / count;
                let variance = affiliations
                    .column(k)
                    .zip(samples.iter())
                    .map(|(g, x)| g * (x - mean).powi(2))
                    .sum::<f64>()
                    / count;
                component.weight = count / n;
                component.mean = mean;
                component.deviation = variance.sqrt().max(1e-6);
            }
            Ok(())
        }
    }

    fn two_clusters() -> Vec<f64> {
        let mut samples = Vec::new();
        for j in 0..41 {
            samples.push(100.0 + (j as f64 - 20.0) * 0.05);
        }
        for j in 0..41 {
            samples.push(110.0 + (j as f64 - 20.0) * 0.05);
        }
        samples
    }

    fn initial() -> MixtureModel<f64> {
        MixtureModel::new(vec![
            GaussianComponent::new(0.5, 98.0, 2.0),
            GaussianComponent::new(0.5, 112.0, 2.0),
        ])
    }

    #[test_log::test]
    fn test_fit_two_clusters() {
        let samples = two_clusters();
        let mut fitter = MixtureFitter::new(&samples, initial()).unwrap();
        let start = fitter.log_likelihood().unwrap();

        let result = fitter
            .fit_with(&mut WeightedMoments, FitConfig::default().max_iter(500))
            .unwrap();
        assert!(result.converged, "{result:?}");
        assert!(!result.cancelled);
        assert!(result.log_likelihood > start);

        let (mixture, affiliations) = fitter.into_inner();
        assert!((mixture[0].mean - 100.0).abs() < 1e-3, "{mixture:?}");
        assert!((mixture[1].mean - 110.0).abs() < 1e-3, "{mixture:?}");
        assert!((mixture[0].weight - 0.5).abs() < 1e-3);
        assert!((mixture.weight_sum() - 1.0).abs() < 1e-9);

        assert_eq!(affiliations.shape(), (82, 2));
        assert_eq!(affiliations.argmax_row(0), Some(0));
        assert_eq!(affiliations.argmax_row(81), Some(1));
    }

    #[test]
    fn test_log_likelihood_does_not_decrease() {
        let samples = two_clusters();
        let mut fitter = MixtureFitter::new(&samples, initial()).unwrap();
        let mut last = fitter.log_likelihood().unwrap();
        for _ in 0..20 {
            fitter.step(&mut WeightedMoments).unwrap();
            let current = fitter.log_likelihood().unwrap();
            assert!(current >= last - 1e-9, "{current} < {last}");
            last = current;
        }
    }

    #[test]
    fn test_iteration_limit() {
        let samples = two_clusters();
        let mut fitter = MixtureFitter::new(&samples, initial()).unwrap();
        let result = fitter
            .fit_with(
                &mut WeightedMoments,
                FitConfig::default().max_iter(1).convergence(0.0),
            )
            .unwrap();
        assert_eq!(result.iterations, 1);
        assert!(!result.converged);

        assert!(fitter
            .fit_with(&mut WeightedMoments, FitConfig::default().max_iter(0))
            .is_err());
    }

    #[test]
    fn test_cancelled() {
        let samples = two_clusters();
        let mut fitter = MixtureFitter::new(&samples, initial()).unwrap();
        let cancel = AtomicBool::new(true);
        let result = fitter
            .fit_until(&mut WeightedMoments, FitConfig::default(), &cancel)
            .unwrap();
        assert!(result.cancelled);
        assert_eq!(result.iterations, 0);
        assert_eq!(fitter.mixture, initial());
    }

    #[test]
    fn test_closure_maximization() {
        let samples = two_clusters();
        let mut fitter = MixtureFitter::new(&samples, initial()).unwrap();
        let mut calls = 0;
        let mut shift = |_: &[f64],
                         _: &AffiliationMatrix<f64>,
                         mixture: &mut MixtureModel<f64>|
         -> Result<(), MixtureModelError> {
            calls += 1;
            mixture[0].mean += 1.0;
            Ok(())
        };
        fitter.step(&mut shift).unwrap();
        fitter.step(&mut shift).unwrap();
        assert_eq!(calls, 2);
        assert_eq!(fitter.mixture[0].mean, 100.0);

        let mut grow = |_: &[f64],
                        _: &AffiliationMatrix<f64>,
                        mixture: &mut MixtureModel<f64>|
         -> Result<(), MixtureModelError> {
            mixture.push(GaussianComponent::new(0.0, 105.0, 1.0));
            Ok(())
        };
        let err = fitter.step(&mut grow).unwrap_err();
        assert_eq!(
            err,
            MixtureModelError::DimensionMismatch {
                expected: (82, 2),
                found: (82, 3)
            }
        );
    }

    #[test]
    fn test_invalid_session() {
        let samples = two_clusters();
        assert!(MixtureFitter::new(&samples, MixtureModel::default()).is_err());
        let none: Vec<f64> = Vec::new();
        assert!(matches!(
            MixtureFitter::new(&none, initial()),
            Err(MixtureModelError::InvalidArgument { name: "samples", .. })
        ));
    }

    #[test]
    fn test_degenerate_aborts() {
        let samples = vec![100.0, 100.5, 1e6];
        let mut fitter = MixtureFitter::new(&samples, initial()).unwrap();
        let err = fitter.fit(&mut WeightedMoments).unwrap_err();
        assert_eq!(err, MixtureModelError::DegenerateDistribution { index: 2 });
    }

    #[test]
    fn test_epsilon_applies_to_one_fit() {
        let samples = vec![100.0, 105.0];
        let mixture = MixtureModel::new(vec![GaussianComponent::new(1.0, 100.0, 1.0)]);
        let mut keep = |_: &[f64],
                        _: &AffiliationMatrix<f64>,
                        _: &mut MixtureModel<f64>|
         -> Result<(), MixtureModelError> { Ok(()) };
        let mut fitter = MixtureFitter::new(&samples, mixture).unwrap();

        // N(105 | 100, 1) is about 1.5e-6
        let err = fitter
            .fit_with(&mut keep, FitConfig::default().epsilon(1e-3))
            .unwrap_err();
        assert_eq!(err, MixtureModelError::DegenerateDistribution { index: 1 });

        let result = fitter.fit_with(&mut keep, FitConfig::default()).unwrap();
        assert!(result.converged);
        assert_eq!(fitter.affiliations.row(1), &[1.0]);
    }
}
