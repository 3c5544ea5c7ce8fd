//! Gaussian mixture model parameters.
//!
//! A [`MixtureModel`] is an ordered collection of [`GaussianComponent`]s. Component order is
//! significant: column `k` of an [`AffiliationMatrix`](crate::AffiliationMatrix) refers to
//! component `k` of the mixture it was computed from.
use std::fmt;
use std::ops::{Deref, DerefMut};

use mzpeaks::{CentroidLike, CoordinateLike, IntensityMeasurement};
use num_traits::{Float, FromPrimitive};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::MixtureModelError;
use crate::gaussian::{check_deviation, gaussian_cdf, gaussian_unchecked};

/// The ratio between the full width at half max of a normal peak and its standard deviation
pub const FWHM_TO_DEVIATION: f64 = 2.35482;

/// A single weighted normal distribution in a mixture
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GaussianComponent<F: Float> {
    /// The mixing proportion, expected to lie in $`[0, 1]`$
    pub weight: F,
    pub mean: F,
    /// The standard deviation, must be strictly positive
    pub deviation: F,
}

impl<F: Float + FromPrimitive> GaussianComponent<F> {
    pub fn new(weight: F, mean: F, deviation: F) -> Self {
        Self {
            weight,
            mean,
            deviation,
        }
    }

    /// Check that the parameters of this component can be evaluated
    pub fn validate(&self) -> Result<(), MixtureModelError> {
        check_deviation(self.deviation)?;
        if !self.weight.is_finite() || self.weight < F::zero() {
            return Err(MixtureModelError::InvalidParameter {
                name: "weight",
                value: self.weight.to_f64().unwrap_or(f64::NAN),
            });
        }
        Ok(())
    }

    /// The weighted density of this component at `x`, $`w_k N(x|\mu_k, \sigma_k)`$.
    ///
    /// The deviation is assumed to have been validated.
    #[inline]
    pub fn density(&self, x: F) -> F {
        self.weight * gaussian_unchecked(x, self.mean, self.deviation)
    }

    /// The weighted cumulative density of this component at `x`
    pub fn cdf(&self, x: F) -> Result<F, MixtureModelError> {
        Ok(self.weight * gaussian_cdf(x, self.mean, self.deviation)?)
    }
}

impl<F: Float + fmt::Display> fmt::Display for GaussianComponent<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GaussianComponent({}, {}, {})",
            self.weight, self.mean, self.deviation
        )
    }
}

/// An ordered collection of [`GaussianComponent`]s
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MixtureModel<F: Float> {
    pub components: Vec<GaussianComponent<F>>,
}

impl<F: Float> Deref for MixtureModel<F> {
    type Target = [GaussianComponent<F>];

    fn deref(&self) -> &Self::Target {
        &self.components
    }
}

impl<F: Float> DerefMut for MixtureModel<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.components
    }
}

impl<F: Float> From<Vec<GaussianComponent<F>>> for MixtureModel<F> {
    fn from(components: Vec<GaussianComponent<F>>) -> Self {
        Self { components }
    }
}

impl<F: Float> FromIterator<GaussianComponent<F>> for MixtureModel<F> {
    fn from_iter<T: IntoIterator<Item = GaussianComponent<F>>>(iter: T) -> Self {
        Self {
            components: iter.into_iter().collect(),
        }
    }
}

impl<F: Float + FromPrimitive> MixtureModel<F> {
    pub fn new(components: Vec<GaussianComponent<F>>) -> Self {
        Self { components }
    }

    /// Add a component to the end of the mixture
    pub fn push(&mut self, component: GaussianComponent<F>) {
        self.components.push(component)
    }

    /// Check that the mixture is non-empty and that every component can be evaluated
    pub fn validate(&self) -> Result<(), MixtureModelError> {
        if self.components.is_empty() {
            return Err(MixtureModelError::invalid_argument(
                "mixture",
                "a mixture must contain at least one component",
            ));
        }
        self.components.iter().try_for_each(|c| c.validate())
    }

    /// The total of all component weights, nominally 1
    pub fn weight_sum(&self) -> F {
        self.components
            .iter()
            .fold(F::zero(), |acc, c| acc + c.weight)
    }

    /// Rescale the component weights so they sum to 1
    pub fn normalize_weights(&mut self) -> Result<(), MixtureModelError> {
        let total = self.weight_sum();
        if !(total > F::zero()) || !total.is_finite() {
            return Err(MixtureModelError::invalid_argument(
                "mixture",
                format!(
                    "cannot normalize weights summing to {}",
                    total.to_f64().unwrap_or(f64::NAN)
                ),
            ));
        }
        for c in self.components.iter_mut() {
            c.weight = c.weight / total;
        }
        Ok(())
    }

    /// The mixture density at `x`, $`\sum_k w_k N(x|\mu_k, \sigma_k)`$, summed left to right.
    ///
    /// The component deviations are assumed to have been validated.
    #[inline]
    pub fn density(&self, x: F) -> F {
        self.components
            .iter()
            .fold(F::zero(), |acc, c| acc + c.density(x))
    }

    /// The mixture cumulative density at `x`
    pub fn cdf(&self, x: F) -> Result<F, MixtureModelError> {
        self.components
            .iter()
            .try_fold(F::zero(), |acc, c| Ok(acc + c.cdf(x)?))
    }
}

impl MixtureModel<f64> {
    /// Build an initial mixture from centroided peaks, placing one component at each
    /// peak's m/z with a deviation derived from `full_width_at_half_max` and a weight
    /// proportional to the peak's share of the total intensity.
    ///
    /// # Errors
    /// [`MixtureModelError::InvalidArgument`] if there are no peaks or no intensity to
    /// distribute, [`MixtureModelError::InvalidParameter`] if the width is not positive.
    pub fn from_centroids<C: CentroidLike>(
        peaks: &[C],
        full_width_at_half_max: f64,
    ) -> Result<Self, MixtureModelError> {
        let deviation = full_width_at_half_max / FWHM_TO_DEVIATION;
        check_deviation(deviation)?;
        let total: f64 = peaks.iter().map(|p| p.intensity() as f64).sum();
        if peaks.is_empty() || !(total > 0.0) {
            return Err(MixtureModelError::invalid_argument(
                "peaks",
                "at least one peak with positive intensity is required",
            ));
        }
        Ok(peaks
            .iter()
            .map(|p| GaussianComponent::new(p.intensity() as f64 / total, p.coordinate(), deviation))
            .collect())
    }
}

/// Extract the m/z coordinates of a peak list as a sample sequence
pub fn samples_from_peaks<C: CoordinateLike<mzpeaks::MZ>>(peaks: &[C]) -> Vec<f64> {
    peaks.iter().map(|p| p.coordinate()).collect()
}
