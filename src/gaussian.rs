//! The univariate normal distribution, the building block of every mixture component.
//!
//! ```math
//! f(x) = \frac{1}{\sigma\sqrt{2\pi}}\exp\left({\frac{-(x - \mu)^2}{2\sigma^2}}\right)
//! ```
use std::f64::consts::{PI, SQRT_2};

use libm::erf;
use num_traits::{Float, FromPrimitive};

use crate::error::MixtureModelError;

/// Check that `deviation` is usable as a standard deviation, e.g. finite and strictly positive
#[inline]
pub fn check_deviation<F: Float>(deviation: F) -> Result<(), MixtureModelError> {
    if deviation.is_finite() && deviation > F::zero() {
        Ok(())
    } else {
        Err(MixtureModelError::InvalidParameter {
            name: "deviation",
            value: deviation.to_f64().unwrap_or(f64::NAN),
        })
    }
}

/// Evaluate the normal probability density at `x` without checking `deviation`.
///
/// Callers must have already validated `deviation` with [`check_deviation`], otherwise
/// the result may be `NaN` or infinite.
#[inline]
pub fn gaussian_unchecked<F: Float + FromPrimitive>(x: F, mean: F, deviation: F) -> F {
    let two = F::from_f64(2.0).unwrap();
    let sqrt_two_pi = F::from_f64((2.0 * PI).sqrt()).unwrap();
    let delta = x - mean;
    F::one() / (deviation * sqrt_two_pi) * (-(delta * delta) / (two * deviation * deviation)).exp()
}

/// Evaluate the normal probability density at `x` for a distribution centered at `mean`
/// with standard deviation `deviation`.
///
/// # Errors
/// [`MixtureModelError::InvalidParameter`] if `deviation` is not finite and positive.
pub fn gaussian<F: Float + FromPrimitive>(
    x: F,
    mean: F,
    deviation: F,
) -> Result<F, MixtureModelError> {
    check_deviation(deviation)?;
    Ok(gaussian_unchecked(x, mean, deviation))
}

/// Evaluate the cumulative distribution function of the normal distribution at `x`
pub fn gaussian_cdf<F: Float + FromPrimitive>(
    x: F,
    mean: F,
    deviation: F,
) -> Result<F, MixtureModelError> {
    check_deviation(deviation)?;
    let z = ((x - mean) / deviation).to_f64().unwrap_or(f64::NAN);
    let p = 0.5 * (1.0 + erf(z / SQRT_2));
    Ok(F::from_f64(p).unwrap())
}
