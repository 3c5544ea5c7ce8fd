//! `mzmixture` fits one-dimensional Gaussian mixture models to spectral signal, such as
//! the m/z positions of peaks in a mass spectrum, using Expectation-Maximization.
//!
//! The expectation step is provided by [`ExpectationRunner`], which fills an
//! [`AffiliationMatrix`] with the posterior probability that each sample was generated
//! by each [`GaussianComponent`] of a [`MixtureModel`]. A fitting session alternating
//! expectation with a caller-supplied [`Maximization`] step is driven by [`MixtureFitter`].
//!
//! The [`selection`] sub-module includes a fitness-preserving [`PreservationStrategy`]
//! for genetic search over candidate mixture configurations.
//!
//! # Usage
//! ```
//! use mzmixture::{AffiliationMatrix, ExpectationRunner, GaussianComponent, MixtureModel};
//!
//! let samples = vec![180.06, 180.07, 181.06, 181.07];
//! let mixture = MixtureModel::new(vec![
//!     GaussianComponent::new(0.5, 180.065, 0.01),
//!     GaussianComponent::new(0.5, 181.065, 0.01),
//! ]);
//!
//! let mut affiliations = AffiliationMatrix::new(samples.len(), mixture.len());
//! ExpectationRunner::new()
//!     .compute_responsibilities(&samples, &mixture, &mut affiliations)
//!     .unwrap();
//!
//! for row in affiliations.rows() {
//!     let total: f64 = row.iter().sum();
//!     assert!((total - 1.0).abs() < 1e-9);
//! }
//! assert_eq!(affiliations.argmax_row(0), Some(0));
//! assert_eq!(affiliations.argmax_row(3), Some(1));
//! ```
//! ## Features
//! - `parallelism` (default): compute the rows of the affiliation matrix concurrently with `rayon`
//! - `ndarray`: convert an [`AffiliationMatrix`] into an `ndarray::Array2`
//! - `serde`: serialize mixture parameters, affiliations and fit configuration
pub mod affiliation;
pub mod error;
pub mod expectation;
pub mod fit;
pub mod gaussian;
pub mod mixture;
pub mod prelude;
pub mod selection;

pub use crate::affiliation::AffiliationMatrix;
pub use crate::error::MixtureModelError;
pub use crate::expectation::{compute_responsibilities, ExpectationRunner};
pub use crate::fit::{FitConfig, Maximization, MixtureFitter, ModelFitResult};
pub use crate::gaussian::{gaussian, gaussian_cdf};
pub use crate::mixture::{samples_from_peaks, GaussianComponent, MixtureModel};
pub use crate::selection::{PreservationStrategy, Scored, ScoredIndividual};
