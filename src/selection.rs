//! Fitness-preserving selection for genetic search over candidate solutions.
//!
//! A [`PreservationStrategy`] keeps the best-scoring fraction of a generation, carrying
//! it forward into the next one.
use std::cmp::Ordering;

use crate::error::MixtureModelError;

/// Something with a fitness score, higher is better
pub trait Scored {
    fn fitness(&self) -> f64;
}

/// Pair an arbitrary individual with its fitness score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredIndividual<T> {
    pub individual: T,
    pub fitness: f64,
}

impl<T> ScoredIndividual<T> {
    pub fn new(individual: T, fitness: f64) -> Self {
        Self {
            individual,
            fitness,
        }
    }
}

impl<T> Scored for ScoredIndividual<T> {
    fn fitness(&self) -> f64 {
        self.fitness
    }
}

/// Keep the best `preservation_rate` fraction of each generation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreservationStrategy {
    preservation_rate: f64,
}

impl PreservationStrategy {
    /// Create a new strategy.
    ///
    /// # Errors
    /// [`MixtureModelError::InvalidArgument`] when `preservation_rate` is not in $`(0, 1]`$
    pub fn new(preservation_rate: f64) -> Result<Self, MixtureModelError> {
        if preservation_rate > 0.0 && preservation_rate <= 1.0 {
            Ok(Self { preservation_rate })
        } else {
            Err(MixtureModelError::invalid_argument(
                "preservation_rate",
                format!("{preservation_rate} is not in (0, 1]"),
            ))
        }
    }

    pub fn preservation_rate(&self) -> f64 {
        self.preservation_rate
    }

    /// The number of individuals kept from a generation of `generation_size`
    pub fn preserved_count(&self, generation_size: usize) -> usize {
        let count = (self.preservation_rate * generation_size as f64).ceil() as usize;
        count.min(generation_size)
    }

    /// Pick the fittest individuals of `generation` in descending order of fitness.
    ///
    /// Individuals with equal fitness keep their original relative order. `NaN` scores
    /// rank below every other score.
    pub fn pick_best<T: Scored + Clone>(&self, generation: &[T]) -> Vec<T> {
        let count = self.preserved_count(generation.len());
        let mut order: Vec<usize> = (0..generation.len()).collect();
        order.sort_by(|a, b| {
            compare_fitness(generation[*b].fitness(), generation[*a].fitness())
        });
        log::trace!(
            "Preserving {count} of {} individuals",
            generation.len()
        );
        order
            .into_iter()
            .take(count)
            .map(|i| generation[i].clone())
            .collect()
    }
}

fn compare_fitness(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}
