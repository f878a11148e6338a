//! Combination enumeration without materializing the parameter space
//!
//! Each parameter's value list is generated once; a linear index is then
//! mapped to a combination by mixed-radix decomposition. Parameters are
//! walked from last-declared to first-declared, so the last parameter varies
//! fastest and the first varies slowest. That keeps the most disruptive
//! parameter (declared first) constant for as long as possible.
//!
//! ```text
//! parameters: [A (2 values), B (3 values)]     total = 6
//!
//! index:  0    1    2    3    4    5
//! A:      a0   a0   a0   a1   a1   a1
//! B:      b0   b1   b2   b0   b1   b2
//! ```

mod generate;
pub mod time;

use tracing::{debug, info};

use crate::recipe::{Assignment, Combination, ParamValue, SweepRecipe};

pub use generate::{MAX_VALUES_PER_PARAMETER, values_of};

/// One non-empty axis of the sweep space
#[derive(Debug, Clone)]
pub struct Dimension {
    pub name: String,
    pub values: Vec<ParamValue>,
}

impl Dimension {
    pub fn cardinality(&self) -> u64 {
        self.values.len() as u64
    }
}

/// The sweep space of a recipe: per-parameter value lists plus their product
#[derive(Debug, Clone)]
pub struct SweepSpace {
    /// Non-empty dimensions in declaration order
    dimensions: Vec<Dimension>,

    /// Parameters that produced no values
    skipped: Vec<String>,

    total: u64,
}

impl SweepSpace {
    /// Generate every parameter's values (but never the product)
    pub fn new(recipe: &SweepRecipe) -> Self {
        debug!(name = %recipe.name, parameters = recipe.parameters.len(), "SweepSpace::new: called");
        let mut dimensions = Vec::with_capacity(recipe.parameters.len());
        let mut skipped = Vec::new();

        for spec in &recipe.parameters {
            let values = values_of(spec);
            if values.is_empty() {
                info!(parameter = %spec.name, "Parameter yields no values, excluded from sweep");
                skipped.push(spec.name.clone());
            } else {
                dimensions.push(Dimension {
                    name: spec.name.clone(),
                    values,
                });
            }
        }

        let total = if dimensions.is_empty() {
            0
        } else {
            dimensions.iter().fold(1u64, |acc, d| acc.saturating_mul(d.cardinality()))
        };

        debug!(total, dimensions = dimensions.len(), skipped = skipped.len(), "SweepSpace::new: complete");
        Self {
            dimensions,
            skipped,
            total,
        }
    }

    /// Number of combinations in the space
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Map a linear index in `[0, total)` to its combination
    ///
    /// Indices at or beyond `total` wrap around; bounding the index is the
    /// caller's job.
    pub fn combination(&self, index: u64) -> Combination {
        let mut remaining = index;
        let mut picked = Vec::with_capacity(self.dimensions.len());

        for dim in self.dimensions.iter().rev() {
            let radix = dim.cardinality();
            let value_index = (remaining % radix) as usize;
            picked.push(Assignment {
                name: dim.name.clone(),
                value: dim.values[value_index].clone(),
            });
            remaining /= radix;
        }

        picked.reverse();
        Combination::new(picked)
    }
}

/// Resolve the combination at `index` for a recipe
pub fn enumerate(recipe: &SweepRecipe, index: u64) -> Combination {
    SweepSpace::new(recipe).combination(index)
}

/// Product of all non-empty value-list lengths
pub fn total_combinations(recipe: &SweepRecipe) -> u64 {
    SweepSpace::new(recipe).total()
}
