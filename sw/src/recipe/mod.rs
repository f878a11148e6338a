//! Sweep recipes: parameter specifications and the values they produce

mod spec;
mod value;

pub use spec::{Exclusion, GenerationMode, NumericRange, ParamKind, ParameterSpec, Scalar, SweepRecipe};
pub use value::{Assignment, Combination, ParamValue};
