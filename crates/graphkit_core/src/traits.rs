use crate::error::EvalError;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that expressions can be evaluated over.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A one-dimensional recurrence `x_{n+1} = f(x_n)`.
///
/// The graph engine steps cobweb, time-series and bifurcation diagrams
/// through this trait.
pub trait IteratedMap {
    /// Computes the next iterate from `x`.
    fn apply(&mut self, x: f64) -> Result<f64, EvalError>;

    /// Binds a secondary parameter (e.g. `r` in `r*x*(1-x)`) before iterating.
    fn set_parameter(&mut self, name: &str, value: f64);
}
