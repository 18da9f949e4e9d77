use thiserror::Error;

/// Failure while evaluating a [`crate::function::Function`] or parsing its source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Unsupported expression syntax: {0}")]
    UnsupportedSyntax(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Math domain error in {function}({value})")]
    Domain { function: String, value: f64 },
    #[error("Numerical result out of range")]
    Overflow,
    #[error("Callable failed: {0}")]
    Callable(String),
}

impl EvalError {
    /// Arithmetic failures of a single sample. Iteration loops replace these
    /// with a marker and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EvalError::DivisionByZero | EvalError::Domain { .. } | EvalError::Overflow
        )
    }

    pub(crate) fn domain(function: &str, value: f64) -> Self {
        EvalError::Domain {
            function: function.to_string(),
            value,
        }
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvalError),
    #[error("Construction error: {0}")]
    Construction(String),
    #[error("Unknown color scheme: {0}")]
    UnknownScheme(String),
    #[error("No color scheme registered")]
    NoScheme,
    #[error("Background worker panicked: {0}")]
    WorkerPanicked(String),
}

impl GraphError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        GraphError::Configuration(message.into())
    }
}

pub type Result<T, E = GraphError> = std::result::Result<T, E>;
