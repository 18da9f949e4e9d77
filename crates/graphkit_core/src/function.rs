use crate::error::EvalError;
use crate::expression::{normalize, parse, Expr};
use crate::traits::IteratedMap;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Variable name → value mapping used for a single evaluation.
pub type Bindings = HashMap<String, f64>;

/// User-supplied Rust closure standing in for an expression.
pub type Callable = Arc<dyn Fn(&Bindings) -> Result<f64, EvalError> + Send + Sync>;

#[derive(Clone)]
enum Body {
    Expression { source: String, expr: Expr },
    Callable(Callable),
}

/// A function of named variables, built from an expression string or a
/// closure, together with the bindings it was last evaluated with.
#[derive(Clone)]
pub struct Function {
    body: Body,
    variables: Bindings,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Function");
        match &self.body {
            Body::Expression { source, .. } => debug.field("source", source),
            Body::Callable(_) => debug.field("source", &"<callable>"),
        };
        debug.field("variables", &self.variables).finish()
    }
}

impl Function {
    /// Parses `expression`. Fails with [`EvalError::UnsupportedSyntax`] on
    /// anything outside the expression grammar.
    pub fn parse(expression: &str) -> Result<Self, EvalError> {
        let source = normalize(expression)?;
        let expr = parse(expression)?;
        Ok(Self {
            body: Body::Expression { source, expr },
            variables: Bindings::new(),
        })
    }

    pub fn from_callable<F>(callable: F) -> Self
    where
        F: Fn(&Bindings) -> Result<f64, EvalError> + Send + Sync + 'static,
    {
        Self {
            body: Body::Callable(Arc::new(callable)),
            variables: Bindings::new(),
        }
    }

    /// Normalized expression text, `None` for callables.
    pub fn source(&self) -> Option<&str> {
        match &self.body {
            Body::Expression { source, .. } => Some(source),
            Body::Callable(_) => None,
        }
    }

    /// Variables read by the expression. Callables report the names currently bound.
    pub fn free_variables(&self) -> BTreeSet<String> {
        match &self.body {
            Body::Expression { expr, .. } => expr.free_variables(),
            Body::Callable(_) => self.variables.keys().cloned().collect(),
        }
    }

    pub fn variables(&self) -> &Bindings {
        &self.variables
    }

    pub fn create_variable(&mut self, names: &[&str]) {
        for name in names {
            self.set_variable(name, 0.0);
        }
    }

    pub fn set_variable(&mut self, name: &str, value: f64) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn delete_variable(&mut self, names: &[&str]) -> Result<(), EvalError> {
        for name in names {
            self.variables
                .remove(*name)
                .ok_or_else(|| EvalError::UnknownVariable(name.to_string()))?;
        }
        Ok(())
    }

    /// Evaluates with `bindings`, which replace the stored bindings when
    /// non-empty. An empty map reuses the bindings of the previous call.
    pub fn evaluate(&mut self, bindings: &Bindings) -> Result<f64, EvalError> {
        if !bindings.is_empty() {
            self.variables = bindings.clone();
        }
        self.evaluate_current()
    }

    /// Binds every free variable not already in `bindings` to `default`, then
    /// evaluates.
    pub fn evaluate_with_default(
        &mut self,
        bindings: &Bindings,
        default: f64,
    ) -> Result<f64, EvalError> {
        let mut all = bindings.clone();
        for name in self.free_variables() {
            all.entry(name).or_insert(default);
        }
        self.evaluate(&all)
    }

    /// Evaluates against the stored bindings without replacing them.
    pub fn evaluate_current(&self) -> Result<f64, EvalError> {
        match &self.body {
            Body::Expression { expr, .. } => {
                expr.eval(&|name: &str| self.variables.get(name).copied())
            }
            Body::Callable(callable) => callable(&self.variables),
        }
    }

    /// Fails with [`EvalError::UndefinedVariable`] if the expression reads a
    /// variable that has no binding.
    pub fn check_bound(&self) -> Result<(), EvalError> {
        if let Body::Expression { expr, .. } = &self.body {
            if let Some(missing) = expr
                .free_variables()
                .into_iter()
                .find(|name| !self.variables.contains_key(name))
            {
                return Err(EvalError::UndefinedVariable(missing));
            }
        }
        Ok(())
    }

    /// Treats the function as the map `variable ↦ f(variable)`.
    pub fn as_map(&mut self, variable: &str) -> FunctionMap<'_> {
        FunctionMap {
            function: self,
            variable: variable.to_string(),
        }
    }
}

impl TryFrom<&str> for Function {
    type Error = EvalError;

    fn try_from(expression: &str) -> Result<Self, Self::Error> {
        Function::parse(expression)
    }
}

/// A [`Function`] iterated through one of its variables.
pub struct FunctionMap<'a> {
    function: &'a mut Function,
    variable: String,
}

impl IteratedMap for FunctionMap<'_> {
    fn apply(&mut self, x: f64) -> Result<f64, EvalError> {
        self.function.set_variable(&self.variable, x);
        self.function.evaluate_current()
    }

    fn set_parameter(&mut self, name: &str, value: f64) {
        self.function.set_variable(name, value);
    }
}
