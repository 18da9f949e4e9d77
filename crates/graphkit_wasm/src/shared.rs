//! Conversions shared by the plot wrapper and the runner.

use anyhow::{bail, Context};
use graphkit_core::Function;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// Parses `expression` and binds `names[i] = values[i]`.
pub(crate) fn build_function(
    expression: &str,
    names: &[String],
    values: &[f64],
) -> anyhow::Result<Function> {
    if names.len() != values.len() {
        bail!(
            "Variable name/value mismatch: {} names, {} values.",
            names.len(),
            values.len()
        );
    }
    let mut function =
        Function::parse(expression).with_context(|| format!("Invalid expression {expression:?}"))?;
    for (name, value) in names.iter().zip(values) {
        function.set_variable(name, *value);
    }
    Ok(function)
}

/// Reads options from JS. `undefined` and `null` give the defaults.
pub(crate) fn options_from<T>(value: JsValue, what: &str) -> Result<T, JsValue>
where
    T: DeserializeOwned + Default,
{
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid {} options: {}", what, e)))
}

pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

pub(crate) fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Renders the whole error chain, outermost first.
pub(crate) fn js_chain(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{:#}", err))
}
