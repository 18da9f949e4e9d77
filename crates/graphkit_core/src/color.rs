use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A host color specifier: a named color (`"red"`) or `#rrggbb`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(String);

impl Color {
    pub fn new(spec: &str) -> Result<Self> {
        let valid = match spec.strip_prefix('#') {
            Some(hex) => {
                matches!(hex.len(), 3 | 6 | 12) && hex.chars().all(|c| c.is_ascii_hexdigit())
            }
            None => !spec.is_empty() && spec.chars().all(|c| c.is_ascii_alphanumeric() || c == ' '),
        };
        if !valid {
            return Err(GraphError::config(format!("Illegal color value: {spec:?}")));
        }
        Ok(Self(spec.to_string()))
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(format!("#{r:02x}{g:02x}{b:02x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn black() -> Self {
        Self("black".to_string())
    }

    pub fn red() -> Self {
        Self("red".to_string())
    }

    pub fn blue() -> Self {
        Self("blue".to_string())
    }

    pub fn white() -> Self {
        Self("white".to_string())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Color {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self> {
        Color::new(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.0
    }
}

/// Maps plot state (iteration count, coordinates, ...) to a color.
pub type SchemeFn = Arc<dyn Fn(&[f64]) -> Color + Send + Sync>;

/// Registry of named coloring schemes with one active scheme.
///
/// Arity of the state passed to [`ColorScheme::get_color`] is a contract
/// between the caller and the scheme function and is not checked.
#[derive(Default)]
pub struct ColorScheme {
    schemes: HashMap<String, SchemeFn>,
    current: Option<String>,
    current_number: u32,
}

impl ColorScheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `scheme` under `name`, or under the next free number when
    /// `name` is `None`. The first scheme registered becomes active. Returns
    /// the name used.
    pub fn add_scheme<F>(&mut self, scheme: F, name: Option<&str>) -> String
    where
        F: Fn(&[f64]) -> Color + Send + Sync + 'static,
    {
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                self.current_number += 1;
                self.current_number.to_string()
            }
        };
        self.schemes.insert(name.clone(), Arc::new(scheme));
        if self.current.is_none() {
            self.current = Some(name.clone());
        }
        name
    }

    /// Registers unnamed schemes first, then named ones.
    pub fn add_schemes<I, J>(&mut self, unnamed: I, named: J)
    where
        I: IntoIterator<Item = SchemeFn>,
        J: IntoIterator<Item = (String, SchemeFn)>,
    {
        for scheme in unnamed {
            self.add_scheme(move |state: &[f64]| scheme(state), None);
        }
        for (name, scheme) in named {
            self.add_scheme(move |state: &[f64]| scheme(state), Some(&name));
        }
    }

    pub fn set_scheme(&mut self, name: &str) -> Result<()> {
        if !self.schemes.contains_key(name) {
            return Err(GraphError::UnknownScheme(name.to_string()));
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn get_color(&self, state: &[f64]) -> Result<Color> {
        let scheme = self
            .current
            .as_ref()
            .and_then(|name| self.schemes.get(name))
            .ok_or(GraphError::NoScheme)?;
        Ok(scheme(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_color_specifiers() {
        assert!(Color::new("red").is_ok());
        assert!(Color::new("#00ff7f").is_ok());
        assert!(Color::new("dark green").is_ok());
        assert!(Color::new("#12345").is_err());
        assert!(Color::new("").is_err());
        assert!(Color::new("red;drop").is_err());
        assert_eq!(Color::rgb(255, 0, 16).as_str(), "#ff0010");
    }

    #[test]
    fn unnamed_schemes_are_numbered_and_first_is_active() {
        let mut schemes = ColorScheme::new();
        let first = schemes.add_scheme(|_| Color::red(), None);
        let second = schemes.add_scheme(|_| Color::blue(), None);
        assert_eq!(first, "1");
        assert_eq!(second, "2");
        assert_eq!(schemes.current(), Some("1"));
        assert_eq!(schemes.get_color(&[]).unwrap(), Color::red());
    }

    #[test]
    fn set_scheme_switches_active_scheme() {
        let mut schemes = ColorScheme::new();
        schemes.add_scheme(|_| Color::red(), None);
        schemes.add_scheme(
            |state| {
                let level = (state[0].clamp(0.0, 1.0) * 255.0) as u8;
                Color::rgb(level, level, level)
            },
            Some("gray"),
        );
        schemes.set_scheme("gray").expect("known scheme");
        assert_eq!(schemes.get_color(&[1.0]).unwrap().as_str(), "#ffffff");
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let mut schemes = ColorScheme::new();
        assert!(matches!(schemes.get_color(&[]), Err(GraphError::NoScheme)));
        schemes.add_scheme(|_| Color::red(), None);
        let err = schemes.set_scheme("missing").unwrap_err();
        assert!(matches!(err, GraphError::UnknownScheme(name) if name == "missing"));
        assert_eq!(schemes.current(), Some("1"));
    }

    #[test]
    fn add_schemes_registers_both_kinds() {
        let mut schemes = ColorScheme::new();
        let red: SchemeFn = Arc::new(|_: &[f64]| Color::red());
        let blue: SchemeFn = Arc::new(|_: &[f64]| Color::blue());
        schemes.add_schemes(vec![red], vec![("cool".to_string(), blue)]);
        schemes.set_scheme("cool").unwrap();
        assert_eq!(schemes.get_color(&[]).unwrap(), Color::blue());
        schemes.set_scheme("1").unwrap();
        assert_eq!(schemes.get_color(&[]).unwrap(), Color::red());
    }
}
