//! Derived store keys
//!
//! Every key is `prefix + title`, optionally followed by a disambiguator
//! rendered from the request's sub-key. Structurally equal sub-keys always
//! render identically, so repeated calls address the same entry.

use serde_json::{Map, Number, Value};

/// Extra data distinguishing entries that share a title
#[derive(Debug, Clone, PartialEq)]
pub enum SubKey {
    Text(String),
    Number(Number),
    Map(Map<String, Value>),
}

impl SubKey {
    /// Textual form appended to the base key.
    ///
    /// Maps render as JSON with sorted keys.
    pub fn disambiguator(&self) -> String {
        match self {
            SubKey::Text(text) => text.clone(),
            SubKey::Number(number) => render_number(number),
            SubKey::Map(map) => Value::Object(map.clone()).to_string(),
        }
    }
}

/// Render a number the way it is written in a key: integral values never
/// carry a fractional part, so `123` and `123.0` address the same entry.
///
/// Integral floats follow JavaScript's `String(n)`: plain digits below
/// `1e21`, exponent form with an explicit sign above.
pub fn render_number(number: &Number) -> String {
    if number.is_f64()
        && let Some(float) = number.as_f64()
        && float.fract() == 0.0
    {
        if float == 0.0 {
            return "0".to_owned();
        }
        if float.abs() < 1e21 {
            // Display never uses an exponent and pads the shortest digits with zeros
            return format!("{float}");
        }
        let rendered = format!("{float:e}");
        return match rendered.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => rendered,
        };
    }
    number.to_string()
}

/// Builds derived keys under a fixed prefix
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the final store key for `title` and an optional sub-key.
    pub fn build(&self, title: &str, sub_key: Option<&SubKey>) -> String {
        let mut key = format!("{}{}", self.prefix, title);
        if let Some(sub_key) = sub_key {
            key.push_str(&sub_key.disambiguator());
        }
        key
    }
}
