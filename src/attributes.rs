use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Attribute record describing a visitor, keyed by feature name.
///
/// # Examples
/// ```
/// # use pickpick::{Visitor, AttributeValue};
/// let visitor = [
///     ("geo".to_owned(), "US".into()),
///     ("returning".to_owned(), true.into()),
/// ].into_iter().collect::<Visitor>();
/// ```
pub type Visitor = HashMap<String, AttributeValue>;

/// Value of a single visitor attribute.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `f64`, and `bool` types.
#[derive(Debug, Serialize, Deserialize, PartialEq, PartialOrd, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
    /// A null value or absence of value.
    Null,
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        if let AttributeValue::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// JavaScript-style truthiness: `""`, `0`, `NaN`, `false` and null are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            AttributeValue::String(s) => !s.is_empty(),
            AttributeValue::Number(n) => *n != 0.0 && !n.is_nan(),
            AttributeValue::Boolean(b) => *b,
            AttributeValue::Null => false,
        }
    }

    /// Convert a scalar JSON value. Returns `None` for arrays and objects.
    pub(crate) fn from_json_scalar(value: &serde_json::Value) -> Option<AttributeValue> {
        match value {
            serde_json::Value::Null => Some(AttributeValue::Null),
            serde_json::Value::Bool(b) => Some(AttributeValue::Boolean(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(AttributeValue::Number),
            serde_json::Value::String(s) => Some(AttributeValue::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::String(s) => serde_json::Value::String(s.clone()),
            // keep integral numbers integral, so `1` does not come back as `1.0`
            AttributeValue::Number(n) if n.fract() == 0.0 && n.abs() < 9e15 => {
                serde_json::Value::from(*n as i64)
            }
            AttributeValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            AttributeValue::Boolean(b) => serde_json::Value::Bool(*b),
            AttributeValue::Null => serde_json::Value::Null,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Convert a dynamic targeting input into a [`Visitor`].
///
/// Fails if `input` is null. Inputs that are not objects carry no attributes, and non-scalar
/// attribute values are left out.
pub(crate) fn visitor_from_json(input: &serde_json::Value) -> Result<Visitor> {
    match input {
        serde_json::Value::Null => Err(Error::MissingTargetingInput),
        serde_json::Value::Object(map) => Ok(map
            .iter()
            .filter_map(|(k, v)| AttributeValue::from_json_scalar(v).map(|v| (k.clone(), v)))
            .collect()),
        _ => Ok(Visitor::new()),
    }
}

/// Build a [`Visitor`] from an arbitrary attribute source.
///
/// Only `features` are looked up. Missing and falsy values are left out of the record, so
/// targeting treats them as absent.
///
/// ```
/// # use pickpick::{collect_visitor, AttributeValue};
/// let visitor = collect_visitor(["geo", "page"], |feature| match feature {
///     "geo" => Some(AttributeValue::from("US")),
///     "page" => Some(AttributeValue::from("")),
///     _ => None,
/// });
/// assert_eq!(visitor.len(), 1);
/// ```
pub fn collect_visitor<I, S, F>(features: I, mut lookup: F) -> Visitor
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: FnMut(&str) -> Option<AttributeValue>,
{
    features
        .into_iter()
        .filter_map(|feature| {
            let feature = feature.as_ref();
            lookup(feature)
                .filter(AttributeValue::is_truthy)
                .map(|value| (feature.to_owned(), value))
        })
        .collect()
}
