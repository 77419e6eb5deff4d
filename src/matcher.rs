use derive_more::From;
use serde::{Serialize, Serializer};

use crate::{
    error::{json_kind, Error, Result},
    AttributeValue,
};

/// Keys of the object forms. `$not` and `$eq` are used where the string shorthand would be
/// read back as a different matcher.
const AND_KEY: &str = "$and";
const NOT_KEY: &str = "$not";
const EQ_KEY: &str = "$eq";

/// Predicate over the value of a single visitor attribute.
///
/// Matchers are immutable. Evaluated against an absent value (missing or null attribute), every
/// matcher fails except [`Matcher::Any`], and [`Matcher::In`] holding null for a null attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Matches every value, including an absent one.
    Any,
    /// Matches a value strictly equal to the held one.
    Exact(AttributeValue),
    /// Matches a present value that differs from the held one.
    Not(AttributeValue),
    /// Matches a value contained in the list. A null entry matches an attribute explicitly set to
    /// null, never a missing one.
    In(Vec<AttributeValue>),
    /// Matches when all sub-matchers match. Never empty.
    And(Vec<Matcher>),
}

/// Either a ready-made [`Matcher`] or a raw literal to be normalized with [`Matcher::value_of`].
#[derive(Debug, Clone, From)]
pub enum MatcherInput {
    Matcher(Matcher),
    Raw(serde_json::Value),
}

impl From<&str> for MatcherInput {
    fn from(value: &str) -> Self {
        Self::Raw(value.into())
    }
}

impl MatcherInput {
    pub(crate) fn into_matcher(self) -> Result<Matcher> {
        match self {
            MatcherInput::Matcher(m) => Ok(m),
            MatcherInput::Raw(raw) => Matcher::value_of(&raw),
        }
    }
}

impl Matcher {
    pub fn any() -> Matcher {
        Matcher::Any
    }

    pub fn exact(value: impl Into<AttributeValue>) -> Matcher {
        Matcher::Exact(value.into())
    }

    pub fn not(value: impl Into<AttributeValue>) -> Matcher {
        Matcher::Not(value.into())
    }

    pub fn is_in<T: Into<AttributeValue>>(values: impl IntoIterator<Item = T>) -> Matcher {
        Matcher::In(values.into_iter().map(Into::into).collect())
    }

    /// Conjunction of matchers. Raw entries are normalized with [`Matcher::value_of`].
    ///
    /// Beware that `and(["US", "MX"])` can never match: a value cannot equal both.
    ///
    /// ```
    /// # use pickpick::Matcher;
    /// let outside_north_america = Matcher::and(["!US", "!MX", "!CA"]).unwrap();
    /// assert!(outside_north_america.matches(Some(&"IL".into())));
    /// ```
    pub fn and<T: Into<MatcherInput>>(items: impl IntoIterator<Item = T>) -> Result<Matcher> {
        let matchers = items
            .into_iter()
            .map(|item| item.into().into_matcher())
            .collect::<Result<Vec<_>>>()?;
        if matchers.is_empty() {
            return Err(Error::EmptyConjunction);
        }
        Ok(Matcher::And(matchers))
    }

    /// Normalize a raw literal into a matcher.
    ///
    /// - `"*"` becomes [`Matcher::Any`];
    /// - an array becomes [`Matcher::In`];
    /// - a string starting with `!` becomes [`Matcher::Not`] of the rest;
    /// - any other string, number or boolean becomes [`Matcher::Exact`];
    /// - `{"$and": [...]}` becomes [`Matcher::And`];
    /// - `{"$not": v}` and `{"$eq": v}` become [`Matcher::Not`] and [`Matcher::Exact`] of the
    ///   scalar `v`, taken literally.
    ///
    /// Everything else is rejected.
    pub fn value_of(raw: &serde_json::Value) -> Result<Matcher> {
        match raw {
            serde_json::Value::String(s) if s == "*" => Ok(Matcher::Any),
            serde_json::Value::String(s) => Ok(match s.strip_prefix('!') {
                Some(rest) => Matcher::Not(rest.into()),
                None => Matcher::Exact(s.as_str().into()),
            }),
            serde_json::Value::Bool(_) | serde_json::Value::Number(_) => {
                Ok(Matcher::Exact(scalar(raw)?))
            }
            serde_json::Value::Array(items) => Ok(Matcher::In(
                items.iter().map(scalar).collect::<Result<_>>()?,
            )),
            serde_json::Value::Object(map) if map.len() == 1 => {
                match map.iter().next() {
                    Some((key, serde_json::Value::Array(items))) if key == AND_KEY => {
                        Matcher::and(items.iter().cloned())
                    }
                    Some((key, value)) if key == NOT_KEY => Ok(Matcher::Not(scalar(value)?)),
                    Some((key, value)) if key == EQ_KEY => Ok(Matcher::Exact(scalar(value)?)),
                    _ => Err(unsupported(raw)),
                }
            }
            _ => Err(unsupported(raw)),
        }
    }

    /// Kind name, as exposed for introspection.
    pub fn name(&self) -> &'static str {
        match self {
            Matcher::Any => "any",
            Matcher::Exact(_) => "isExactly",
            Matcher::Not(_) => "isNot",
            Matcher::In(_) => "isIn",
            Matcher::And(_) => "and",
        }
    }

    /// Test `candidate`. `None` stands for a missing attribute.
    pub fn matches(&self, candidate: Option<&AttributeValue>) -> bool {
        match (self, candidate) {
            (Matcher::Any, _) => true,
            (Matcher::And(matchers), candidate) => matchers.iter().all(|m| m.matches(candidate)),
            (Matcher::In(expected), Some(value)) => expected.contains(value),
            (_, None) | (_, Some(AttributeValue::Null)) => false,
            (Matcher::Exact(expected), Some(value)) => value == expected,
            (Matcher::Not(expected), Some(value)) => value != expected,
        }
    }

    /// The literal this matcher represents. Feeding it back to [`Matcher::value_of`] yields an
    /// equal matcher.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Matcher::Any => "*".into(),
            Matcher::Exact(AttributeValue::String(s)) if s == "*" || s.starts_with('!') => {
                object_form(EQ_KEY, s.as_str().into())
            }
            Matcher::Exact(AttributeValue::Null) => object_form(EQ_KEY, serde_json::Value::Null),
            Matcher::Exact(value) => value.to_json(),
            Matcher::Not(AttributeValue::String(s)) => format!("!{s}").into(),
            Matcher::Not(value) => object_form(NOT_KEY, value.to_json()),
            Matcher::In(values) => values.iter().map(AttributeValue::to_json).collect(),
            Matcher::And(matchers) => {
                object_form(AND_KEY, matchers.iter().map(Matcher::to_json).collect())
            }
        }
    }
}

fn object_form(key: &str, value: serde_json::Value) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    object.insert(key.to_owned(), value);
    serde_json::Value::Object(object)
}

fn scalar(raw: &serde_json::Value) -> Result<AttributeValue> {
    AttributeValue::from_json_scalar(raw).ok_or_else(|| unsupported(raw))
}

fn unsupported(raw: &serde_json::Value) -> Error {
    Error::UnsupportedMatcherType {
        kind: json_kind(raw),
        value: raw.to_string(),
    }
}

impl Serialize for Matcher {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl std::fmt::Display for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.to_json())
    }
}
