use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    attributes::visitor_from_json,
    error::json_kind,
    expression::{compile, CompiledExpression},
    Error, Matcher, MatcherInput, Result, Visitor,
};

/// A predicate over visitor attributes.
///
/// Targeting has two front-ends sharing the same contract:
/// - a *features map*: an ordered conjunction of one [`Matcher`] per feature;
/// - an *expression*: a free-form boolean formula, see [`compile`].
///
/// The default targeting is the empty features map and matches every visitor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Targeting {
    kind: TargetingKind,
}

#[derive(Debug, Clone, PartialEq)]
enum TargetingKind {
    Features(Vec<(String, Matcher)>),
    Expression(CompiledExpression),
}

impl Default for TargetingKind {
    fn default() -> Self {
        TargetingKind::Features(Vec::new())
    }
}

impl Targeting {
    /// Build a features-map targeting. Raw values are normalized with [`Matcher::value_of`].
    ///
    /// A feature listed twice keeps its position and takes the last matcher.
    ///
    /// ```
    /// # use pickpick::{Targeting, Matcher, MatcherInput};
    /// # use serde_json::json;
    /// let targeting = Targeting::create([
    ///     ("geo", MatcherInput::from(Matcher::exact("US"))),
    ///     ("page", MatcherInput::from(json!(["buy", "index"]))),
    /// ]).unwrap();
    /// assert!(targeting.has_feature("page"));
    /// ```
    pub fn create<K, M>(expression: impl IntoIterator<Item = (K, M)>) -> Result<Targeting>
    where
        K: Into<String>,
        M: Into<MatcherInput>,
    {
        let mut features: Vec<(String, Matcher)> = Vec::new();
        for (feature, matcher) in expression {
            let feature = feature.into();
            let matcher = matcher.into().into_matcher()?;
            match features.iter_mut().find(|(f, _)| *f == feature) {
                Some(entry) => entry.1 = matcher,
                None => features.push((feature, matcher)),
            }
        }
        Ok(Targeting {
            kind: TargetingKind::Features(features),
        })
    }

    /// Build a targeting from a free-form expression.
    pub fn expression(expression: &str) -> Result<Targeting> {
        Ok(Targeting {
            kind: TargetingKind::Expression(compile(expression)?),
        })
    }

    /// Build a targeting from its literal form: an object is a features map, a string is an
    /// expression and `null` is the default targeting.
    pub fn from_json(raw: &serde_json::Value) -> Result<Targeting> {
        match raw {
            serde_json::Value::Null => Ok(Targeting::default()),
            serde_json::Value::Object(map) => {
                Targeting::create(map.iter().map(|(k, v)| (k.as_str(), v.clone())))
            }
            serde_json::Value::String(expression) => Targeting::expression(expression),
            other => Err(Error::InvalidTargeting(json_kind(other))),
        }
    }

    /// Test `visitor`. Attributes not referenced by the targeting are ignored.
    pub fn matches(&self, visitor: &Visitor) -> bool {
        match &self.kind {
            TargetingKind::Features(features) => features
                .iter()
                .all(|(feature, matcher)| matcher.matches(visitor.get(feature))),
            TargetingKind::Expression(expression) => expression.is_match(visitor),
        }
    }

    /// Test an arbitrary JSON input.
    ///
    /// Fails if `input` is null. Inputs that are not objects carry no attributes, and non-scalar
    /// attribute values never match.
    pub fn matches_json(&self, input: &serde_json::Value) -> Result<bool> {
        let visitor = visitor_from_json(input)?;
        Ok(self.matches(&visitor))
    }

    /// Names of the features this targeting depends on.
    pub fn features(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match &self.kind {
            TargetingKind::Features(features) => {
                Box::new(features.iter().map(|(feature, _)| feature.as_str()))
            }
            TargetingKind::Expression(expression) => Box::new(expression.features()),
        }
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features().any(|f| f == feature)
    }

    /// Check whether `feature` is targeted with a matcher structurally equal to `matcher`.
    ///
    /// Expression targeting carries no matchers and always answers `false`.
    pub fn has(&self, feature: &str, matcher: impl Into<MatcherInput>) -> Result<bool> {
        let matcher = matcher.into().into_matcher()?;
        Ok(self.iter().any(|(f, m)| f == feature && *m == matcher))
    }

    /// Iterate over `(feature, matcher)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Matcher)> {
        let features = match &self.kind {
            TargetingKind::Features(features) => features.as_slice(),
            TargetingKind::Expression(_) => &[],
        };
        features.iter().map(|(f, m)| (f.as_str(), m))
    }

    /// Source of an expression targeting.
    pub fn expression_source(&self) -> Option<&str> {
        match &self.kind {
            TargetingKind::Expression(expression) => Some(expression.source()),
            TargetingKind::Features(_) => None,
        }
    }

    /// Literal form, accepted back by [`Targeting::from_json`].
    pub fn to_json(&self) -> serde_json::Value {
        match &self.kind {
            TargetingKind::Features(features) => serde_json::Value::Object(
                features
                    .iter()
                    .map(|(feature, matcher)| (feature.clone(), matcher.to_json()))
                    .collect(),
            ),
            TargetingKind::Expression(expression) => expression.source().into(),
        }
    }
}

impl<'a> IntoIterator for &'a Targeting {
    type Item = (&'a str, &'a Matcher);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a Matcher)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl Serialize for Targeting {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Targeting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Targeting::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Targeting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TargetingKind::Expression(expression) => {
                write!(f, "Targeting ( {} )", expression.source())
            }
            TargetingKind::Features(_) => write!(f, "Targeting ( {} )", self.to_json()),
        }
    }
}
