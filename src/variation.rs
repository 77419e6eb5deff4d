use std::sync::Arc;

use derive_more::From;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Experiment, Result};

/// What a variation hands out when picked.
///
/// A payload is either plain data or a nested experiment. Nested experiments model mutually
/// exclusive sub-experiments: the caller picks again on the returned experiment.
#[derive(Debug, Clone, PartialEq, Serialize, From)]
#[serde(untagged)]
pub enum Payload {
    Value(serde_json::Value),
    Experiment(Arc<Experiment>),
}

impl From<Experiment> for Payload {
    fn from(value: Experiment) -> Self {
        Self::Experiment(Arc::new(value))
    }
}

impl Payload {
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Value(value) => Some(value),
            Payload::Experiment(_) => None,
        }
    }

    pub fn as_experiment(&self) -> Option<&Arc<Experiment>> {
        match self {
            Payload::Experiment(experiment) => Some(experiment),
            Payload::Value(_) => None,
        }
    }

    pub fn is_experiment(&self) -> bool {
        self.as_experiment().is_some()
    }
}

/// A payload with a positive integer weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variation {
    object: Payload,
    weight: u32,
}

impl Variation {
    /// Create a variation with the default weight of 1.
    pub fn new(object: impl Into<Payload>) -> Result<Variation> {
        Variation::with_weight(object, 1)
    }

    pub fn with_weight(object: impl Into<Payload>, weight: u32) -> Result<Variation> {
        let object = object.into();
        if matches!(object, Payload::Value(serde_json::Value::Null)) {
            return Err(Error::MissingPayload);
        }
        if weight < 1 {
            return Err(Error::WeightNotPositive);
        }
        Ok(Variation { object, weight })
    }

    /// Parse the literal form of a variation.
    ///
    /// An object with an `object` key (and an optional `weight`) is a variation literal. Any other
    /// non-object, non-null value is a bare payload with weight 1.
    pub fn from_json(raw: &serde_json::Value) -> Result<Variation> {
        match raw {
            serde_json::Value::Null => Err(Error::MissingPayload),
            serde_json::Value::Object(map) => {
                let Some(object) = map.get("object") else {
                    return Err(Error::MalformedVariation(if map.contains_key("weight") {
                        "missing `object`".to_owned()
                    } else {
                        format!("expected `object` and optional `weight`, got {raw}")
                    }));
                };
                let weight = match map.get("weight") {
                    None | Some(serde_json::Value::Null) => 1,
                    Some(weight) => parse_weight(weight)?,
                };
                Variation::with_weight(object.clone(), weight)
            }
            other => Variation::new(other.clone()),
        }
    }

    pub fn object(&self) -> &Payload {
        &self.object
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Update the weight. Fails, leaving the variation untouched, if `weight` is 0.
    pub fn set_weight(&mut self, weight: u32) -> Result<()> {
        if weight < 1 {
            return Err(Error::WeightNotPositive);
        }
        self.weight = weight;
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (Payload, u32) {
        (self.object, self.weight)
    }

    pub(crate) fn write_tree(&self, f: &mut std::fmt::Formatter<'_>, tabs: &str) -> std::fmt::Result {
        write!(f, "Variation ( object: ")?;
        match &self.object {
            Payload::Value(value) => write!(f, "{value}")?,
            Payload::Experiment(experiment) => {
                writeln!(f)?;
                experiment.write_tree(f, &format!("{tabs}\t"))?;
            }
        }
        write!(f, ", weight: {} )", self.weight)
    }
}

/// Validate a raw JSON weight.
pub(crate) fn parse_weight(raw: &serde_json::Value) -> Result<u32> {
    let weight = raw.as_f64().ok_or(Error::WeightNotANumber)?;
    if weight.fract() != 0.0 {
        return Err(Error::WeightNotAnInteger);
    }
    if weight < 1.0 {
        return Err(Error::WeightNotPositive);
    }
    if weight > f64::from(u32::MAX) {
        return Err(Error::WeightTooLarge);
    }
    Ok(weight as u32)
}

impl<'de> Deserialize<'de> for Variation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Variation::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Variation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_tree(f, "")
    }
}

/// Anything [`Experiment::create`] and [`Experiment::add`] accept as a variation.
#[derive(Debug, Clone, From)]
pub enum VariationInput {
    Variation(Variation),
    Experiment(Arc<Experiment>),
    Raw(serde_json::Value),
}

impl From<Experiment> for VariationInput {
    fn from(value: Experiment) -> Self {
        Self::Experiment(Arc::new(value))
    }
}

impl VariationInput {
    pub(crate) fn into_variation(self) -> Result<Variation> {
        match self {
            VariationInput::Variation(variation) => Ok(variation),
            VariationInput::Experiment(experiment) => Variation::new(experiment),
            VariationInput::Raw(raw) => Variation::from_json(&raw),
        }
    }
}
