use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::json_kind, selector::RoundRobin, Error, Payload, Result, Targeting, Variation,
    VariationInput, Visitor,
};

/// Everything needed to create an [`Experiment`].
///
/// ```
/// # use pickpick::{Experiment, ExperimentDefinition, Targeting};
/// # use serde_json::json;
/// let experiment = Experiment::create(ExperimentDefinition {
///     id: "953d6fe0".to_owned(),
///     name: Some("buy page button color".to_owned()),
///     variations: vec![json!("#ff0000").into(), json!({"object": "#00ff00", "weight": 2}).into()],
///     targeting: Targeting::expression(r#"_.page in ["buy", "index"]"#).unwrap(),
///     ..Default::default()
/// }).unwrap();
/// assert_eq!(experiment.variations().len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ExperimentDefinition {
    /// Required, unique within a container.
    pub id: String,
    /// Defaults to `id`.
    pub name: Option<String>,
    /// Must not be empty.
    pub variations: Vec<VariationInput>,
    pub targeting: Targeting,
    /// Opaque metadata carried along with the experiment.
    pub user_data: Option<serde_json::Value>,
}

/// A named set of weighted [`Variation`]s gated by a [`Targeting`].
///
/// Variations are handed out round-robin, honoring weights: over a full cycle each variation is
/// picked exactly `weight` times. The cursor lives behind a mutex, so an experiment shared through
/// an `Arc` can still be picked from.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    id: String,
    name: String,
    targeting: Targeting,
    variations: Vec<Variation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<serde_json::Value>,
    #[serde(skip)]
    selector: Mutex<RoundRobin>,
}

impl Experiment {
    pub fn create(definition: ExperimentDefinition) -> Result<Experiment> {
        let ExperimentDefinition {
            id,
            name,
            variations,
            targeting,
            user_data,
        } = definition;

        if id.is_empty() {
            return Err(Error::MissingExperimentId);
        }

        let variations = variations
            .into_iter()
            .map(VariationInput::into_variation)
            .collect::<Result<Vec<_>>>()?;
        if variations.is_empty() {
            return Err(Error::EmptyVariations { id });
        }

        let selector = RoundRobin::new(weights(&variations))?;
        Ok(Experiment {
            name: name.unwrap_or_else(|| id.clone()),
            id,
            targeting,
            variations,
            user_data,
            selector: Mutex::new(selector),
        })
    }

    /// Create an experiment from its literal form:
    /// `{"id", "name"?, "variations", "targeting"?, "userData"?}`.
    pub fn from_json(raw: &serde_json::Value) -> Result<Experiment> {
        let serde_json::Value::Object(map) = raw else {
            return Err(Error::InvalidExperiment(format!(
                "expected an object, got {}",
                json_kind(raw)
            )));
        };

        let id = match map.get("id") {
            None | Some(serde_json::Value::Null) => return Err(Error::MissingExperimentId),
            Some(serde_json::Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(Error::InvalidExperiment(format!(
                    "id must be a string, got {}",
                    json_kind(other)
                )))
            }
        };

        let name = match map.get("name") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(name)) => Some(name.clone()),
            Some(other) => {
                return Err(Error::InvalidExperiment(format!(
                    "name must be a string, got {}",
                    json_kind(other)
                )))
            }
        };

        let variations = match map.get("variations") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(variations)) => variations
                .iter()
                .cloned()
                .map(VariationInput::Raw)
                .collect(),
            Some(other) => {
                return Err(Error::InvalidExperiment(format!(
                    "variations must be an array, got {}",
                    json_kind(other)
                )))
            }
        };

        let targeting = match map.get("targeting") {
            Some(targeting) => Targeting::from_json(targeting)?,
            None => Targeting::default(),
        };

        Experiment::create(ExperimentDefinition {
            id,
            name,
            variations,
            targeting,
            user_data: map.get("userData").filter(|v| !v.is_null()).cloned(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn targeting(&self) -> &Targeting {
        &self.targeting
    }

    pub fn variations(&self) -> &[Variation] {
        &self.variations
    }

    pub fn user_data(&self) -> Option<&serde_json::Value> {
        self.user_data.as_ref()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Variation> {
        self.variations.iter()
    }

    /// Whether `visitor` is targeted by this experiment.
    pub fn matches(&self, visitor: &Visitor) -> bool {
        self.targeting.matches(visitor)
    }

    /// See [`Targeting::matches_json`].
    pub fn matches_json(&self, input: &serde_json::Value) -> Result<bool> {
        self.targeting.matches_json(input)
    }

    /// Payload of the next variation in round-robin order.
    ///
    /// Targeting is not consulted. A nested experiment is returned as is: call `pick()` on it to
    /// go one level deeper.
    pub fn pick(&self) -> Payload {
        // The cursor is always consistent, even if another thread panicked while holding the lock.
        let index = self
            .selector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_index();
        let payload = self.variations[index].object().clone();

        log::trace!(target: "pickpick",
                    experiment_id:display = self.id,
                    variation_index = index,
                    payload:serde = payload;
                    "picked variation");

        payload
    }

    /// Append a variation and restart the round-robin cycle.
    ///
    /// Experiments cannot be added directly, wrap them in a [`Variation`] first.
    pub fn add(&mut self, variation: impl Into<VariationInput>) -> Result<()> {
        let variation = match variation.into() {
            VariationInput::Experiment(_) => return Err(Error::NestedExperimentAdd),
            other => other.into_variation()?,
        };

        let mut weights = weights(&self.variations);
        weights.push(variation.weight());
        let selector = RoundRobin::new(weights)?;

        self.variations.push(variation);
        self.selector = Mutex::new(selector);

        log::debug!(target: "pickpick",
                    experiment_id:display = self.id,
                    variations = self.variations.len();
                    "added variation");
        Ok(())
    }

    /// Literal form, accepted back by [`Experiment::from_json`].
    pub fn to_json(&self) -> serde_json::Value {
        // Serialization of plain values cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub(crate) fn write_tree(&self, f: &mut std::fmt::Formatter<'_>, tabs: &str) -> std::fmt::Result {
        writeln!(f, "{tabs}Experiment (")?;
        writeln!(f, "{tabs}\tId: {}", self.id)?;
        writeln!(f, "{tabs}\tName: {}", self.name)?;
        writeln!(f, "{tabs}\t{}", self.targeting)?;
        writeln!(f, "{tabs}\tVariations:")?;
        let nested_tabs = format!("{tabs}\t\t");
        for (index, variation) in self.variations.iter().enumerate() {
            write!(f, "{nested_tabs}#{index} ")?;
            variation.write_tree(f, &nested_tabs)?;
            writeln!(f)?;
        }
        write!(f, "{tabs})")
    }
}

fn weights(variations: &[Variation]) -> Vec<u32> {
    variations.iter().map(Variation::weight).collect()
}

impl Clone for Experiment {
    fn clone(&self) -> Self {
        let selector = self
            .selector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Experiment {
            id: self.id.clone(),
            name: self.name.clone(),
            targeting: self.targeting.clone(),
            variations: self.variations.clone(),
            user_data: self.user_data.clone(),
            selector: Mutex::new(selector),
        }
    }
}

/// Experiments are equal when they describe the same thing. The round-robin position is ignored.
impl PartialEq for Experiment {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.targeting == other.targeting
            && self.variations == other.variations
            && self.user_data == other.user_data
    }
}

impl<'a> IntoIterator for &'a Experiment {
    type Item = &'a Variation;
    type IntoIter = std::slice::Iter<'a, Variation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'de> Deserialize<'de> for Experiment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Experiment::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_tree(f, "")
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use serde_json::json;

    use super::{Experiment, ExperimentDefinition};
    use crate::{Error, Payload, Targeting, Variation, VariationInput, Visitor};

    fn raw_variations(values: &[serde_json::Value]) -> Vec<VariationInput> {
        values.iter().cloned().map(VariationInput::Raw).collect()
    }

    fn run(experiment: &Experiment, size: usize) -> HashMap<String, usize> {
        let mut counter = HashMap::new();
        for _ in 0..size {
            let key = match experiment.pick() {
                Payload::Value(value) => value.to_string(),
                Payload::Experiment(e) => e.id().to_owned(),
            };
            *counter.entry(key).or_insert(0) += 1;
        }
        counter
    }

    #[test]
    fn picks_based_on_even_weights() {
        let experiment = Experiment::create(ExperimentDefinition {
            id: "e".into(),
            variations: raw_variations(&[json!(1), json!(2), json!(3)]),
            ..Default::default()
        })
        .unwrap();

        let counter = run(&experiment, 100);
        assert_eq!(counter["1"], 34);
        assert_eq!(counter["2"], 33);
        assert_eq!(counter["3"], 33);
    }

    #[test]
    fn picks_based_on_uneven_weights() {
        let experiment = Experiment::create(ExperimentDefinition {
            id: "e".into(),
            variations: vec![
                Variation::with_weight(json!(1), 50).unwrap().into(),
                Variation::with_weight(json!(2), 25).unwrap().into(),
                Variation::with_weight(json!(3), 25).unwrap().into(),
            ],
            ..Default::default()
        })
        .unwrap();

        let counter = run(&experiment, 100);
        assert_eq!(counter["1"], 50);
        assert_eq!(counter["2"], 25);
        assert_eq!(counter["3"], 25);
    }

    #[test]
    fn returns_nested_experiments_without_entering_them() {
        let us = Arc::new(
            Experiment::from_json(&json!({
                "id": "us", "variations": [1, 2], "targeting": {"geo": "US"}
            }))
            .unwrap(),
        );
        let mx = Arc::new(
            Experiment::from_json(&json!({
                "id": "mx", "variations": [3, 4], "targeting": {"geo": "MX"}
            }))
            .unwrap(),
        );
        let parent = Experiment::create(ExperimentDefinition {
            id: "parent".into(),
            variations: vec![us.clone().into(), mx.clone().into()],
            ..Default::default()
        })
        .unwrap();

        let first = parent.pick();
        let nested = first.as_experiment().unwrap();
        assert!(Arc::ptr_eq(nested, &us));
        assert_eq!(nested.pick(), Payload::Value(json!(1)));
        assert_eq!(nested.pick(), Payload::Value(json!(2)));

        let second = parent.pick();
        assert!(Arc::ptr_eq(second.as_experiment().unwrap(), &mx));
        assert!(second.as_experiment().unwrap().matches(&Visitor::from([(
            "geo".to_owned(),
            "MX".into()
        )])));
    }

    #[test]
    fn requires_an_id() {
        let err = Experiment::create(ExperimentDefinition {
            variations: raw_variations(&[json!(1)]),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::MissingExperimentId));

        assert!(matches!(
            Experiment::from_json(&json!({"variations": [1]})),
            Err(Error::MissingExperimentId)
        ));
        assert!(matches!(
            Experiment::from_json(&json!({"id": "", "variations": [1]})),
            Err(Error::MissingExperimentId)
        ));
    }

    #[test]
    fn requires_variations() {
        assert!(matches!(
            Experiment::from_json(&json!({"id": "e", "variations": []})),
            Err(Error::EmptyVariations { .. })
        ));
        assert!(matches!(
            Experiment::from_json(&json!({"id": "e"})),
            Err(Error::EmptyVariations { .. })
        ));
    }

    #[test]
    fn rejects_invalid_literals() {
        assert!(matches!(
            Experiment::from_json(&json!([1, 2])),
            Err(Error::InvalidExperiment(_))
        ));
        assert!(matches!(
            Experiment::from_json(&json!({"id": "e", "variations": [1], "targeting": 5})),
            Err(Error::InvalidTargeting(_))
        ));
        assert!(matches!(
            Experiment::from_json(&json!({"id": "e", "variations": [{"weight": 3}]})),
            Err(Error::MalformedVariation(_))
        ));
        assert!(matches!(
            Experiment::from_json(&json!({"id": "e", "variations": [{"object": 1, "weight": 0}]})),
            Err(Error::WeightNotPositive)
        ));
    }

    #[test]
    fn name_defaults_to_id() {
        let experiment = Experiment::from_json(&json!({"id": "e", "variations": [1]})).unwrap();
        assert_eq!(experiment.name(), "e");
    }

    #[test]
    fn delegates_matching_to_targeting() {
        let experiment = Experiment::from_json(&json!({
            "id": "e", "variations": [1], "targeting": {"geo": "US"}
        }))
        .unwrap();
        assert!(experiment.matches(&Visitor::from([("geo".to_owned(), "US".into())])));
        assert!(!experiment.matches(&Visitor::new()));
        assert!(experiment.matches_json(&json!(null)).is_err());
    }

    #[test]
    fn add_restarts_round_robin() {
        let mut experiment =
            Experiment::from_json(&json!({"id": "e", "variations": [1, 2]})).unwrap();
        assert_eq!(experiment.pick(), Payload::Value(json!(1)));

        experiment.add(json!(3)).unwrap();
        experiment
            .add(Variation::with_weight(json!(4), 2).unwrap())
            .unwrap();

        let picks: Vec<_> = (0..5).map(|_| experiment.pick()).collect();
        assert_eq!(
            picks,
            [json!(1), json!(2), json!(3), json!(4), json!(4)]
                .map(Payload::Value)
                .to_vec()
        );
    }

    #[test]
    fn add_rejects_experiments() {
        let mut experiment = Experiment::from_json(&json!({"id": "e", "variations": [1]})).unwrap();
        let other = Experiment::from_json(&json!({"id": "o", "variations": [1]})).unwrap();

        assert!(matches!(
            experiment.add(other.clone()),
            Err(Error::NestedExperimentAdd)
        ));
        assert_eq!(experiment.variations().len(), 1);

        // wrapping in a variation is the way to nest
        experiment.add(Variation::new(other).unwrap()).unwrap();
        assert_eq!(experiment.variations().len(), 2);
        assert!(experiment.variations()[1].object().is_experiment());
    }

    #[test]
    fn add_rejects_invalid_variations() {
        let mut experiment = Experiment::from_json(&json!({"id": "e", "variations": [1]})).unwrap();
        assert!(experiment.add(json!(null)).is_err());
        assert!(experiment.add(json!({"weight": 2})).is_err());
        assert_eq!(experiment.variations().len(), 1);
    }

    #[test]
    fn serializes_to_literal_form() {
        let experiment = Experiment::from_json(&json!({
            "id": "foo-id",
            "name": "e1",
            "variations": [1, {"object": 2, "weight": 3}],
            "targeting": {"geo": "US", "page": ["buy", "index"]}
        }))
        .unwrap();

        assert_eq!(
            experiment.to_json(),
            json!({
                "id": "foo-id",
                "name": "e1",
                "targeting": {"geo": "US", "page": ["buy", "index"]},
                "variations": [{"object": 1, "weight": 1}, {"object": 2, "weight": 3}]
            })
        );
    }

    #[test]
    fn round_trips_through_json() {
        let experiment = Experiment::from_json(&json!({
            "id": "foo-id",
            "name": "e1",
            "variations": ["a", "b", "c"],
            "targeting": "_.geo === \"US\"",
            "userData": {"owner": "growth"}
        }))
        .unwrap();

        let text = serde_json::to_string(&experiment).unwrap();
        let parsed: Experiment = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed, experiment);
        assert_eq!(parsed.id(), "foo-id");
        assert_eq!(parsed.user_data(), Some(&json!({"owner": "growth"})));
        let visitor = Visitor::from([("geo".to_owned(), "US".into())]);
        assert_eq!(parsed.matches(&visitor), experiment.matches(&visitor));
        assert_eq!(
            parsed.iter().map(|v| v.object().clone()).collect::<Vec<_>>(),
            experiment.iter().map(|v| v.object().clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn iterates_variations_in_order() {
        let experiment =
            Experiment::from_json(&json!({"id": "e", "variations": ["x", "y"]})).unwrap();
        let objects: Vec<_> = (&experiment)
            .into_iter()
            .map(|v| v.object().as_value().cloned())
            .collect();
        assert_eq!(objects, [Some(json!("x")), Some(json!("y"))]);
    }

    #[test]
    fn clone_keeps_content() {
        let experiment = Experiment::from_json(&json!({"id": "e", "variations": [1, 2]})).unwrap();
        experiment.pick();
        let copy = experiment.clone();
        assert_eq!(copy, experiment);
        assert_eq!(copy.pick(), Payload::Value(json!(2)));
    }

    #[test]
    fn display_renders_nested_tree() {
        let child = Experiment::from_json(&json!({"id": "child", "variations": [1]})).unwrap();
        let parent = Experiment::create(ExperimentDefinition {
            id: "parent".into(),
            name: Some("Parent".into()),
            variations: vec![child.into(), json!("leaf").into()],
            targeting: Targeting::from_json(&json!({"geo": "US"})).unwrap(),
            ..Default::default()
        })
        .unwrap();

        let text = parent.to_string();
        assert!(text.starts_with("Experiment (\n\tId: parent\n\tName: Parent\n"));
        assert!(text.contains(r#"Targeting ( {"geo":"US"} )"#));
        assert!(text.contains("\t\t\tExperiment (\n\t\t\t\tId: child"));
        assert!(text.contains(r#"#1 Variation ( object: "leaf", weight: 1 )"#));
        assert!(text.ends_with(')'));
    }
}
