use std::{
    collections::HashSet,
    io::Read,
    sync::{Arc, Mutex, PoisonError},
};

use derive_more::From;
use rand::{rngs::StdRng, thread_rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    attributes::visitor_from_json, error::json_kind, selector::WeightedRandom, Error, Experiment,
    Payload, Result, Variation, Visitor,
};

/// Anything [`ExperimentContainer::add`] accepts.
///
/// Raw literals are either a variation literal `{"object": <experiment literal>, "weight": n}` or
/// a bare experiment literal (weight 1).
#[derive(Debug, Clone, From)]
pub enum ContainerItem {
    Experiment(Arc<Experiment>),
    /// A variation whose payload is an experiment, or an experiment literal.
    Variation(Variation),
    Raw(serde_json::Value),
}

impl From<Experiment> for ContainerItem {
    fn from(value: Experiment) -> Self {
        Self::Experiment(Arc::new(value))
    }
}

impl ContainerItem {
    fn into_entry(self) -> Result<ContainerEntry> {
        let (payload, weight) = match self {
            ContainerItem::Experiment(experiment) => return Ok(ContainerEntry::new(experiment, 1)),
            ContainerItem::Variation(variation) => variation.into_parts(),
            ContainerItem::Raw(raw) if raw.get("object").is_some() => {
                Variation::from_json(&raw)?.into_parts()
            }
            ContainerItem::Raw(raw) => (Payload::Value(raw), 1),
        };

        let experiment = match payload {
            Payload::Experiment(experiment) => experiment,
            Payload::Value(raw) => Arc::new(Experiment::from_json(&raw)?),
        };
        Ok(ContainerEntry::new(experiment, weight))
    }
}

/// An experiment held by a container, with its container-level weight.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerEntry {
    #[serde(rename = "object")]
    experiment: Arc<Experiment>,
    weight: u32,
}

impl ContainerEntry {
    fn new(experiment: Arc<Experiment>, weight: u32) -> Self {
        ContainerEntry { experiment, weight }
    }

    pub fn experiment(&self) -> &Arc<Experiment> {
        &self.experiment
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }
}

/// A registry of experiments with unique ids.
///
/// [`pick`](ExperimentContainer::pick) filters experiments by targeting and draws one of the
/// matching ones at random, proportionally to container-level weights. A seeded container draws
/// from a reproducible sequence.
///
/// Experiments can be added but never removed.
#[derive(Debug, Serialize)]
pub struct ExperimentContainer {
    #[serde(rename = "experiments")]
    entries: Vec<ContainerEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip)]
    rng: Option<Mutex<StdRng>>,
    #[serde(skip)]
    targeting_features: HashSet<String>,
}

impl ExperimentContainer {
    /// Create an empty container. With a `seed`, picks are reproducible.
    pub fn new(seed: Option<u64>) -> ExperimentContainer {
        ExperimentContainer {
            entries: Vec::new(),
            seed,
            rng: seed.map(|seed| Mutex::new(StdRng::seed_from_u64(seed))),
            targeting_features: HashSet::new(),
        }
    }

    /// Create a container holding `experiments`.
    pub fn create<T: Into<ContainerItem>>(
        experiments: impl IntoIterator<Item = T>,
        seed: Option<u64>,
    ) -> Result<ExperimentContainer> {
        let mut container = ExperimentContainer::new(seed);
        container.add(experiments)?;
        Ok(container)
    }

    /// Load a container from its literal form: `{"experiments": [...], "seed"?: n}`.
    pub fn from_json(raw: &serde_json::Value) -> Result<ExperimentContainer> {
        let serde_json::Value::Object(map) = raw else {
            return Err(Error::InvalidExperiment(format!(
                "expected a container object, got {}",
                json_kind(raw)
            )));
        };

        let seed = match map.get("seed") {
            None | Some(serde_json::Value::Null) => None,
            Some(seed) => Some(seed.as_u64().ok_or_else(|| {
                Error::InvalidExperiment(format!("seed must be a non-negative integer, got {seed}"))
            })?),
        };

        let experiments = match map.get("experiments") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(experiments)) => experiments.clone(),
            Some(other) => {
                return Err(Error::InvalidExperiment(format!(
                    "experiments must be an array, got {}",
                    json_kind(other)
                )))
            }
        };

        ExperimentContainer::create(experiments, seed)
    }

    /// Load a container from a JSON document.
    pub fn from_reader(reader: impl Read) -> Result<ExperimentContainer> {
        let raw: serde_json::Value = serde_json::from_reader(reader)?;
        ExperimentContainer::from_json(&raw)
    }

    /// Add experiments.
    ///
    /// Items are added one by one. Adding an experiment whose id is already held fails and leaves
    /// the container as it was before that item, items before it stay added.
    pub fn add<T: Into<ContainerItem>>(&mut self, items: impl IntoIterator<Item = T>) -> Result<()> {
        for item in items {
            let entry = item.into().into_entry()?;
            let id = entry.experiment.id();

            if self.has_id(id) {
                log::debug!(target: "pickpick",
                            experiment_id:display = id;
                            "rejected experiment with duplicate id");
                return Err(Error::DuplicateExperimentId(id.to_owned()));
            }

            self.targeting_features.extend(
                entry
                    .experiment
                    .targeting()
                    .features()
                    .map(str::to_owned),
            );

            log::debug!(target: "pickpick",
                        experiment_id:display = id,
                        weight = entry.weight;
                        "added experiment");
            self.entries.push(entry);
        }
        Ok(())
    }

    /// Pick one of the experiments targeting `visitor`, or `None` if none does.
    ///
    /// The returned experiment has not picked a variation yet, call
    /// [`Experiment::pick`] for that (or use [`ExperimentContainer::assign`]).
    ///
    /// Errors come from building the weighted selector over the matching experiments. Held weights
    /// are always valid, so in practice this does not fail.
    pub fn pick(&self, visitor: &Visitor) -> Result<Option<Arc<Experiment>>> {
        let candidates: Vec<&ContainerEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.experiment.matches(visitor))
            .collect();

        if candidates.is_empty() {
            log::trace!(target: "pickpick",
                        visitor:serde = visitor;
                        "no experiment matches visitor");
            return Ok(None);
        }

        let weights: Vec<u32> = candidates.iter().map(|entry| entry.weight).collect();
        let selector = WeightedRandom::new(&weights)?;

        let index = match &self.rng {
            Some(rng) => selector.pick(&mut *rng.lock().unwrap_or_else(PoisonError::into_inner)),
            None => selector.pick(&mut thread_rng()),
        };
        let experiment = candidates[index].experiment.clone();

        log::trace!(target: "pickpick",
                    visitor:serde = visitor,
                    candidates = candidates.len(),
                    experiment_id:display = experiment.id();
                    "picked experiment");

        Ok(Some(experiment))
    }

    /// Like [`ExperimentContainer::pick`], for a dynamic input. Fails if `input` is null.
    pub fn pick_json(&self, input: &serde_json::Value) -> Result<Option<Arc<Experiment>>> {
        let visitor = visitor_from_json(input)?;
        self.pick(&visitor)
    }

    /// Whether an experiment equal to `experiment` is held.
    pub fn has(&self, experiment: &Experiment) -> bool {
        self.entries
            .iter()
            .any(|entry| *entry.experiment == *experiment)
    }

    /// Whether an experiment with this id is held. Always `false` for an empty id.
    pub fn has_id(&self, id: &str) -> bool {
        !id.is_empty() && self.get(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Experiment>> {
        self.entries
            .iter()
            .map(|entry| &entry.experiment)
            .find(|experiment| experiment.id() == id)
    }

    /// All features targeted by any held experiment, deduplicated, in no particular order.
    ///
    /// Use it to know which visitor attributes to collect before calling
    /// [`pick`](ExperimentContainer::pick).
    pub fn targeting_features(&self) -> impl Iterator<Item = &str> {
        self.targeting_features.iter().map(String::as_str)
    }

    pub fn entries(&self) -> &[ContainerEntry] {
        &self.entries
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over held experiments in insertion order.
    pub fn iter(&self) -> Experiments<'_> {
        Experiments {
            entries: self.entries.iter(),
        }
    }

    /// Literal form, accepted back by [`ExperimentContainer::from_json`].
    pub fn to_json(&self) -> serde_json::Value {
        // Serialization of plain values cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Iterator over the experiments of a container.
#[derive(Debug, Clone)]
pub struct Experiments<'a> {
    entries: std::slice::Iter<'a, ContainerEntry>,
}

impl<'a> Iterator for Experiments<'a> {
    type Item = &'a Arc<Experiment>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|entry| &entry.experiment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<'a> IntoIterator for &'a ExperimentContainer {
    type Item = &'a Arc<Experiment>;
    type IntoIter = Experiments<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'de> Deserialize<'de> for ExperimentContainer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        ExperimentContainer::from_json(&raw).map_err(serde::de::Error::custom)
    }
}
