use std::sync::Arc;

use serde::Serialize;

use crate::{Experiment, ExperimentContainer, Payload, Result, Visitor};

/// Result of assigning a visitor: the experiment it falls into and the variation it gets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub experiment: Arc<Experiment>,
    /// Payload of the picked variation. May itself be a nested experiment.
    pub variation: Payload,
}

impl ExperimentContainer {
    /// Pick an experiment for `visitor`, then a variation of that experiment.
    ///
    /// Returns `None` when no experiment targets the visitor. Errors are those of
    /// [`ExperimentContainer::pick`].
    ///
    /// ```
    /// # use pickpick::{ExperimentContainer, Visitor};
    /// # use serde_json::json;
    /// let container = ExperimentContainer::create(
    ///     [json!({"id": "colors", "variations": ["red"], "targeting": {"page": "buy"}})],
    ///     None,
    /// ).unwrap();
    ///
    /// let visitor = Visitor::from([("page".to_owned(), "buy".into())]);
    /// let assignment = container.assign(&visitor).unwrap().unwrap();
    /// assert_eq!(assignment.experiment.id(), "colors");
    /// assert_eq!(assignment.variation.as_value(), Some(&json!("red")));
    ///
    /// assert!(container.assign(&Visitor::new()).unwrap().is_none());
    /// ```
    pub fn assign(&self, visitor: &Visitor) -> Result<Option<Assignment>> {
        let Some(experiment) = self.pick(visitor)? else {
            return Ok(None);
        };
        let variation = experiment.pick();

        log::debug!(target: "pickpick",
                    experiment_id:display = experiment.id(),
                    variation:serde = variation;
                    "assigned visitor");

        Ok(Some(Assignment {
            experiment,
            variation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::{
        attributes::collect_visitor, AttributeValue, Experiment, ExperimentContainer, Variation,
    };

    #[test]
    fn assigns_round_robin_variations() {
        let container = ExperimentContainer::create(
            [json!({
                "id": "953d6fe0",
                "name": "buy page button color",
                "variations": ["#ff0000", "#00ff00", "#0000ff"],
                "targeting": "_.page === \"buy\""
            })],
            Some(1),
        )
        .unwrap();

        let visitor = collect_visitor(["page"], |_| Some(AttributeValue::from("buy")));
        let colors: Vec<_> = (0..4)
            .map(|_| {
                container
                    .assign(&visitor)
                    .unwrap()
                    .unwrap()
                    .variation
                    .as_value()
                    .cloned()
            })
            .collect();
        assert_eq!(
            colors,
            [
                Some(json!("#ff0000")),
                Some(json!("#00ff00")),
                Some(json!("#0000ff")),
                Some(json!("#ff0000"))
            ]
        );
    }

    #[test]
    fn returns_nested_experiments_unopened() {
        let nested = Arc::new(
            Experiment::from_json(&json!({"id": "inner", "variations": ["small", "large"]})).unwrap(),
        );
        let mut outer = Experiment::from_json(&json!({"id": "outer", "variations": ["plain"]})).unwrap();
        outer.add(Variation::new(nested.clone()).unwrap()).unwrap();

        let container = ExperimentContainer::create([outer], None).unwrap();
        let visitor = collect_visitor(std::iter::empty::<&str>(), |_| None);

        let first = container.assign(&visitor).unwrap().unwrap();
        assert_eq!(first.variation.as_value(), Some(&json!("plain")));

        let second = container.assign(&visitor).unwrap().unwrap();
        let inner = second.variation.as_experiment().unwrap();
        assert!(Arc::ptr_eq(inner, &nested));
        assert_eq!(inner.pick().as_value(), Some(&json!("small")));
    }

    #[test]
    fn serializes_assignment() {
        let container =
            ExperimentContainer::create([json!({"id": "e", "variations": [{"object": 5}]})], None)
                .unwrap();
        let assignment = container.assign(&Default::default()).unwrap().unwrap();
        assert_eq!(
            serde_json::to_value(&assignment).unwrap(),
            json!({
                "experiment": {
                    "id": "e",
                    "name": "e",
                    "targeting": {},
                    "variations": [{"object": 5, "weight": 1}]
                },
                "variation": 5
            })
        );
    }
}
