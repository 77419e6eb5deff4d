use crate::{ContainerItem, ExperimentContainer, Result};

/// Configuration for [`ExperimentContainer`].
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    pub(crate) seed: Option<u64>,
    pub(crate) experiments: Vec<ContainerItem>,
}

impl ContainerConfig {
    /// Create an empty, unseeded configuration.
    ///
    /// ```
    /// # use pickpick::ContainerConfig;
    /// ContainerConfig::new();
    /// ```
    pub fn new() -> Self {
        ContainerConfig::default()
    }

    /// Seed the container's random generator, making picks reproducible across runs.
    ///
    /// ```
    /// # use pickpick::ContainerConfig;
    /// let mut config = ContainerConfig::new();
    /// config.seed(42);
    /// ```
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    /// Queue an experiment to be added to the container.
    pub fn experiment(&mut self, experiment: impl Into<ContainerItem>) -> &mut Self {
        self.experiments.push(experiment.into());
        self
    }

    /// Queue several experiments.
    pub fn experiments<T: Into<ContainerItem>>(
        &mut self,
        experiments: impl IntoIterator<Item = T>,
    ) -> &mut Self {
        self.experiments
            .extend(experiments.into_iter().map(Into::into));
        self
    }

    /// Create a new [`ExperimentContainer`] using the specified configuration.
    ///
    /// Fails with the first error raised while adding experiments, e.g. a duplicate id.
    ///
    /// ```
    /// # use pickpick::ContainerConfig;
    /// # use serde_json::json;
    /// let container = ContainerConfig::new()
    ///     .seed(7)
    ///     .experiment(json!({"id": "colors", "variations": ["red", "blue"]}))
    ///     .to_container()
    ///     .unwrap();
    /// assert_eq!(container.len(), 1);
    /// ```
    pub fn to_container(&self) -> Result<ExperimentContainer> {
        ExperimentContainer::create(self.experiments.iter().cloned(), self.seed)
    }
}
