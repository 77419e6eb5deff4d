//! A small A/B testing engine: targeted experiments with weighted variations.
//!
//! # Overview
//!
//! An [`Experiment`] holds a list of weighted [`Variation`]s and a [`Targeting`] deciding which
//! visitors it applies to. Visitors are described by a [`Visitor`], a map from feature names to
//! scalar [`AttributeValue`]s. Picking on an experiment hands out variations round-robin,
//! honoring their weights.
//!
//! An [`ExperimentContainer`] registers experiments with unique ids. Picking on a container keeps
//! the experiments whose targeting matches the visitor and draws one at random, proportionally to
//! container-level weights. [`ExperimentContainer::assign`] performs both steps at once.
//!
//! A variation payload can itself be an experiment, which models mutually exclusive
//! sub-experiments. Picks never descend into nested experiments on their own.
//!
//! Targeting comes in two forms: a map from feature names to [`Matcher`]s, or a JavaScript-like
//! expression string such as `_.geo === "MX" && _.page in ["buy", "index"]`.
//!
//! Everything can be loaded from and saved to JSON, see [`ExperimentContainer::from_reader`].
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. They are raised while building or loading
//! experiments and containers. Picking from a valid container does not fail in practice, but
//! [`ExperimentContainer::pick`] still reports selector errors instead of hiding them.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `pickpick` target. Consider integrating a `log`-compatible logger implementation for better
//! visibility into picks.
//!
//! # Examples
//!
//! A runnable example lives in the `demos` directory of the crate repository.

#![warn(rustdoc::missing_crate_level_docs)]

mod assignment;
mod attributes;
mod config;
mod container;
mod error;
mod experiment;
mod expression;
mod matcher;
mod selector;
mod targeting;
mod variation;

pub use assignment::Assignment;
pub use attributes::{collect_visitor, AttributeValue, Visitor};
pub use config::ContainerConfig;
pub use container::{ContainerEntry, ContainerItem, Experiments, ExperimentContainer};
pub use error::{Error, Result};
pub use experiment::{Experiment, ExperimentDefinition};
pub use expression::{compile, CompiledExpression};
pub use matcher::{Matcher, MatcherInput};
pub use selector::{RoundRobin, WeightedRandom};
pub use targeting::Targeting;
pub use variation::{Payload, Variation, VariationInput};
