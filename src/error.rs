use std::sync::Arc;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned when building or querying experiments.
///
/// All of them signal invalid input (programmer or data errors). None are recovered internally.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Experiment was created without an id.
    #[error("experiment id is required")]
    MissingExperimentId,

    /// Experiment was created with no variations.
    #[error("experiment {id:?} must have at least one variation")]
    EmptyVariations {
        /// Id of the offending experiment.
        id: String,
    },

    /// Raw weight is not a number.
    #[error("weight must be a number")]
    WeightNotANumber,

    /// Raw weight has a fractional part.
    #[error("weight must be an integer")]
    WeightNotAnInteger,

    /// Weight is lower than one.
    #[error("weight must be greater than 0")]
    WeightNotPositive,

    /// Weight does not fit in 32 bits.
    #[error("weight must not exceed {}", u32::MAX)]
    WeightTooLarge,

    /// Targeting is neither an expression map, an expression string nor null.
    #[error("invalid targeting of type {0}")]
    InvalidTargeting(&'static str),

    /// `and` matcher was given an empty list.
    #[error("and() requires at least one matcher")]
    EmptyConjunction,

    /// A literal cannot be turned into a matcher.
    #[error("unsupported type: {kind} for value: {value}")]
    UnsupportedMatcherType {
        /// JSON type name of the literal.
        kind: &'static str,
        /// The literal itself.
        value: String,
    },

    /// Container already holds an experiment with this id.
    #[error("experiment with id {0:?} already exists in the container")]
    DuplicateExperimentId(String),

    /// Variation literal has neither usable `object` nor `weight`.
    #[error("malformed variation literal: {0}")]
    MalformedVariation(String),

    /// Variation payload is missing or null.
    #[error("variation object cannot be null")]
    MissingPayload,

    /// Targeting input is null.
    #[error("inputTargeting cannot be null or undefined")]
    MissingTargetingInput,

    /// `Experiment::add` was called with an experiment.
    #[error("cannot add an experiment as a variation, wrap it in a Variation first")]
    NestedExperimentAdd,

    /// Experiment literal is not a JSON object.
    #[error("invalid experiment literal: {0}")]
    InvalidExperiment(String),

    /// Selection was requested over an empty collection.
    #[error("cannot select from an empty collection")]
    EmptySelection,

    /// Targeting expression failed to compile.
    #[error("invalid targeting expression at offset {position}: {message}")]
    Expression {
        /// Byte offset into the expression.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// Persisted data is not valid JSON.
    #[error(transparent)]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    Json(Arc<serde_json::Error>),

    /// An I/O error while reading persisted data.
    #[error(transparent)]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Arc::new(value))
    }
}

/// Name of the JSON type of `value`, used in error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
