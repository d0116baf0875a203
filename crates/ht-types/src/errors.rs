use thiserror::Error;

/// Main error type for the HillTune system
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Round failure: failed to evaluate {failed} of {total} setups")]
    RoundFailure {
        failed: usize,
        total: usize,
        failures: Vec<TaskFailure>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while turning a point into a model configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Unknown property path: {path}")]
    UnknownProperty { path: String },

    #[error("Property path used by more than one dimension: {path}")]
    DuplicateProperty { path: String },

    #[error("Cannot set value '{value}' for '{path}': expected {expected}")]
    IncompatibleValue {
        path: String,
        value: String,
        expected: String,
    },

    #[error("Nested component not present for '{path}'")]
    MissingComponent { path: String },

    #[error("Invalid dimension '{property}': {message}")]
    InvalidDimension { property: String, message: String },

    #[error("Point has {actual} values, but {expected} dimensions are configured")]
    PointMismatch { expected: usize, actual: usize },
}

/// Errors raised by training or scoring a configured model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Training failed: {message}")]
    TrainingFailed { message: String },

    #[error("Scoring failed: {message}")]
    ScoringFailed { message: String },

    #[error("Statistic {statistic} not produced by the evaluator")]
    MissingStatistic { statistic: String },

    #[error("Dataset is empty")]
    EmptyDataset,

    #[error("Evaluation task panicked: {message}")]
    Panicked { message: String },
}

/// Errors raised by parameter space navigation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("Index {index} outside [{min}, {max}] for '{property}'")]
    IndexOutOfRange {
        property: String,
        index: i64,
        min: i64,
        max: i64,
    },

    #[error("Value {value} is not addressable in dimension '{property}'")]
    ValueNotInSpace { property: String, value: String },

    #[error("Expected {expected} coordinates, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Coordinate {position} outside dimension '{property}' with {cardinality} positions")]
    CoordinateOutOfRange {
        property: String,
        position: usize,
        cardinality: usize,
    },

    #[error("Parameter space has no dimensions")]
    Empty,
}

/// Diagnostic record for one failed evaluation task
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TaskFailure {
    /// Display form of the candidate point.
    pub candidate: String,
    pub cause: String,
}

/// Result type alias for HillTune operations
pub type TuneResult<T> = Result<T, TuneError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::TuneError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::TuneError::Internal(format!($($arg)*))
    };
}

/// Macro for creating invalid-dimension configuration errors
#[macro_export]
macro_rules! config_error {
    ($property:expr, $($arg:tt)*) => {
        $crate::ConfigurationError::InvalidDimension {
            property: $property.to_string(),
            message: format!($($arg)*),
        }
    };
}
