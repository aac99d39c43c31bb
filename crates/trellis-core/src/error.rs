use thiserror::Error;

/// Core error type for the Trellis workflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Workflow definition not found
    #[error("Workflow definition not found: {0}")]
    WorkflowDefinitionNotFound(String),

    /// Workflow instance not found
    #[error("Workflow instance not found: {0}")]
    WorkflowInstanceNotFound(String),

    /// No activity kind is registered under the given name
    #[error("Activity not found: {0}")]
    ActivityNotFound(String),

    /// An activity id does not exist in its workflow definition
    #[error("Activity record {activity_id} not found in workflow definition {definition_id}")]
    ActivityRecordNotFound {
        /// Definition that was searched
        definition_id: String,
        /// Missing activity id
        activity_id: String,
    },

    /// A resume targeted an activity the instance is not awaiting
    #[error("Workflow instance {instance_id} is not awaiting activity {activity_id}")]
    AwaitingActivityMissing {
        /// Instance being resumed
        instance_id: String,
        /// Activity the resume was keyed on
        activity_id: String,
    },

    /// The stored instance version does not match the expected one
    #[error(
        "Concurrency conflict on workflow instance {instance_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// Instance being persisted
        instance_id: String,
        /// Version the caller loaded
        expected: u64,
        /// Version currently in the store
        actual: u64,
    },

    /// A single traversal executed more activities than allowed
    #[error("Execution limit of {0} activities exceeded")]
    ExecutionLimitExceeded(usize),

    /// Activity execution error
    #[error("Activity execution error: {0}")]
    ActivityExecutionError(String),

    /// Condition evaluation error
    #[error("Condition evaluation error: {0}")]
    ConditionEvaluationError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
