//!
//! Trellis Core - event-driven workflow engine
//!
//! Workflows are graphs of activities joined by outcome-labelled transitions.
//! An external event either starts the enabled workflows whose start activity
//! matches it or resumes the instances halted on a matching activity. Event
//! activities halt traversal; a halted instance is persisted with the
//! activities it awaits and is deleted once nothing is awaited anymore.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - workflow models, activity contract, repositories
pub mod domain;

/// Application services - engine, manager, definition service
pub mod application;

/// Engine configuration
pub mod config;

/// Error types
pub mod error;

// Re-export main API types for easy use
pub use application::definition_service::WorkflowDefinitionService;
pub use application::execution_engine::ExecutionEngine;
pub use application::lifecycle::LifecycleDispatcher;
pub use application::workflow_manager::{WorkflowManager, WorkflowRunStatus};
pub use config::{ConcurrencyPolicy, EngineConfig};
pub use domain::activity::{
    Activity, ActivityContext, ActivityLibrary, ActivityRegistry, CancellationSignal, Outcome,
};
pub use domain::context::{EntityReference, WorkflowContext};
pub use domain::events::{DomainEvent, DomainEventHandler, TracingEventHandler};
pub use domain::repository::{
    AwaitingActivityMatch, VersionCheck, WorkflowDefinitionRepository, WorkflowInstanceRepository,
};
pub use domain::workflow_definition::{
    ActivityId, ActivityRecord, Transition, WorkflowDefinition, WorkflowDefinitionId,
};
pub use domain::workflow_instance::{AwaitingActivity, WorkflowInstance, WorkflowInstanceId};
pub use error::CoreError;
