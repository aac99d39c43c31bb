/// Workflow definition domain models
pub mod workflow_definition;

/// Workflow instance domain models
pub mod workflow_instance;

/// Activity capability contract and registry
pub mod activity;

/// Per-execution workflow context
pub mod context;

/// Domain events
pub mod events;

/// Repository interfaces
pub mod repository;
