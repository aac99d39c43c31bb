/// Lifecycle notifications to every activity kind
pub mod lifecycle;

/// Graph traversal
pub mod execution_engine;

/// Per-instance locks for exclusive resumes
pub mod instance_lock;

/// Event-driven start and resume of workflows
pub mod workflow_manager;

/// Workflow definition management service
pub mod definition_service;
