use crate::domain::workflow_definition::{ActivityId, WorkflowDefinitionId};
use crate::domain::workflow_instance::WorkflowInstanceId;
use crate::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Domain event trait for all events in the system
pub trait DomainEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the workflow instance ID this event is associated with
    fn workflow_instance_id(&self) -> &WorkflowInstanceId;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Handler for domain events
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// Handle a domain event
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError>;
}

/// Default handler: writes every event to the log
#[derive(Debug, Default)]
pub struct TracingEventHandler;

#[async_trait]
impl DomainEventHandler for TracingEventHandler {
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError> {
        tracing::debug!(
            event_type = event.event_type(),
            workflow_instance_id = %event.workflow_instance_id(),
            timestamp = %event.timestamp(),
            "Workflow event"
        );
        Ok(())
    }
}

/// Event: workflow instance halted on one or more blocking activities
#[derive(Debug)]
pub struct WorkflowInstanceHalted {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,

    /// The identifier of the workflow definition
    pub workflow_definition_id: WorkflowDefinitionId,

    /// Every activity the instance now awaits
    pub awaiting: Vec<ActivityId>,

    /// The timestamp when the instance was persisted
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for WorkflowInstanceHalted {
    fn event_type(&self) -> &'static str {
        "workflow_instance.halted"
    }

    fn workflow_instance_id(&self) -> &WorkflowInstanceId {
        &self.workflow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: workflow instance resumed at a blocking activity
#[derive(Debug)]
pub struct WorkflowInstanceResumed {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,

    /// The activity the resume targets
    pub activity_id: ActivityId,

    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for WorkflowInstanceResumed {
    fn event_type(&self) -> &'static str {
        "workflow_instance.resumed"
    }

    fn workflow_instance_id(&self) -> &WorkflowInstanceId {
        &self.workflow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: workflow ran to completion
#[derive(Debug)]
pub struct WorkflowInstanceCompleted {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,

    /// The identifier of the workflow definition
    pub workflow_definition_id: WorkflowDefinitionId,

    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for WorkflowInstanceCompleted {
    fn event_type(&self) -> &'static str {
        "workflow_instance.completed"
    }

    fn workflow_instance_id(&self) -> &WorkflowInstanceId {
        &self.workflow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: a start or resume was cancelled by a lifecycle participant
#[derive(Debug)]
pub struct WorkflowAborted {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,

    /// "starting" or "resuming"
    pub checkpoint: &'static str,

    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for WorkflowAborted {
    fn event_type(&self) -> &'static str {
        "workflow_instance.aborted"
    }

    fn workflow_instance_id(&self) -> &WorkflowInstanceId {
        &self.workflow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types() {
        let id = WorkflowInstanceId("i1".to_string());
        let now = Utc::now();

        let halted = WorkflowInstanceHalted {
            workflow_instance_id: id.clone(),
            workflow_definition_id: WorkflowDefinitionId("wf".to_string()),
            awaiting: vec![ActivityId("b".to_string())],
            timestamp: now,
        };
        let aborted = WorkflowAborted {
            workflow_instance_id: id.clone(),
            checkpoint: "starting",
            timestamp: now,
        };

        assert_eq!(halted.event_type(), "workflow_instance.halted");
        assert_eq!(aborted.event_type(), "workflow_instance.aborted");
        assert_eq!(halted.workflow_instance_id(), &id);
        assert_eq!(aborted.timestamp(), now);
    }

    #[tokio::test]
    async fn test_tracing_handler_accepts_events() {
        let handler = TracingEventHandler;
        let event = WorkflowInstanceCompleted {
            workflow_instance_id: WorkflowInstanceId("i1".to_string()),
            workflow_definition_id: WorkflowDefinitionId("wf".to_string()),
            timestamp: Utc::now(),
        };

        assert!(handler.handle_event(Box::new(event)).await.is_ok());
    }
}
