use crate::domain::workflow_definition::{ActivityId, ActivityRecord, WorkflowDefinitionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Value object: Workflow Instance ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowInstanceId(pub String);

impl WorkflowInstanceId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for WorkflowInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Records that an instance is parked at a blocking activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwaitingActivity {
    /// The activity the instance is halted on
    pub activity_id: ActivityId,

    /// Kind name of that activity, used for event lookup
    pub name: String,

    /// Copied from the activity record
    pub is_start: bool,
}

impl AwaitingActivity {
    /// Build the awaiting entry for a blocking activity record
    pub fn from_activity(activity: &ActivityRecord) -> Self {
        Self {
            activity_id: activity.id.clone(),
            name: activity.name.clone(),
            is_start: activity.is_start,
        }
    }
}

/// Aggregate: a paused execution of a workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique identifier
    pub id: WorkflowInstanceId,

    /// Workflow definition ID
    pub definition_id: WorkflowDefinitionId,

    /// Activities the instance is halted on, in the order they blocked
    pub awaiting_activities: Vec<AwaitingActivity>,

    /// Optimistic concurrency stamp, bumped by the store on every save
    pub version: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// Create a new, not yet persisted, instance of a definition
    pub fn new(definition_id: WorkflowDefinitionId) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowInstanceId::generate(),
            definition_id,
            awaiting_activities: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append one awaiting entry per blocking activity
    pub fn add_awaiting_activities<'a>(
        &mut self,
        blocking: impl IntoIterator<Item = &'a ActivityRecord>,
    ) {
        self.awaiting_activities
            .extend(blocking.into_iter().map(AwaitingActivity::from_activity));
        self.updated_at = Utc::now();
    }

    /// Remove the first awaiting entry for `activity_id`, returning it if present
    pub fn remove_awaiting_activity(&mut self, activity_id: &ActivityId) -> Option<AwaitingActivity> {
        let position = self
            .awaiting_activities
            .iter()
            .position(|a| &a.activity_id == activity_id)?;
        self.updated_at = Utc::now();
        Some(self.awaiting_activities.remove(position))
    }

    /// Whether the instance is parked on `activity_id`
    pub fn is_awaiting(&self, activity_id: &ActivityId) -> bool {
        self.awaiting_activities
            .iter()
            .any(|a| &a.activity_id == activity_id)
    }

    /// Whether nothing is awaited anymore
    pub fn has_no_awaiting_activities(&self) -> bool {
        self.awaiting_activities.is_empty()
    }
}
