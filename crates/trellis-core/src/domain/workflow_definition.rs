use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Value object: Workflow Definition ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowDefinitionId(pub String);

/// Value object: Activity ID, unique within one definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub String);

impl fmt::Display for WorkflowDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One activity placed in a workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// ID of the activity
    pub id: ActivityId,

    /// Kind name used to resolve the activity behavior
    pub name: String,

    /// Whether this is the definition's start activity
    pub is_start: bool,

    /// Serialized configuration/state, parsed lazily by the activity context
    pub state: String,
}

impl ActivityRecord {
    /// Create a new activity record with an empty state document
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ActivityId(id.into()),
            name: name.into(),
            is_start: false,
            state: "{}".to_string(),
        }
    }

    /// Mark this record as the start activity
    pub fn as_start(mut self) -> Self {
        self.is_start = true;
        self
    }

    /// Attach a state document
    pub fn with_state(mut self, state: serde_json::Value) -> Self {
        self.state = state.to_string();
        self
    }
}

/// A labeled edge from an activity outcome to another activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Activity the transition leaves from
    pub source_activity_id: ActivityId,

    /// Outcome label on the source activity
    pub source_endpoint: String,

    /// Activity the transition leads to
    pub destination_activity_id: ActivityId,
}

impl Transition {
    /// Create a transition
    pub fn new(
        source: impl Into<String>,
        endpoint: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            source_activity_id: ActivityId(source.into()),
            source_endpoint: endpoint.into(),
            destination_activity_id: ActivityId(destination.into()),
        }
    }
}

/// Aggregate: a workflow graph made of activities and transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// ID of the workflow
    pub id: WorkflowDefinitionId,

    /// Human-readable name of the workflow
    pub name: String,

    /// Definition version
    pub version: u32,

    /// Disabled definitions are never started by a trigger
    pub is_enabled: bool,

    /// The activities in this workflow
    pub activities: Vec<ActivityRecord>,

    /// The transitions between activities
    pub transitions: Vec<Transition>,
}

impl WorkflowDefinition {
    /// Create an empty, enabled definition
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: WorkflowDefinitionId(id.into()),
            name: name.into(),
            version: 1,
            is_enabled: true,
            activities: Vec::new(),
            transitions: Vec::new(),
        }
    }

    /// Add an activity
    pub fn with_activity(mut self, activity: ActivityRecord) -> Self {
        self.activities.push(activity);
        self
    }

    /// Add a transition
    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Set the enabled flag
    pub fn enabled(mut self, is_enabled: bool) -> Self {
        self.is_enabled = is_enabled;
        self
    }

    /// Find an activity by id
    pub fn activity(&self, id: &ActivityId) -> Option<&ActivityRecord> {
        self.activities.iter().find(|a| &a.id == id)
    }

    /// The first activity flagged as start
    pub fn start_activity(&self) -> Option<&ActivityRecord> {
        self.activities.iter().find(|a| a.is_start)
    }

    /// Whether the definition has a start activity
    pub fn has_start(&self) -> bool {
        self.start_activity().is_some()
    }

    /// Kind name of the start activity, if any
    pub fn start_activity_name(&self) -> Option<&str> {
        self.start_activity().map(|a| a.name.as_str())
    }

    /// First transition leaving `source` through `outcome`
    pub fn transition_for(&self, source: &ActivityId, outcome: &str) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| &t.source_activity_id == source && t.source_endpoint == outcome)
    }

    /// Validate the graph structure
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut activity_ids = HashSet::new();
        for activity in &self.activities {
            if !activity_ids.insert(&activity.id) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate activity ID: {}",
                    activity.id
                )));
            }
        }

        let start_count = self.activities.iter().filter(|a| a.is_start).count();
        if start_count > 1 {
            return Err(CoreError::ValidationError(format!(
                "Workflow {} has {} start activities, at most one is allowed",
                self.id, start_count
            )));
        }

        for transition in &self.transitions {
            for endpoint in [
                &transition.source_activity_id,
                &transition.destination_activity_id,
            ] {
                if !activity_ids.contains(endpoint) {
                    return Err(CoreError::ValidationError(format!(
                        "Transition {} --{}--> {} references non-existent activity: {}",
                        transition.source_activity_id,
                        transition.source_endpoint,
                        transition.destination_activity_id,
                        endpoint
                    )));
                }
            }
        }

        Ok(())
    }
}
