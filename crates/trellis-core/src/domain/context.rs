use crate::domain::workflow_definition::WorkflowDefinition;
use crate::domain::workflow_instance::WorkflowInstance;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The entity an external event concerns
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityReference {
    /// Kind of entity, e.g. a content type
    pub kind: String,

    /// Identifier of the entity
    pub id: String,
}

impl EntityReference {
    /// Create an entity reference
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// Per-execution state shared by every activity of one run
///
/// Activities may mutate the definition and instance in place; whatever they
/// hold when the run halts is what the manager persists.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    /// Definition being executed
    pub definition: WorkflowDefinition,

    /// Instance being executed
    pub instance: WorkflowInstance,

    /// Entity the triggering event concerns
    pub target: Option<EntityReference>,

    /// Key/value environment produced by the trigger's context factory
    pub environment: HashMap<String, Value>,
}

impl WorkflowContext {
    /// Create a context without a target or environment
    pub fn new(definition: WorkflowDefinition, instance: WorkflowInstance) -> Self {
        Self {
            definition,
            instance,
            target: None,
            environment: HashMap::new(),
        }
    }

    /// Attach the triggering entity
    pub fn with_target(mut self, target: EntityReference) -> Self {
        self.target = Some(target);
        self
    }

    /// Attach the trigger environment
    pub fn with_environment(mut self, environment: HashMap<String, Value>) -> Self {
        self.environment = environment;
        self
    }

    /// Read an environment value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.environment.get(key)
    }

    /// Write an environment value
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.environment.insert(key.into(), value);
    }
}
