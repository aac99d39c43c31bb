//! Activity capability contract
//!
//! Every activity kind implements [`Activity`]. The engine never calls a
//! concrete type: it resolves a kind name through an [`ActivityRegistry`] and
//! talks to the trait object.

use crate::domain::context::WorkflowContext;
use crate::domain::workflow_definition::ActivityRecord;
use crate::CoreError;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

/// Outcome label produced by an activity execution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Outcome(pub String);

impl Outcome {
    /// Create an outcome label
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cooperative cancellation flag shared by one lifecycle broadcast
#[derive(Debug, Default)]
pub struct CancellationSignal {
    cancelled: AtomicBool,
}

impl CancellationSignal {
    /// Create a signal that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether any participant requested cancellation
    pub fn is_cancellation_requested(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A workflow activity kind
#[async_trait]
pub trait Activity: Send + Sync {
    /// Unique kind name
    fn name(&self) -> &str;

    /// Whether the kind can start a workflow
    fn is_start(&self) -> bool {
        false
    }

    /// Whether the kind blocks traversal until an external event matches it
    fn is_event(&self) -> bool {
        false
    }

    /// Guard evaluated before starting or resuming on this activity
    fn can_execute(
        &self,
        _context: &WorkflowContext,
        _activity_context: &ActivityContext,
    ) -> Result<bool, CoreError> {
        Ok(true)
    }

    /// Execute the activity and return the outcomes to follow
    async fn execute(
        &self,
        context: &mut WorkflowContext,
        activity_context: &ActivityContext,
    ) -> Result<Vec<Outcome>, CoreError>;

    /// Called on every registered kind before a workflow starts
    fn on_workflow_starting(&self, _context: &WorkflowContext, _cancellation: &CancellationSignal) {
    }

    /// Called on every registered kind once a workflow started
    fn on_workflow_started(&self, _context: &WorkflowContext) {}

    /// Called on every registered kind before a workflow resumes
    fn on_workflow_resuming(&self, _context: &WorkflowContext, _cancellation: &CancellationSignal) {
    }

    /// Called on every registered kind once a workflow resumed
    fn on_workflow_resumed(&self, _context: &WorkflowContext) {}

    /// Called on every registered kind before an activity executes
    fn on_activity_executing(
        &self,
        _context: &WorkflowContext,
        _activity_context: &ActivityContext,
        _cancellation: &CancellationSignal,
    ) {
    }

    /// Called on every registered kind after an activity executed
    fn on_activity_executed(&self, _context: &WorkflowContext, _activity_context: &ActivityContext) {
    }
}

/// One visit to an activity record
///
/// The state document is parsed on first access and cached only for the
/// lifetime of this context.
pub struct ActivityContext {
    record: ActivityRecord,
    activity: Arc<dyn Activity>,
    state: OnceCell<Value>,
}

impl ActivityContext {
    /// Create a context for `record` executed by `activity`
    pub fn new(record: ActivityRecord, activity: Arc<dyn Activity>) -> Self {
        Self {
            record,
            activity,
            state: OnceCell::new(),
        }
    }

    /// The activity record being visited
    pub fn record(&self) -> &ActivityRecord {
        &self.record
    }

    /// The resolved behavior
    pub fn activity(&self) -> &Arc<dyn Activity> {
        &self.activity
    }

    /// The parsed state document
    pub fn state(&self) -> Result<&Value, CoreError> {
        self.state
            .get_or_try_init(|| serde_json::from_str(&self.record.state).map_err(CoreError::from))
    }

    /// Whether the state document has been parsed yet
    pub fn is_state_loaded(&self) -> bool {
        self.state.get().is_some()
    }

    /// Deserialize the whole state document into `T`
    pub fn state_as<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        Ok(serde_json::from_value(self.state()?.clone())?)
    }

    /// Deserialize one top-level property of the state document
    pub fn property<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, CoreError> {
        match self.state()?.get(name) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for ActivityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityContext")
            .field("record", &self.record)
            .field("activity", &self.activity.name())
            .field("state_loaded", &self.is_state_loaded())
            .finish()
    }
}

/// Resolves activity kind names to behaviors
pub trait ActivityRegistry: Send + Sync {
    /// Look up a kind by name
    fn get(&self, name: &str) -> Option<Arc<dyn Activity>>;

    /// Every registered kind, in registration order
    fn list(&self) -> Vec<Arc<dyn Activity>>;
}

/// Default registry keeping kinds in registration order
#[derive(Default)]
pub struct ActivityLibrary {
    entries: RwLock<LibraryEntries>,
}

/// Kinds and their name index, always locked together
#[derive(Default)]
struct LibraryEntries {
    activities: Vec<Arc<dyn Activity>>,
    index: HashMap<String, usize>,
}

impl ActivityLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind; a kind with the same name is replaced in place
    pub fn register(&self, activity: Arc<dyn Activity>) -> Result<(), CoreError> {
        let mut entries = self.entries.write().map_err(|e| {
            CoreError::Other(format!("Failed to acquire activity registry lock: {}", e))
        })?;

        let name = activity.name().to_string();
        match entries.index.get(&name).copied() {
            Some(position) => entries.activities[position] = activity,
            None => {
                let position = entries.activities.len();
                entries.activities.push(activity);
                entries.index.insert(name.clone(), position);
            }
        }

        tracing::debug!(activity = %name, "Registered activity");
        Ok(())
    }

    /// Builder-style registration
    pub fn with(self, activity: Arc<dyn Activity>) -> Result<Self, CoreError> {
        self.register(activity)?;
        Ok(self)
    }

    // The index is only written after the push, so a poisoned lock still
    // guards consistent entries
    fn read(&self) -> RwLockReadGuard<'_, LibraryEntries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActivityRegistry for ActivityLibrary {
    fn get(&self, name: &str) -> Option<Arc<dyn Activity>> {
        let entries = self.read();
        entries
            .index
            .get(name)
            .and_then(|&i| entries.activities.get(i).cloned())
    }

    fn list(&self) -> Vec<Arc<dyn Activity>> {
        self.read().activities.clone()
    }
}
