//! Repository traits for the Trellis Core
//!
//! This module defines the store interfaces used by the workflow manager.
//! External crates implement these traits to provide different persistence
//! mechanisms. Every call is a suspension point.

use async_trait::async_trait;

use super::workflow_definition::{ActivityId, WorkflowDefinition, WorkflowDefinitionId};
use super::workflow_instance::{WorkflowInstance, WorkflowInstanceId};
use crate::CoreError;

/// Whether a save or delete must match the stored instance version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// Last writer wins
    Skip,
    /// Fail with [`CoreError::ConcurrencyConflict`] unless the stored version
    /// equals this one; an instance that was never stored has version 0
    Expect(u64),
}

impl VersionCheck {
    /// Compare against the version currently stored for `instance_id`
    pub fn verify(&self, instance_id: &WorkflowInstanceId, stored: u64) -> Result<(), CoreError> {
        match *self {
            VersionCheck::Expect(expected) if expected != stored => {
                Err(CoreError::ConcurrencyConflict {
                    instance_id: instance_id.0.clone(),
                    expected,
                    actual: stored,
                })
            }
            _ => Ok(()),
        }
    }
}

/// One row of the awaiting-activities index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwaitingActivityMatch {
    /// Instance that is halted
    pub instance_id: WorkflowInstanceId,

    /// Activity it is halted on
    pub activity_id: ActivityId,

    /// Kind name of that activity
    pub activity_name: String,
}

/// Repository for workflow definitions
#[async_trait]
pub trait WorkflowDefinitionRepository: Send + Sync {
    /// Find a workflow definition by ID
    async fn find_by_id(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, CoreError>;

    /// Save a workflow definition
    async fn save(&self, definition: &WorkflowDefinition) -> Result<(), CoreError>;

    /// Delete a workflow definition
    async fn delete(&self, id: &WorkflowDefinitionId) -> Result<(), CoreError>;

    /// Get all workflow definitions
    async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, CoreError>;

    /// Enabled definitions whose start activity has kind `activity_name`
    async fn find_by_start_activity(
        &self,
        activity_name: &str,
    ) -> Result<Vec<WorkflowDefinition>, CoreError>;
}

/// Repository for workflow instances
#[async_trait]
pub trait WorkflowInstanceRepository: Send + Sync {
    /// Find a workflow instance by ID
    async fn find_by_id(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, CoreError>;

    /// Load several instances at once; unknown ids are left out
    async fn find_many(
        &self,
        ids: &[WorkflowInstanceId],
    ) -> Result<Vec<WorkflowInstance>, CoreError>;

    /// Save a workflow instance and return its new version
    async fn save(&self, instance: &WorkflowInstance, check: VersionCheck)
        -> Result<u64, CoreError>;

    /// Delete a workflow instance
    async fn delete(&self, id: &WorkflowInstanceId, check: VersionCheck) -> Result<(), CoreError>;

    /// Instances halted on an activity of kind `activity_name`
    async fn find_awaiting(
        &self,
        activity_name: &str,
        exclude_start: bool,
    ) -> Result<Vec<AwaitingActivityMatch>, CoreError>;

    /// Find all workflow instances for a workflow definition
    async fn find_all_for_definition(
        &self,
        definition_id: &WorkflowDefinitionId,
    ) -> Result<Vec<WorkflowInstance>, CoreError>;
}

/// Simple in-memory repositories, handy for tests and embedding
pub mod memory {
    use super::*;
    use dashmap::mapref::entry::Entry;
    use dashmap::DashMap;
    use std::sync::Arc;

    /// In-memory implementation of the workflow definition repository
    #[derive(Default)]
    pub struct MemoryWorkflowDefinitionRepository {
        definitions: Arc<DashMap<String, WorkflowDefinition>>,
    }

    impl MemoryWorkflowDefinitionRepository {
        /// Create a new memory workflow definition repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl WorkflowDefinitionRepository for MemoryWorkflowDefinitionRepository {
        async fn find_by_id(
            &self,
            id: &WorkflowDefinitionId,
        ) -> Result<Option<WorkflowDefinition>, CoreError> {
            Ok(self.definitions.get(&id.0).map(|d| d.clone()))
        }

        async fn save(&self, definition: &WorkflowDefinition) -> Result<(), CoreError> {
            self.definitions
                .insert(definition.id.0.clone(), definition.clone());
            Ok(())
        }

        async fn delete(&self, id: &WorkflowDefinitionId) -> Result<(), CoreError> {
            self.definitions.remove(&id.0);
            Ok(())
        }

        async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, CoreError> {
            let mut all: Vec<WorkflowDefinition> =
                self.definitions.iter().map(|d| d.value().clone()).collect();
            all.sort_by(|a, b| a.id.0.cmp(&b.id.0));
            Ok(all)
        }

        async fn find_by_start_activity(
            &self,
            activity_name: &str,
        ) -> Result<Vec<WorkflowDefinition>, CoreError> {
            let mut matches: Vec<WorkflowDefinition> = self
                .definitions
                .iter()
                .filter(|d| d.is_enabled && d.start_activity_name() == Some(activity_name))
                .map(|d| d.value().clone())
                .collect();
            matches.sort_by(|a, b| a.id.0.cmp(&b.id.0));
            Ok(matches)
        }
    }

    /// In-memory implementation of the workflow instance repository
    #[derive(Default)]
    pub struct MemoryWorkflowInstanceRepository {
        instances: Arc<DashMap<String, WorkflowInstance>>,
    }

    impl MemoryWorkflowInstanceRepository {
        /// Create a new memory workflow instance repository
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of stored instances
        pub fn len(&self) -> usize {
            self.instances.len()
        }

        /// Whether the repository holds no instance
        pub fn is_empty(&self) -> bool {
            self.instances.is_empty()
        }

        fn sorted(&self) -> Vec<WorkflowInstance> {
            let mut all: Vec<WorkflowInstance> =
                self.instances.iter().map(|i| i.value().clone()).collect();
            all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
            all
        }
    }

    #[async_trait]
    impl WorkflowInstanceRepository for MemoryWorkflowInstanceRepository {
        async fn find_by_id(
            &self,
            id: &WorkflowInstanceId,
        ) -> Result<Option<WorkflowInstance>, CoreError> {
            Ok(self.instances.get(&id.0).map(|i| i.clone()))
        }

        async fn find_many(
            &self,
            ids: &[WorkflowInstanceId],
        ) -> Result<Vec<WorkflowInstance>, CoreError> {
            Ok(ids
                .iter()
                .filter_map(|id| self.instances.get(&id.0).map(|i| i.clone()))
                .collect())
        }

        async fn save(
            &self,
            instance: &WorkflowInstance,
            check: VersionCheck,
        ) -> Result<u64, CoreError> {
            match self.instances.entry(instance.id.0.clone()) {
                Entry::Occupied(mut entry) => {
                    check.verify(&instance.id, entry.get().version)?;
                    let version = entry.get().version + 1;
                    entry.insert(WorkflowInstance {
                        version,
                        ..instance.clone()
                    });
                    Ok(version)
                }
                Entry::Vacant(entry) => {
                    check.verify(&instance.id, 0)?;
                    entry.insert(WorkflowInstance {
                        version: 1,
                        ..instance.clone()
                    });
                    Ok(1)
                }
            }
        }

        async fn delete(
            &self,
            id: &WorkflowInstanceId,
            check: VersionCheck,
        ) -> Result<(), CoreError> {
            match self.instances.entry(id.0.clone()) {
                Entry::Occupied(entry) => {
                    check.verify(id, entry.get().version)?;
                    entry.remove();
                    Ok(())
                }
                Entry::Vacant(_) => check.verify(id, 0),
            }
        }

        async fn find_awaiting(
            &self,
            activity_name: &str,
            exclude_start: bool,
        ) -> Result<Vec<AwaitingActivityMatch>, CoreError> {
            Ok(self
                .sorted()
                .into_iter()
                .flat_map(|instance| {
                    instance
                        .awaiting_activities
                        .into_iter()
                        .filter(|a| a.name == activity_name && !(exclude_start && a.is_start))
                        .map(move |a| AwaitingActivityMatch {
                            instance_id: instance.id.clone(),
                            activity_id: a.activity_id,
                            activity_name: a.name,
                        })
                })
                .collect())
        }

        async fn find_all_for_definition(
            &self,
            definition_id: &WorkflowDefinitionId,
        ) -> Result<Vec<WorkflowInstance>, CoreError> {
            Ok(self
                .sorted()
                .into_iter()
                .filter(|i| &i.definition_id == definition_id)
                .collect())
        }
    }
}
