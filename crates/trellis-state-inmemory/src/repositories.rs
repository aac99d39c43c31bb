use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use trellis_core::{
    ActivityId, AwaitingActivityMatch, CoreError, VersionCheck, WorkflowDefinition, WorkflowDefinitionId,
    WorkflowDefinitionRepository, WorkflowInstance, WorkflowInstanceId,
    WorkflowInstanceRepository,
};

/// One row of the awaiting-activities index
#[derive(Debug, Clone)]
struct AwaitingIndexEntry {
    instance_id: WorkflowInstanceId,
    activity_id: ActivityId,
    is_start: bool,
}

/// Workflow instances and their awaiting-activities index, kept consistent
/// under one lock
#[derive(Debug, Default)]
pub struct InstanceTable {
    instances: HashMap<String, WorkflowInstance>,
    awaiting_by_name: HashMap<String, Vec<AwaitingIndexEntry>>,
}

impl InstanceTable {
    fn stored_version(&self, id: &WorkflowInstanceId) -> u64 {
        self.instances.get(&id.0).map(|i| i.version).unwrap_or(0)
    }

    fn insert(&mut self, instance: WorkflowInstance) {
        self.unindex(&instance.id);
        for awaiting in &instance.awaiting_activities {
            self.awaiting_by_name
                .entry(awaiting.name.clone())
                .or_default()
                .push(AwaitingIndexEntry {
                    instance_id: instance.id.clone(),
                    activity_id: awaiting.activity_id.clone(),
                    is_start: awaiting.is_start,
                });
        }
        self.instances.insert(instance.id.0.clone(), instance);
    }

    fn remove(&mut self, id: &WorkflowInstanceId) -> Option<WorkflowInstance> {
        self.unindex(id);
        self.instances.remove(&id.0)
    }

    fn unindex(&mut self, id: &WorkflowInstanceId) {
        let Some(previous) = self.instances.get(&id.0) else {
            return;
        };
        for awaiting in &previous.awaiting_activities {
            if let Some(entries) = self.awaiting_by_name.get_mut(&awaiting.name) {
                entries.retain(|e| &e.instance_id != id);
                if entries.is_empty() {
                    self.awaiting_by_name.remove(&awaiting.name);
                }
            }
        }
    }
}

/// In-memory implementation of the WorkflowInstanceRepository
pub struct InMemoryWorkflowInstanceRepository {
    table: Arc<RwLock<InstanceTable>>,
}

impl InMemoryWorkflowInstanceRepository {
    /// Create a new in-memory workflow instance repository
    pub fn new(table: Arc<RwLock<InstanceTable>>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl WorkflowInstanceRepository for InMemoryWorkflowInstanceRepository {
    async fn find_by_id(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, CoreError> {
        let table = self.table.read().await;
        Ok(table.instances.get(&id.0).cloned())
    }

    async fn find_many(
        &self,
        ids: &[WorkflowInstanceId],
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        let table = self.table.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| table.instances.get(&id.0).cloned())
            .collect())
    }

    async fn save(
        &self,
        instance: &WorkflowInstance,
        check: VersionCheck,
    ) -> Result<u64, CoreError> {
        let mut table = self.table.write().await;
        check.verify(&instance.id, table.stored_version(&instance.id))?;

        let version = table.stored_version(&instance.id) + 1;
        table.insert(WorkflowInstance {
            version,
            ..instance.clone()
        });

        debug!(workflow_instance_id = %instance.id, version, "Saved workflow instance");
        Ok(version)
    }

    async fn delete(&self, id: &WorkflowInstanceId, check: VersionCheck) -> Result<(), CoreError> {
        let mut table = self.table.write().await;
        check.verify(id, table.stored_version(id))?;

        if table.remove(id).is_some() {
            debug!(workflow_instance_id = %id, "Deleted workflow instance");
        }
        Ok(())
    }

    async fn find_awaiting(
        &self,
        activity_name: &str,
        exclude_start: bool,
    ) -> Result<Vec<AwaitingActivityMatch>, CoreError> {
        let table = self.table.read().await;
        let Some(entries) = table.awaiting_by_name.get(activity_name) else {
            return Ok(Vec::new());
        };

        Ok(entries
            .iter()
            .filter(|e| !(exclude_start && e.is_start))
            .map(|e| AwaitingActivityMatch {
                instance_id: e.instance_id.clone(),
                activity_id: e.activity_id.clone(),
                activity_name: activity_name.to_string(),
            })
            .collect())
    }

    async fn find_all_for_definition(
        &self,
        definition_id: &WorkflowDefinitionId,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        let table = self.table.read().await;

        let mut matching: Vec<WorkflowInstance> = table
            .instances
            .values()
            .filter(|instance| &instance.definition_id == definition_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(matching)
    }
}

/// In-memory implementation of the WorkflowDefinitionRepository
pub struct InMemoryWorkflowDefinitionRepository {
    definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>,
}

impl InMemoryWorkflowDefinitionRepository {
    /// Create a new in-memory workflow definition repository
    pub fn new(definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>) -> Self {
        Self { definitions }
    }
}

#[async_trait]
impl WorkflowDefinitionRepository for InMemoryWorkflowDefinitionRepository {
    async fn find_by_id(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, CoreError> {
        let definitions = self.definitions.read().await;
        Ok(definitions.get(&id.0).cloned())
    }

    async fn save(&self, definition: &WorkflowDefinition) -> Result<(), CoreError> {
        let mut definitions = self.definitions.write().await;
        definitions.insert(definition.id.0.clone(), definition.clone());
        Ok(())
    }

    async fn delete(&self, id: &WorkflowDefinitionId) -> Result<(), CoreError> {
        let mut definitions = self.definitions.write().await;
        definitions.remove(&id.0);
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, CoreError> {
        let definitions = self.definitions.read().await;

        let mut all: Vec<WorkflowDefinition> = definitions.values().cloned().collect();
        all.sort_by(|a, b| a.id.0.cmp(&b.id.0));

        Ok(all)
    }

    async fn find_by_start_activity(
        &self,
        activity_name: &str,
    ) -> Result<Vec<WorkflowDefinition>, CoreError> {
        let definitions = self.definitions.read().await;

        let mut matching: Vec<WorkflowDefinition> = definitions
            .values()
            .filter(|d| d.is_enabled && d.start_activity_name() == Some(activity_name))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.0.cmp(&b.id.0));

        Ok(matching)
    }
}
