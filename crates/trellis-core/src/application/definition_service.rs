use crate::{
    domain::activity::ActivityRegistry,
    domain::repository::{VersionCheck, WorkflowDefinitionRepository, WorkflowInstanceRepository},
    domain::workflow_definition::{WorkflowDefinition, WorkflowDefinitionId},
    domain::workflow_instance::WorkflowInstance,
    CoreError,
};
use std::sync::Arc;

/// Service for managing workflow definitions
pub struct WorkflowDefinitionService {
    /// Repository for workflow definitions
    definition_repo: Arc<dyn WorkflowDefinitionRepository>,

    /// Repository for workflow instances
    instance_repo: Arc<dyn WorkflowInstanceRepository>,

    /// Used to check that every activity kind exists
    registry: Arc<dyn ActivityRegistry>,
}

impl WorkflowDefinitionService {
    /// Create a new workflow definition service
    pub fn new(
        definition_repo: Arc<dyn WorkflowDefinitionRepository>,
        instance_repo: Arc<dyn WorkflowInstanceRepository>,
        registry: Arc<dyn ActivityRegistry>,
    ) -> Self {
        Self {
            definition_repo,
            instance_repo,
            registry,
        }
    }

    /// Validate and store a workflow definition
    pub async fn deploy(&self, definition: WorkflowDefinition) -> Result<(), CoreError> {
        definition.validate()?;

        if let Some(unknown) = definition
            .activities
            .iter()
            .find(|a| self.registry.get(&a.name).is_none())
        {
            return Err(CoreError::ValidationError(format!(
                "Activity {} uses unregistered kind {}",
                unknown.id, unknown.name
            )));
        }

        self.definition_repo.save(&definition).await?;

        tracing::info!(
            workflow_definition_id = %definition.id,
            start_activity = definition.start_activity_name().unwrap_or("none"),
            enabled = definition.is_enabled,
            "Workflow deployed"
        );

        Ok(())
    }

    /// Get a workflow definition
    pub async fn get(&self, id: &WorkflowDefinitionId) -> Result<WorkflowDefinition, CoreError> {
        self.definition_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::WorkflowDefinitionNotFound(id.0.clone()))
    }

    /// Enable or disable a workflow definition
    pub async fn set_enabled(
        &self,
        id: &WorkflowDefinitionId,
        enabled: bool,
    ) -> Result<WorkflowDefinition, CoreError> {
        let mut definition = self.get(id).await?;
        definition.is_enabled = enabled;
        self.definition_repo.save(&definition).await?;

        tracing::info!(workflow_definition_id = %id, enabled, "Workflow enabled flag changed");
        Ok(definition)
    }

    /// Delete a workflow definition together with its halted instances
    pub async fn undeploy(&self, id: &WorkflowDefinitionId) -> Result<(), CoreError> {
        let instances = self.instance_repo.find_all_for_definition(id).await?;

        for instance in &instances {
            self.instance_repo
                .delete(&instance.id, VersionCheck::Skip)
                .await?;
        }

        self.definition_repo.delete(id).await?;

        tracing::info!(
            workflow_definition_id = %id,
            instances_deleted = instances.len(),
            "Workflow undeployed"
        );

        Ok(())
    }

    /// Halted instances of a workflow definition
    pub async fn list_instances(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        self.instance_repo.find_all_for_definition(id).await
    }
}
