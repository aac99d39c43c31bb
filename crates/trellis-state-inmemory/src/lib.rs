//! In-memory workflow store for the Trellis Platform
//!
//! This crate provides in-memory implementations of the repository
//! interfaces defined in trellis-core. It is useful for development,
//! testing, and simple deployments where persistence is not required.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{
    InMemoryWorkflowDefinitionRepository, InMemoryWorkflowInstanceRepository, InstanceTable,
};

use trellis_core::{WorkflowDefinition, WorkflowDefinitionRepository, WorkflowInstanceRepository};


/// Provider for in-memory workflow store repositories
///
/// Repositories created by the same provider share their storage.
#[derive(Clone, Default)]
pub struct InMemoryStateStoreProvider {
    // Shared storage for workflow instances and the awaiting index
    instances: Arc<RwLock<InstanceTable>>,

    // Shared storage for workflow definitions
    definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>,
}

impl InMemoryStateStoreProvider {
    /// Create a new in-memory state store provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the definition and instance repositories
    pub fn create_repositories(
        &self,
    ) -> (
        Arc<dyn WorkflowDefinitionRepository>,
        Arc<dyn WorkflowInstanceRepository>,
    ) {
        let definition_repo = Arc::new(InMemoryWorkflowDefinitionRepository::new(
            self.definitions.clone(),
        ));
        let instance_repo = Arc::new(InMemoryWorkflowInstanceRepository::new(
            self.instances.clone(),
        ));

        (definition_repo, instance_repo)
    }
}
