use crate::application::lifecycle::LifecycleDispatcher;
use crate::domain::activity::{ActivityContext, ActivityRegistry};
use crate::domain::context::WorkflowContext;
use crate::domain::workflow_definition::ActivityRecord;
use crate::CoreError;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Traverses a workflow graph until every branch ends or blocks
pub struct ExecutionEngine {
    /// Resolves activity kinds
    registry: Arc<dyn ActivityRegistry>,

    /// Lifecycle broadcasts around each executed activity
    dispatcher: LifecycleDispatcher,

    /// Cap on executed activities per traversal
    max_activity_executions: usize,
}

impl ExecutionEngine {
    /// Create a new execution engine
    pub fn new(registry: Arc<dyn ActivityRegistry>, max_activity_executions: usize) -> Self {
        Self {
            dispatcher: LifecycleDispatcher::new(registry.clone()),
            registry,
            max_activity_executions,
        }
    }

    /// Build the per-visit context for an activity record
    pub fn create_activity_context(
        &self,
        record: ActivityRecord,
    ) -> Result<ActivityContext, CoreError> {
        let activity = self
            .registry
            .get(&record.name)
            .ok_or_else(|| CoreError::ActivityNotFound(record.name.clone()))?;
        Ok(ActivityContext::new(record, activity))
    }

    /// Run the graph starting at `start_activity`
    ///
    /// The start activity is always executed, even if its kind is an event.
    /// Every other event activity reached is collected instead of executed.
    /// Returns the collected activities without duplicates, in the order they
    /// were first reached. Outcomes follow `context.definition` as it stands
    /// after each execution, so activities may rewire the graph in place.
    pub async fn execute_workflow(
        &self,
        context: &mut WorkflowContext,
        start_activity: &ActivityRecord,
    ) -> Result<Vec<ActivityRecord>, CoreError> {
        let mut scheduled = vec![start_activity.clone()];
        let mut blocking: Vec<ActivityRecord> = Vec::new();
        let mut first_pass = true;
        let mut executions = 0usize;

        while let Some(record) = scheduled.pop() {
            let activity_context = self.create_activity_context(record)?;
            let activity = activity_context.activity().clone();

            if !first_pass && activity.is_event() {
                debug!(
                    workflow_instance_id = %context.instance.id,
                    activity_id = %activity_context.record().id,
                    "Blocking on event activity"
                );
                blocking.push(activity_context.record().clone());
                continue;
            }
            first_pass = false;

            let cancellation = self
                .dispatcher
                .activity_executing(context, &activity_context);
            if cancellation.is_cancellation_requested() {
                debug!(
                    workflow_instance_id = %context.instance.id,
                    activity_id = %activity_context.record().id,
                    "Activity execution cancelled"
                );
                continue;
            }

            executions += 1;
            if executions > self.max_activity_executions {
                return Err(CoreError::ExecutionLimitExceeded(
                    self.max_activity_executions,
                ));
            }

            trace!(
                workflow_instance_id = %context.instance.id,
                activity_id = %activity_context.record().id,
                activity = activity.name(),
                "Executing activity"
            );
            let outcomes = activity.execute(context, &activity_context).await?;

            self.dispatcher.activity_executed(context, &activity_context);

            let source_id = &activity_context.record().id;
            for outcome in &outcomes {
                let Some(transition) = context.definition.transition_for(source_id, &outcome.0)
                else {
                    debug!(
                        workflow_instance_id = %context.instance.id,
                        activity_id = %source_id,
                        outcome = %outcome,
                        "No transition for outcome"
                    );
                    continue;
                };

                let destination = context
                    .definition
                    .activity(&transition.destination_activity_id)
                    .cloned()
                    .ok_or_else(|| CoreError::ActivityRecordNotFound {
                        definition_id: context.definition.id.0.clone(),
                        activity_id: transition.destination_activity_id.0.clone(),
                    })?;
                scheduled.push(destination);
            }
        }

        let mut seen = HashSet::new();
        blocking.retain(|record| seen.insert(record.id.clone()));
        Ok(blocking)
    }
}
