use crate::domain::activity::{Activity, ActivityContext, ActivityRegistry, CancellationSignal};
use crate::domain::context::WorkflowContext;
use std::sync::Arc;

/// Broadcasts lifecycle notifications to every registered activity kind
///
/// Participants run synchronously in registry order. The cancellable
/// checkpoints hand the same fresh [`CancellationSignal`] to every participant
/// and return it once the whole broadcast is done.
#[derive(Clone)]
pub struct LifecycleDispatcher {
    registry: Arc<dyn ActivityRegistry>,
}

impl LifecycleDispatcher {
    /// Create a dispatcher over `registry`
    pub fn new(registry: Arc<dyn ActivityRegistry>) -> Self {
        Self { registry }
    }

    /// Signal that a workflow is about to start
    pub fn workflow_starting(&self, context: &WorkflowContext) -> CancellationSignal {
        let cancellation = CancellationSignal::new();
        self.invoke_activities(|a| a.on_workflow_starting(context, &cancellation));
        cancellation
    }

    /// Signal that a workflow has started
    pub fn workflow_started(&self, context: &WorkflowContext) {
        self.invoke_activities(|a| a.on_workflow_started(context));
    }

    /// Signal that a workflow is about to resume
    pub fn workflow_resuming(&self, context: &WorkflowContext) -> CancellationSignal {
        let cancellation = CancellationSignal::new();
        self.invoke_activities(|a| a.on_workflow_resuming(context, &cancellation));
        cancellation
    }

    /// Signal that a workflow resumed
    pub fn workflow_resumed(&self, context: &WorkflowContext) {
        self.invoke_activities(|a| a.on_workflow_resumed(context));
    }

    /// Signal that an activity is about to execute
    pub fn activity_executing(
        &self,
        context: &WorkflowContext,
        activity_context: &ActivityContext,
    ) -> CancellationSignal {
        let cancellation = CancellationSignal::new();
        self.invoke_activities(|a| {
            a.on_activity_executing(context, activity_context, &cancellation)
        });
        cancellation
    }

    /// Signal that an activity executed
    pub fn activity_executed(&self, context: &WorkflowContext, activity_context: &ActivityContext) {
        self.invoke_activities(|a| a.on_activity_executed(context, activity_context));
    }

    fn invoke_activities(&self, action: impl Fn(&dyn Activity)) {
        for activity in self.registry.list() {
            action(activity.as_ref());
        }
    }
}
