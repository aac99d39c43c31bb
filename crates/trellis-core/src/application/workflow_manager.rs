use crate::application::execution_engine::ExecutionEngine;
use crate::application::instance_lock::InstanceLocks;
use crate::application::lifecycle::LifecycleDispatcher;
use crate::config::{ConcurrencyPolicy, EngineConfig};
use crate::domain::activity::{Activity, ActivityContext, ActivityRegistry};
use crate::domain::context::{EntityReference, WorkflowContext};
use crate::domain::events::{
    DomainEvent, DomainEventHandler, TracingEventHandler, WorkflowAborted,
    WorkflowInstanceCompleted, WorkflowInstanceHalted, WorkflowInstanceResumed,
};
use crate::domain::repository::{
    AwaitingActivityMatch, VersionCheck, WorkflowDefinitionRepository, WorkflowInstanceRepository,
};
use crate::domain::workflow_definition::{ActivityRecord, WorkflowDefinition};
use crate::domain::workflow_instance::{WorkflowInstance, WorkflowInstanceId};
use crate::CoreError;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a start or resume ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowRunStatus {
    /// A lifecycle participant cancelled; nothing was persisted
    Aborted,
    /// Nothing is awaited anymore; a resumed instance was deleted
    Completed,
    /// The instance was saved with its awaiting activities
    Halted,
}

/// Orchestration entry point: turns external events into workflow starts
/// and resumes
///
/// Share one manager (e.g. behind an `Arc`) between concurrent callers so the
/// [`ConcurrencyPolicy::Exclusive`] locks are shared too.
pub struct WorkflowManager {
    /// Repository for workflow definitions
    definition_repo: Arc<dyn WorkflowDefinitionRepository>,

    /// Repository for workflow instances
    instance_repo: Arc<dyn WorkflowInstanceRepository>,

    /// Activity kinds
    registry: Arc<dyn ActivityRegistry>,

    /// Graph traversal
    engine: ExecutionEngine,

    /// Workflow-level lifecycle broadcasts
    dispatcher: LifecycleDispatcher,

    /// Receives instance lifecycle events
    event_handler: Arc<dyn DomainEventHandler>,

    /// Engine configuration
    config: EngineConfig,

    /// Per-instance locks for the exclusive policy
    locks: InstanceLocks,
}

impl WorkflowManager {
    /// Create a new workflow manager
    pub fn new(
        definition_repo: Arc<dyn WorkflowDefinitionRepository>,
        instance_repo: Arc<dyn WorkflowInstanceRepository>,
        registry: Arc<dyn ActivityRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            engine: ExecutionEngine::new(registry.clone(), config.max_activity_executions),
            dispatcher: LifecycleDispatcher::new(registry.clone()),
            definition_repo,
            instance_repo,
            registry,
            event_handler: Arc::new(TracingEventHandler),
            config,
            locks: InstanceLocks::new(),
        }
    }

    /// Replace the default (logging) event handler
    pub fn with_event_handler(mut self, event_handler: Arc<dyn DomainEventHandler>) -> Self {
        self.event_handler = event_handler;
        self
    }

    /// The engine configuration in use
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The execution engine
    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Handle an external event
    ///
    /// Resumes every instance halted on a non-start activity of kind `name`,
    /// then starts every enabled definition whose start activity has that
    /// kind. Candidates whose guard returns `false` or fails are skipped.
    /// `context_factory` is called once; its map is copied into every
    /// workflow context built for this event.
    pub async fn trigger_event<F>(
        &self,
        name: &str,
        target: EntityReference,
        context_factory: F,
    ) -> Result<(), CoreError>
    where
        F: FnOnce() -> HashMap<String, Value> + Send,
    {
        let environment = context_factory();

        let Some(event_activity) = self.registry.get(name) else {
            error!(event = name, "Activity {} was not found", name);
            return Ok(());
        };

        // Find candidates
        let workflows_to_start = self.definition_repo.find_by_start_activity(name).await?;
        let awaiting = self.instance_repo.find_awaiting(name, true).await?;

        if workflows_to_start.is_empty() && awaiting.is_empty() {
            debug!(event = name, "No workflow is interested in this event");
            return Ok(());
        }

        info!(
            event = name,
            starts = workflows_to_start.len(),
            resumes = awaiting.len(),
            "Triggering event"
        );

        // Resume halted workflows
        let ids: Vec<WorkflowInstanceId> = awaiting.iter().map(|m| m.instance_id.clone()).collect();
        let mut working: HashMap<WorkflowInstanceId, WorkflowInstance> = self
            .instance_repo
            .find_many(&ids)
            .await?
            .into_iter()
            .map(|instance| (instance.id.clone(), instance))
            .collect();

        for candidate in &awaiting {
            let trigger = Trigger {
                event_activity: &event_activity,
                target: &target,
                environment: &environment,
            };

            if self.config.concurrency_policy == ConcurrencyPolicy::Exclusive {
                let guard = self.locks.acquire(&candidate.instance_id).await;
                let result = self.resume_candidate(&trigger, candidate, &mut working).await;
                drop(guard);
                self.locks.release(&candidate.instance_id);
                result?;
            } else {
                self.resume_candidate(&trigger, candidate, &mut working)
                    .await?;
            }
        }

        // Start new workflows
        for definition in workflows_to_start {
            let Some(start_activity) = definition.start_activity().cloned() else {
                warn!(
                    workflow_definition_id = %definition.id,
                    "Definition has no start activity"
                );
                continue;
            };

            let instance = WorkflowInstance::new(definition.id.clone());
            let mut context = WorkflowContext::new(definition, instance)
                .with_target(target.clone())
                .with_environment(environment.clone());
            let activity_context =
                ActivityContext::new(start_activity.clone(), event_activity.clone());

            if !self.evaluate_guard(name, &*event_activity, &context, &activity_context) {
                continue;
            }

            let result = self.start_workflow(&mut context, &start_activity).await;
            self.tolerate_conflict(result, &context.instance.id)?;
        }

        Ok(())
    }

    /// Start a workflow at `start_activity`
    ///
    /// Persists the definition and the instance only if the run halted.
    pub async fn start_workflow(
        &self,
        context: &mut WorkflowContext,
        start_activity: &ActivityRecord,
    ) -> Result<WorkflowRunStatus, CoreError> {
        let cancellation = self.dispatcher.workflow_starting(context);
        if cancellation.is_cancellation_requested() {
            info!(
                workflow_definition_id = %context.definition.id,
                workflow_instance_id = %context.instance.id,
                "Workflow start cancelled"
            );
            self.publish(WorkflowAborted {
                workflow_instance_id: context.instance.id.clone(),
                checkpoint: "starting",
                timestamp: Utc::now(),
            })
            .await;
            return Ok(WorkflowRunStatus::Aborted);
        }

        self.dispatcher.workflow_started(context);

        let blocked_on = self.engine.execute_workflow(context, start_activity).await?;

        if blocked_on.is_empty() {
            info!(
                workflow_definition_id = %context.definition.id,
                workflow_instance_id = %context.instance.id,
                "Workflow ran to completion"
            );
            self.publish(WorkflowInstanceCompleted {
                workflow_instance_id: context.instance.id.clone(),
                workflow_definition_id: context.definition.id.clone(),
                timestamp: Utc::now(),
            })
            .await;
            return Ok(WorkflowRunStatus::Completed);
        }

        self.definition_repo.save(&context.definition).await?;
        context.instance.add_awaiting_activities(&blocked_on);
        self.persist(context).await?;

        Ok(WorkflowRunStatus::Halted)
    }

    /// Resume a halted instance at `blocking_activity`
    ///
    /// Deletes the instance once nothing is awaited anymore, otherwise saves
    /// it with the newly blocked activities appended.
    pub async fn resume_workflow(
        &self,
        context: &mut WorkflowContext,
        blocking_activity: &ActivityRecord,
    ) -> Result<WorkflowRunStatus, CoreError> {
        let cancellation = self.dispatcher.workflow_resuming(context);
        if cancellation.is_cancellation_requested() {
            info!(
                workflow_instance_id = %context.instance.id,
                activity_id = %blocking_activity.id,
                "Workflow resume cancelled"
            );
            self.publish(WorkflowAborted {
                workflow_instance_id: context.instance.id.clone(),
                checkpoint: "resuming",
                timestamp: Utc::now(),
            })
            .await;
            return Ok(WorkflowRunStatus::Aborted);
        }

        self.dispatcher.workflow_resumed(context);
        self.publish(WorkflowInstanceResumed {
            workflow_instance_id: context.instance.id.clone(),
            activity_id: blocking_activity.id.clone(),
            timestamp: Utc::now(),
        })
        .await;

        context
            .instance
            .remove_awaiting_activity(&blocking_activity.id)
            .ok_or_else(|| CoreError::AwaitingActivityMissing {
                instance_id: context.instance.id.0.clone(),
                activity_id: blocking_activity.id.0.clone(),
            })?;

        let blocked_on = self
            .engine
            .execute_workflow(context, blocking_activity)
            .await?;

        if blocked_on.is_empty() && context.instance.has_no_awaiting_activities() {
            self.instance_repo
                .delete(&context.instance.id, self.version_check(&context.instance))
                .await?;
            info!(
                workflow_definition_id = %context.definition.id,
                workflow_instance_id = %context.instance.id,
                "Workflow completed"
            );
            self.publish(WorkflowInstanceCompleted {
                workflow_instance_id: context.instance.id.clone(),
                workflow_definition_id: context.definition.id.clone(),
                timestamp: Utc::now(),
            })
            .await;
            return Ok(WorkflowRunStatus::Completed);
        }

        context.instance.add_awaiting_activities(&blocked_on);
        self.persist(context).await?;

        Ok(WorkflowRunStatus::Halted)
    }

    async fn resume_candidate(
        &self,
        trigger: &Trigger<'_>,
        candidate: &AwaitingActivityMatch,
        working: &mut HashMap<WorkflowInstanceId, WorkflowInstance>,
    ) -> Result<(), CoreError> {
        let name = trigger.event_activity.name();

        // Under the exclusive policy an earlier holder of the lock may have
        // changed the instance since it was batch-loaded
        let instance = if self.config.concurrency_policy == ConcurrencyPolicy::Exclusive {
            let reloaded = self.instance_repo.find_by_id(&candidate.instance_id).await?;
            match reloaded {
                Some(instance) if instance.is_awaiting(&candidate.activity_id) => instance,
                Some(_) => {
                    debug!(
                        workflow_instance_id = %candidate.instance_id,
                        activity_id = %candidate.activity_id,
                        "Instance no longer awaits this activity"
                    );
                    return Ok(());
                }
                None => {
                    warn!(
                        workflow_instance_id = %candidate.instance_id,
                        "Workflow instance vanished before resume"
                    );
                    working.remove(&candidate.instance_id);
                    return Ok(());
                }
            }
        } else {
            match working.get(&candidate.instance_id) {
                Some(instance) => instance.clone(),
                None => {
                    warn!(
                        workflow_instance_id = %candidate.instance_id,
                        "Workflow instance vanished before resume"
                    );
                    return Ok(());
                }
            }
        };

        // Find workflow definition
        let Some(definition) = self
            .definition_repo
            .find_by_id(&instance.definition_id)
            .await?
        else {
            warn!(
                workflow_instance_id = %instance.id,
                workflow_definition_id = %instance.definition_id,
                "Workflow definition not found, skipping halted instance"
            );
            return Ok(());
        };

        let record = find_record(&definition, candidate)?;
        let mut context = WorkflowContext::new(definition, instance)
            .with_target(trigger.target.clone())
            .with_environment(trigger.environment.clone());
        let activity_context = ActivityContext::new(record.clone(), trigger.event_activity.clone());

        if !self.evaluate_guard(name, &**trigger.event_activity, &context, &activity_context) {
            return Ok(());
        }

        let result = self.resume_workflow(&mut context, &record).await;
        let status = self.tolerate_conflict(result, &context.instance.id)?;

        match status {
            Some(WorkflowRunStatus::Completed) | None => {
                working.remove(&context.instance.id);
            }
            Some(_) => {
                working.insert(context.instance.id.clone(), context.instance);
            }
        }

        Ok(())
    }

    /// Run the event kind's guard; failures are logged and count as `false`
    fn evaluate_guard(
        &self,
        name: &str,
        event_activity: &dyn Activity,
        context: &WorkflowContext,
        activity_context: &ActivityContext,
    ) -> bool {
        match event_activity.can_execute(context, activity_context) {
            Ok(true) => true,
            Ok(false) => {
                debug!(
                    event = name,
                    workflow_instance_id = %context.instance.id,
                    activity_id = %activity_context.record().id,
                    "Guard declined the event"
                );
                false
            }
            Err(e) => {
                error!(
                    event = name,
                    workflow_instance_id = %context.instance.id,
                    activity_id = %activity_context.record().id,
                    "Error while evaluating an activity condition on {}: {}",
                    name,
                    e
                );
                false
            }
        }
    }

    /// Under the optimistic policy a lost race skips the candidate
    fn tolerate_conflict(
        &self,
        result: Result<WorkflowRunStatus, CoreError>,
        instance_id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowRunStatus>, CoreError> {
        match result {
            Ok(status) => Ok(Some(status)),
            Err(e @ CoreError::ConcurrencyConflict { .. })
                if self.config.concurrency_policy == ConcurrencyPolicy::Optimistic =>
            {
                warn!(
                    workflow_instance_id = %instance_id,
                    error = %e,
                    "Skipping workflow instance changed by a concurrent trigger"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn version_check(&self, instance: &WorkflowInstance) -> VersionCheck {
        match self.config.concurrency_policy {
            ConcurrencyPolicy::Optimistic => VersionCheck::Expect(instance.version),
            ConcurrencyPolicy::Unguarded | ConcurrencyPolicy::Exclusive => VersionCheck::Skip,
        }
    }

    /// Save a halted instance and announce it
    async fn persist(&self, context: &mut WorkflowContext) -> Result<(), CoreError> {
        let version = self
            .instance_repo
            .save(&context.instance, self.version_check(&context.instance))
            .await?;
        context.instance.version = version;

        info!(
            workflow_definition_id = %context.definition.id,
            workflow_instance_id = %context.instance.id,
            awaiting = context.instance.awaiting_activities.len(),
            "Workflow halted"
        );
        self.publish(WorkflowInstanceHalted {
            workflow_instance_id: context.instance.id.clone(),
            workflow_definition_id: context.definition.id.clone(),
            awaiting: context
                .instance
                .awaiting_activities
                .iter()
                .map(|a| a.activity_id.clone())
                .collect(),
            timestamp: Utc::now(),
        })
        .await;
        Ok(())
    }

    async fn publish(&self, event: impl DomainEvent + 'static) {
        let event_type = event.event_type();
        if let Err(e) = self.event_handler.handle_event(Box::new(event)).await {
            warn!(event_type, error = %e, "Event handler failed");
        }
    }
}

/// What every candidate of one trigger shares
struct Trigger<'a> {
    event_activity: &'a Arc<dyn Activity>,
    target: &'a EntityReference,
    environment: &'a HashMap<String, Value>,
}

fn find_record(
    definition: &WorkflowDefinition,
    candidate: &AwaitingActivityMatch,
) -> Result<ActivityRecord, CoreError> {
    definition
        .activity(&candidate.activity_id)
        .cloned()
        .ok_or_else(|| CoreError::ActivityRecordNotFound {
            definition_id: definition.id.0.clone(),
            activity_id: candidate.activity_id.0.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::activity::{ActivityLibrary, CancellationSignal, Outcome};
    use crate::domain::repository::memory::{
        MemoryWorkflowDefinitionRepository, MemoryWorkflowInstanceRepository,
    };
    use crate::domain::workflow_definition::{ActivityId, Transition, WorkflowDefinitionId};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Init;

    #[async_trait]
    impl Activity for Init {
        fn name(&self) -> &str {
            "Init"
        }

        fn is_start(&self) -> bool {
            true
        }

        fn is_event(&self) -> bool {
            true
        }

        async fn execute(
            &self,
            context: &mut WorkflowContext,
            _activity_context: &ActivityContext,
        ) -> Result<Vec<Outcome>, CoreError> {
            context.set("initialized", json!(true));
            Ok(vec![Outcome::new("Done")])
        }
    }

    /// Blocking activity whose guard reads `{"approver": ...}` from its state
    #[derive(Default)]
    struct WaitForApproval {
        executions: AtomicUsize,
    }

    #[async_trait]
    impl Activity for WaitForApproval {
        fn name(&self) -> &str {
            "WaitForApproval"
        }

        fn is_event(&self) -> bool {
            true
        }

        fn can_execute(
            &self,
            context: &WorkflowContext,
            activity_context: &ActivityContext,
        ) -> Result<bool, CoreError> {
            let Some(approver) = activity_context.property::<String>("approver")? else {
                return Ok(true);
            };
            match context.get("user").and_then(Value::as_str) {
                Some(user) => Ok(user == approver),
                None => Err(CoreError::ConditionEvaluationError(
                    "no user in the environment".to_string(),
                )),
            }
        }

        async fn execute(
            &self,
            _context: &mut WorkflowContext,
            _activity_context: &ActivityContext,
        ) -> Result<Vec<Outcome>, CoreError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Outcome::new("Approved")])
        }
    }

    /// Cancels the configured checkpoints
    #[derive(Default)]
    struct Gatekeeper {
        block_start: AtomicBool,
        block_resume: AtomicBool,
    }

    #[async_trait]
    impl Activity for Gatekeeper {
        fn name(&self) -> &str {
            "Gatekeeper"
        }

        async fn execute(
            &self,
            _context: &mut WorkflowContext,
            _activity_context: &ActivityContext,
        ) -> Result<Vec<Outcome>, CoreError> {
            Ok(vec![])
        }

        fn on_workflow_starting(&self, _context: &WorkflowContext, cancellation: &CancellationSignal) {
            if self.block_start.load(Ordering::SeqCst) {
                cancellation.cancel();
            }
        }

        fn on_workflow_resuming(&self, _context: &WorkflowContext, cancellation: &CancellationSignal) {
            if self.block_resume.load(Ordering::SeqCst) {
                cancellation.cancel();
            }
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl DomainEventHandler for RecordingHandler {
        async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError> {
            self.events.lock().unwrap().push(event.event_type());
            Ok(())
        }
    }

    struct Fixture {
        manager: WorkflowManager,
        definitions: Arc<MemoryWorkflowDefinitionRepository>,
        instances: Arc<MemoryWorkflowInstanceRepository>,
        wait: Arc<WaitForApproval>,
        gatekeeper: Arc<Gatekeeper>,
        events: Arc<RecordingHandler>,
    }

    fn fixture(config: EngineConfig) -> Fixture {
        let definitions = Arc::new(MemoryWorkflowDefinitionRepository::new());
        let instances = Arc::new(MemoryWorkflowInstanceRepository::new());
        let wait = Arc::new(WaitForApproval::default());
        let gatekeeper = Arc::new(Gatekeeper::default());
        let events = Arc::new(RecordingHandler::default());

        let library = ActivityLibrary::new();
        library.register(Arc::new(Init)).unwrap();
        library.register(wait.clone()).unwrap();
        library.register(gatekeeper.clone()).unwrap();

        let manager = WorkflowManager::new(
            definitions.clone(),
            instances.clone(),
            Arc::new(library),
            config,
        )
        .with_event_handler(events.clone());

        Fixture {
            manager,
            definitions,
            instances,
            wait,
            gatekeeper,
            events,
        }
    }

    fn approval_workflow(id: &str, wait_state: Value) -> WorkflowDefinition {
        WorkflowDefinition::new(id, "Approval")
            .with_activity(ActivityRecord::new("a", "Init").as_start())
            .with_activity(ActivityRecord::new("b", "WaitForApproval").with_state(wait_state))
            .with_transition(Transition::new("a", "Done", "b"))
    }

    fn target() -> EntityReference {
        EntityReference::new("Article", "42")
    }

    fn user(name: &str) -> impl FnOnce() -> HashMap<String, Value> {
        let name = name.to_string();
        move || HashMap::from([("user".to_string(), json!(name))])
    }

    #[tokio::test]
    async fn test_start_then_resume_to_completion() {
        let f = fixture(EngineConfig::default());
        f.definitions
            .save(&approval_workflow("wf", json!({})))
            .await
            .unwrap();

        f.manager.trigger_event("Init", target(), HashMap::new).await.unwrap();

        let halted = f.instances.find_awaiting("WaitForApproval", true).await.unwrap();
        assert_eq!(halted.len(), 1);
        assert_eq!(halted[0].activity_id, ActivityId("b".to_string()));

        f.manager
            .trigger_event("WaitForApproval", target(), HashMap::new)
            .await
            .unwrap();

        assert!(f.instances.is_empty());
        assert_eq!(f.wait.executions.load(Ordering::SeqCst), 1);
        assert_eq!(
            *f.events.events.lock().unwrap(),
            vec![
                "workflow_instance.halted",
                "workflow_instance.resumed",
                "workflow_instance.completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_event_is_dropped() {
        let f = fixture(EngineConfig::default());
        f.definitions
            .save(&approval_workflow("wf", json!({})))
            .await
            .unwrap();
        let mut called = false;

        f.manager
            .trigger_event("Unknown", target(), || {
                called = true;
                HashMap::new()
            })
            .await
            .unwrap();

        assert!(called);
        assert!(f.instances.is_empty());
        assert!(f.events.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_guard_decides_per_candidate() {
        let f = fixture(EngineConfig::default());
        f.definitions
            .save(&approval_workflow("alice", json!({"approver": "alice"})))
            .await
            .unwrap();
        f.definitions
            .save(&approval_workflow("bob", json!({"approver": "bob"})))
            .await
            .unwrap();
        f.manager.trigger_event("Init", target(), HashMap::new).await.unwrap();
        assert_eq!(f.instances.len(), 2);

        // no user: both guards fail, nothing changes
        f.manager
            .trigger_event("WaitForApproval", target(), HashMap::new)
            .await
            .unwrap();
        assert_eq!(f.instances.len(), 2);

        f.manager
            .trigger_event("WaitForApproval", target(), user("bob"))
            .await
            .unwrap();

        let remaining = f
            .instances
            .find_all_for_definition(&WorkflowDefinitionId("alice".to_string()))
            .await
            .unwrap();
        assert_eq!(f.instances.len(), 1);
        assert_eq!(remaining.len(), 1);
        assert_eq!(f.wait.executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_cancellation_persists_nothing() {
        let f = fixture(EngineConfig::default());
        f.definitions
            .save(&approval_workflow("wf", json!({})))
            .await
            .unwrap();
        f.gatekeeper.block_start.store(true, Ordering::SeqCst);

        f.manager.trigger_event("Init", target(), HashMap::new).await.unwrap();

        assert!(f.instances.is_empty());
        assert_eq!(
            *f.events.events.lock().unwrap(),
            vec!["workflow_instance.aborted"]
        );
    }

    #[tokio::test]
    async fn test_resume_cancellation_leaves_instance_untouched() {
        let f = fixture(EngineConfig::default());
        f.definitions
            .save(&approval_workflow("wf", json!({})))
            .await
            .unwrap();
        f.manager.trigger_event("Init", target(), HashMap::new).await.unwrap();
        let before = f.instances.find_awaiting("WaitForApproval", true).await.unwrap();
        let stored = f
            .instances
            .find_by_id(&before[0].instance_id)
            .await
            .unwrap()
            .unwrap();

        f.gatekeeper.block_resume.store(true, Ordering::SeqCst);
        f.manager
            .trigger_event("WaitForApproval", target(), HashMap::new)
            .await
            .unwrap();

        let after = f.instances.find_by_id(&stored.id).await.unwrap().unwrap();
        assert_eq!(after, stored);
        assert_eq!(f.wait.executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resume_without_awaiting_entry_is_an_error() {
        let f = fixture(EngineConfig::default());
        let definition = approval_workflow("wf", json!({}));
        let record = definition.activities[1].clone();
        let instance = WorkflowInstance::new(definition.id.clone());
        let mut context = WorkflowContext::new(definition, instance);

        let result = f.manager.resume_workflow(&mut context, &record).await;

        assert!(matches!(
            result,
            Err(CoreError::AwaitingActivityMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_start_saves_definition_and_instance() {
        let f = fixture(EngineConfig::default());
        let definition = approval_workflow("wf", json!({}));
        let start = definition.activities[0].clone();
        let instance = WorkflowInstance::new(definition.id.clone());
        let mut context = WorkflowContext::new(definition, instance);

        let status = f.manager.start_workflow(&mut context, &start).await.unwrap();

        assert_eq!(status, WorkflowRunStatus::Halted);
        assert_eq!(context.instance.version, 1);
        assert_eq!(context.get("initialized"), Some(&json!(true)));
        assert!(f
            .definitions
            .find_by_id(&context.definition.id)
            .await
            .unwrap()
            .is_some());
        assert_eq!(
            f.instances.find_by_id(&context.instance.id).await.unwrap(),
            Some(context.instance.clone())
        );
    }

    #[tokio::test]
    async fn test_optimistic_conflict_skips_candidate() {
        let f = fixture(EngineConfig::default().with_concurrency_policy(ConcurrencyPolicy::Optimistic));
        let definition = approval_workflow("wf", json!({}));
        let mut instance = WorkflowInstance::new(definition.id.clone());
        instance.add_awaiting_activities([&definition.activities[1]]);
        f.definitions.save(&definition).await.unwrap();
        f.instances.save(&instance, VersionCheck::Skip).await.unwrap();

        // stale copy: the store is already at version 1
        let record = definition.activities[1].clone();
        let mut context = WorkflowContext::new(definition, instance);
        let result = f.manager.resume_workflow(&mut context, &record).await;

        assert!(matches!(
            result,
            Err(CoreError::ConcurrencyConflict { expected: 0, actual: 1, .. })
        ));
        assert_eq!(f.instances.len(), 1);
        assert_eq!(
            f.manager
                .tolerate_conflict(result, &context.instance.id)
                .unwrap(),
            None
        );
    }
}
