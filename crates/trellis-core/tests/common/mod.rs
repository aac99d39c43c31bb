//! Shared activities and wiring for the workflow integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use trellis_core::{
    Activity, ActivityContext, ActivityLibrary, CancellationSignal, CoreError, EngineConfig,
    Outcome, WorkflowContext, WorkflowDefinitionRepository, WorkflowInstanceRepository,
    WorkflowManager,
};
use trellis_state_inmemory::InMemoryStateStoreProvider;

/// `vec!` of activity kinds as trait objects
macro_rules! activities {
    ($($activity:expr),* $(,)?) => {
        vec![$(($activity) as std::sync::Arc<dyn trellis_core::Activity>),*]
    };
}

/// Event that starts workflows
pub struct StartEvent {
    pub name: &'static str,
    pub executions: AtomicUsize,
}

impl StartEvent {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            executions: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Activity for StartEvent {
    fn name(&self) -> &str {
        self.name
    }

    fn is_start(&self) -> bool {
        true
    }

    fn is_event(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _context: &mut WorkflowContext,
        _activity_context: &ActivityContext,
    ) -> Result<Vec<Outcome>, CoreError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Outcome::new("Done")])
    }
}

/// Blocking event activity
///
/// Its guard reads the activity state: `{"explode": true}` makes it fail,
/// `{"owner": "<id>"}` restricts it to events targeting that entity.
pub struct Signal {
    pub name: &'static str,
    pub executions: AtomicUsize,
    pub barrier: Option<Arc<Barrier>>,
    pub delay: Option<Duration>,
}

impl Signal {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            executions: AtomicUsize::new(0),
            barrier: None,
            delay: None,
        })
    }

    pub fn with_barrier(name: &'static str, barrier: Arc<Barrier>) -> Arc<Self> {
        Arc::new(Self {
            name,
            executions: AtomicUsize::new(0),
            barrier: Some(barrier),
            delay: None,
        })
    }

    pub fn with_delay(name: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            executions: AtomicUsize::new(0),
            barrier: None,
            delay: Some(delay),
        })
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Activity for Signal {
    fn name(&self) -> &str {
        self.name
    }

    fn is_event(&self) -> bool {
        true
    }

    fn can_execute(
        &self,
        context: &WorkflowContext,
        activity_context: &ActivityContext,
    ) -> Result<bool, CoreError> {
        if activity_context.property::<bool>("explode")?.unwrap_or(false) {
            return Err(CoreError::ConditionEvaluationError(format!(
                "guard of {} exploded",
                activity_context.record().id
            )));
        }

        match activity_context.property::<String>("owner")? {
            Some(owner) => Ok(context.target.as_ref().is_some_and(|t| t.id == owner)),
            None => Ok(true),
        }
    }

    async fn execute(
        &self,
        _context: &mut WorkflowContext,
        _activity_context: &ActivityContext,
    ) -> Result<Vec<Outcome>, CoreError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(vec![Outcome::new("Done")])
    }
}

/// Plain task with fixed outcomes
pub struct Task {
    pub name: &'static str,
    pub outcomes: Vec<&'static str>,
    pub executions: AtomicUsize,
}

impl Task {
    pub fn new(name: &'static str, outcomes: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcomes,
            executions: AtomicUsize::new(0),
        })
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Activity for Task {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        _context: &mut WorkflowContext,
        _activity_context: &ActivityContext,
    ) -> Result<Vec<Outcome>, CoreError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcomes.iter().map(|o| Outcome::new(*o)).collect())
    }
}

/// Lifecycle participant that can veto starts and counts the broadcasts it saw
#[derive(Default)]
pub struct Gatekeeper {
    pub name: &'static str,
    pub veto_start: AtomicBool,
    pub starting_calls: AtomicUsize,
}

impl Gatekeeper {
    pub fn new(name: &'static str, veto_start: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            veto_start: AtomicBool::new(veto_start),
            starting_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Activity for Gatekeeper {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        _context: &mut WorkflowContext,
        _activity_context: &ActivityContext,
    ) -> Result<Vec<Outcome>, CoreError> {
        Ok(vec![])
    }

    fn on_workflow_starting(&self, _context: &WorkflowContext, cancellation: &CancellationSignal) {
        self.starting_calls.fetch_add(1, Ordering::SeqCst);
        if self.veto_start.load(Ordering::SeqCst) {
            cancellation.cancel();
        }
    }
}

/// Manager wired to an in-memory store
pub struct Harness {
    pub manager: Arc<WorkflowManager>,
    pub definitions: Arc<dyn WorkflowDefinitionRepository>,
    pub instances: Arc<dyn WorkflowInstanceRepository>,
}

pub fn harness(activities: Vec<Arc<dyn Activity>>, config: EngineConfig) -> Harness {
    trellis_monitoring::try_init_test_logging();

    let library = ActivityLibrary::new();
    for activity in activities {
        library.register(activity).expect("register activity");
    }

    let provider = InMemoryStateStoreProvider::new();
    let (definitions, instances) = provider.create_repositories();
    let manager = WorkflowManager::new(
        definitions.clone(),
        instances.clone(),
        Arc::new(library),
        config,
    );

    Harness {
        manager: Arc::new(manager),
        definitions,
        instances,
    }
}
