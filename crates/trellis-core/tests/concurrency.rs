#[macro_use]
mod common;

use common::{harness, Harness, Signal, StartEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use trellis_core::{
    ActivityRecord, ConcurrencyPolicy, CoreError, EngineConfig, EntityReference, Transition,
    WorkflowDefinition, WorkflowInstanceId,
};

fn article() -> EntityReference {
    EntityReference::new("Article", "42")
}

/// Deploys the approval workflow and halts one instance on `WaitForApproval`
async fn halted_instance(h: &Harness) -> Result<WorkflowInstanceId, CoreError> {
    let definition = WorkflowDefinition::new("approval", "Approval")
        .with_activity(ActivityRecord::new("a", "Init").as_start())
        .with_activity(ActivityRecord::new("b", "WaitForApproval"))
        .with_transition(Transition::new("a", "Done", "b"));
    h.definitions.save(&definition).await?;

    h.manager.trigger_event("Init", article(), HashMap::new).await?;

    let halted = h.instances.find_awaiting("WaitForApproval", true).await?;
    assert_eq!(halted.len(), 1);
    Ok(halted[0].instance_id.clone())
}

async fn approve_twice(h: &Harness) -> (Result<(), CoreError>, Result<(), CoreError>) {
    let first = h.manager.clone();
    let second = h.manager.clone();
    tokio::join!(
        async move {
            first
                .trigger_event("WaitForApproval", article(), HashMap::new)
                .await
        },
        async move {
            second
                .trigger_event("WaitForApproval", article(), HashMap::new)
                .await
        }
    )
}

#[tokio::test]
async fn test_optimistic_policy_rejects_the_stale_resume() -> Result<(), CoreError> {
    // Both resumes load version 1 before either persists
    let approval = Signal::with_barrier("WaitForApproval", Arc::new(Barrier::new(2)));
    let h = harness(
        activities![StartEvent::new("Init"), approval.clone()],
        EngineConfig::default().with_concurrency_policy(ConcurrencyPolicy::Optimistic),
    );
    let instance_id = halted_instance(&h).await?;

    let (first, second) = approve_twice(&h).await;

    // The loser is skipped, not reported
    assert_eq!(first, Ok(()));
    assert_eq!(second, Ok(()));
    assert_eq!(approval.executions(), 2);
    assert!(h.instances.find_by_id(&instance_id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_exclusive_policy_serializes_resumes() -> Result<(), CoreError> {
    let approval = Signal::with_delay("WaitForApproval", Duration::from_millis(20));
    let h = harness(
        activities![StartEvent::new("Init"), approval.clone()],
        EngineConfig::default().with_concurrency_policy(ConcurrencyPolicy::Exclusive),
    );
    let instance_id = halted_instance(&h).await?;

    let (first, second) = approve_twice(&h).await;

    assert_eq!(first, Ok(()));
    assert_eq!(second, Ok(()));
    // The waiting resume found the instance gone and skipped it
    assert_eq!(approval.executions(), 1);
    assert!(h.instances.find_by_id(&instance_id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_unguarded_policy_lets_both_resumes_run() -> Result<(), CoreError> {
    let approval = Signal::with_delay("WaitForApproval", Duration::from_millis(20));
    let h = harness(
        activities![StartEvent::new("Init"), approval.clone()],
        EngineConfig::default(),
    );
    let instance_id = halted_instance(&h).await?;

    let (first, second) = approve_twice(&h).await;

    assert_eq!(first, Ok(()));
    assert_eq!(second, Ok(()));
    assert_eq!(approval.executions(), 2);
    assert!(h.instances.find_by_id(&instance_id).await?.is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exclusive_policy_across_tasks() -> Result<(), CoreError> {
    let approval = Signal::with_delay("WaitForApproval", Duration::from_millis(10));
    let h = harness(
        activities![StartEvent::new("Init"), approval.clone()],
        EngineConfig::default().with_concurrency_policy(ConcurrencyPolicy::Exclusive),
    );
    let instance_id = halted_instance(&h).await?;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let manager = h.manager.clone();
            tokio::spawn(async move {
                manager
                    .trigger_event("WaitForApproval", article(), HashMap::new)
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.expect("trigger task panicked")?;
    }

    assert_eq!(approval.executions(), 1);
    assert!(h.instances.find_by_id(&instance_id).await?.is_none());

    Ok(())
}
