//! Removal and upgrade flows over the child-stack fleet
//!
//! Each flow validates the config, discovers the target stacks, then drives
//! the per-stack executor through the bounded scheduler with the configured
//! failure policy.

use crate::aws::StackOperations;
use crate::config::{RemovalPolicy, StackManagerConfig};
use crate::error::StackActionError;
use crate::monitor::StackAction;
use crate::scheduler::{self, handle_stack_action_error};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Why a run did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `removal_policy` is `keep`
    RemovalPolicyKeep,
    /// No stack matched the prefix
    NoStacksFound,
}

/// End state of a removal or upgrade run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every discovered stack was processed
    Completed { action: StackAction, found: usize },
    /// Nothing was attempted, and that is not an error
    Skipped { reason: SkipReason },
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed { action, found } => match action {
                StackAction::Removal => write!(f, "Removed {found} stack(s)"),
                StackAction::Update => write!(f, "Upgraded {found} stack(s)"),
            },
            RunOutcome::Skipped {
                reason: SkipReason::RemovalPolicyKeep,
            } => f.write_str("Skipped: removal_policy is set to keep"),
            RunOutcome::Skipped {
                reason: SkipReason::NoStacksFound,
            } => f.write_str("Skipped: no matching stacks found"),
        }
    }
}

/// Remove every child stack matching the configured prefix.
///
/// Gated by `removal_policy`: with `keep` the run is skipped before any
/// remote call.
pub async fn remove_child_stacks<O>(config: &StackManagerConfig, ops: Arc<O>) -> Result<RunOutcome>
where
    O: StackOperations + 'static,
{
    config.validate(StackAction::Removal)?;

    if config.removal_policy == RemovalPolicy::Keep {
        info!("Skipping removal of child stacks because of removal_policy setting");
        return Ok(RunOutcome::Skipped {
            reason: SkipReason::RemovalPolicyKeep,
        });
    }

    info!(prefix = %config.child_stacks_name_prefix, "Removing child stacks");
    let stack_ids = ops
        .list_matching_stacks(&config.child_stacks_name_prefix)
        .await?;
    info!(count = stack_ids.len(), "Found stacks");

    if stack_ids.is_empty() {
        info!("Skipping removal of child stacks because no stacks found");
        return Ok(RunOutcome::Skipped {
            reason: SkipReason::NoStacksFound,
        });
    }

    let found = stack_ids.len();
    info!("Starting delete operation");

    let continue_on_failure = config.continue_on_failure;
    let action = {
        let ops = Arc::clone(&ops);
        move |stack_id: String| {
            let ops = Arc::clone(&ops);
            async move {
                let result = remove_one(ops.as_ref(), &stack_id).await;
                settle_action_result(result, stack_id, continue_on_failure)
            }
        }
    };
    scheduler::run_bounded(stack_ids, config.max_concurrent_count, action).await?;

    info!("Stacks successfully removed");
    Ok(RunOutcome::Completed {
        action: StackAction::Removal,
        found,
    })
}

/// Invoke the upgrade function against every child stack matching the
/// configured prefix.
pub async fn upgrade_child_stacks<O>(config: &StackManagerConfig, ops: Arc<O>) -> Result<RunOutcome>
where
    O: StackOperations + 'static,
{
    config.validate(StackAction::Update)?;
    let function = config.require_upgrade_function()?.to_string();

    info!(prefix = %config.child_stacks_name_prefix, "Upgrading child stacks");
    let stack_ids = ops
        .list_matching_stacks(&config.child_stacks_name_prefix)
        .await?;
    info!(count = stack_ids.len(), "Found stacks");

    if stack_ids.is_empty() {
        info!("Skipping upgrade of child stacks because no stacks found");
        return Ok(RunOutcome::Skipped {
            reason: SkipReason::NoStacksFound,
        });
    }

    let found = stack_ids.len();
    info!("Starting update operation");

    let continue_on_failure = config.continue_on_failure;
    let action = {
        let ops = Arc::clone(&ops);
        move |stack_id: String| {
            let ops = Arc::clone(&ops);
            let function = function.clone();
            async move {
                let result = upgrade_one(ops.as_ref(), &function, &stack_id).await;
                settle_action_result(result, stack_id, continue_on_failure)
            }
        }
    };
    scheduler::run_bounded(stack_ids, config.max_concurrent_count, action).await?;

    info!("Stacks successfully updated");
    Ok(RunOutcome::Completed {
        action: StackAction::Update,
        found,
    })
}

/// One unit of removal work: request the delete, then block on settlement.
async fn remove_one<O: StackOperations>(ops: &O, stack_id: &str) -> Result<()> {
    ops.delete_stack(stack_id).await?;
    ops.wait_for_settled(StackAction::Removal, stack_id).await
}

/// One unit of upgrade work: invoke the function, then block on settlement.
async fn upgrade_one<O: StackOperations>(ops: &O, function: &str, stack_id: &str) -> Result<()> {
    ops.invoke_upgrade(function, stack_id).await?;
    ops.wait_for_settled(StackAction::Update, stack_id).await
}

/// Tag a failed action with its stack id and apply the failure policy.
fn settle_action_result(
    result: Result<()>,
    stack_id: String,
    continue_on_failure: bool,
) -> Result<String> {
    match result {
        Ok(()) => Ok(stack_id),
        Err(error) => {
            let error = anyhow::Error::new(StackActionError::new(stack_id.as_str(), &error));
            handle_stack_action_error(error, &stack_id, continue_on_failure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_CONCURRENT_COUNT;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory fleet standing in for CloudFormation and Lambda.
    #[derive(Default)]
    struct FakeFleet {
        stacks: Vec<String>,
        fail_on: Option<String>,
        fail_listing: bool,
        list_calls: AtomicUsize,
        deletes: Mutex<Vec<String>>,
        invokes: Mutex<Vec<(String, String)>>,
        waits: Mutex<Vec<(StackAction, String)>>,
    }

    impl FakeFleet {
        fn with_stacks(names: &[&str]) -> Self {
            Self {
                stacks: names.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    impl StackOperations for FakeFleet {
        async fn list_matching_stacks(&self, prefix: &str) -> Result<Vec<String>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_listing {
                bail!("listing failed");
            }
            Ok(self
                .stacks
                .iter()
                .filter(|name| name.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn delete_stack(&self, stack_id: &str) -> Result<()> {
            self.deletes.lock().unwrap().push(stack_id.to_string());
            if self.fail_on.as_deref() == Some(stack_id) {
                bail!("delete rejected for {stack_id}");
            }
            Ok(())
        }

        async fn invoke_upgrade(&self, function_name: &str, stack_id: &str) -> Result<()> {
            self.invokes
                .lock()
                .unwrap()
                .push((function_name.to_string(), stack_id.to_string()));
            if self.fail_on.as_deref() == Some(stack_id) {
                bail!("migration table is locked");
            }
            Ok(())
        }

        async fn wait_for_settled(&self, action: StackAction, stack_id: &str) -> Result<()> {
            self.waits
                .lock()
                .unwrap()
                .push((action, stack_id.to_string()));
            Ok(())
        }
    }

    fn config(prefix: &str) -> StackManagerConfig {
        StackManagerConfig {
            child_stacks_name_prefix: prefix.to_string(),
            removal_policy: RemovalPolicy::Remove,
            max_concurrent_count: 1,
            upgrade_function: None,
            continue_on_failure: false,
        }
    }

    #[tokio::test]
    async fn test_removal_processes_matching_stacks() {
        let fleet = Arc::new(FakeFleet::with_stacks(&["Foo-A", "Bar-B", "Foo-C"]));
        let outcome = remove_child_stacks(&config("Foo"), Arc::clone(&fleet))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Completed {
                action: StackAction::Removal,
                found: 2
            }
        );
        assert_eq!(
            fleet.deletes.lock().unwrap().clone(),
            vec!["Foo-A".to_string(), "Foo-C".to_string()]
        );
        let waits = fleet.waits.lock().unwrap().clone();
        assert_eq!(waits.len(), 2);
        assert!(waits.iter().all(|(a, _)| *a == StackAction::Removal));
    }

    #[tokio::test]
    async fn test_removal_policy_keep_makes_no_remote_calls() {
        let fleet = Arc::new(FakeFleet::with_stacks(&["Foo-A"]));
        let mut cfg = config("Foo");
        cfg.removal_policy = RemovalPolicy::Keep;

        let outcome = remove_child_stacks(&cfg, Arc::clone(&fleet)).await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Skipped {
                reason: SkipReason::RemovalPolicyKeep
            }
        );
        assert_eq!(fleet.list_calls.load(Ordering::SeqCst), 0);
        assert!(fleet.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_matches_skips_with_zero_actions() {
        let fleet = Arc::new(FakeFleet::with_stacks(&["Bar-B"]));
        let outcome = remove_child_stacks(&config("Foo"), Arc::clone(&fleet))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Skipped {
                reason: SkipReason::NoStacksFound
            }
        );
        assert!(fleet.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enumeration_error_aborts_before_any_action() {
        let fleet = Arc::new(FakeFleet {
            fail_listing: true,
            ..FakeFleet::with_stacks(&["Foo-A"])
        });

        let err = remove_child_stacks(&config("Foo"), Arc::clone(&fleet))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("listing failed"));
        assert!(fleet.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sequential_failure_aborts_and_names_the_stack() {
        let fleet = Arc::new(FakeFleet {
            fail_on: Some("Foo-B".to_string()),
            ..FakeFleet::with_stacks(&["Foo-A", "Foo-B", "Foo-C"])
        });

        let err = remove_child_stacks(&config("Foo"), Arc::clone(&fleet))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Foo-B"));
        // First unit completed, second failed, third never attempted.
        assert_eq!(
            fleet.deletes.lock().unwrap().clone(),
            vec!["Foo-A".to_string(), "Foo-B".to_string()]
        );
    }

    #[tokio::test]
    async fn test_continue_on_failure_processes_every_stack() {
        let fleet = Arc::new(FakeFleet {
            fail_on: Some("Foo-B".to_string()),
            ..FakeFleet::with_stacks(&["Foo-A", "Foo-B", "Foo-C"])
        });
        let mut cfg = config("Foo");
        cfg.continue_on_failure = true;

        let outcome = remove_child_stacks(&cfg, Arc::clone(&fleet)).await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Completed {
                action: StackAction::Removal,
                found: 3
            }
        );
        assert_eq!(fleet.deletes.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_upgrade_invokes_function_then_waits() {
        let fleet = Arc::new(FakeFleet::with_stacks(&["Foo-A", "Foo-B"]));
        let mut cfg = config("Foo");
        cfg.upgrade_function = Some("stack-migrator".to_string());
        cfg.max_concurrent_count = DEFAULT_MAX_CONCURRENT_COUNT;

        let outcome = upgrade_child_stacks(&cfg, Arc::clone(&fleet)).await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Completed {
                action: StackAction::Update,
                found: 2
            }
        );
        let invokes = fleet.invokes.lock().unwrap().clone();
        assert_eq!(invokes.len(), 2);
        assert!(invokes.iter().all(|(f, _)| f == "stack-migrator"));
        let waits = fleet.waits.lock().unwrap().clone();
        assert!(waits.iter().all(|(a, _)| *a == StackAction::Update));
    }

    #[tokio::test]
    async fn test_upgrade_without_function_fails_before_any_call() {
        let fleet = Arc::new(FakeFleet::with_stacks(&["Foo-A"]));
        let err = upgrade_child_stacks(&config("Foo"), Arc::clone(&fleet))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("upgrade_function"));
        assert_eq!(fleet.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upgrade_surfaces_function_error_message() {
        let fleet = Arc::new(FakeFleet {
            fail_on: Some("Foo-A".to_string()),
            ..FakeFleet::with_stacks(&["Foo-A"])
        });
        let mut cfg = config("Foo");
        cfg.upgrade_function = Some("stack-migrator".to_string());

        let err = upgrade_child_stacks(&cfg, Arc::clone(&fleet))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("migration table is locked"));
    }

    #[test]
    fn test_outcome_display() {
        let completed = RunOutcome::Completed {
            action: StackAction::Removal,
            found: 2,
        };
        assert_eq!(completed.to_string(), "Removed 2 stack(s)");

        let skipped = RunOutcome::Skipped {
            reason: SkipReason::NoStacksFound,
        };
        assert!(skipped.to_string().contains("no matching stacks"));
    }
}
