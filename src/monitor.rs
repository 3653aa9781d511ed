//! Stack settlement monitoring
//!
//! CloudFormation only acknowledges delete/update requests; this module
//! polls the stack status at a fixed interval until the stack reaches a
//! terminal state for the requested action.

use crate::aws::cloudformation::CloudFormationClient;
use anyhow::{anyhow, Result};
use aws_sdk_cloudformation::types::StackStatus;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// How often the stack status is probed while waiting for settlement.
pub const DEFAULT_MONITOR_FREQUENCY: Duration = Duration::from_secs(10);

/// The lifecycle action being tracked, which determines the terminal
/// statuses the monitor accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAction {
    Removal,
    Update,
}

impl std::fmt::Display for StackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StackAction::Removal => "removal",
            StackAction::Update => "update",
        })
    }
}

/// How a probed status relates to the action being waited on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Terminal success for this action
    Complete,
    /// Terminal failure, with the reason
    Failed(String),
    /// Still transitioning, keep polling
    InProgress,
}

/// Map a stack status onto the settlement outcome for an action.
pub fn settle_outcome(action: StackAction, status: &StackStatus) -> SettleOutcome {
    match action {
        StackAction::Removal => match status {
            StackStatus::DeleteComplete => SettleOutcome::Complete,
            StackStatus::DeleteFailed => {
                SettleOutcome::Failed("stack reached DELETE_FAILED".to_string())
            }
            s if s.as_str().ends_with("_IN_PROGRESS") => SettleOutcome::InProgress,
            other => SettleOutcome::Failed(format!(
                "unexpected stack status {} while waiting for removal",
                other.as_str()
            )),
        },
        StackAction::Update => match status {
            StackStatus::UpdateComplete => SettleOutcome::Complete,
            StackStatus::UpdateFailed
            | StackStatus::UpdateRollbackComplete
            | StackStatus::UpdateRollbackFailed => SettleOutcome::Failed(format!(
                "stack rolled back or failed with status {}",
                status.as_str()
            )),
            s if s.as_str().ends_with("_IN_PROGRESS") => SettleOutcome::InProgress,
            other => SettleOutcome::Failed(format!(
                "unexpected stack status {} while waiting for update",
                other.as_str()
            )),
        },
    }
}

/// Polls a stack until it settles for a given action.
#[derive(Clone)]
pub struct StackMonitor {
    cloudformation: CloudFormationClient,
    frequency: Duration,
}

impl StackMonitor {
    /// Create a monitor polling at the default 10 second frequency.
    pub fn new(cloudformation: CloudFormationClient) -> Self {
        Self::with_frequency(cloudformation, DEFAULT_MONITOR_FREQUENCY)
    }

    pub fn with_frequency(cloudformation: CloudFormationClient, frequency: Duration) -> Self {
        Self {
            cloudformation,
            frequency,
        }
    }

    /// Wait until `stack_id` reaches a terminal state for `action`.
    ///
    /// A stack that can no longer be described counts as settled for a
    /// removal (the record is gone once the delete finishes) and as a
    /// failure for an update.
    pub async fn wait_for_settled(&self, action: StackAction, stack_id: &str) -> Result<()> {
        wait_for_settled_with(action, stack_id, self.frequency, || {
            self.cloudformation.stack_status(stack_id)
        })
        .await
    }
}

/// Poll `probe` every `frequency` until the status settles for `action`.
///
/// The first probe only happens after one full interval, so a terminal
/// status left over from before the action was issued is not read back
/// immediately as settlement.
async fn wait_for_settled_with<F, Fut>(
    action: StackAction,
    stack_id: &str,
    frequency: Duration,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<StackStatus>>>,
{
    debug!(stack_id = %stack_id, action = %action, "Waiting for stack to settle");

    loop {
        sleep(frequency).await;

        match probe().await? {
            None => {
                return match action {
                    StackAction::Removal => {
                        debug!(stack_id = %stack_id, "Stack no longer exists, removal settled");
                        Ok(())
                    }
                    StackAction::Update => Err(anyhow!(
                        "stack {stack_id} no longer exists while waiting for update"
                    )),
                };
            }
            Some(status) => match settle_outcome(action, &status) {
                SettleOutcome::Complete => {
                    debug!(stack_id = %stack_id, status = %status.as_str(), "Stack settled");
                    return Ok(());
                }
                SettleOutcome::Failed(reason) => {
                    return Err(anyhow!("stack {stack_id} {action} failed: {reason}"));
                }
                SettleOutcome::InProgress => {
                    debug!(
                        stack_id = %stack_id,
                        status = %status.as_str(),
                        "Stack still transitioning"
                    );
                }
            },
        }
    }
}
