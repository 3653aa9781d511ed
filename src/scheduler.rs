//! Bounded concurrent execution of stack actions
//!
//! Mutating every stack at once risks CloudFormation throttling, so the
//! scheduler keeps a fixed number of actions in flight: it starts an
//! initial batch, races their completion, and replenishes from the backlog
//! each time one settles.

use anyhow::{ensure, Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Run `action` over every stack id with at most `limit` in flight.
///
/// Completion order is a race, not FIFO: whichever in-flight action settles
/// first frees the slot for the next backlog id. Resolves once every id has
/// been processed; fails with the first unsuppressed action error. On such
/// a failure the remaining in-flight tasks are left running detached and
/// their outcomes are discarded, so the run surfaces the error immediately
/// instead of waiting for the stragglers.
pub async fn run_bounded<F, Fut>(stack_ids: Vec<String>, limit: usize, action: F) -> Result<()>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    ensure!(limit >= 1, "concurrency limit must be at least 1");
    if stack_ids.is_empty() {
        return Ok(());
    }

    let mut backlog: VecDeque<String> = stack_ids.into();
    let mut in_flight: FuturesUnordered<JoinHandle<Result<String>>> = FuturesUnordered::new();

    // Initial batch, up to the limit.
    while in_flight.len() < limit {
        match backlog.pop_front() {
            Some(stack_id) => in_flight.push(tokio::spawn(action(stack_id))),
            None => break,
        }
    }

    while let Some(settled) = in_flight.next().await {
        // The `?` drops the remaining handles, detaching those tasks.
        let completed = settled.context("stack action task panicked")??;
        info!(stack_id = %completed, "Stack operation completed");

        if let Some(stack_id) = backlog.pop_front() {
            in_flight.push(tokio::spawn(action(stack_id)));
        }
    }

    Ok(())
}

/// Per-stack failure policy.
///
/// With `continue_on_failure` the error is logged and downgraded to a
/// success carrying the same stack id, so the scheduler treats the unit as
/// completed and the batch runs to the end. Otherwise the error propagates
/// unchanged and the scheduler aborts the run with it.
pub fn handle_stack_action_error(
    error: anyhow::Error,
    stack_id: &str,
    continue_on_failure: bool,
) -> Result<String> {
    if continue_on_failure {
        warn!(stack_id = %stack_id, error = ?error, "Stack action failed");
        warn!(stack_id = %stack_id, "Failure ignored because continue_on_failure is set");
        return Ok(stack_id.to_string());
    }

    Err(error)
}
