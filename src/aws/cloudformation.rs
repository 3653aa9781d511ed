//! CloudFormation stack discovery and mutation

use crate::aws::context::AwsContext;
use crate::aws::error::classify_cfn_error;
use anyhow::{Context, Result};
use aws_sdk_cloudformation::error::ProvideErrorMetadata;
use aws_sdk_cloudformation::types::StackStatus;
use aws_sdk_cloudformation::Client;
use std::future::Future;
use tracing::{debug, info};

/// Stack statuses considered safe to enumerate and act upon.
///
/// A stack outside this set is mid-transition and must not be acted on
/// a second time.
pub const STABLE_STACK_STATUSES: [StackStatus; 5] = [
    StackStatus::CreateComplete,
    StackStatus::RollbackComplete,
    StackStatus::UpdateComplete,
    StackStatus::ImportComplete,
    StackStatus::UpdateRollbackComplete,
];

/// One page of stack summaries: `(name, id)` pairs plus the continuation
/// token for the next page, if any.
struct StackSummaryPage {
    summaries: Vec<(String, Option<String>)>,
    next_token: Option<String>,
}

/// CloudFormation client for managing child stacks
#[derive(Clone)]
pub struct CloudFormationClient {
    client: Client,
}

impl CloudFormationClient {
    /// Create a new CloudFormation client (loads AWS config from environment)
    pub async fn new(region: &str) -> Self {
        Self::from_context(&AwsContext::new(region).await)
    }

    /// Create a CloudFormation client from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.cloudformation_client(),
        }
    }

    /// List the ids of every stable stack whose name starts with `prefix`.
    ///
    /// Pages through `ListStacks` until the continuation token is absent;
    /// a listing failure aborts the whole enumeration.
    pub async fn list_matching_stacks(&self, prefix: &str) -> Result<Vec<String>> {
        debug!(prefix = %prefix, "Listing stacks");
        collect_matching_stacks(prefix, |token| self.fetch_summary_page(token)).await
    }

    /// Fetch one `ListStacks` page, filtered to stable statuses.
    async fn fetch_summary_page(&self, token: Option<String>) -> Result<StackSummaryPage> {
        let mut request = self.client.list_stacks();
        for status in STABLE_STACK_STATUSES {
            request = request.stack_status_filter(status);
        }
        if let Some(token) = token {
            request = request.next_token(token);
        }

        let response = request.send().await.context("Failed to list stacks")?;

        Ok(StackSummaryPage {
            summaries: response
                .stack_summaries()
                .iter()
                .map(|s| {
                    (
                        s.stack_name().unwrap_or_default().to_string(),
                        s.stack_id().map(str::to_string),
                    )
                })
                .collect(),
            next_token: response.next_token().map(str::to_string),
        })
    }

    /// Request deletion of a stack.
    ///
    /// CloudFormation only acknowledges acceptance here; completion is
    /// detected separately by polling the stack status.
    pub async fn delete_stack(&self, stack_id: &str) -> Result<()> {
        info!(stack_id = %stack_id, "Deleting stack");

        self.client
            .delete_stack()
            .stack_name(stack_id)
            .send()
            .await
            .context("Failed to delete stack")?;

        Ok(())
    }

    /// Current status of a stack, or `None` if it no longer exists.
    pub async fn stack_status(&self, stack_id: &str) -> Result<Option<StackStatus>> {
        let response = match self
            .client
            .describe_stacks()
            .stack_name(stack_id)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) if classify_cfn_error(err.code(), err.message()).is_not_found() => {
                return Ok(None)
            }
            Err(err) => return Err(err).context("Failed to describe stack"),
        };

        Ok(response
            .stacks()
            .first()
            .and_then(|stack| stack.stack_status().cloned()))
    }
}

/// Drive a page source until its continuation token runs out, collecting
/// the prefix-filtered ids of every page in order.
async fn collect_matching_stacks<F, Fut>(prefix: &str, mut fetch_page: F) -> Result<Vec<String>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<StackSummaryPage>>,
{
    let mut stack_ids = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let page = fetch_page(next_token).await?;

        let matched = matching_stack_ids(
            page.summaries
                .iter()
                .map(|(name, id)| (name.as_str(), id.as_deref())),
            prefix,
        );
        debug!(page_matches = matched.len(), "Fetched stack summary page");
        stack_ids.extend(matched);

        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    Ok(stack_ids)
}

/// Filter one page of `(name, id)` stack summaries down to the ids whose
/// name starts with `prefix` and that actually carry a non-empty id.
pub fn matching_stack_ids<'a>(
    summaries: impl Iterator<Item = (&'a str, Option<&'a str>)>,
    prefix: &str,
) -> Vec<String> {
    summaries
        .filter(|(name, _)| name.starts_with(prefix))
        .filter_map(|(_, id)| id)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
