//! Stack operations trait for testing

use crate::aws::cloudformation::CloudFormationClient;
use crate::aws::context::AwsContext;
use crate::aws::lambda::LambdaClient;
use crate::monitor::{StackAction, StackMonitor};
use anyhow::Result;
use std::future::Future;

/// Trait for the remote stack operations that can be faked in tests.
///
/// This abstracts the CloudFormation/Lambda calls so the orchestration
/// logic can be unit tested without hitting real AWS.
pub trait StackOperations: Send + Sync {
    /// List ids of stable stacks whose name starts with `prefix`
    fn list_matching_stacks(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Request deletion of a stack (acceptance only)
    fn delete_stack(&self, stack_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Invoke the upgrade function synchronously for one stack
    fn invoke_upgrade(
        &self,
        function_name: &str,
        stack_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Wait until the stack reaches a terminal state for the action
    fn wait_for_settled(
        &self,
        action: StackAction,
        stack_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Production implementation backed by the AWS SDK clients.
pub struct StackManagerClient {
    cloudformation: CloudFormationClient,
    lambda: LambdaClient,
    monitor: StackMonitor,
}

impl StackManagerClient {
    /// Build all clients from one pre-loaded AWS context.
    pub fn from_context(ctx: &AwsContext) -> Self {
        let cloudformation = CloudFormationClient::from_context(ctx);
        let monitor = StackMonitor::new(cloudformation.clone());
        Self {
            cloudformation,
            lambda: LambdaClient::from_context(ctx),
            monitor,
        }
    }
}

impl StackOperations for StackManagerClient {
    async fn list_matching_stacks(&self, prefix: &str) -> Result<Vec<String>> {
        self.cloudformation.list_matching_stacks(prefix).await
    }

    async fn delete_stack(&self, stack_id: &str) -> Result<()> {
        self.cloudformation.delete_stack(stack_id).await
    }

    async fn invoke_upgrade(&self, function_name: &str, stack_id: &str) -> Result<()> {
        self.lambda.invoke_upgrade(function_name, stack_id).await
    }

    async fn wait_for_settled(&self, action: StackAction, stack_id: &str) -> Result<()> {
        self.monitor.wait_for_settled(action, stack_id).await
    }
}
