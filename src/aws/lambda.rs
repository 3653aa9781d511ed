//! Lambda invocation of the per-stack upgrade function

use crate::aws::context::AwsContext;
use anyhow::{Context, Result};
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{InvocationType, LogType};
use aws_sdk_lambda::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Payload handed to the upgrade function. Field names follow the wire
/// contract the function expects.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpgradePayload<'a> {
    stack_id: &'a str,
}

/// Error detail a Lambda function reports in its payload on failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionErrorDetail {
    error_message: String,
}

/// Lambda client for invoking the upgrade function
#[derive(Clone)]
pub struct LambdaClient {
    client: Client,
}

impl LambdaClient {
    /// Create a new Lambda client (loads AWS config from environment)
    pub async fn new(region: &str) -> Self {
        Self::from_context(&AwsContext::new(region).await)
    }

    /// Create a Lambda client from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.lambda_client(),
        }
    }

    /// Invoke the upgrade function synchronously for one stack.
    ///
    /// A function that ran but signalled failure is surfaced with its own
    /// error message, which distinguishes it from the invocation itself
    /// failing.
    pub async fn invoke_upgrade(&self, function_name: &str, stack_id: &str) -> Result<()> {
        info!(function = %function_name, stack_id = %stack_id, "Invoking upgrade function");

        let payload = serde_json::to_vec(&UpgradePayload { stack_id })
            .context("Failed to serialize upgrade payload")?;

        let response = self
            .client
            .invoke()
            .function_name(function_name)
            .invocation_type(InvocationType::RequestResponse)
            .log_type(LogType::None)
            .payload(Blob::new(payload))
            .send()
            .await
            .context("Failed to invoke upgrade function")?;

        if let Some(function_error) = response.function_error() {
            let message =
                function_error_message(function_error, response.payload().map(|b| b.as_ref()));
            return Err(anyhow::anyhow!(message));
        }

        Ok(())
    }
}

/// Extract the function's own error message from its response payload,
/// falling back to the invocation-level error marker when the payload is
/// absent or unparseable.
fn function_error_message(function_error: &str, payload: Option<&[u8]>) -> String {
    payload
        .and_then(|bytes| serde_json::from_slice::<FunctionErrorDetail>(bytes).ok())
        .map(|detail| detail.error_message)
        .unwrap_or_else(|| format!("upgrade function reported {function_error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_extracted_from_payload() {
        let payload = br#"{"errorMessage":"migration table is locked","errorType":"Error"}"#;
        let message = function_error_message("Unhandled", Some(payload));
        assert_eq!(message, "migration table is locked");
    }

    #[test]
    fn test_missing_payload_falls_back_to_marker() {
        let message = function_error_message("Unhandled", None);
        assert_eq!(message, "upgrade function reported Unhandled");
    }

    #[test]
    fn test_unparseable_payload_falls_back_to_marker() {
        let message = function_error_message("Unhandled", Some(b"not json"));
        assert!(message.contains("Unhandled"));
    }

    #[test]
    fn test_upgrade_payload_uses_wire_field_name() {
        let payload = serde_json::to_string(&UpgradePayload { stack_id: "arn:x" }).unwrap();
        assert_eq!(payload, r#"{"stackId":"arn:x"}"#);
    }
}
