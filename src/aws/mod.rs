//! AWS client modules
//!
//! Thin wrappers around the AWS SDK clients this tool drives:
//! - CloudFormation: stack discovery, deletion, and status probes
//! - Lambda: synchronous invocation of the per-stack upgrade function

pub mod cloudformation;
pub mod context;
pub mod error;
pub mod lambda;
pub mod operations;

pub use cloudformation::{CloudFormationClient, STABLE_STACK_STATUSES};
pub use context::AwsContext;
pub use error::{classify_cfn_error, CfnError};
pub use lambda::LambdaClient;
pub use operations::{StackManagerClient, StackOperations};
