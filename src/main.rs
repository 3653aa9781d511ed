//! child-stack-manager: bulk removal and upgrade of CloudFormation child stacks
//!
//! The `remove` and `upgrade` subcommands mirror the deployment tool's
//! "before removal" and "after deployment" trigger points.

use anyhow::Result;
use child_stack_manager::aws::{AwsContext, StackManagerClient};
use child_stack_manager::config::{RemovalPolicy, StackManagerConfig, DEFAULT_MAX_CONCURRENT_COUNT};
use child_stack_manager::orchestrator;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "child-stack-manager")]
#[command(about = "Bulk removal and upgrade of prefixed CloudFormation child stacks")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Flags shared by both subcommands
#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// Name prefix identifying the child stacks (exact, case-sensitive)
    #[arg(short, long)]
    prefix: String,

    /// AWS region
    #[arg(long, default_value = "us-east-1")]
    region: String,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long)]
    aws_profile: Option<String>,

    /// Maximum number of stacks mutated simultaneously
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_COUNT)]
    max_concurrent: usize,

    /// Log and skip individual stack failures instead of aborting the run
    #[arg(long)]
    continue_on_failure: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Delete every child stack matching the prefix
    Remove {
        #[command(flatten)]
        common: CommonArgs,

        /// What to do with the child stacks (keep skips the run)
        #[arg(long, value_enum, default_value_t = RemovalPolicy::Keep)]
        removal_policy: RemovalPolicy,
    },

    /// Invoke the upgrade function against every child stack matching the prefix
    Upgrade {
        #[command(flatten)]
        common: CommonArgs,

        /// Lambda function that performs the per-stack upgrade
        #[arg(long)]
        upgrade_function: String,
    },
}

impl CommonArgs {
    fn into_config(
        self,
        removal_policy: RemovalPolicy,
        upgrade_function: Option<String>,
    ) -> (StackManagerConfig, String, Option<String>) {
        let config = StackManagerConfig {
            child_stacks_name_prefix: self.prefix,
            removal_policy,
            max_concurrent_count: self.max_concurrent,
            upgrade_function,
            continue_on_failure: self.continue_on_failure,
        };
        (config, self.region, self.aws_profile)
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let outcome = match args.command {
        Command::Remove {
            common,
            removal_policy,
        } => {
            let (config, region, profile) = common.into_config(removal_policy, None);
            info!(
                prefix = %config.child_stacks_name_prefix,
                region = %region,
                policy = %config.removal_policy,
                max_concurrent = config.max_concurrent_count,
                "Starting removal run"
            );

            let ctx = AwsContext::with_profile(&region, profile.as_deref()).await;
            let ops = Arc::new(StackManagerClient::from_context(&ctx));
            orchestrator::remove_child_stacks(&config, ops).await?
        }

        Command::Upgrade {
            common,
            upgrade_function,
        } => {
            let (config, region, profile) =
                common.into_config(RemovalPolicy::Keep, Some(upgrade_function));
            info!(
                prefix = %config.child_stacks_name_prefix,
                region = %region,
                function = config.upgrade_function.as_deref().unwrap_or_default(),
                max_concurrent = config.max_concurrent_count,
                "Starting upgrade run"
            );

            let ctx = AwsContext::with_profile(&region, profile.as_deref()).await;
            let ops = Arc::new(StackManagerClient::from_context(&ctx));
            orchestrator::upgrade_child_stacks(&config, ops).await?
        }
    };

    println!("{outcome}");
    Ok(())
}
