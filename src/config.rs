//! Run configuration

use crate::monitor::StackAction;
use anyhow::{ensure, Context, Result};

/// Default cap on concurrently mutated stacks.
pub const DEFAULT_MAX_CONCURRENT_COUNT: usize = 5;

/// What to do with the child stacks when the parent service is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RemovalPolicy {
    /// Leave the child stacks in place
    #[default]
    Keep,
    /// Remove every child stack matching the prefix
    Remove,
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RemovalPolicy::Keep => "keep",
            RemovalPolicy::Remove => "remove",
        })
    }
}

/// Configuration for one run, built once and never mutated.
#[derive(Debug, Clone)]
pub struct StackManagerConfig {
    /// Name prefix identifying the child stacks (exact, case-sensitive)
    pub child_stacks_name_prefix: String,
    /// Removal gating for the remove flow
    pub removal_policy: RemovalPolicy,
    /// Cap on concurrently mutated stacks, must be at least 1
    pub max_concurrent_count: usize,
    /// Lambda function performing the per-stack upgrade (upgrade runs only)
    pub upgrade_function: Option<String>,
    /// Log and skip individual stack failures instead of aborting the run
    pub continue_on_failure: bool,
}

impl StackManagerConfig {
    /// Check required fields and bounds before any remote call is made.
    pub fn validate(&self, action: StackAction) -> Result<()> {
        ensure!(
            !self.child_stacks_name_prefix.is_empty(),
            "child_stacks_name_prefix is required"
        );
        ensure!(
            self.max_concurrent_count >= 1,
            "max_concurrent_count must be at least 1"
        );
        if action == StackAction::Update {
            self.require_upgrade_function()?;
        }
        Ok(())
    }

    /// The upgrade function name, or a configuration error if absent.
    pub fn require_upgrade_function(&self) -> Result<&str> {
        self.upgrade_function
            .as_deref()
            .filter(|name| !name.is_empty())
            .context("upgrade_function is required for upgrade runs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> StackManagerConfig {
        StackManagerConfig {
            child_stacks_name_prefix: "Foo".to_string(),
            removal_policy: RemovalPolicy::Remove,
            max_concurrent_count: DEFAULT_MAX_CONCURRENT_COUNT,
            upgrade_function: None,
            continue_on_failure: false,
        }
    }

    #[test]
    fn test_valid_removal_config() {
        assert!(base_config().validate(StackAction::Removal).is_ok());
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let mut config = base_config();
        config.child_stacks_name_prefix = String::new();
        let err = config.validate(StackAction::Removal).unwrap_err();
        assert!(err.to_string().contains("child_stacks_name_prefix"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = base_config();
        config.max_concurrent_count = 0;
        assert!(config.validate(StackAction::Removal).is_err());
    }

    #[test]
    fn test_upgrade_requires_function() {
        let config = base_config();
        assert!(config.validate(StackAction::Removal).is_ok());
        let err = config.validate(StackAction::Update).unwrap_err();
        assert!(err.to_string().contains("upgrade_function"));
    }

    #[test]
    fn test_empty_upgrade_function_rejected() {
        let mut config = base_config();
        config.upgrade_function = Some(String::new());
        assert!(config.validate(StackAction::Update).is_err());
    }

    #[test]
    fn test_upgrade_function_accepted() {
        let mut config = base_config();
        config.upgrade_function = Some("stack-migrator".to_string());
        assert!(config.validate(StackAction::Update).is_ok());
        assert_eq!(config.require_upgrade_function().unwrap(), "stack-migrator");
    }

    #[test]
    fn test_removal_policy_default_is_keep() {
        assert_eq!(RemovalPolicy::default(), RemovalPolicy::Keep);
    }
}
