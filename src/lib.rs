//! child-stack-manager - bulk lifecycle operations for CloudFormation child stacks
//!
//! Discovers all stacks whose name starts with a configured prefix and runs a
//! delete or upgrade action against each of them, with a fixed cap on how many
//! stacks are mutated at the same time.

pub mod aws;
pub mod config;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod scheduler;
