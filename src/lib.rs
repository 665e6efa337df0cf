//! drover: plan-driven orchestration of agent CLI tools.
//!
//! A run walks a markdown task plan through configurable phases (task
//! execution, self-review, external review, finalize), driving each phase
//! with child invocations of the configured tools and steering on the
//! sentinel signals they echo back.

pub mod config;
pub mod errors;
pub mod executor;
pub mod input;
pub mod logger;
pub mod phase;
pub mod plan;
pub mod process;
pub mod runner;
pub mod signals;
pub mod stream;
