//! Prompt execution runtime: retry policy, stage runner, the three-stage
//! chain, the worker pool that drives it and the in-memory job tracker.

pub mod chain;
pub mod orchestrator;
pub mod retry;
pub mod stage;
pub mod tracker;
pub mod types;
