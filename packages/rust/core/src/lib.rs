//! Workflow orchestration and domain logic for ContentForge.
//!
//! This crate ties together research, per-platform generation, and run
//! persistence into the end-to-end [`Workflow::run`].

pub mod generation;
pub mod persist;
pub mod research;
pub mod retry;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use generation::{Generator, PlatformProfile};
pub use persist::{PersistedRun, load_run, persist_run, slugify};
pub use research::{ResearchOptions, Researcher};
pub use retry::{RetryPolicy, backoff_delay, execute_with_retry};
pub use workflow::{
    ProgressReporter, RunOutcome, RunState, SilentProgress, Workflow, WorkflowConfig,
};
