//! Workflow stage machine
//!
//! Stages move forward one step at a time. Only the UI may move a session
//! backwards. The validator is a pure function; persisting the new stage is
//! the caller's job.

pub mod stage;
mod transition;

#[cfg(test)]
mod proptests;

pub use stage::{Actor, Flow, WorkflowStage};
pub use transition::{validate_stages, validate_transition, TransitionKind, TransitionRejection};
