//! Pure stage transition validation

use super::stage::{Actor, Flow, WorkflowStage};
use thiserror::Error;

/// What kind of move an accepted transition is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// `from == to`
    NoOp,
    /// Exactly one step forward
    Forward,
    /// Any number of steps back (UI only)
    Backward,
}

/// Why a transition was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionRejection {
    #[error("'{0}' is not a stage of this workflow")]
    UnknownStage(String),
    #[error("cannot skip stages: {to} is {steps} steps ahead of {from}")]
    SkipsStages {
        from: WorkflowStage,
        to: WorkflowStage,
        steps: usize,
    },
    #[error("only the UI may navigate back from {from} to {to} (actor: {actor})")]
    BackwardNotAllowed {
        from: WorkflowStage,
        to: WorkflowStage,
        actor: Actor,
    },
}

/// Validate a transition given stage names as they arrive from callers.
///
/// This function is pure: the same inputs always produce the same answer.
pub fn validate_transition(
    flow: Flow,
    from: &str,
    to: &str,
    actor: Actor,
) -> Result<TransitionKind, TransitionRejection> {
    let from_stage = parse_in_flow(flow, from)?;
    let to_stage = parse_in_flow(flow, to)?;
    validate_stages(flow, from_stage, to_stage, actor)
}

/// Validate a transition between typed stages.
pub fn validate_stages(
    flow: Flow,
    from: WorkflowStage,
    to: WorkflowStage,
    actor: Actor,
) -> Result<TransitionKind, TransitionRejection> {
    let from_idx = flow
        .position(from)
        .ok_or_else(|| TransitionRejection::UnknownStage(from.to_string()))?;
    let to_idx = flow
        .position(to)
        .ok_or_else(|| TransitionRejection::UnknownStage(to.to_string()))?;

    match to_idx.cmp(&from_idx) {
        std::cmp::Ordering::Equal => Ok(TransitionKind::NoOp),
        std::cmp::Ordering::Greater if to_idx - from_idx == 1 => Ok(TransitionKind::Forward),
        std::cmp::Ordering::Greater => Err(TransitionRejection::SkipsStages {
            from,
            to,
            steps: to_idx - from_idx,
        }),
        std::cmp::Ordering::Less => match actor {
            Actor::Ui => Ok(TransitionKind::Backward),
            Actor::Automated => Err(TransitionRejection::BackwardNotAllowed { from, to, actor }),
        },
    }
}

fn parse_in_flow(flow: Flow, name: &str) -> Result<WorkflowStage, TransitionRejection> {
    let stage: WorkflowStage = name
        .parse()
        .map_err(|_| TransitionRejection::UnknownStage(name.to_string()))?;
    if flow.position(stage).is_none() {
        return Err(TransitionRejection::UnknownStage(name.to_string()));
    }
    Ok(stage)
}
