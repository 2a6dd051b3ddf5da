//! Turn/action dispatch
//!
//! Orchestration and the UI both change sessions by submitting an ordered
//! list of [`ToolAction`]s. The [`Dispatcher`] applies them one at a time and
//! reports where a batch stopped.

mod action;
mod dispatcher;

#[cfg(test)]
pub use action::DayRestaurants;
pub use action::ToolAction;
pub use dispatcher::{ActionRejection, DispatchOutcome, DispatchPolicy, Dispatcher};
