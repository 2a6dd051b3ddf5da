//! HTTP surface for the trip planner
//!
//! A thin host around [`Planner`]: every route maps to one planner
//! operation and every [`crate::error::EngineError`] kind to one status.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::planner::Planner;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub planner: Arc<Planner>,
}

impl AppState {
    pub fn new(planner: Arc<Planner>) -> Self {
        Self { planner }
    }
}
