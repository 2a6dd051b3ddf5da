//! Trip-planning sessions
//!
//! A session is the unit of work for one trip plan. It is created at trip
//! start, read and written on every turn, and dropped after a period of
//! inactivity.

pub mod clock;
mod patch;
mod store;
mod sweeper;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use patch::{SessionPatch, TripInfoPatch, TripLimits};
pub use store::{InMemorySessionStore, SessionStore};
pub use sweeper::spawn_sweeper;
pub use types::*;
