//! # Outpost Edge Agent
//!
//! The process running at an edge site: sync loops, access-controller
//! reconciliation, and the LAN endpoint local producers report events to.
//!
//! - [`controller`] - Card list reconciliation against the cached state
//! - [`local_api`] - `POST /fob-swipes`, `POST /printer-events`

pub mod controller;
pub mod local_api;

pub use controller::{run_controller, AccessController, DryRunController};
pub use local_api::build_router;
