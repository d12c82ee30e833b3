//! HTTP API handlers for confreg-submit

pub mod health;
pub mod registrations;

pub use health::health_routes;
pub use registrations::{get_diagnostics, list_pending, resync_registrations, submit_registration};
