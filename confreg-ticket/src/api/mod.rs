//! HTTP API handlers for confreg-ticket

pub mod confirmation;
pub mod health;

pub use confirmation::send_confirmation_email;
pub use health::health_routes;
