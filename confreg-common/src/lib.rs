//! # CONFREG Common Library
//!
//! Shared code for the registration services including:
//! - Registration record model and form validation
//! - PostgREST store client
//! - Configuration loading and root folder resolution
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod registration;
pub mod store;
pub mod time;

pub use error::{Error, Result};
pub use registration::{Gender, PhoneRequirement, RegistrationForm, RegistrationRecord};
