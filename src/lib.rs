// Typed errors and exit codes
pub mod error;

// Config file, env overrides, state directory
pub mod config;

// Credential records and the on-disk account store
pub mod accounts;

// OAuth authorization-code flow
pub mod oauth;

// Access tokens for outgoing API calls
pub mod auth;

// Command-line surface
pub mod cli;

pub use error::{Error, Result};
