//! Core types for dockspec
//!
//! This module holds the error system shared by every other module:
//! - [`DockspecError`] - Enumerated error types covering all failure modes
//! - [`ErrorContext`] - User-friendly error wrapper with suggestions and details
//! - [`user_friendly_error`] - Convert any error to user-friendly format
//!
//! Operations return [`anyhow::Result`] and raise [`DockspecError`] variants for the
//! failures a user can act on; the CLI converts whatever reaches it with
//! [`user_friendly_error`].

pub mod error;

pub use error::{DockspecError, ErrorContext, user_friendly_error};
