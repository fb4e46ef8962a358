//! Utility functions shared by the fetcher and the CLI.
//!
//! - **URL validation**: shape checks before a request is issued
//! - **Text processing**: terminal-safe output and bounded diagnostics

mod text;
mod url_validator;

pub use text::{strip_control_chars, truncate_chars};
pub use url_validator::{validate_url, UrlValidationError};
