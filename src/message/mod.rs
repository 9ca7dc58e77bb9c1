//! Structured messages and the composer that builds them from template text.

pub mod composer;
pub mod headers;
pub mod types;

pub use composer::{Composer, compose, normalize_line_endings};
pub use headers::ParsedHeaders;
pub use types::{Body, StructuredMessage};
