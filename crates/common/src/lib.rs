//! Common types shared across Quill crates.
//!
//! This crate provides the error type, the role-tagged message model and
//! the explicit per-session context that every handler receives.

pub mod error;
pub mod message;
pub mod session;

pub use error::{QuillError, Result};
pub use message::{ChatMessage, Role, Transcript};
pub use session::Session;
