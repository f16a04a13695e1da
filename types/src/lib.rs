//! Core domain types for lsp-rocks.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! The editor-facing envelopes, the closed set of supported LSP methods and the
//! file-to-project index are shared by the protocol client and the orchestrator.

#![allow(clippy::missing_errors_doc)]

mod envelope;
mod method;
mod project;

pub use envelope::{RequestEnvelope, RequestId, ResponseEnvelope, StalenessScope};
pub use method::{Method, MethodParseError};
pub use project::FileProjectIndex;
