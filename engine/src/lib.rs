//! Orchestration for lsp-rocks.
//!
//! Maps editor requests to project roots, keeps one pool of language clients
//! per project, fans requests out to every applicable client and merges the
//! answers. Diagnostics pushed by servers are de-duplicated here before they
//! reach the editor.

pub mod descriptors;

mod diagnostics;
mod orchestrator;
mod registry;
mod staleness;


pub use diagnostics::{DiagnosticsCenter, DiagnosticsUpdate};
pub use orchestrator::{EngineOptions, LogControl, LspRocks, NoLogControl, RequestError};
pub use registry::{CommandLookup, DescriptorProvider, PathLookup, ServerRegistry, StaticProvider};
pub use staleness::RecentRequests;
