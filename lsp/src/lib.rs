//! Protocol client driving language servers on behalf of an editor.
//!
//! One [`LanguageClient`] owns one server process for one project root. It
//! runs the LSP lifecycle, tracks which documents are open on the server,
//! and turns editor-shaped feature requests into protocol requests.

pub mod codec;
pub mod protocol;

mod capabilities;
mod client;
mod connection;
mod descriptor;
mod editor;
mod error;
mod features;
mod state;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;


pub use client::{
    ClientContext, ClientOptions, DEFAULT_MAX_RESTARTS, DEFAULT_SHUTDOWN_TIMEOUT, LanguageClient,
    ServerEvent,
};
pub use connection::{LaunchSpec, Launcher, ProcessLauncher, ServerTransport};
pub use descriptor::ServerDescriptor;
pub use editor::Editor;
pub use error::ClientError;
pub use features::{
    EditorCompletionItem, EditorCompletionParams, EditorLocation, EditorPrepareRename,
    FeatureRequest, FeatureResponse, ResolveTarget,
};
pub use state::ClientState;
