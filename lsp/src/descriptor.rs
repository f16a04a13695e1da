//! Static description of one language server.

use std::path::Path;

use lsp_types::{ConfigurationItem, InitializeResult};
use rocks_types::FileProjectIndex;
use serde_json::Value;

/// How to launch a server, which files it covers, and how to talk to it.
///
/// Descriptors are immutable after construction and shared between every
/// client created from them.
pub trait ServerDescriptor: Send + Sync {
    /// Unique name; at most one client per `(project root, name)`.
    fn name(&self) -> &str;

    /// Executable looked up on `PATH`.
    fn command(&self) -> &str;

    fn args(&self) -> &[String];

    /// File extensions this server covers, with or without a leading dot.
    fn extensions(&self) -> &[String];

    /// Project-detection predicate, e.g. "does a tailwind config exist".
    fn activate(&self, file: &Path, root: &Path) -> bool;

    /// Sent with `workspace/didChangeConfiguration` after `initialized`.
    fn settings(&self) -> Value {
        Value::Object(serde_json::Map::new())
    }

    fn initialization_options(&self) -> Option<Value> {
        None
    }

    /// Answer to a `workspace/configuration` pull, one value per item.
    ///
    /// The default answers every item with the initialization options.
    fn configuration(&self, items: &[ConfigurationItem], index: &FileProjectIndex) -> Vec<Value> {
        let _ = index;
        let answer = self.initialization_options().unwrap_or(Value::Null);
        vec![answer; items.len()]
    }

    /// Adjust the server's `initialize` result before it is stored.
    fn post_initialize(&self, result: &mut InitializeResult) {
        let _ = result;
    }

    fn supports_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        !ext.is_empty()
            && self
                .extensions()
                .iter()
                .any(|e| e.trim_start_matches('.') == ext)
    }
}
