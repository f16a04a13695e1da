//! The editor side of the bridge, as seen by clients and the orchestrator.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lsp_types::{ClientInfo, Diagnostic};
use rocks_types::ResponseEnvelope;
use serde_json::Value;

/// Calls into the editor.
///
/// The query methods round-trip through the editor and may fail; the push
/// methods are fire-and-forget and log their own failures.
#[async_trait]
pub trait Editor: Send + Sync {
    /// Project root the editor associates with `file`, if any.
    async fn suggest_project_root(&self, file: &Path) -> anyhow::Result<Option<PathBuf>>;

    /// `didOpen` parameters for `file`: `{textDocument: {uri, languageId?, version?, text}}`.
    async fn open_params(&self, file: &Path) -> anyhow::Result<Value>;

    async fn client_info(&self) -> anyhow::Result<Option<ClientInfo>>;

    /// Free-form status or error text for the user.
    async fn show_message(&self, message: &str);

    async fn deliver(&self, response: ResponseEnvelope);

    async fn record_trigger_characters(&self, file: &Path, characters: &[String]);

    async fn diagnostics_updated(&self, file: &Path, diagnostics: &[Diagnostic]);
}
