//! [`Editor`] calls mapped onto the editor endpoint's functions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use lsp_types::{ClientInfo, Diagnostic};
use rocks_lsp::Editor;
use rocks_types::ResponseEnvelope;
use serde_json::{Value, json};

use crate::rpc::EditorEndpoint;

const SUGGEST_PROJECT_ROOT: &str = "lsp-rocks--suggest-project-root";
const DID_OPEN_PARAMS: &str = "lsp-rocks--did-open-params";
const CLIENT_INFO: &str = "lsp-rocks--client-info";
const MESSAGE: &str = "lsp-rocks--message";
const MESSAGE_HANDLER: &str = "lsp-rocks--message-handler";
const RECORD_TRIGGER_CHARACTERS: &str = "lsp-rocks--record-trigger-characters";
const DIAGNOSTICS_REPORT: &str = "lsp-rocks--diagnostics-flycheck-report";

pub struct EditorBridge {
    endpoint: Arc<EditorEndpoint>,
}

impl EditorBridge {
    pub fn new(endpoint: Arc<EditorEndpoint>) -> Self {
        Self { endpoint }
    }

    async fn push(&self, method: &str, params: Value) {
        if let Err(e) = self.endpoint.notify(method, params).await {
            tracing::debug!(method, "Editor push failed: {e:#}");
        }
    }
}

fn file_path(file: &Path) -> Value {
    json!({"filePath": file.display().to_string()})
}

#[async_trait]
impl Editor for EditorBridge {
    async fn suggest_project_root(&self, file: &Path) -> anyhow::Result<Option<PathBuf>> {
        let root = self
            .endpoint
            .request(SUGGEST_PROJECT_ROOT, file_path(file))
            .await?;
        Ok(root
            .as_str()
            .filter(|root| !root.is_empty())
            .map(PathBuf::from))
    }

    async fn open_params(&self, file: &Path) -> anyhow::Result<Value> {
        self.endpoint.request(DID_OPEN_PARAMS, file_path(file)).await
    }

    async fn client_info(&self) -> anyhow::Result<Option<ClientInfo>> {
        let info = self.endpoint.request(CLIENT_INFO, Value::Null).await?;
        if info.is_null() {
            return Ok(None);
        }
        serde_json::from_value(info)
            .map(Some)
            .context("editor client info is not {name, version}")
    }

    async fn show_message(&self, message: &str) {
        self.push(MESSAGE, json!({"message": message})).await;
    }

    async fn deliver(&self, response: ResponseEnvelope) {
        match serde_json::to_value(&response) {
            Ok(value) => self.push(MESSAGE_HANDLER, value).await,
            Err(e) => tracing::warn!(id = %response.id, "Cannot encode response: {e}"),
        }
    }

    async fn record_trigger_characters(&self, file: &Path, characters: &[String]) {
        self.push(
            RECORD_TRIGGER_CHARACTERS,
            json!({"filePath": file.display().to_string(), "triggerCharacters": characters}),
        )
        .await;
    }

    async fn diagnostics_updated(&self, file: &Path, diagnostics: &[Diagnostic]) {
        self.push(
            DIAGNOSTICS_REPORT,
            json!({"filePath": file.display().to_string(), "diagnostics": diagnostics}),
        )
        .await;
    }
}
