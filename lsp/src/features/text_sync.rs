//! Document synchronization notifications.

use lsp_types::notification::{
    DidChangeTextDocument, DidCloseTextDocument, DidOpenTextDocument, DidSaveTextDocument,
    WillSaveTextDocument,
};
use lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, TextDocumentItem, TextDocumentSyncCapability, TextDocumentSyncKind,
    TextDocumentSyncSaveOptions, Uri, WillSaveTextDocumentParams,
};
use serde::Deserialize;
use serde_json::Value;

use super::FeatureResponse;
use crate::client::LanguageClient;
use crate::error::ClientError;
use crate::protocol;

/// How a server wants documents synchronized, flattened from either form
/// of `textDocumentSync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSync {
    pub open_close: bool,
    pub change: TextDocumentSyncKind,
    pub will_save: bool,
    /// `didSave` is sent, never with the document text.
    pub save: bool,
}

impl ResolvedSync {
    pub const NONE: Self = Self {
        open_close: false,
        change: TextDocumentSyncKind::NONE,
        will_save: false,
        save: false,
    };

    #[must_use]
    pub fn resolve(sync: Option<&TextDocumentSyncCapability>) -> Self {
        match sync {
            None => Self::NONE,
            Some(TextDocumentSyncCapability::Kind(kind)) if *kind == TextDocumentSyncKind::NONE => {
                Self::NONE
            }
            Some(TextDocumentSyncCapability::Kind(kind)) => Self {
                open_close: true,
                change: *kind,
                will_save: false,
                save: true,
            },
            Some(TextDocumentSyncCapability::Options(options)) => Self {
                open_close: options.open_close.unwrap_or(false),
                change: options.change.unwrap_or(TextDocumentSyncKind::NONE),
                will_save: options.will_save.unwrap_or(false),
                save: match &options.save {
                    None => false,
                    Some(TextDocumentSyncSaveOptions::Supported(supported)) => *supported,
                    Some(TextDocumentSyncSaveOptions::SaveOptions(_)) => true,
                },
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenDocument {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    language_id: Option<String>,
    #[serde(default)]
    version: Option<i32>,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenParams {
    text_document: OpenDocument,
}

/// Build `didOpen` params from the editor's loosely-shaped open parameters.
///
/// The editor's `uri` may be a path or a URI; `fallback` is used when it
/// sends none. A missing `languageId` is derived from the file extension
/// and a missing `version` is 0.
pub(crate) fn open_params(
    params: Value,
    fallback: Option<&Uri>,
) -> Result<DidOpenTextDocumentParams, ClientError> {
    let OpenParams { text_document } = serde_json::from_value(params)
        .map_err(|e| ClientError::invalid_params("textDocument/didOpen", &e))?;

    let uri = match (text_document.uri.as_deref(), fallback) {
        (Some(raw), _) => protocol::to_protocol_uri(raw).map_err(|e| ClientError::InvalidParams {
            method: "textDocument/didOpen".into(),
            message: e.to_string(),
        })?,
        (None, Some(uri)) => uri.clone(),
        (None, None) => {
            return Err(ClientError::InvalidParams {
                method: "textDocument/didOpen".into(),
                message: "missing textDocument.uri".into(),
            });
        }
    };
    let language_id = text_document.language_id.unwrap_or_else(|| {
        protocol::language_id_for_path(&protocol::document_path(uri.as_str())).to_string()
    });

    Ok(DidOpenTextDocumentParams {
        text_document: TextDocumentItem {
            uri,
            language_id,
            version: text_document.version.unwrap_or(0),
            text: text_document.text,
        },
    })
}

/// Forwarded only the first time a document is opened on this client.
pub(crate) async fn did_open(
    client: &LanguageClient,
    params: DidOpenTextDocumentParams,
) -> Result<FeatureResponse, ClientError> {
    let _opening = client.lock_opening().await;
    open_locked(client, params).await
}

/// [`did_open`] for callers already holding the client's opening lock.
pub(crate) async fn open_locked(
    client: &LanguageClient,
    params: DidOpenTextDocumentParams,
) -> Result<FeatureResponse, ClientError> {
    let uri = params.text_document.uri.as_str().to_string();
    if !client.track_open(&uri) {
        return Ok(FeatureResponse::None);
    }
    if client.sync().open_close
        && let Err(e) = client
            .send_notification::<DidOpenTextDocument>(params)
            .await
    {
        client.untrack_open(&uri);
        return Err(e);
    }
    Ok(FeatureResponse::None)
}

/// Forwarded only for documents this client has open.
pub(crate) async fn did_close(
    client: &LanguageClient,
    params: DidCloseTextDocumentParams,
) -> Result<FeatureResponse, ClientError> {
    if !client.untrack_open(params.text_document.uri.as_str()) {
        return Ok(FeatureResponse::None);
    }
    if client.sync().open_close {
        client
            .send_notification::<DidCloseTextDocument>(params)
            .await?;
    }
    Ok(FeatureResponse::None)
}

pub(crate) async fn did_change(
    client: &LanguageClient,
    params: DidChangeTextDocumentParams,
) -> Result<FeatureResponse, ClientError> {
    if client.sync().change != TextDocumentSyncKind::NONE {
        client
            .send_notification::<DidChangeTextDocument>(params)
            .await?;
    }
    Ok(FeatureResponse::None)
}

pub(crate) async fn will_save(
    client: &LanguageClient,
    params: WillSaveTextDocumentParams,
) -> Result<FeatureResponse, ClientError> {
    if client.sync().will_save {
        client
            .send_notification::<WillSaveTextDocument>(params)
            .await?;
    }
    Ok(FeatureResponse::None)
}

pub(crate) async fn did_save(
    client: &LanguageClient,
    mut params: DidSaveTextDocumentParams,
) -> Result<FeatureResponse, ClientError> {
    if client.sync().save {
        params.text = None;
        client
            .send_notification::<DidSaveTextDocument>(params)
            .await?;
    }
    Ok(FeatureResponse::None)
}

#[cfg(test)]
mod tests {
    use lsp_types::{SaveOptions, TextDocumentSyncOptions};
    use serde_json::json;

    use super::*;

    #[test]
    fn bare_kind_implies_open_close_and_save() {
        let sync = ResolvedSync::resolve(Some(&TextDocumentSyncCapability::Kind(
            TextDocumentSyncKind::INCREMENTAL,
        )));
        assert!(sync.open_close);
        assert!(sync.save);
        assert!(!sync.will_save);
        assert_eq!(sync.change, TextDocumentSyncKind::INCREMENTAL);
    }

    #[test]
    fn none_kind_and_absent_sync_send_nothing() {
        assert_eq!(ResolvedSync::resolve(None), ResolvedSync::NONE);
        assert_eq!(
            ResolvedSync::resolve(Some(&TextDocumentSyncCapability::Kind(
                TextDocumentSyncKind::NONE
            ))),
            ResolvedSync::NONE
        );
    }

    #[test]
    fn options_are_taken_field_by_field() {
        let sync = ResolvedSync::resolve(Some(&TextDocumentSyncCapability::Options(
            TextDocumentSyncOptions {
                open_close: Some(true),
                change: Some(TextDocumentSyncKind::FULL),
                will_save: Some(true),
                will_save_wait_until: None,
                save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                    include_text: Some(true),
                })),
            },
        )));
        assert_eq!(
            sync,
            ResolvedSync {
                open_close: true,
                change: TextDocumentSyncKind::FULL,
                will_save: true,
                save: true,
            }
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn open_params_fill_language_and_version() {
        let params = open_params(
            json!({"textDocument": {"uri": "/proj/src/b.tsx", "text": "let a = 1"}}),
            None,
        )
        .unwrap();
        assert_eq!(params.text_document.uri.as_str(), "file:///proj/src/b.tsx");
        assert_eq!(params.text_document.language_id, "typescriptreact");
        assert_eq!(params.text_document.version, 0);
        assert_eq!(params.text_document.text, "let a = 1");
    }

    #[test]
    fn open_params_keep_editor_values_and_use_fallback_uri() {
        let fallback: Uri = "file:///proj/a.ts".parse().unwrap();
        let params = open_params(
            json!({"textDocument": {"languageId": "vue", "version": 4, "text": ""}}),
            Some(&fallback),
        )
        .unwrap();
        assert_eq!(params.text_document.uri, fallback);
        assert_eq!(params.text_document.language_id, "vue");
        assert_eq!(params.text_document.version, 4);

        assert!(open_params(json!({"textDocument": {}}), None).is_err());
    }
}
