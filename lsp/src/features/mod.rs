//! Feature handlers: editor-shaped request in, editor-shaped result out.
//!
//! Each handler is gated on the client's capability check; a server that
//! never advertised a method gets no request and the handler answers with
//! the method's empty result.

pub(crate) mod completion;
pub(crate) mod filter;
mod formatting;
mod hover;
mod navigation;
mod rename;
pub(crate) mod text_sync;

use lsp_types::request::{GotoDeclaration, GotoDefinition, GotoImplementation, GotoTypeDefinition};
use lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, DocumentFormattingParams, GotoDefinitionParams, Hover, HoverParams,
    ReferenceParams, RenameParams, SignatureHelp, SignatureHelpParams, TextDocumentPositionParams,
    TextEdit, Uri, WillSaveTextDocumentParams, WorkspaceEdit,
};
use rocks_types::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::LanguageClient;
use crate::error::ClientError;

pub use completion::{EditorCompletionItem, EditorCompletionParams, ResolveTarget};
pub use navigation::EditorLocation;
pub use rename::EditorPrepareRename;

/// A typed editor request for one method.
#[derive(Debug, Clone)]
pub enum FeatureRequest {
    DidOpen(DidOpenTextDocumentParams),
    DidClose(DidCloseTextDocumentParams),
    DidChange(DidChangeTextDocumentParams),
    WillSave(WillSaveTextDocumentParams),
    DidSave(DidSaveTextDocumentParams),
    Completion(EditorCompletionParams),
    CompletionResolve(ResolveTarget),
    Definition(GotoDefinitionParams),
    Declaration(GotoDefinitionParams),
    TypeDefinition(GotoDefinitionParams),
    Implementation(GotoDefinitionParams),
    References(ReferenceParams),
    Hover(HoverParams),
    SignatureHelp(SignatureHelpParams),
    Rename(RenameParams),
    PrepareRename(TextDocumentPositionParams),
    Formatting(DocumentFormattingParams),
}

impl FeatureRequest {
    /// Parse editor params for `method`.
    ///
    /// `params.textDocument.uri` must already be a protocol URI. Members the
    /// editor commonly leaves out (reference context, formatting options,
    /// will-save reason, open-document language and version) get defaults.
    pub fn parse(method: Method, params: Value) -> Result<Self, ClientError> {
        Ok(match method {
            Method::DidOpen => Self::DidOpen(text_sync::open_params(params, None)?),
            Method::DidClose => Self::DidClose(typed(method, params)?),
            Method::DidChange => Self::DidChange(typed(method, params)?),
            Method::WillSave => {
                Self::WillSave(typed(method, with_default(params, "reason", serde_json::json!(1)))?)
            }
            Method::DidSave => Self::DidSave(typed(method, params)?),
            Method::Completion => Self::Completion(typed(method, params)?),
            Method::CompletionResolve => Self::CompletionResolve(typed(method, params)?),
            Method::Definition => Self::Definition(typed(method, params)?),
            Method::Declaration => Self::Declaration(typed(method, params)?),
            Method::TypeDefinition => Self::TypeDefinition(typed(method, params)?),
            Method::Implementation => Self::Implementation(typed(method, params)?),
            Method::References => Self::References(typed(
                method,
                with_default(
                    params,
                    "context",
                    serde_json::json!({"includeDeclaration": true}),
                ),
            )?),
            Method::Hover => Self::Hover(typed(method, params)?),
            Method::SignatureHelp => Self::SignatureHelp(typed(method, params)?),
            Method::Rename => Self::Rename(typed(method, params)?),
            Method::PrepareRename => Self::PrepareRename(typed(method, params)?),
            Method::Formatting => Self::Formatting(typed(
                method,
                with_default(
                    params,
                    "options",
                    serde_json::json!({"tabSize": 2, "insertSpaces": true}),
                ),
            )?),
        })
    }

    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::DidOpen(_) => Method::DidOpen,
            Self::DidClose(_) => Method::DidClose,
            Self::DidChange(_) => Method::DidChange,
            Self::WillSave(_) => Method::WillSave,
            Self::DidSave(_) => Method::DidSave,
            Self::Completion(_) => Method::Completion,
            Self::CompletionResolve(_) => Method::CompletionResolve,
            Self::Definition(_) => Method::Definition,
            Self::Declaration(_) => Method::Declaration,
            Self::TypeDefinition(_) => Method::TypeDefinition,
            Self::Implementation(_) => Method::Implementation,
            Self::References(_) => Method::References,
            Self::Hover(_) => Method::Hover,
            Self::SignatureHelp(_) => Method::SignatureHelp,
            Self::Rename(_) => Method::Rename,
            Self::PrepareRename(_) => Method::PrepareRename,
            Self::Formatting(_) => Method::Formatting,
        }
    }

    /// The document this request is about; `None` for completion resolve.
    #[must_use]
    pub fn document_uri(&self) -> Option<&Uri> {
        Some(match self {
            Self::DidOpen(p) => &p.text_document.uri,
            Self::DidClose(p) => &p.text_document.uri,
            Self::DidChange(p) => &p.text_document.uri,
            Self::WillSave(p) => &p.text_document.uri,
            Self::DidSave(p) => &p.text_document.uri,
            Self::Completion(p) => &p.text_document.uri,
            Self::CompletionResolve(_) => return None,
            Self::Definition(p)
            | Self::Declaration(p)
            | Self::TypeDefinition(p)
            | Self::Implementation(p) => &p.text_document_position_params.text_document.uri,
            Self::References(p) => &p.text_document_position.text_document.uri,
            Self::Hover(p) => &p.text_document_position_params.text_document.uri,
            Self::SignatureHelp(p) => &p.text_document_position_params.text_document.uri,
            Self::Rename(p) => &p.text_document_position.text_document.uri,
            Self::PrepareRename(p) => &p.text_document.uri,
            Self::Formatting(p) => &p.text_document.uri,
        })
    }
}

/// A feature handler's result.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureResponse {
    /// Notifications, and requests the server answered with nothing.
    None,
    Completion(Vec<EditorCompletionItem>),
    Resolved(Option<lsp_types::CompletionItem>),
    Locations(Vec<EditorLocation>),
    Hover(Option<Hover>),
    SignatureHelp(Option<SignatureHelp>),
    Rename(Option<WorkspaceEdit>),
    PrepareRename(Option<EditorPrepareRename>),
    Formatting(Vec<TextEdit>),
}

impl FeatureResponse {
    /// The result a method yields when the server cannot serve it.
    #[must_use]
    pub fn empty(method: Method) -> Self {
        match method {
            Method::Completion => Self::Completion(Vec::new()),
            Method::Definition
            | Method::Declaration
            | Method::TypeDefinition
            | Method::Implementation
            | Method::References => Self::Locations(Vec::new()),
            Method::Formatting => Self::Formatting(Vec::new()),
            _ => Self::None,
        }
    }

    /// No data worth delivering.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None
            | Self::Resolved(None)
            | Self::Hover(None)
            | Self::SignatureHelp(None)
            | Self::Rename(None)
            | Self::PrepareRename(None) => true,
            Self::Completion(items) => items.is_empty(),
            Self::Locations(locations) => locations.is_empty(),
            Self::Formatting(edits) => edits.is_empty(),
            Self::Resolved(Some(_))
            | Self::Hover(Some(_))
            | Self::SignatureHelp(Some(_))
            | Self::Rename(Some(_))
            | Self::PrepareRename(Some(_)) => false,
        }
    }

    /// The `data` member delivered to the editor.
    pub fn into_value(self) -> Result<Value, ClientError> {
        let value = match self {
            Self::None => Value::Null,
            Self::Completion(items) => serde_json::to_value(items)?,
            Self::Resolved(item) => serde_json::to_value(item)?,
            Self::Locations(locations) => serde_json::to_value(locations)?,
            Self::Hover(hover) => serde_json::to_value(hover)?,
            Self::SignatureHelp(help) => serde_json::to_value(help)?,
            Self::Rename(edit) => serde_json::to_value(edit)?,
            Self::PrepareRename(result) => serde_json::to_value(result)?,
            Self::Formatting(edits) => serde_json::to_value(edits)?,
        };
        Ok(value)
    }
}

/// Run `request` on `client`, assuming the document is already open there.
pub(crate) async fn dispatch(
    client: &LanguageClient,
    request: FeatureRequest,
) -> Result<FeatureResponse, ClientError> {
    let method = request.method();
    if !client.check_capability(method) {
        tracing::debug!(server = %client.name(), %method, "Server lacks capability; skipping");
        return Ok(FeatureResponse::empty(method));
    }

    match request {
        FeatureRequest::DidOpen(params) => text_sync::did_open(client, params).await,
        FeatureRequest::DidClose(params) => text_sync::did_close(client, params).await,
        FeatureRequest::DidChange(params) => text_sync::did_change(client, params).await,
        FeatureRequest::WillSave(params) => text_sync::will_save(client, params).await,
        FeatureRequest::DidSave(params) => text_sync::did_save(client, params).await,
        FeatureRequest::Completion(params) => completion::complete(client, params).await,
        FeatureRequest::CompletionResolve(target) => completion::resolve(client, &target).await,
        FeatureRequest::Definition(params) => navigation::goto::<GotoDefinition>(client, params).await,
        FeatureRequest::Declaration(params) => {
            navigation::goto::<GotoDeclaration>(client, params).await
        }
        FeatureRequest::TypeDefinition(params) => {
            navigation::goto::<GotoTypeDefinition>(client, params).await
        }
        FeatureRequest::Implementation(params) => {
            navigation::goto::<GotoImplementation>(client, params).await
        }
        FeatureRequest::References(params) => navigation::references(client, params).await,
        FeatureRequest::Hover(params) => hover::hover(client, params).await,
        FeatureRequest::SignatureHelp(params) => hover::signature_help(client, params).await,
        FeatureRequest::Rename(params) => rename::rename(client, params).await,
        FeatureRequest::PrepareRename(params) => rename::prepare_rename(client, params).await,
        FeatureRequest::Formatting(params) => formatting::format(client, params).await,
    }
}

fn typed<T: DeserializeOwned>(method: Method, params: Value) -> Result<T, ClientError> {
    serde_json::from_value(params).map_err(|e| ClientError::invalid_params(method.as_str(), &e))
}

/// Insert `key` into an object `params` when it is absent or null.
fn with_default(mut params: Value, key: &str, default: Value) -> Value {
    if let Value::Object(map) = &mut params {
        let missing = map.get(key).is_none_or(Value::is_null);
        if missing {
            map.insert(key.to_string(), default);
        }
    }
    params
}
