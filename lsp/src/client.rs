//! Protocol client: one language-server connection and its lifecycle.
//!
//! ```text
//! Initial -> Starting -> Running -> Stopping -> Stopped
//!               \-> StartFailed
//! ```
//!
//! Lifecycle transitions (start, stop, restart, crash recovery) are serialized
//! by a per-client async lock. State reads and the small bookkeeping maps sit
//! behind a std mutex that is never held across an await.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use lsp_types::notification::{DidChangeConfiguration, Exit, Initialized};
use lsp_types::request::{Initialize, Request as LspRequest, Shutdown};
use lsp_types::{
    ClientCapabilities, ClientInfo, CodeActionClientCapabilities, CompletionClientCapabilities,
    CompletionItemCapability, CompletionItemCapabilityResolveSupport, ConfigurationParams,
    DiagnosticTag, DidChangeConfigurationParams, DidOpenTextDocumentParams,
    DocumentFormattingClientCapabilities, DynamicRegistrationClientCapabilities,
    GeneralClientCapabilities, GotoCapability, HoverClientCapabilities, InitializeParams,
    InitializeResult, InitializedParams, LogMessageParams, MarkupKind, MessageType,
    PositionEncodingKind, PublishDiagnosticsClientCapabilities, PublishDiagnosticsParams,
    ReferenceClientCapabilities, Registration, RegistrationParams, RenameClientCapabilities,
    ServerCapabilities, ShowMessageParams, SignatureHelpClientCapabilities, SymbolKind,
    SymbolKindCapability, TagSupport, TextDocumentClientCapabilities,
    TextDocumentSyncClientCapabilities, UnregistrationParams, Uri, WorkspaceClientCapabilities,
    WorkspaceEditClientCapabilities, WorkspaceFolder, WorkspaceSymbolClientCapabilities,
};
use rocks_types::{FileProjectIndex, Method};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::capabilities;
use crate::connection::{Connection, IncomingHandler, LaunchSpec, Launcher};
use crate::descriptor::ServerDescriptor;
use crate::editor::Editor;
use crate::error::ClientError;
use crate::features::completion::CompletionCache;
use crate::features::text_sync::{self, ResolvedSync};
use crate::features::{self, FeatureRequest, FeatureResponse};
use crate::protocol::{self, INVALID_PARAMS, RpcError};
use crate::state::ClientState;

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

type SharedStop = Shared<BoxFuture<'static, Result<(), ClientError>>>;

#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// Bound on the `shutdown` + `exit` exchange.
    pub shutdown_timeout: Duration,
    /// Automatic restarts after unexpected exits, over the client's lifetime.
    pub max_restarts: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_restarts: DEFAULT_MAX_RESTARTS,
        }
    }
}

/// Server pushes the orchestrator consumes.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Diagnostics {
        server: String,
        root: PathBuf,
        params: PublishDiagnosticsParams,
    },
}

/// Collaborators shared by every client of one orchestrator.
#[derive(Clone)]
pub struct ClientContext {
    pub editor: Arc<dyn Editor>,
    pub launcher: Arc<dyn Launcher>,
    pub events: mpsc::Sender<ServerEvent>,
    pub index: FileProjectIndex,
    pub options: ClientOptions,
}

struct ClientInner {
    state: ClientState,
    connection: Option<Arc<Connection>>,
    capabilities: Option<ServerCapabilities>,
    /// `capabilities` serialized, for the capability table.
    capabilities_json: Value,
    sync: ResolvedSync,
    trigger_characters: Vec<String>,
    /// Dynamic registrations keyed by method.
    registrations: HashMap<String, Registration>,
    opened: HashSet<String>,
    restart_count: u32,
    /// Bumped on every start so a stale connection's close is ignored.
    generation: u64,
    start_error: Option<ClientError>,
    /// The stop in progress; later callers share its outcome.
    stopping: Option<SharedStop>,
}

impl ClientInner {
    fn new() -> Self {
        Self {
            state: ClientState::Initial,
            connection: None,
            capabilities: None,
            capabilities_json: Value::Null,
            sync: ResolvedSync::NONE,
            trigger_characters: Vec::new(),
            registrations: HashMap::new(),
            opened: HashSet::new(),
            restart_count: 0,
            generation: 0,
            start_error: None,
            stopping: None,
        }
    }
}

pub struct LanguageClient {
    descriptor: Arc<dyn ServerDescriptor>,
    root: PathBuf,
    ctx: ClientContext,
    inner: Mutex<ClientInner>,
    lifecycle: tokio::sync::Mutex<()>,
    /// Held from marking a document open until its `didOpen` is queued.
    opening: tokio::sync::Mutex<()>,
    completions: CompletionCache,
    this: Weak<LanguageClient>,
}

impl LanguageClient {
    pub fn new(
        descriptor: Arc<dyn ServerDescriptor>,
        root: impl Into<PathBuf>,
        ctx: ClientContext,
    ) -> Arc<Self> {
        let root = root.into();
        Arc::new_cyclic(|this| Self {
            descriptor,
            root,
            ctx,
            inner: Mutex::new(ClientInner::new()),
            lifecycle: tokio::sync::Mutex::new(()),
            opening: tokio::sync::Mutex::new(()),
            completions: CompletionCache::default(),
            this: this.clone(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.inner().state
    }

    #[must_use]
    pub fn capabilities(&self) -> Option<ServerCapabilities> {
        self.inner().capabilities.clone()
    }

    #[must_use]
    pub fn trigger_characters(&self) -> Vec<String> {
        self.inner().trigger_characters.clone()
    }

    #[must_use]
    pub fn restart_count(&self) -> u32 {
        self.inner().restart_count
    }

    #[must_use]
    pub fn is_open(&self, uri: &str) -> bool {
        self.inner().opened.contains(uri)
    }

    /// URIs of documents open on this client, sorted.
    #[must_use]
    pub fn opened_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.inner().opened.iter().cloned().collect();
        files.sort();
        files
    }

    /// Whether the latest completion call produced an item with this token.
    #[must_use]
    pub fn has_completion_item(&self, token: &str) -> bool {
        self.completions.contains(token)
    }

    /// Start the server. Concurrent callers wait for the one in progress.
    ///
    /// A client that failed to start keeps failing with the same error until
    /// it is restarted.
    pub async fn start(&self) -> Result<(), ClientError> {
        let _lifecycle = self.lifecycle.lock().await;
        let (state, start_error) = {
            let inner = self.inner();
            (inner.state, inner.start_error.clone())
        };
        match state {
            ClientState::Running => Ok(()),
            ClientState::StartFailed => Err(start_error.unwrap_or_else(|| self.inactive())),
            _ => self.start_locked().await,
        }
    }

    /// Start when never started; fail fast when stopped or failed.
    pub async fn ensure_started(&self) -> Result<(), ClientError> {
        match self.state() {
            ClientState::Running => Ok(()),
            ClientState::Initial | ClientState::Starting | ClientState::StartFailed => {
                self.start().await
            }
            ClientState::Stopping | ClientState::Stopped => Err(self.inactive()),
        }
    }

    /// Shut the server down, bounded by the configured timeout.
    ///
    /// The client ends up `Stopped` whether or not the exchange completes.
    /// Callers arriving while a stop is in progress get that stop's outcome.
    pub async fn stop(&self) -> Result<(), ClientError> {
        let stopping = {
            let mut inner = self.inner();
            match &inner.stopping {
                Some(stopping) => stopping.clone(),
                None => {
                    let Some(this) = self.this.upgrade() else {
                        return Ok(());
                    };
                    let stopping = async move {
                        let outcome = {
                            let _lifecycle = this.lifecycle.lock().await;
                            this.stop_locked().await
                        };
                        this.inner().stopping = None;
                        outcome
                    }
                    .boxed()
                    .shared();
                    inner.stopping = Some(stopping.clone());
                    stopping
                }
            }
        };
        stopping.await
    }

    /// Stop, then start again. A failed stop does not prevent the start.
    pub async fn restart(&self) -> Result<(), ClientError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.restart_locked().await
    }

    /// Run a feature request, opening the document on this client first
    /// when the method needs it.
    pub async fn on(&self, request: FeatureRequest) -> Result<FeatureResponse, ClientError> {
        if request.method().requires_open_document()
            && let Some(uri) = request.document_uri()
        {
            let _opening = self.opening.lock().await;
            if !self.is_open(uri.as_str()) {
                self.open_from_editor(uri).await?;
            }
        }
        features::dispatch(self, request).await
    }

    /// Static capability table, then dynamic registrations.
    #[must_use]
    pub fn check_capability(&self, method: Method) -> bool {
        let inner = self.inner();
        capabilities::satisfied(method, &inner.capabilities_json)
            || inner.registrations.contains_key(method.as_str())
    }

    pub async fn send_request<R: LspRequest>(
        &self,
        params: R::Params,
    ) -> Result<R::Result, ClientError> {
        let connection = self.active_connection()?;
        connection.send_request::<R>(params).await.inspect_err(|e| {
            tracing::warn!(server = %self.name(), method = R::METHOD, "Request failed: {e}");
        })
    }

    pub async fn send_notification<N: lsp_types::notification::Notification>(
        &self,
        params: N::Params,
    ) -> Result<(), ClientError> {
        let connection = self.active_connection()?;
        connection.send_notification::<N>(params).await
    }

    pub(crate) fn active_connection(&self) -> Result<Arc<Connection>, ClientError> {
        let inner = self.inner();
        if inner.state.is_inactive() {
            return Err(self.inactive());
        }
        inner.connection.clone().ok_or_else(|| self.inactive())
    }

    pub(crate) fn completion_cache(&self) -> &CompletionCache {
        &self.completions
    }

    pub(crate) fn sync(&self) -> ResolvedSync {
        self.inner().sync
    }

    pub(crate) async fn lock_opening(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.opening.lock().await
    }

    /// Returns `false` when already open.
    pub(crate) fn track_open(&self, uri: &str) -> bool {
        self.inner().opened.insert(uri.to_string())
    }

    /// Returns `false` when not open.
    pub(crate) fn untrack_open(&self, uri: &str) -> bool {
        self.inner().opened.remove(uri)
    }

    fn inner(&self) -> MutexGuard<'_, ClientInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inactive(&self) -> ClientError {
        ClientError::Inactive {
            server: self.name().to_string(),
        }
    }

    async fn open_from_editor(&self, uri: &Uri) -> Result<(), ClientError> {
        let path = protocol::document_path(uri.as_str());
        let raw = self
            .ctx
            .editor
            .open_params(&path)
            .await
            .map_err(|e| ClientError::Editor(format!("{e:#}")))?;
        let mut params: DidOpenTextDocumentParams = text_sync::open_params(raw, Some(uri))?;
        // The tracked URI must match the one later requests carry.
        params.text_document.uri = uri.clone();
        text_sync::open_locked(self, params).await.map(|_| ())
    }

    async fn start_locked(&self) -> Result<(), ClientError> {
        let generation = {
            let mut inner = self.inner();
            inner.state = ClientState::Starting;
            inner.start_error = None;
            inner.generation += 1;
            inner.generation
        };
        tracing::info!(server = %self.name(), root = %self.root.display(), "Starting language server");

        match self.spawn_and_initialize(generation).await {
            Ok(()) => {
                tracing::info!(server = %self.name(), "Language server running");
                Ok(())
            }
            Err(err) => {
                let err = match err {
                    ClientError::Launch { .. } | ClientError::UnsupportedPositionEncoding { .. } => {
                        err
                    }
                    other => ClientError::StartFailed {
                        server: self.name().to_string(),
                        message: other.to_string(),
                    },
                };
                let connection = {
                    let mut inner = self.inner();
                    inner.state = ClientState::StartFailed;
                    inner.start_error = Some(err.clone());
                    inner.opened.clear();
                    inner.connection.take()
                };
                if let Some(connection) = connection {
                    connection.dispose().await;
                }
                tracing::warn!(server = %self.name(), "Language server failed to start: {err}");
                self.ctx.editor.show_message(&err.to_string()).await;
                Err(err)
            }
        }
    }

    async fn spawn_and_initialize(&self, generation: u64) -> Result<(), ClientError> {
        let spec = LaunchSpec {
            name: self.name().to_string(),
            command: self.descriptor.command().to_string(),
            args: self.descriptor.args().to_vec(),
            cwd: self.root.clone(),
        };
        let transport = self.ctx.launcher.launch(&spec)?;
        let handler = Arc::new(ClientHandler {
            client: self.this.clone(),
            generation,
        });
        let connection = Arc::new(Connection::listen(self.name(), transport, handler));
        self.inner().connection = Some(Arc::clone(&connection));

        let params = self.initialize_params().await?;
        let mut result: InitializeResult = connection.send_request::<Initialize>(params).await?;
        self.descriptor.post_initialize(&mut result);

        if let Some(encoding) = &result.capabilities.position_encoding
            && *encoding != PositionEncodingKind::UTF16
        {
            return Err(ClientError::UnsupportedPositionEncoding {
                server: self.name().to_string(),
                encoding: encoding.as_str().to_string(),
            });
        }

        let capabilities_json = serde_json::to_value(&result.capabilities)?;
        let sync = ResolvedSync::resolve(result.capabilities.text_document_sync.as_ref());
        let trigger_characters = result
            .capabilities
            .completion_provider
            .as_ref()
            .and_then(|c| c.trigger_characters.clone())
            .unwrap_or_default();
        {
            let mut inner = self.inner();
            inner.capabilities = Some(result.capabilities);
            inner.capabilities_json = capabilities_json;
            inner.sync = sync;
            inner.trigger_characters = trigger_characters;
        }

        connection
            .send_notification::<Initialized>(InitializedParams {})
            .await?;
        connection
            .send_notification::<DidChangeConfiguration>(DidChangeConfigurationParams {
                settings: self.descriptor.settings(),
            })
            .await?;

        self.inner().state = ClientState::Running;
        Ok(())
    }

    async fn initialize_params(&self) -> Result<InitializeParams, ClientError> {
        let root_uri = protocol::lsp_uri(&self.root).map_err(|e| ClientError::StartFailed {
            server: self.name().to_string(),
            message: e.to_string(),
        })?;
        let client_info = match self.ctx.editor.client_info().await {
            Ok(Some(info)) => info,
            Ok(None) => default_client_info(),
            Err(e) => {
                tracing::debug!("Editor did not supply client info: {e:#}");
                default_client_info()
            }
        };
        let folder_name = self
            .root
            .file_name()
            .map_or_else(|| self.root.display().to_string(), |n| n.to_string_lossy().into_owned());

        #[allow(deprecated)]
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_path: Some(self.root.display().to_string()),
            root_uri: Some(root_uri.clone()),
            initialization_options: self.descriptor.initialization_options(),
            capabilities: client_capabilities(),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: root_uri,
                name: folder_name,
            }]),
            client_info: Some(client_info),
            ..Default::default()
        };
        Ok(params)
    }

    async fn stop_locked(&self) -> Result<(), ClientError> {
        let connection = {
            let mut inner = self.inner();
            match inner.state {
                ClientState::Stopped | ClientState::Initial => return Ok(()),
                ClientState::Running => {}
                state => {
                    return Err(ClientError::NotRunning {
                        server: self.name().to_string(),
                        state,
                    });
                }
            }
            inner.state = ClientState::Stopping;
            inner.connection.clone()
        };

        let outcome = match &connection {
            Some(connection) => {
                let exchange = async {
                    connection.send_request::<Shutdown>(()).await?;
                    connection.send_notification::<Exit>(()).await?;
                    connection.end().await;
                    Ok::<(), ClientError>(())
                };
                match tokio::time::timeout(self.ctx.options.shutdown_timeout, exchange).await {
                    Ok(result) => result,
                    Err(_) => Err(ClientError::StopTimedOut {
                        server: self.name().to_string(),
                    }),
                }
            }
            None => Ok(()),
        };

        let connection = {
            let mut inner = self.inner();
            inner.state = ClientState::Stopped;
            inner.opened.clear();
            inner.connection.take()
        };
        if let Some(connection) = connection {
            connection.dispose().await;
        }

        match &outcome {
            Ok(()) => tracing::info!(server = %self.name(), "Language server stopped"),
            Err(e) => tracing::warn!(server = %self.name(), "Stopping language server failed: {e}"),
        }
        outcome
    }

    async fn restart_locked(&self) -> Result<(), ClientError> {
        self.inner().opened.clear();
        if let Err(e) = self.stop_locked().await {
            tracing::warn!(server = %self.name(), "Stop before restart failed: {e}");
        }
        {
            let mut inner = self.inner();
            if inner.state == ClientState::StartFailed {
                inner.state = ClientState::Stopped;
            }
        }
        self.start_locked().await
    }

    /// The connection of `generation` closed without being asked to.
    async fn connection_closed(&self, generation: u64) {
        let _lifecycle = self.lifecycle.lock().await;
        let max_restarts = self.ctx.options.max_restarts;

        let attempt = {
            let mut inner = self.inner();
            if inner.generation != generation || inner.state != ClientState::Running {
                return;
            }
            inner.opened.clear();
            if inner.restart_count < max_restarts {
                inner.restart_count += 1;
                Some(inner.restart_count)
            } else {
                None
            }
        };

        match attempt {
            Some(attempt) => {
                tracing::warn!(
                    server = %self.name(),
                    attempt,
                    max_restarts,
                    "Language server exited unexpectedly; restarting"
                );
                if let Err(e) = self.restart_locked().await {
                    tracing::warn!(server = %self.name(), "Restart failed: {e}");
                }
            }
            None => {
                let connection = {
                    let mut inner = self.inner();
                    inner.state = ClientState::Stopped;
                    inner.connection.take()
                };
                if let Some(connection) = connection {
                    connection.dispose().await;
                }
                tracing::warn!(server = %self.name(), "Language server exited; restart limit reached");
                self.ctx
                    .editor
                    .show_message(&format!(
                        "{} exited unexpectedly and was restarted {max_restarts} times; not restarting again",
                        self.name()
                    ))
                    .await;
            }
        }
    }

    async fn handle_server_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "client/registerCapability" | "client/registerFeature" => {
                let params: RegistrationParams = parse_server_params(params)?;
                let mut inner = self.inner();
                for registration in params.registrations {
                    tracing::debug!(server = %self.name(), method = %registration.method, "Dynamic registration");
                    inner
                        .registrations
                        .insert(registration.method.clone(), registration);
                }
                Ok(Value::Null)
            }
            "client/unregisterCapability" => {
                let params: UnregistrationParams = parse_server_params(params)?;
                let mut inner = self.inner();
                for unregistration in params.unregisterations {
                    if inner
                        .registrations
                        .get(&unregistration.method)
                        .is_some_and(|r| r.id == unregistration.id)
                    {
                        inner.registrations.remove(&unregistration.method);
                    }
                }
                Ok(Value::Null)
            }
            "workspace/configuration" => {
                let params: ConfigurationParams = parse_server_params(params)?;
                let answers = self
                    .descriptor
                    .configuration(&params.items, &self.ctx.index);
                Ok(Value::Array(answers))
            }
            "window/workDoneProgress/create" => Ok(Value::Null),
            _ => {
                tracing::debug!(server = %self.name(), method, "Unhandled server request");
                Err(RpcError::method_not_found(method))
            }
        }
    }

    async fn handle_server_notification(&self, method: &str, params: Value) {
        match method {
            "window/logMessage" => {
                if let Ok(LogMessageParams { typ, message }) = serde_json::from_value(params) {
                    log_server_message(self.name(), typ, &message);
                }
            }
            "window/showMessage" => {
                if let Ok(ShowMessageParams { message, .. }) = serde_json::from_value(params) {
                    self.ctx
                        .editor
                        .show_message(&format!("{}: {message}", self.name()))
                        .await;
                }
            }
            "textDocument/publishDiagnostics" => {
                match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                    Ok(params) => {
                        let event = ServerEvent::Diagnostics {
                            server: self.name().to_string(),
                            root: self.root.clone(),
                            params,
                        };
                        if self.ctx.events.send(event).await.is_err() {
                            tracing::debug!(server = %self.name(), "Diagnostics receiver gone");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(server = %self.name(), "Malformed publishDiagnostics: {e}");
                    }
                }
            }
            _ => tracing::trace!(server = %self.name(), method, "Ignoring server notification"),
        }
    }
}

/// Routes one connection's server traffic to its client.
struct ClientHandler {
    client: Weak<LanguageClient>,
    generation: u64,
}

#[async_trait]
impl IncomingHandler for ClientHandler {
    async fn on_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match self.client.upgrade() {
            Some(client) => client.handle_server_request(method, params).await,
            None => Err(RpcError::method_not_found(method)),
        }
    }

    async fn on_notification(&self, method: &str, params: Value) {
        if let Some(client) = self.client.upgrade() {
            client.handle_server_notification(method, params).await;
        }
    }

    fn on_error(&self, error: &anyhow::Error) {
        if let Some(client) = self.client.upgrade() {
            tracing::warn!(server = %client.name(), "Connection error: {error:#}");
        }
    }

    fn on_close(&self) {
        let Some(client) = self.client.upgrade() else {
            return;
        };
        let generation = self.generation;
        tokio::spawn(async move { client.connection_closed(generation).await });
    }
}

fn parse_server_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::new(INVALID_PARAMS, e.to_string()))
}

fn log_server_message(server: &str, typ: MessageType, message: &str) {
    if typ == MessageType::ERROR {
        tracing::error!(server, "{message}");
    } else if typ == MessageType::WARNING {
        tracing::warn!(server, "{message}");
    } else if typ == MessageType::INFO {
        tracing::info!(server, "{message}");
    } else {
        tracing::debug!(server, "{message}");
    }
}

fn default_client_info() -> ClientInfo {
    ClientInfo {
        name: "lsp-rocks".to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    }
}

fn symbol_kinds() -> Vec<SymbolKind> {
    vec![
        SymbolKind::FILE,
        SymbolKind::MODULE,
        SymbolKind::NAMESPACE,
        SymbolKind::PACKAGE,
        SymbolKind::CLASS,
        SymbolKind::METHOD,
        SymbolKind::PROPERTY,
        SymbolKind::FIELD,
        SymbolKind::CONSTRUCTOR,
        SymbolKind::ENUM,
        SymbolKind::INTERFACE,
        SymbolKind::FUNCTION,
        SymbolKind::VARIABLE,
        SymbolKind::CONSTANT,
        SymbolKind::STRING,
        SymbolKind::NUMBER,
        SymbolKind::BOOLEAN,
        SymbolKind::ARRAY,
        SymbolKind::OBJECT,
        SymbolKind::KEY,
        SymbolKind::NULL,
        SymbolKind::ENUM_MEMBER,
        SymbolKind::STRUCT,
        SymbolKind::EVENT,
        SymbolKind::OPERATOR,
        SymbolKind::TYPE_PARAMETER,
    ]
}

/// What this client supports. Positions are UTF-16 only.
fn client_capabilities() -> ClientCapabilities {
    let goto = Some(GotoCapability {
        dynamic_registration: Some(true),
        link_support: Some(true),
    });
    let markup = Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]);

    ClientCapabilities {
        workspace: Some(WorkspaceClientCapabilities {
            apply_edit: Some(true),
            workspace_edit: Some(WorkspaceEditClientCapabilities {
                document_changes: Some(true),
                ..Default::default()
            }),
            did_change_configuration: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(true),
            }),
            symbol: Some(WorkspaceSymbolClientCapabilities {
                symbol_kind: Some(SymbolKindCapability {
                    value_set: Some(symbol_kinds()),
                }),
                ..Default::default()
            }),
            workspace_folders: Some(true),
            configuration: Some(true),
            ..Default::default()
        }),
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(TextDocumentSyncClientCapabilities {
                dynamic_registration: Some(true),
                will_save: Some(true),
                did_save: Some(true),
                ..Default::default()
            }),
            completion: Some(CompletionClientCapabilities {
                dynamic_registration: Some(true),
                completion_item: Some(CompletionItemCapability {
                    snippet_support: Some(true),
                    documentation_format: markup.clone(),
                    insert_replace_support: Some(true),
                    resolve_support: Some(CompletionItemCapabilityResolveSupport {
                        properties: vec![
                            "documentation".to_string(),
                            "detail".to_string(),
                            "additionalTextEdits".to_string(),
                        ],
                    }),
                    ..Default::default()
                }),
                context_support: Some(true),
                ..Default::default()
            }),
            hover: Some(HoverClientCapabilities {
                dynamic_registration: Some(true),
                content_format: markup,
            }),
            signature_help: Some(SignatureHelpClientCapabilities {
                dynamic_registration: Some(true),
                ..Default::default()
            }),
            references: Some(ReferenceClientCapabilities {
                dynamic_registration: Some(true),
            }),
            formatting: Some(DocumentFormattingClientCapabilities {
                dynamic_registration: Some(true),
            }),
            declaration: goto.clone(),
            definition: goto.clone(),
            type_definition: goto.clone(),
            implementation: goto,
            code_action: Some(CodeActionClientCapabilities {
                dynamic_registration: Some(true),
                ..Default::default()
            }),
            rename: Some(RenameClientCapabilities {
                dynamic_registration: Some(true),
                prepare_support: Some(true),
                ..Default::default()
            }),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                related_information: Some(true),
                tag_support: Some(TagSupport {
                    value_set: vec![DiagnosticTag::UNNECESSARY, DiagnosticTag::DEPRECATED],
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        general: Some(GeneralClientCapabilities {
            position_encodings: Some(vec![PositionEncodingKind::UTF16]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_declare_utf16_only() {
        let caps = client_capabilities();
        assert_eq!(
            caps.general.unwrap().position_encodings,
            Some(vec![PositionEncodingKind::UTF16])
        );
    }

    #[test]
    fn capabilities_cover_every_symbol_kind() {
        assert_eq!(symbol_kinds().len(), 26);
        let value = serde_json::to_value(client_capabilities()).unwrap();
        assert_eq!(
            value["textDocument"]["publishDiagnostics"]["tagSupport"]["valueSet"],
            serde_json::json!([1, 2])
        );
        assert_eq!(value["textDocument"]["rename"]["prepareSupport"], true);
    }

    #[test]
    fn default_client_info_names_the_bridge() {
        let info = default_client_info();
        assert_eq!(info.name, "lsp-rocks");
        assert!(info.version.is_some());
    }
}
