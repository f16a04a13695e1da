//! The orchestrator: routes editor requests to per-project client pools.
//!
//! Each request is resolved to a project root, then to the clients whose
//! descriptors cover the file. Clients are created lazily, at most one per
//! `(root, server name)`, and started before use. Results are merged per
//! method and dropped when a newer request of the same kind arrived while
//! this one was in flight.
//!
//! Text synchronization notifications are applied one at a time, in arrival
//! order, by a single consumer task; everything else runs concurrently.

use std::collections::{BTreeSet, HashMap};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::future::{join_all, try_join_all};
use lsp_types::Diagnostic;
use rocks_config::RocksConfig;
use rocks_lsp::protocol::{document_path, to_protocol_uri};
use rocks_lsp::{
    ClientContext, ClientError, ClientOptions, Editor, FeatureRequest, FeatureResponse,
    LanguageClient, Launcher, ServerDescriptor, ServerEvent,
};
use rocks_types::{
    FileProjectIndex, Method, MethodParseError, RequestEnvelope, ResponseEnvelope, StalenessScope,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::descriptors::TYPESCRIPT;
use crate::diagnostics::DiagnosticsCenter;
use crate::registry::ServerRegistry;
use crate::staleness::RecentRequests;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    UnknownMethod(#[from] MethodParseError),
    #[error("{cmd}: params.textDocument.uri is missing")]
    MissingDocument { cmd: String },
    #[error("{cmd}: {message}")]
    InvalidUri { cmd: String, message: String },
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("no {server} client for project {}", root.display())]
    NoClient { server: String, root: PathBuf },
    #[error("unknown language server `{0}`")]
    UnknownServer(String),
    #[error("{cmd}: lsp-rocks is shutting down")]
    ShuttingDown { cmd: String },
}

/// Log verbosity and location, owned by the binary.
pub trait LogControl: Send + Sync {
    /// Flip between the configured level and `trace`; `true` when now tracing.
    fn toggle_trace(&self) -> anyhow::Result<bool>;

    fn log_file(&self) -> Option<PathBuf>;
}

/// For embedders without a log file.
pub struct NoLogControl;

impl LogControl for NoLogControl {
    fn toggle_trace(&self) -> anyhow::Result<bool> {
        anyhow::bail!("log level cannot be changed")
    }

    fn log_file(&self) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    pub client: ClientOptions,
    pub staleness: StalenessScope,
}

impl EngineOptions {
    #[must_use]
    pub fn from_config(config: &RocksConfig) -> Self {
        Self {
            client: ClientOptions {
                shutdown_timeout: config.client.shutdown_timeout(),
                max_restarts: config.client.max_restarts,
            },
            staleness: config.requests.staleness,
        }
    }
}

type Outcome = Result<Option<ResponseEnvelope>, RequestError>;

/// A text synchronization notification waiting for the ordered consumer.
struct SyncJob {
    envelope: RequestEnvelope,
    /// `None` for fire-and-forget messages.
    reply: Option<oneshot::Sender<Outcome>>,
}

pub struct LspRocks {
    registry: Arc<ServerRegistry>,
    ctx: ClientContext,
    pool: Mutex<HashMap<PathBuf, Vec<Arc<LanguageClient>>>>,
    /// Descriptors matched per `(root, extension)`; only non-empty matches.
    matches: Mutex<HashMap<(PathBuf, String), Vec<Arc<dyn ServerDescriptor>>>>,
    sync_tx: mpsc::UnboundedSender<SyncJob>,
    recent: RecentRequests,
    diagnostics: DiagnosticsCenter,
    log: Arc<dyn LogControl>,
}

/// A request resolved to its document and project.
struct Routed {
    method: Method,
    request: FeatureRequest,
    path: PathBuf,
    clients: Vec<Arc<LanguageClient>>,
}

impl LspRocks {
    /// Must be called inside a tokio runtime; server diagnostics are pumped
    /// to the editor by a background task.
    pub fn new(
        registry: ServerRegistry,
        editor: Arc<dyn Editor>,
        launcher: Arc<dyn Launcher>,
        log: Arc<dyn LogControl>,
        options: EngineOptions,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();
        let rocks = Arc::new(Self {
            registry: Arc::new(registry),
            ctx: ClientContext {
                editor,
                launcher,
                events: events_tx,
                index: FileProjectIndex::new(),
                options: options.client,
            },
            pool: Mutex::new(HashMap::new()),
            matches: Mutex::new(HashMap::new()),
            sync_tx,
            recent: RecentRequests::new(options.staleness),
            diagnostics: DiagnosticsCenter::new(),
            log,
        });
        tokio::spawn(pump_events(Arc::downgrade(&rocks), events_rx));
        tokio::spawn(apply_sync(Arc::downgrade(&rocks), sync_rx));
        rocks
    }

    #[must_use]
    pub fn index(&self) -> &FileProjectIndex {
        &self.ctx.index
    }

    fn pool(&self) -> MutexGuard<'_, HashMap<PathBuf, Vec<Arc<LanguageClient>>>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn matches(
        &self,
    ) -> MutexGuard<'_, HashMap<(PathBuf, String), Vec<Arc<dyn ServerDescriptor>>>> {
        self.matches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clients of `root`, in creation order.
    #[must_use]
    pub fn clients(&self, root: &Path) -> Vec<Arc<LanguageClient>> {
        self.pool().get(root).cloned().unwrap_or_default()
    }

    /// Fire-and-forget: the result is delivered to the editor when ready.
    ///
    /// The request is recorded before this returns, so a later call always
    /// supersedes an earlier one regardless of task scheduling.
    pub fn message(self: &Arc<Self>, envelope: RequestEnvelope) {
        self.recent.record(&envelope);
        if is_text_sync(&envelope) {
            self.enqueue_sync(SyncJob {
                envelope,
                reply: None,
            });
            return;
        }
        let rocks = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = rocks.handle(&envelope).await;
            rocks.report(&envelope, outcome).await;
        });
    }

    /// Request/response: the result data, `null` when suppressed or empty.
    pub async fn request(&self, envelope: RequestEnvelope) -> Result<Value, RequestError> {
        self.recent.record(&envelope);
        let response = if is_text_sync(&envelope) {
            let cmd = envelope.cmd.clone();
            let (reply, outcome) = oneshot::channel();
            self.enqueue_sync(SyncJob {
                envelope,
                reply: Some(reply),
            });
            outcome.await.map_err(|_| RequestError::ShuttingDown { cmd })??
        } else {
            self.handle(&envelope).await?
        };
        Ok(response.map_or(Value::Null, |response| response.data))
    }

    fn enqueue_sync(&self, job: SyncJob) {
        if let Err(mpsc::error::SendError(job)) = self.sync_tx.send(job) {
            tracing::debug!(cmd = %job.envelope.cmd, "Dropping text sync; consumer is gone");
        }
    }

    /// Deliver a fire-and-forget outcome to the editor.
    async fn report(&self, envelope: &RequestEnvelope, outcome: Outcome) {
        match outcome {
            Ok(Some(response)) => self.ctx.editor.deliver(response).await,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(id = %envelope.id, cmd = %envelope.cmd, "Request failed: {e}");
                self.ctx.editor.show_message(&e.to_string()).await;
            }
        }
    }

    async fn handle(&self, envelope: &RequestEnvelope) -> Outcome {
        tracing::debug!(id = %envelope.id, cmd = %envelope.cmd, "Received request");
        let method: Method = envelope.cmd.parse()?;
        if method == Method::DidClose
            && let Some(uri) = envelope.document_uri()
        {
            self.recent.forget_document(uri);
        }

        let response = if method == Method::CompletionResolve {
            if self.recent.is_stale(envelope) {
                return Ok(None);
            }
            let request = FeatureRequest::parse(method, envelope.params.clone())?;
            self.resolve(request).await?
        } else {
            let Some(routed) = self.route(method, envelope).await? else {
                return Ok(None);
            };
            if self.recent.is_stale(envelope) {
                tracing::debug!(id = %envelope.id, cmd = %envelope.cmd, "Superseded before dispatch");
                return Ok(None);
            }
            if method == Method::DidOpen {
                self.record_trigger_characters(&routed).await;
            }
            self.fan_out(routed).await?
        };

        if self.recent.is_stale(envelope) {
            tracing::debug!(id = %envelope.id, cmd = %envelope.cmd, "Superseded; dropping result");
            return Ok(None);
        }
        let data = response.into_value()?;
        if data.is_null() {
            return Ok(None);
        }
        Ok(Some(ResponseEnvelope {
            id: envelope.id.clone(),
            cmd: envelope.cmd.clone(),
            data,
        }))
    }

    /// Resolve the document's project and clients; `None` when no server covers it.
    async fn route(
        &self,
        method: Method,
        envelope: &RequestEnvelope,
    ) -> Result<Option<Routed>, RequestError> {
        let raw = envelope
            .document_uri()
            .ok_or_else(|| RequestError::MissingDocument {
                cmd: envelope.cmd.clone(),
            })?;
        let uri = to_protocol_uri(raw).map_err(|e| RequestError::InvalidUri {
            cmd: envelope.cmd.clone(),
            message: e.to_string(),
        })?;
        let path = document_path(uri.as_str());

        let mut params = envelope.params.clone();
        if let Some(document) = params.get_mut("textDocument") {
            document["uri"] = Value::String(uri.as_str().to_string());
        }
        let request = FeatureRequest::parse(method, params)?;

        let root = match self.ctx.index.get(uri.as_str()) {
            Some(root) => root,
            None => self.suggest_root(&path).await,
        };

        let clients = self.ensure_clients(&root, &path).await;
        if clients.is_empty() {
            return Ok(None);
        }
        self.ctx.index.insert(uri.as_str(), root);

        Ok(Some(Routed {
            method,
            request,
            path,
            clients,
        }))
    }

    async fn suggest_root(&self, path: &Path) -> PathBuf {
        let fallback = || path.parent().map_or_else(|| path.to_path_buf(), Path::to_path_buf);
        match self.ctx.editor.suggest_project_root(path).await {
            Ok(Some(root)) => root,
            Ok(None) => fallback(),
            Err(e) => {
                tracing::warn!(file = %path.display(), "Editor could not suggest a project root: {e:#}");
                fallback()
            }
        }
    }

    /// Running clients for `file` under `root`, creating and starting missing ones.
    ///
    /// Clients of other descriptors already in the project's pool are kept.
    /// Clients that fail to start, or that were stopped after exhausting
    /// their restarts, are left out.
    async fn ensure_clients(&self, root: &Path, file: &Path) -> Vec<Arc<LanguageClient>> {
        let descriptors = self.matching_descriptors(root, file).await;
        if descriptors.is_empty() {
            tracing::info!(file = %file.display(), "No language server for file");
            self.ctx
                .editor
                .show_message(&format!("No language server found for {}", file.display()))
                .await;
            return Vec::new();
        }

        let clients: Vec<Arc<LanguageClient>> = {
            let mut pool = self.pool();
            let project = pool.entry(root.to_path_buf()).or_default();
            descriptors
                .into_iter()
                .map(|descriptor| {
                    if let Some(existing) = project.iter().find(|c| c.name() == descriptor.name()) {
                        return Arc::clone(existing);
                    }
                    tracing::info!(server = descriptor.name(), root = %root.display(), "Creating client");
                    let client = LanguageClient::new(descriptor, root, self.ctx.clone());
                    project.push(Arc::clone(&client));
                    client
                })
                .collect()
        };

        let started = join_all(clients.iter().map(|c| c.ensure_started())).await;
        clients
            .into_iter()
            .zip(started)
            .filter_map(|(client, result)| match result {
                Ok(()) => Some(client),
                Err(e) => {
                    tracing::debug!(server = %client.name(), "Client unavailable: {e}");
                    None
                }
            })
            .collect()
    }

    /// Descriptors for `file`'s extension under `root`, looked up once per pair.
    ///
    /// The lookup searches for executables on `PATH` and reads project files, so it
    /// runs on the blocking pool.
    async fn matching_descriptors(&self, root: &Path, file: &Path) -> Vec<Arc<dyn ServerDescriptor>> {
        let extension = file
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
            .to_string();
        let key = (root.to_path_buf(), extension);
        if let Some(found) = self.matches().get(&key) {
            return found.clone();
        }

        let registry = Arc::clone(&self.registry);
        let (lookup_root, lookup_file) = (root.to_path_buf(), file.to_path_buf());
        let found = match tokio::task::spawn_blocking(move || {
            registry.find_clients(&lookup_file, &lookup_root)
        })
        .await
        {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(file = %file.display(), "Server lookup failed: {e}");
                Vec::new()
            }
        };
        if !found.is_empty() {
            self.matches().insert(key, found.clone());
        }
        found
    }

    async fn record_trigger_characters(&self, routed: &Routed) {
        let characters: BTreeSet<String> = routed
            .clients
            .iter()
            .flat_map(|c| c.trigger_characters())
            .collect();
        let characters: Vec<String> = characters.into_iter().collect();
        self.ctx
            .editor
            .record_trigger_characters(&routed.path, &characters)
            .await;
    }

    async fn fan_out(&self, routed: Routed) -> Result<FeatureResponse, RequestError> {
        let Routed {
            method,
            request,
            clients,
            ..
        } = routed;

        match method {
            Method::Completion => {
                let results = join_all(clients.iter().map(|c| c.on(request.clone()))).await;
                let mut merged = Vec::new();
                for (client, result) in clients.iter().zip(results) {
                    match result {
                        Ok(FeatureResponse::Completion(items)) => merged.extend(items),
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(server = %client.name(), "Completion failed: {e}");
                        }
                    }
                }
                Ok(FeatureResponse::Completion(merged))
            }
            Method::Formatting => {
                match clients.iter().find(|c| c.check_capability(Method::Formatting)) {
                    Some(client) => Ok(client.on(request).await?),
                    None => Ok(FeatureResponse::empty(method)),
                }
            }
            _ => {
                let results = try_join_all(clients.iter().map(|c| c.on(request.clone()))).await?;
                Ok(first_non_empty(method, results))
            }
        }
    }

    /// Completion resolve goes to the client that produced the item.
    async fn resolve(&self, request: FeatureRequest) -> Result<FeatureResponse, RequestError> {
        let FeatureRequest::CompletionResolve(target) = &request else {
            return Ok(FeatureResponse::empty(Method::CompletionResolve));
        };
        let token = target.token().to_string();
        let clients: Vec<Arc<LanguageClient>> = self
            .pool()
            .values()
            .flatten()
            .filter(|c| target.source.as_deref().is_none_or(|source| c.name() == source))
            .filter(|c| c.has_completion_item(&token))
            .cloned()
            .collect();
        if clients.is_empty() {
            tracing::debug!(token, "No client holds the completion item");
            return Ok(FeatureResponse::Resolved(None));
        }
        let results = try_join_all(clients.iter().map(|c| c.on(request.clone()))).await?;
        Ok(first_non_empty(Method::CompletionResolve, results))
    }

    /// Merged diagnostics for a file path, empty when its project is unknown.
    #[must_use]
    pub fn pull_diagnostics(&self, file: &str) -> Vec<Diagnostic> {
        let Ok(uri) = to_protocol_uri(file) else {
            return Vec::new();
        };
        match self.ctx.index.get(uri.as_str()) {
            Some(root) => self.diagnostics.get(&root, uri.as_str()),
            None => Vec::new(),
        }
    }

    /// Restart the TypeScript client of `root`.
    pub async fn restart(&self, root: &Path) -> Result<(), RequestError> {
        self.restart_server(root, TYPESCRIPT).await
    }

    /// Restart one client of `root`. The project's descriptor matches are
    /// looked up again on its next request.
    pub async fn restart_server(&self, root: &Path, server: &str) -> Result<(), RequestError> {
        if self.registry.descriptor(server).is_none() {
            return Err(RequestError::UnknownServer(server.to_string()));
        }
        self.matches().retain(|(project, _), _| project != root);
        let client = self
            .clients(root)
            .into_iter()
            .find(|c| c.name() == server)
            .ok_or_else(|| RequestError::NoClient {
                server: server.to_string(),
                root: root.to_path_buf(),
            })?;
        tracing::info!(server, root = %root.display(), "Restarting on request");
        client.restart().await?;
        Ok(())
    }

    /// Filesystem paths of every document open on any client, sorted.
    #[must_use]
    pub fn opened_files(&self) -> Vec<String> {
        let files: BTreeSet<String> = self
            .pool()
            .values()
            .flatten()
            .flat_map(|c| c.opened_files())
            .map(|uri| document_path(&uri).display().to_string())
            .collect();
        files.into_iter().collect()
    }

    pub fn toggle_trace(&self) -> anyhow::Result<bool> {
        self.log.toggle_trace()
    }

    #[must_use]
    pub fn log_file(&self) -> Option<PathBuf> {
        self.log.log_file()
    }

    /// Stop every client, each bounded by the shutdown timeout.
    pub async fn shutdown(&self) {
        let clients: Vec<Arc<LanguageClient>> = self.pool().drain().flat_map(|(_, c)| c).collect();
        tracing::info!(count = clients.len(), "Stopping all clients");
        for (client, result) in clients
            .iter()
            .zip(join_all(clients.iter().map(|c| c.stop())).await)
        {
            if let Err(e) = result {
                tracing::warn!(server = %client.name(), "Stop failed: {e}");
            }
        }
    }

    async fn publish(&self, event: ServerEvent) {
        let ServerEvent::Diagnostics {
            server,
            root,
            params,
        } = event;
        if let Some(update) = self.diagnostics.set(&root, &server, params) {
            let path = document_path(&update.uri);
            self.ctx
                .editor
                .diagnostics_updated(&path, &update.diagnostics)
                .await;
        }
    }
}

fn is_text_sync(envelope: &RequestEnvelope) -> bool {
    envelope
        .cmd
        .parse::<Method>()
        .is_ok_and(Method::is_text_sync)
}

fn first_non_empty(method: Method, results: Vec<FeatureResponse>) -> FeatureResponse {
    results
        .into_iter()
        .find(|r| !r.is_empty())
        .unwrap_or_else(|| FeatureResponse::empty(method))
}

async fn pump_events(rocks: Weak<LspRocks>, mut events: mpsc::Receiver<ServerEvent>) {
    while let Some(event) = events.recv().await {
        let Some(rocks) = rocks.upgrade() else {
            break;
        };
        rocks.publish(event).await;
    }
}

/// Apply text synchronization in arrival order, one job at a time.
async fn apply_sync(rocks: Weak<LspRocks>, mut jobs: mpsc::UnboundedReceiver<SyncJob>) {
    while let Some(SyncJob { envelope, reply }) = jobs.recv().await {
        let Some(rocks) = rocks.upgrade() else {
            break;
        };
        let outcome = rocks.handle(&envelope).await;
        match reply {
            Some(reply) => {
                let _ = reply.send(outcome);
            }
            None => rocks.report(&envelope, outcome).await,
        }
    }
}
