//! In-process fakes for exercising clients without spawning processes.
//!
//! [`FakeLauncher`] hands each client one end of a `tokio::io::duplex` pipe
//! and serves the other end with a scripted [`FakeServer`]. Every frame the
//! client sends is recorded so tests can count outbound requests.
//! [`FakeEditor`] records everything pushed to the editor.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use lsp_types::{ClientInfo, Diagnostic, InitializeResult};
use rocks_types::ResponseEnvelope;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::codec::{FrameReader, FrameWriter};
use crate::connection::{LaunchSpec, Launcher, ServerTransport};
use crate::descriptor::ServerDescriptor;
use crate::editor::Editor;
use crate::error::ClientError;
use crate::protocol::{self, RpcError};

const PIPE_CAPACITY: usize = 1024 * 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How the fake server answers one method.
#[derive(Debug, Clone)]
pub enum Reply {
    Result(Value),
    Error(RpcError),
    /// Answer once a permit is available on the semaphore.
    Gated(Arc<Semaphore>, Value),
    /// Never answer.
    Never,
}

/// Scripted language server.
///
/// `initialize` answers with the configured capabilities unless scripted
/// explicitly; unscripted requests answer `null`.
#[derive(Debug, Clone)]
pub struct FakeServer {
    capabilities: Value,
    replies: HashMap<String, Reply>,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    /// Full text sync and nothing else.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: json!({"textDocumentSync": 1}),
            replies: HashMap::new(),
        }
    }

    /// Merge members into the advertised `ServerCapabilities`.
    pub fn with_capabilities(mut self, capabilities: Value) -> Self {
        if let (Value::Object(base), Value::Object(extra)) = (&mut self.capabilities, capabilities)
        {
            base.extend(extra);
        }
        self
    }

    pub fn reply(mut self, method: &str, reply: Reply) -> Self {
        self.replies.insert(method.to_string(), reply);
        self
    }

    pub fn respond(self, method: &str, result: Value) -> Self {
        self.reply(method, Reply::Result(result))
    }

    fn reply_for(&self, method: &str) -> Reply {
        match self.replies.get(method) {
            Some(reply) => reply.clone(),
            None if method == "initialize" => {
                Reply::Result(json!({"capabilities": self.capabilities}))
            }
            None => Reply::Result(Value::Null),
        }
    }
}

struct Session {
    received: Arc<Mutex<Vec<Value>>>,
    frames: mpsc::UnboundedSender<Value>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Default)]
struct LauncherState {
    servers: HashMap<String, FakeServer>,
    sessions: HashMap<String, Vec<Session>>,
    failing: HashSet<String>,
}

/// Launcher serving scripted servers over in-memory pipes, keyed by server name.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl FakeLauncher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(self, name: &str, server: FakeServer) -> Self {
        lock(&self.state)
            .servers
            .insert(name.to_string(), server);
        self
    }

    /// Make every later launch of `name` fail like a missing executable.
    pub fn fail_launches(&self, name: &str) {
        lock(&self.state).failing.insert(name.to_string());
    }

    #[must_use]
    pub fn launches(&self, name: &str) -> usize {
        lock(&self.state).sessions.get(name).map_or(0, Vec::len)
    }

    /// Frames received from the client across every session of `name`.
    #[must_use]
    pub fn received(&self, name: &str) -> Vec<Value> {
        let state = lock(&self.state);
        state
            .sessions
            .get(name)
            .map(|sessions| {
                sessions
                    .iter()
                    .flat_map(|s| lock(&s.received).clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn count(&self, name: &str, method: &str) -> usize {
        self.received(name)
            .iter()
            .filter(|f| f.get("method").and_then(Value::as_str) == Some(method))
            .count()
    }

    /// Poll until `name` has received `n` frames of `method`, up to two seconds.
    pub async fn wait_for(&self, name: &str, method: &str, n: usize) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            if self.count(name, method) >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    /// Kill the latest session of `name` as if the process died.
    pub fn crash(&self, name: &str) {
        let mut state = lock(&self.state);
        if let Some(session) = state.sessions.get_mut(name).and_then(|s| s.last_mut()) {
            for task in session.tasks.drain(..) {
                task.abort();
            }
        }
    }

    /// Push a raw frame from the latest session of `name` to its client.
    pub fn send(&self, name: &str, frame: Value) {
        let state = lock(&self.state);
        if let Some(session) = state.sessions.get(name).and_then(|s| s.last()) {
            let _ = session.frames.send(frame);
        }
    }

    pub fn notify(&self, name: &str, method: &str, params: Value) {
        self.send(
            name,
            json!({"jsonrpc": "2.0", "method": method, "params": params}),
        );
    }

    /// Send a server → client request; its answer shows up in [`Self::received`].
    pub fn request(&self, name: &str, id: i64, method: &str, params: Value) {
        self.send(
            name,
            json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}),
        );
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<ServerTransport, ClientError> {
        let mut state = lock(&self.state);
        if state.failing.contains(&spec.name) {
            return Err(ClientError::Launch {
                command: spec.command.clone(),
                message: "not found in PATH".into(),
            });
        }
        let server = state.servers.get(&spec.name).cloned().unwrap_or_default();

        let (client_io, server_io) = tokio::io::duplex(PIPE_CAPACITY);
        let (client_read, client_write) = tokio::io::split(client_io);
        let session = spawn_session(server_io, server);
        state
            .sessions
            .entry(spec.name.clone())
            .or_default()
            .push(session);

        Ok(ServerTransport {
            reader: Box::new(client_read),
            writer: Box::new(client_write),
            process: None,
        })
    }
}

fn spawn_session(io: DuplexStream, server: FakeServer) -> Session {
    let (read, write) = tokio::io::split(io);
    let received = Arc::new(Mutex::new(Vec::new()));
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(write_frames(write, frames_rx));
    let reader = tokio::spawn(serve_frames(
        read,
        server,
        Arc::clone(&received),
        frames_tx.clone(),
    ));

    Session {
        received,
        frames: frames_tx,
        tasks: vec![reader, writer],
    }
}

async fn write_frames(
    write: impl AsyncWrite + Unpin,
    mut frames: mpsc::UnboundedReceiver<Value>,
) {
    let mut writer = FrameWriter::new(write);
    while let Some(frame) = frames.recv().await {
        if writer.write_frame(&frame).await.is_err() {
            break;
        }
    }
}

async fn serve_frames(
    read: impl AsyncRead + Unpin,
    server: FakeServer,
    received: Arc<Mutex<Vec<Value>>>,
    out: mpsc::UnboundedSender<Value>,
) {
    let mut reader = FrameReader::new(read);
    while let Ok(Some(frame)) = reader.read_frame().await {
        lock(&received).push(frame.clone());

        let Some(method) = frame.get("method").and_then(Value::as_str) else {
            continue;
        };
        let Some(id) = frame.get("id").cloned() else {
            continue;
        };

        match server.reply_for(method) {
            Reply::Result(result) => {
                let _ = out.send(protocol::response(id, Ok(result)));
            }
            Reply::Error(error) => {
                let _ = out.send(protocol::response(id, Err(error)));
            }
            Reply::Gated(gate, result) => {
                let out = out.clone();
                tokio::spawn(async move {
                    if let Ok(_permit) = gate.acquire().await {
                        let _ = out.send(protocol::response(id, Ok(result)));
                    }
                });
            }
            Reply::Never => {}
        }
    }
}

/// Descriptor with fixed answers.
#[derive(Debug, Clone)]
pub struct StaticDescriptor {
    name: String,
    command: String,
    args: Vec<String>,
    extensions: Vec<String>,
    active: bool,
    initialization_options: Option<Value>,
    extra_trigger_characters: Vec<String>,
}

impl StaticDescriptor {
    #[must_use]
    pub fn new(name: &str, extensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            command: name.to_string(),
            args: vec!["--stdio".to_string()],
            extensions: extensions.iter().map(ToString::to_string).collect(),
            active: true,
            initialization_options: None,
            extra_trigger_characters: Vec::new(),
        }
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.command = command.to_string();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn with_initialization_options(mut self, options: Value) -> Self {
        self.initialization_options = Some(options);
        self
    }

    /// Appended to the server's completion trigger characters after initialize.
    pub fn with_extra_trigger_characters(mut self, characters: &[&str]) -> Self {
        self.extra_trigger_characters = characters.iter().map(ToString::to_string).collect();
        self
    }
}

impl ServerDescriptor for StaticDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn command(&self) -> &str {
        &self.command
    }

    fn args(&self) -> &[String] {
        &self.args
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn activate(&self, _file: &Path, _root: &Path) -> bool {
        self.active
    }

    fn initialization_options(&self) -> Option<Value> {
        self.initialization_options.clone()
    }

    fn post_initialize(&self, result: &mut InitializeResult) {
        if self.extra_trigger_characters.is_empty() {
            return;
        }
        if let Some(completion) = result.capabilities.completion_provider.as_mut() {
            completion
                .trigger_characters
                .get_or_insert_with(Vec::new)
                .extend(self.extra_trigger_characters.iter().cloned());
        }
    }
}

/// Editor double recording every push.
#[derive(Default)]
pub struct FakeEditor {
    root: Mutex<Option<PathBuf>>,
    texts: Mutex<HashMap<PathBuf, String>>,
    suggest_calls: AtomicUsize,
    messages: Mutex<Vec<String>>,
    delivered: Mutex<Vec<ResponseEnvelope>>,
    trigger_characters: Mutex<Vec<(PathBuf, Vec<String>)>>,
    diagnostics: Mutex<Vec<(PathBuf, Vec<Diagnostic>)>>,
}

impl FakeEditor {
    /// Suggests `root` as the project of every file.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let editor = Self::default();
        *lock(&editor.root) = Some(root.into());
        editor
    }

    pub fn set_text(&self, file: impl Into<PathBuf>, text: &str) {
        lock(&self.texts).insert(file.into(), text.to_string());
    }

    #[must_use]
    pub fn suggest_calls(&self) -> usize {
        self.suggest_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }

    #[must_use]
    pub fn delivered(&self) -> Vec<ResponseEnvelope> {
        lock(&self.delivered).clone()
    }

    #[must_use]
    pub fn trigger_characters(&self) -> Vec<(PathBuf, Vec<String>)> {
        lock(&self.trigger_characters).clone()
    }

    #[must_use]
    pub fn diagnostics(&self) -> Vec<(PathBuf, Vec<Diagnostic>)> {
        lock(&self.diagnostics).clone()
    }
}

#[async_trait]
impl Editor for FakeEditor {
    async fn suggest_project_root(&self, _file: &Path) -> anyhow::Result<Option<PathBuf>> {
        self.suggest_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.root).clone())
    }

    async fn open_params(&self, file: &Path) -> anyhow::Result<Value> {
        let text = lock(&self.texts).get(file).cloned().unwrap_or_default();
        Ok(json!({"textDocument": {"uri": file.display().to_string(), "text": text}}))
    }

    async fn client_info(&self) -> anyhow::Result<Option<ClientInfo>> {
        Ok(None)
    }

    async fn show_message(&self, message: &str) {
        lock(&self.messages).push(message.to_string());
    }

    async fn deliver(&self, response: ResponseEnvelope) {
        lock(&self.delivered).push(response);
    }

    async fn record_trigger_characters(&self, file: &Path, characters: &[String]) {
        lock(&self.trigger_characters).push((file.to_path_buf(), characters.to_vec()));
    }

    async fn diagnostics_updated(&self, file: &Path, diagnostics: &[Diagnostic]) {
        lock(&self.diagnostics).push((file.to_path_buf(), diagnostics.to_vec()));
    }
}
