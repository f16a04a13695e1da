//! Connection transport: a duplex JSON-RPC channel to one language server.
//!
//! A [`Launcher`] turns a command line into a [`ServerTransport`] (the real one
//! spawns a child process; tests hand over an in-memory pipe). [`Connection`]
//! then runs a writer task fed by a channel and a reader task that routes
//! responses to pending requests and everything else to an [`IncomingHandler`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use lsp_types::notification::Notification as LspNotification;
use lsp_types::request::Request as LspRequest;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::{FrameReader, FrameWriter};
use crate::error::ClientError;
use crate::protocol::{self, Incoming, Notification, Request, RpcError};

const WRITER_CHANNEL_CAPACITY: usize = 64;

/// What to run for one language server.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// Byte streams to and from a server, plus the process behind them if any.
pub struct ServerTransport {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    pub process: Option<Child>,
}

pub trait Launcher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> Result<ServerTransport, ClientError>;
}

/// Spawns servers as child processes speaking LSP over stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<ServerTransport, ClientError> {
        let launch_error = |message: String| ClientError::Launch {
            command: spec.command.clone(),
            message,
        };

        let program = which::which(&spec.command)
            .map_err(|e| launch_error(format!("not found in PATH: {e}")))?;
        let mut command = Command::new(&program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| launch_error(e.to_string()))?;
        let Some(pid) = child.id() else {
            return Err(launch_error("process exited before reporting a pid".into()));
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error("no stdout from child".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_error("no stdin from child".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(spec.name.clone(), stderr));
        }

        tracing::info!(server = %spec.name, pid, command = %program.display(), "Language server spawned");
        Ok(ServerTransport {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            process: Some(child),
        })
    }
}

/// Stderr output is diagnostic noise; it is logged and never fails the connection.
async fn log_stderr(name: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(server = %name, "stderr: {line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(server = %name, "stderr read failed: {e}");
                break;
            }
        }
    }
}

/// Receiver of server-initiated traffic.
#[async_trait]
pub trait IncomingHandler: Send + Sync + 'static {
    /// Answer a server → client request.
    async fn on_request(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    async fn on_notification(&self, method: &str, params: Value);

    /// A protocol-level read error; the connection closes right after.
    fn on_error(&self, error: &anyhow::Error) {
        let _ = error;
    }

    /// The server side closed. Called from the reader task, so handlers must
    /// not tear the connection down inline.
    fn on_close(&self);
}

enum WriterCommand {
    Send(Value),
    /// Flush, shut the writer down, then acknowledge.
    Close(oneshot::Sender<()>),
}

type ResponseSender = oneshot::Sender<Result<Value, RpcError>>;

#[derive(Default)]
struct Pending {
    closed: bool,
    waiters: HashMap<u64, ResponseSender>,
}

impl Pending {
    /// Fails every waiter; later inserts are refused.
    fn close(&mut self) {
        self.closed = true;
        self.waiters.clear();
    }
}

pub struct Connection {
    name: String,
    writer_tx: mpsc::Sender<WriterCommand>,
    pending: Arc<Mutex<Pending>>,
    next_id: AtomicU64,
    process: std::sync::Mutex<Option<Child>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Start the reader and writer tasks over `transport`.
    pub fn listen(
        name: impl Into<String>,
        transport: ServerTransport,
        handler: Arc<dyn IncomingHandler>,
    ) -> Self {
        let name = name.into();
        let ServerTransport {
            reader,
            writer,
            process,
        } = transport;

        let pending = Arc::new(Mutex::new(Pending::default()));
        let (writer_tx, writer_rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);

        let writer_handle = tokio::spawn(write_loop(name.clone(), writer, writer_rx));
        let reader_handle = tokio::spawn(read_loop(
            name.clone(),
            reader,
            Arc::clone(&pending),
            writer_tx.clone(),
            handler,
        ));

        Self {
            name,
            writer_tx,
            pending,
            next_id: AtomicU64::new(1),
            process: std::sync::Mutex::new(process),
            tasks: std::sync::Mutex::new(vec![reader_handle, writer_handle]),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn is_closed(&self) -> bool {
        self.pending.lock().await.closed
    }

    pub async fn send_request<R: LspRequest>(
        &self,
        params: R::Params,
    ) -> Result<R::Result, ClientError> {
        let params = serde_json::to_value(params)?;
        let result = self.request(R::METHOD, params).await?;
        serde_json::from_value(result)
            .map_err(|e| ClientError::Serialization(format!("{} result: {e}", R::METHOD)))
    }

    pub async fn send_notification<N: LspNotification>(
        &self,
        params: N::Params,
    ) -> Result<(), ClientError> {
        let params = serde_json::to_value(params)?;
        self.notify(N::METHOD, params).await
    }

    /// Untyped request; resolves with the raw `result` member.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(self.closed_error());
            }
            pending.waiters.insert(id, tx);
        }

        let frame = serde_json::to_value(Request::new(id, method, params))?;
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            self.pending.lock().await.waiters.remove(&id);
            return Err(self.closed_error());
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(ClientError::response(&self.name, error)),
            Err(_) => Err(self.closed_error()),
        }
    }

    pub async fn notify(&self, method: &str, params: Value) -> Result<(), ClientError> {
        if self.is_closed().await {
            return Err(self.closed_error());
        }
        let frame = serde_json::to_value(Notification::new(method, params))?;
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| self.closed_error())
    }

    /// Flush queued frames and close the server's input.
    pub async fn end(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .writer_tx
            .send(WriterCommand::Close(ack_tx))
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }

    /// Stop both tasks, fail pending requests and kill the process.
    pub async fn dispose(&self) {
        self.pending.lock().await.close();

        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }

        let process = self
            .process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut child) = process
            && let Err(e) = child.start_kill()
        {
            tracing::debug!(server = %self.name, "kill after dispose failed: {e}");
        }
    }

    fn closed_error(&self) -> ClientError {
        ClientError::ConnectionClosed {
            server: self.name.clone(),
        }
    }
}

async fn write_loop(
    name: String,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    mut rx: mpsc::Receiver<WriterCommand>,
) {
    let mut frames = FrameWriter::new(writer);
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Send(frame) => {
                tracing::trace!(target: "rocks_lsp::wire", server = %name, "--> {frame}");
                if let Err(e) = frames.write_frame(&frame).await {
                    tracing::warn!(server = %name, "write to server failed: {e:#}");
                    break;
                }
            }
            WriterCommand::Close(ack) => {
                if let Err(e) = frames.close().await {
                    tracing::debug!(server = %name, "closing server input failed: {e:#}");
                }
                let _ = ack.send(());
                break;
            }
        }
    }
}

async fn read_loop(
    name: String,
    reader: Box<dyn AsyncRead + Send + Unpin>,
    pending: Arc<Mutex<Pending>>,
    writer_tx: mpsc::Sender<WriterCommand>,
    handler: Arc<dyn IncomingHandler>,
) {
    let mut frames = FrameReader::new(reader);
    loop {
        match frames.read_frame().await {
            Ok(Some(frame)) => {
                tracing::trace!(target: "rocks_lsp::wire", server = %name, "<-- {frame}");
                dispatch_frame(&name, frame, &pending, &writer_tx, &handler).await;
            }
            Ok(None) => {
                tracing::info!(server = %name, "Language server closed its output");
                break;
            }
            Err(e) => {
                tracing::warn!(server = %name, "reading from server failed: {e:#}");
                handler.on_error(&e);
                break;
            }
        }
    }

    pending.lock().await.close();
    handler.on_close();
}

async fn dispatch_frame(
    name: &str,
    frame: Value,
    pending: &Mutex<Pending>,
    writer_tx: &mpsc::Sender<WriterCommand>,
    handler: &Arc<dyn IncomingHandler>,
) {
    let Some(incoming) = protocol::parse_incoming(frame) else {
        tracing::trace!(server = %name, "Ignoring malformed JSON-RPC frame");
        return;
    };

    match incoming {
        Incoming::Response { id, outcome } => {
            let waiter = pending.lock().await.waiters.remove(&id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(outcome);
                }
                None => tracing::debug!(server = %name, id, "Response for unknown request"),
            }
        }
        Incoming::Request { id, method, params } => {
            // Answered off the reader task: handlers may call back into the editor.
            let handler = Arc::clone(handler);
            let writer_tx = writer_tx.clone();
            tokio::spawn(async move {
                let outcome = handler.on_request(&method, params).await;
                let frame = protocol::response(id, outcome);
                let _ = writer_tx.send(WriterCommand::Send(frame)).await;
            });
        }
        Incoming::Notification { method, params } => {
            handler.on_notification(&method, params).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use lsp_types::notification::Exit;
    use lsp_types::request::Shutdown;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        notifications: std::sync::Mutex<Vec<(String, Value)>>,
        closed: AtomicBool,
    }

    #[async_trait]
    impl IncomingHandler for Recorder {
        async fn on_request(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
            if method == "workspace/configuration" {
                Ok(serde_json::json!([{"enable": true}]))
            } else {
                Err(RpcError::method_not_found(method))
            }
        }

        async fn on_notification(&self, method: &str, params: Value) {
            self.notifications
                .lock()
                .unwrap()
                .push((method.to_string(), params));
        }

        fn on_close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    type ServerReader = FrameReader<ReadHalf<DuplexStream>>;
    type ServerWriter = FrameWriter<WriteHalf<DuplexStream>>;

    fn pipe() -> (ServerTransport, ServerReader, ServerWriter) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, server_write) = tokio::io::split(server_io);
        let transport = ServerTransport {
            reader: Box::new(client_read),
            writer: Box::new(client_write),
            process: None,
        };
        (
            transport,
            FrameReader::new(server_read),
            FrameWriter::new(server_write),
        )
    }

    #[tokio::test]
    async fn request_resolves_with_matching_response() {
        let (transport, mut server_in, mut server_out) = pipe();
        let connection = Connection::listen("fake", transport, Arc::new(Recorder::default()));

        let server = tokio::spawn(async move {
            let request = server_in.read_frame().await.unwrap().unwrap();
            assert_eq!(request["method"], "shutdown");
            assert!(request.get("params").is_none());
            server_out
                .write_frame(&serde_json::json!({"jsonrpc": "2.0", "id": request["id"], "result": null}))
                .await
                .unwrap();
        });

        connection.send_request::<Shutdown>(()).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn error_response_maps_to_client_error() {
        let (transport, mut server_in, mut server_out) = pipe();
        let connection = Connection::listen("fake", transport, Arc::new(Recorder::default()));

        tokio::spawn(async move {
            let request = server_in.read_frame().await.unwrap().unwrap();
            server_out
                .write_frame(&serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "error": {"code": -32800, "message": "cancelled"}
                }))
                .await
                .unwrap();
        });

        let err = connection
            .request("textDocument/hover", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Response { code: -32800, .. }));
    }

    #[tokio::test]
    async fn server_requests_are_answered_by_the_handler() {
        let (transport, mut server_in, mut server_out) = pipe();
        let _connection = Connection::listen("fake", transport, Arc::new(Recorder::default()));

        server_out
            .write_frame(&serde_json::json!({
                "jsonrpc": "2.0", "id": 7, "method": "workspace/configuration", "params": {"items": [{}]}
            }))
            .await
            .unwrap();
        let reply = server_in.read_frame().await.unwrap().unwrap();
        assert_eq!(reply["id"], 7);
        assert_eq!(reply["result"], serde_json::json!([{"enable": true}]));

        server_out
            .write_frame(&serde_json::json!({"jsonrpc": "2.0", "id": 8, "method": "window/showMessageRequest"}))
            .await
            .unwrap();
        let reply = server_in.read_frame().await.unwrap().unwrap();
        assert_eq!(reply["id"], 8);
        assert_eq!(reply["error"]["code"], protocol::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_reach_the_handler_in_order() {
        let (transport, _server_in, mut server_out) = pipe();
        let recorder = Arc::new(Recorder::default());
        let _connection = Connection::listen("fake", transport, recorder.clone());

        for n in 0..3 {
            server_out
                .write_frame(&serde_json::json!({"jsonrpc": "2.0", "method": "$/progress", "params": {"n": n}}))
                .await
                .unwrap();
        }
        drop(server_out);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !recorder.closed.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let seen: Vec<_> = recorder
            .notifications
            .lock()
            .unwrap()
            .iter()
            .map(|(_, p)| p["n"].as_i64().unwrap())
            .collect();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn server_exit_fails_pending_requests_and_reports_close() {
        let (transport, server_in, server_out) = pipe();
        let recorder = Arc::new(Recorder::default());
        let connection = Connection::listen("fake", transport, recorder.clone());

        let request = connection.request("textDocument/definition", serde_json::json!({}));
        let crash = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(server_out);
            drop(server_in);
        };
        let (result, ()) = tokio::join!(request, crash);

        assert!(matches!(result, Err(ClientError::ConnectionClosed { .. })));
        assert!(recorder.closed.load(Ordering::SeqCst));
        assert!(connection.is_closed().await);
        assert!(connection.send_notification::<Exit>(()).await.is_err());
    }

    #[tokio::test]
    async fn dispose_refuses_further_sends() {
        let (transport, _server_in, _server_out) = pipe();
        let connection = Connection::listen("fake", transport, Arc::new(Recorder::default()));
        connection.dispose().await;
        let err = connection
            .request("textDocument/hover", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed { .. }));
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let spec = LaunchSpec {
            name: "ghost".into(),
            command: "rocks-test-no-such-language-server".into(),
            args: vec!["--stdio".into()],
            cwd: std::env::temp_dir(),
        };
        let err = ProcessLauncher.launch(&spec).err().unwrap();
        assert!(matches!(err, ClientError::Launch { .. }));
    }
}
