//! The editor endpoint: JSON-RPC over stdio.
//!
//! Frames use the same `Content-Length` codec as the language-server side.
//! A writer task owns stdout; the read loop routes responses to waiting
//! outbound requests and hands every editor request to its own task, so a
//! slow language server never blocks the next editor message.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, anyhow};
use rocks_engine::{LspRocks, RequestError};
use rocks_lsp::codec::{FrameReader, FrameWriter};
use rocks_lsp::protocol::{
    self, INTERNAL_ERROR, INVALID_PARAMS, Incoming, Notification, Request, RpcError,
};
use rocks_types::RequestEnvelope;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const WRITER_CHANNEL_CAPACITY: usize = 256;

type ResponseSender = oneshot::Sender<Result<Value, RpcError>>;

#[derive(Default)]
struct Pending {
    closed: bool,
    waiters: HashMap<u64, ResponseSender>,
}

/// Outbound half of the editor connection.
pub struct EditorEndpoint {
    writer_tx: mpsc::Sender<Value>,
    pending: Mutex<Pending>,
    next_id: AtomicU64,
}

impl EditorEndpoint {
    /// Start the writer task over `writer`.
    pub fn spawn<W>(writer: W) -> (Arc<Self>, JoinHandle<()>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (writer_tx, writer_rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
        let task = tokio::spawn(write_loop(writer, writer_rx));
        let endpoint = Arc::new(Self {
            writer_tx,
            pending: Mutex::new(Pending::default()),
            next_id: AtomicU64::new(1),
        });
        (endpoint, task)
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call an editor function and wait for its result.
    pub async fn request(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending();
            if pending.closed {
                return Err(anyhow!("editor connection is closed"));
            }
            pending.waiters.insert(id, tx);
        }

        let frame = serde_json::to_value(Request::new(id, method, params))?;
        if self.writer_tx.send(frame).await.is_err() {
            self.pending().waiters.remove(&id);
            return Err(anyhow!("editor connection is closed"));
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(anyhow!(
                "editor answered {method} with error {}: {}",
                error.code,
                error.message
            )),
            Err(_) => Err(anyhow!("editor connection closed before {method} answered")),
        }
    }

    pub async fn notify(&self, method: &str, params: Value) -> anyhow::Result<()> {
        let frame = serde_json::to_value(Notification::new(method, params))?;
        self.writer_tx
            .send(frame)
            .await
            .map_err(|_| anyhow!("editor connection is closed"))
    }

    async fn respond(&self, id: Value, outcome: Result<Value, RpcError>) {
        if self
            .writer_tx
            .send(protocol::response(id, outcome))
            .await
            .is_err()
        {
            tracing::debug!("Dropping response; editor connection is closed");
        }
    }

    pub(crate) fn complete(&self, id: u64, outcome: Result<Value, RpcError>) {
        match self.pending().waiters.remove(&id) {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => tracing::debug!(id, "Editor response for unknown request"),
        }
    }

    /// Fail every waiting request; later requests fail immediately.
    fn close(&self) {
        let mut pending = self.pending();
        pending.closed = true;
        pending.waiters.clear();
    }
}

async fn write_loop<W>(writer: W, mut rx: mpsc::Receiver<Value>)
where
    W: AsyncWrite + Send + Unpin,
{
    let mut frames = FrameWriter::new(writer);
    while let Some(frame) = rx.recv().await {
        tracing::trace!(target: "rocks_lsp::wire", peer = "editor", "--> {frame}");
        if let Err(e) = frames.write_frame(&frame).await {
            tracing::warn!("write to editor failed: {e:#}");
            break;
        }
    }
}

/// Serve editor traffic until its input closes.
pub async fn serve<R>(reader: R, endpoint: &Arc<EditorEndpoint>, rocks: &Arc<LspRocks>)
where
    R: AsyncRead + Send + Unpin,
{
    let mut frames = FrameReader::new(reader);
    loop {
        match frames.read_frame().await {
            Ok(Some(frame)) => {
                tracing::trace!(target: "rocks_lsp::wire", peer = "editor", "<-- {frame}");
                dispatch_frame(frame, endpoint, rocks);
            }
            Ok(None) => {
                tracing::info!("Editor closed its output");
                break;
            }
            Err(e) => {
                tracing::warn!("reading from editor failed: {e:#}");
                break;
            }
        }
    }
    endpoint.close();
}

fn dispatch_frame(frame: Value, endpoint: &Arc<EditorEndpoint>, rocks: &Arc<LspRocks>) {
    let Some(incoming) = protocol::parse_incoming(frame) else {
        tracing::debug!("Ignoring malformed frame from editor");
        return;
    };

    match incoming {
        Incoming::Response { id, outcome } => endpoint.complete(id, outcome),
        Incoming::Request { id, method, params } => {
            let endpoint = Arc::clone(endpoint);
            let rocks = Arc::clone(rocks);
            tokio::spawn(async move {
                let outcome = handle_request(&rocks, &method, params).await;
                if let Err(error) = &outcome {
                    tracing::warn!(method, "Editor request failed: {}", error.message);
                }
                endpoint.respond(id, outcome).await;
            });
        }
        Incoming::Notification { method, params } => match method.as_str() {
            "message" => match envelope(params) {
                Ok(envelope) => rocks.message(envelope),
                Err(error) => tracing::warn!("Ignoring message: {}", error.message),
            },
            _ => tracing::debug!(method, "Ignoring editor notification"),
        },
    }
}

async fn handle_request(rocks: &LspRocks, method: &str, params: Value) -> Result<Value, RpcError> {
    match method {
        "request" | "resolve" => rocks
            .request(envelope(params)?)
            .await
            .map_err(|e| request_error(&e)),
        "lsp-rocks--toggle-trace-io" => rocks
            .toggle_trace()
            .map(Value::Bool)
            .map_err(|e| RpcError::new(INTERNAL_ERROR, format!("{e:#}"))),
        "get-elrpc-logfile" => Ok(rocks
            .log_file()
            .map_or(Value::Null, |path| json!(path.display().to_string()))),
        "pullDiagnostics" => {
            let file = string_arg(params, "filePath")?;
            let diagnostics = rocks.pull_diagnostics(&file);
            serde_json::to_value(diagnostics)
                .map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
        }
        "restart" => {
            let root = string_arg(params, "projectRoot")?;
            rocks
                .restart(&PathBuf::from(root))
                .await
                .map(|()| Value::Null)
                .map_err(|e| request_error(&e))
        }
        "get-all-opened-files" => Ok(json!(rocks.opened_files())),
        _ => Err(RpcError::method_not_found(method)),
    }
}

fn request_error(error: &RequestError) -> RpcError {
    let code = match error {
        RequestError::UnknownMethod(_)
        | RequestError::MissingDocument { .. }
        | RequestError::InvalidUri { .. }
        | RequestError::UnknownServer(_) => INVALID_PARAMS,
        RequestError::Client(_)
        | RequestError::NoClient { .. }
        | RequestError::ShuttingDown { .. } => INTERNAL_ERROR,
    };
    RpcError::new(code, error.to_string())
}

/// Editors pass arguments positionally or by name.
fn single_arg(params: Value) -> Value {
    match params {
        Value::Array(mut args) if !args.is_empty() => args.swap_remove(0),
        other => other,
    }
}

fn envelope(params: Value) -> Result<RequestEnvelope, RpcError> {
    serde_json::from_value(single_arg(params))
        .context("expected {id, cmd, params}")
        .map_err(|e| RpcError::new(INVALID_PARAMS, format!("{e:#}")))
}

fn string_arg(params: Value, name: &str) -> Result<String, RpcError> {
    match single_arg(params) {
        Value::String(value) => Ok(value),
        Value::Object(mut members) => match members.remove(name) {
            Some(Value::String(value)) => Ok(value),
            _ => Err(RpcError::new(INVALID_PARAMS, format!("missing `{name}`"))),
        },
        _ => Err(RpcError::new(INVALID_PARAMS, format!("expected `{name}`"))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn arguments_may_be_positional_or_named() {
        assert_eq!(string_arg(json!(["/proj"]), "projectRoot").unwrap(), "/proj");
        assert_eq!(string_arg(json!("/proj"), "projectRoot").unwrap(), "/proj");
        assert_eq!(
            string_arg(json!({"projectRoot": "/proj"}), "projectRoot").unwrap(),
            "/proj"
        );
        let err = string_arg(json!({}), "projectRoot").unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[test]
    fn envelopes_parse_from_either_shape() {
        let raw = json!({"id": "7", "cmd": "textDocument/hover", "params": {}});
        assert_eq!(envelope(raw.clone()).unwrap().cmd, "textDocument/hover");
        assert_eq!(envelope(json!([raw])).unwrap().cmd, "textDocument/hover");
        assert_eq!(envelope(json!({"cmd": 1})).unwrap_err().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn outbound_requests_resolve_with_the_editor_answer() {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (_our_read, our_write) = tokio::io::split(ours);
        let (their_read, _their_write) = tokio::io::split(theirs);
        let (endpoint, _writer) = EditorEndpoint::spawn(our_write);

        let call = {
            let endpoint = Arc::clone(&endpoint);
            tokio::spawn(async move {
                endpoint
                    .request("lsp-rocks--suggest-project-root", json!({"filePath": "/a.ts"}))
                    .await
            })
        };

        let mut editor = FrameReader::new(their_read);
        let frame = editor.read_frame().await.unwrap().unwrap();
        assert_eq!(frame["method"], "lsp-rocks--suggest-project-root");
        assert_eq!(frame["params"]["filePath"], "/a.ts");
        let id = frame["id"].as_u64().unwrap();

        endpoint.complete(id, Ok(json!("/proj")));
        let answer = tokio::time::timeout(Duration::from_secs(5), call)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(answer, "/proj");
    }

    #[tokio::test]
    async fn closing_fails_waiting_requests() {
        let (ours, _theirs) = tokio::io::duplex(64 * 1024);
        let (_read, write) = tokio::io::split(ours);
        let (endpoint, _writer) = EditorEndpoint::spawn(write);

        let call = {
            let endpoint = Arc::clone(&endpoint);
            tokio::spawn(async move { endpoint.request("lsp-rocks--client-info", Value::Null).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        endpoint.close();

        let result = tokio::time::timeout(Duration::from_secs(5), call)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_err());
        assert!(endpoint.request("x", Value::Null).await.is_err());
    }
}
