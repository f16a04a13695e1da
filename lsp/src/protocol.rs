//! JSON-RPC message shapes and URI helpers shared by both wire endpoints.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use lsp_types::Uri;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub struct PathToUriError {
    path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Notification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl<'a> Notification<'a> {
    pub fn new(method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }
}

/// Build a response frame for a request received from the peer.
pub fn response(id: Value, outcome: Result<Value, RpcError>) -> Value {
    match outcome {
        Ok(result) => serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(error) => serde_json::json!({ "jsonrpc": "2.0", "id": id, "error": error }),
    }
}

/// A classified frame read from the peer.
#[derive(Debug)]
pub enum Incoming {
    Response {
        id: u64,
        outcome: Result<Value, RpcError>,
    },
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
}

/// Classify a raw frame; `None` for frames that are not valid JSON-RPC messages.
pub fn parse_incoming(frame: Value) -> Option<Incoming> {
    let Value::Object(mut map) = frame else {
        return None;
    };
    let id = map.remove("id");
    let method = map
        .get("method")
        .and_then(Value::as_str)
        .map(String::from);
    let params = map.remove("params").unwrap_or(Value::Null);

    match (id, method) {
        (Some(id), None) => {
            let outcome = if let Some(error) = map.remove("error") {
                Err(serde_json::from_value(error)
                    .unwrap_or_else(|_| RpcError::new(INTERNAL_ERROR, "malformed error object")))
            } else {
                Ok(map.remove("result")?)
            };
            Some(Incoming::Response {
                id: id.as_u64()?,
                outcome,
            })
        }
        (Some(id), Some(method)) => Some(Incoming::Request { id, method, params }),
        (None, Some(method)) => Some(Incoming::Notification { method, params }),
        (None, None) => None,
    }
}

pub fn path_to_file_uri(path: &Path) -> Result<url::Url, PathToUriError> {
    url::Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri)
        .ok()
        .filter(|u| u.scheme() == "file")
        .and_then(|u| u.to_file_path().ok())
}

/// Protocol URI for a filesystem path.
pub fn lsp_uri(path: &Path) -> Result<Uri, PathToUriError> {
    let url = path_to_file_uri(path)?;
    Uri::from_str(url.as_str()).map_err(|_| PathToUriError {
        path: path.to_path_buf(),
    })
}

/// Protocol URI for editor input that is either an absolute path or already a URI.
pub fn to_protocol_uri(raw: &str) -> Result<Uri, PathToUriError> {
    let path = Path::new(raw);
    if path.is_absolute() {
        return lsp_uri(path);
    }
    Uri::from_str(raw).map_err(|_| PathToUriError {
        path: path.to_path_buf(),
    })
}

/// Accept either a filesystem path or a `file://` URI and return the path.
pub fn document_path(raw: &str) -> PathBuf {
    if raw.starts_with("file://")
        && let Some(path) = file_uri_to_path(raw)
    {
        return path;
    }
    PathBuf::from(raw)
}

/// Editor-facing form of a protocol URI: a filesystem path for `file://`
/// URIs, the URI string unchanged otherwise.
pub fn display_path(uri: &Uri) -> String {
    file_uri_to_path(uri.as_str())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| uri.as_str().to_string())
}

/// LSP `languageId` for a file, from its extension.
pub fn language_id_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext {
        "vue" => "vue",
        "tsx" => "typescriptreact",
        "ts" | "mts" | "cts" => "typescript",
        "jsx" => "javascriptreact",
        "js" | "mjs" | "cjs" => "javascript",
        "html" => "html",
        "css" => "css",
        "json" => "json",
        "less" => "less",
        "rs" => "rust",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_null_params() {
        let value = serde_json::to_value(Request::new(1, "shutdown", Value::Null)).unwrap();
        assert_eq!(value, serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "shutdown"}));

        let value = serde_json::to_value(Notification::new("initialized", serde_json::json!({})))
            .unwrap();
        assert_eq!(value["params"], serde_json::json!({}));
    }

    #[test]
    fn classifies_responses_requests_and_notifications() {
        let ok = parse_incoming(serde_json::json!({"jsonrpc": "2.0", "id": 4, "result": null}));
        assert!(matches!(ok, Some(Incoming::Response { id: 4, outcome: Ok(Value::Null) })));

        let err = parse_incoming(serde_json::json!({
            "jsonrpc": "2.0", "id": 5, "error": {"code": -32600, "message": "bad"}
        }));
        match err {
            Some(Incoming::Response { id, outcome: Err(e) }) => {
                assert_eq!(id, 5);
                assert_eq!(e.code, -32600);
            }
            other => panic!("expected error response, got {other:?}"),
        }

        let req = parse_incoming(serde_json::json!({
            "jsonrpc": "2.0", "id": "abc", "method": "workspace/configuration", "params": {"items": []}
        }));
        match req {
            Some(Incoming::Request { id, method, params }) => {
                assert_eq!(id, "abc");
                assert_eq!(method, "workspace/configuration");
                assert!(params["items"].is_array());
            }
            other => panic!("expected request, got {other:?}"),
        }

        let note = parse_incoming(serde_json::json!({"jsonrpc": "2.0", "method": "exit"}));
        assert!(matches!(note, Some(Incoming::Notification { params: Value::Null, .. })));
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(parse_incoming(serde_json::json!([1, 2])).is_none());
        assert!(parse_incoming(serde_json::json!({"jsonrpc": "2.0"})).is_none());
        // Response without result or error.
        assert!(parse_incoming(serde_json::json!({"jsonrpc": "2.0", "id": 1})).is_none());
        // Response ids we issue are always integers.
        assert!(parse_incoming(serde_json::json!({"id": "x", "result": 1})).is_none());
    }

    #[test]
    fn response_builder_shapes() {
        let ok = response(serde_json::json!(3), Ok(serde_json::json!([null])));
        assert_eq!(ok["result"], serde_json::json!([null]));
        let err = response(serde_json::json!(3), Err(RpcError::method_not_found("x/y")));
        assert_eq!(err["error"]["code"], METHOD_NOT_FOUND);
        assert!(err["error"]["message"].as_str().unwrap().contains("x/y"));
    }

    #[cfg(not(windows))]
    #[test]
    fn paths_and_uris_convert_both_ways() {
        let uri = lsp_uri(Path::new("/proj/src/a b.ts")).unwrap();
        assert_eq!(uri.as_str(), "file:///proj/src/a%20b.ts");
        assert_eq!(display_path(&uri), "/proj/src/a b.ts");
        assert_eq!(document_path("file:///proj/x.ts"), PathBuf::from("/proj/x.ts"));
        assert_eq!(document_path("/proj/x.ts"), PathBuf::from("/proj/x.ts"));
        assert_eq!(file_uri_to_path("untitled:Untitled-1"), None);
        assert_eq!(
            to_protocol_uri("/proj/x.ts").unwrap().as_str(),
            "file:///proj/x.ts"
        );
        assert_eq!(
            to_protocol_uri("file:///proj/x.ts").unwrap().as_str(),
            "file:///proj/x.ts"
        );
    }

    #[test]
    fn language_ids_follow_extension() {
        assert_eq!(language_id_for_path(Path::new("a.tsx")), "typescriptreact");
        assert_eq!(language_id_for_path(Path::new("a.ts")), "typescript");
        assert_eq!(language_id_for_path(Path::new("a.jsx")), "javascriptreact");
        assert_eq!(language_id_for_path(Path::new("a.vue")), "vue");
        assert_eq!(language_id_for_path(Path::new("Makefile")), "plaintext");
    }
}
