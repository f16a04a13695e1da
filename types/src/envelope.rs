//! Envelopes crossing the editor boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation token assigned by the editor.
///
/// Editors send either strings or integers; both are accepted and echoed back
/// unchanged in the matching [`ResponseEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// `{id, cmd, params}` as sent by the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: RequestId,
    pub cmd: String,
    #[serde(default)]
    pub params: Value,
}

impl RequestEnvelope {
    pub fn new(id: impl Into<RequestId>, cmd: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            cmd: cmd.into(),
            params,
        }
    }

    /// `params.textDocument.uri` exactly as the editor sent it (a path or a URI).
    #[must_use]
    pub fn document_uri(&self) -> Option<&str> {
        self.params.get("textDocument")?.get("uri")?.as_str()
    }
}

/// `{id, cmd, data}` delivered back to the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: RequestId,
    pub cmd: String,
    pub data: Value,
}

/// How requests are grouped when deciding whether one supersedes another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessScope {
    /// A request is superseded by a newer one with the same `cmd` and document.
    #[default]
    Document,
    /// A request is superseded by any newer one with the same `cmd`.
    Command,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_accepts_strings_and_numbers() {
        let env: RequestEnvelope =
            serde_json::from_value(serde_json::json!({"id": "42", "cmd": "x"})).unwrap();
        assert_eq!(env.id, RequestId::String("42".into()));
        assert!(env.params.is_null());

        let env: RequestEnvelope =
            serde_json::from_value(serde_json::json!({"id": 7, "cmd": "x", "params": {}}))
                .unwrap();
        assert_eq!(env.id, RequestId::Number(7));
    }

    #[test]
    fn response_echoes_id_shape() {
        let resp = ResponseEnvelope {
            id: RequestId::String("a1".into()),
            cmd: "textDocument/hover".into(),
            data: Value::Null,
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["id"], "a1");
    }

    #[test]
    fn document_uri_reads_nested_field() {
        let env = RequestEnvelope::new(
            1,
            "textDocument/definition",
            serde_json::json!({"textDocument": {"uri": "/proj/a.ts"}}),
        );
        assert_eq!(env.document_uri(), Some("/proj/a.ts"));

        let env = RequestEnvelope::new(1, "completionItem/resolve", serde_json::json!({}));
        assert_eq!(env.document_uri(), None);
    }

    #[test]
    fn staleness_scope_parses_lowercase() {
        let scope: StalenessScope = serde_json::from_value(serde_json::json!("command")).unwrap();
        assert_eq!(scope, StalenessScope::Command);
        assert_eq!(StalenessScope::default(), StalenessScope::Document);
    }
}
