//! Latest-request-wins bookkeeping.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use rocks_types::{Method, RequestEnvelope, RequestId, StalenessScope};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    cmd: String,
    document: Option<String>,
}

/// The latest request id seen per key.
///
/// A request is stale once a different id has been recorded under its key;
/// callers record on arrival, so the most recent arrival is the only live one.
pub struct RecentRequests {
    scope: StalenessScope,
    latest: Mutex<HashMap<Key, RequestId>>,
}

impl RecentRequests {
    #[must_use]
    pub fn new(scope: StalenessScope) -> Self {
        Self {
            scope,
            latest: Mutex::new(HashMap::new()),
        }
    }

    fn key(&self, envelope: &RequestEnvelope) -> Key {
        let document = match self.scope {
            StalenessScope::Document => envelope.document_uri().map(str::to_string),
            StalenessScope::Command => None,
        };
        Key {
            cmd: envelope.cmd.clone(),
            document,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn record(&self, envelope: &RequestEnvelope) {
        let key = self.key(envelope);
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, envelope.id.clone());
    }

    /// Drop every entry of a closed document.
    pub fn forget_document(&self, uri: &str) {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key, _| key.document.as_deref() != Some(uri));
    }

    /// Superseded by a newer request; `didChange` never is.
    #[must_use]
    pub fn is_stale(&self, envelope: &RequestEnvelope) -> bool {
        if envelope
            .cmd
            .parse::<Method>()
            .is_ok_and(Method::is_exempt_from_staleness)
        {
            return false;
        }
        let key = self.key(envelope);
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .is_some_and(|latest| *latest != envelope.id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn env(id: i64, cmd: &str, uri: &str) -> RequestEnvelope {
        RequestEnvelope::new(id, cmd, json!({"textDocument": {"uri": uri}}))
    }

    #[test]
    fn newer_request_supersedes_older() {
        let recent = RecentRequests::new(StalenessScope::Document);
        let first = env(1, "textDocument/hover", "/a.ts");
        let second = env(2, "textDocument/hover", "/a.ts");
        recent.record(&first);
        assert!(!recent.is_stale(&first));
        recent.record(&second);
        assert!(recent.is_stale(&first));
        assert!(!recent.is_stale(&second));
    }

    #[test]
    fn did_change_is_never_stale() {
        let recent = RecentRequests::new(StalenessScope::Command);
        let first = env(1, "textDocument/didChange", "/a.ts");
        recent.record(&first);
        recent.record(&env(2, "textDocument/didChange", "/a.ts"));
        assert!(!recent.is_stale(&first));
    }

    #[test]
    fn document_scope_keeps_files_apart() {
        let recent = RecentRequests::new(StalenessScope::Document);
        let a = env(1, "textDocument/completion", "/a.ts");
        recent.record(&a);
        recent.record(&env(2, "textDocument/completion", "/b.ts"));
        assert!(!recent.is_stale(&a));
        // A different method never interferes.
        recent.record(&env(3, "textDocument/hover", "/a.ts"));
        assert!(!recent.is_stale(&a));
    }

    #[test]
    fn command_scope_spans_files() {
        let recent = RecentRequests::new(StalenessScope::Command);
        let a = env(1, "textDocument/completion", "/a.ts");
        recent.record(&a);
        recent.record(&env(2, "textDocument/completion", "/b.ts"));
        assert!(recent.is_stale(&a));
    }

    #[test]
    fn closing_a_document_forgets_its_entries() {
        let recent = RecentRequests::new(StalenessScope::Document);
        let hover = env(1, "textDocument/hover", "/a.ts");
        let other = env(3, "textDocument/hover", "/b.ts");
        recent.record(&hover);
        recent.record(&env(2, "textDocument/hover", "/a.ts"));
        recent.record(&other);
        recent.record(&env(4, "textDocument/hover", "/b.ts"));
        assert!(recent.is_stale(&hover));

        recent.forget_document("/a.ts");
        assert!(!recent.is_stale(&hover));
        assert!(recent.is_stale(&other));
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn unrecorded_requests_are_live() {
        let recent = RecentRequests::new(StalenessScope::Document);
        assert!(!recent.is_stale(&env(1, "textDocument/hover", "/a.ts")));
    }
}
