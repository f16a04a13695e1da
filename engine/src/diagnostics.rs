//! Latest push diagnostics per project, server and file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use lsp_types::{Diagnostic, PublishDiagnosticsParams};

/// Reports from every server for one file, in first-report order.
#[derive(Default)]
struct FileRecords {
    sources: Vec<(String, Vec<Diagnostic>)>,
}

impl FileRecords {
    fn merged(&self) -> Vec<Diagnostic> {
        self.sources
            .iter()
            .flat_map(|(_, diagnostics)| diagnostics.iter().cloned())
            .collect()
    }
}

/// A merged report the editor should see.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsUpdate {
    pub uri: String,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Default)]
pub struct DiagnosticsCenter {
    records: Mutex<HashMap<PathBuf, HashMap<String, FileRecords>>>,
}

impl DiagnosticsCenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<PathBuf, HashMap<String, FileRecords>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `server`'s latest report for a file.
    ///
    /// Returns the merged diagnostics across every server for the file, or
    /// `None` when the report is identical to the stored one (both empty
    /// included) and nothing should be forwarded.
    pub fn set(
        &self,
        root: &Path,
        server: &str,
        params: PublishDiagnosticsParams,
    ) -> Option<DiagnosticsUpdate> {
        let uri = params.uri.as_str().to_string();
        let mut records = self.records();
        let file = records
            .entry(root.to_path_buf())
            .or_default()
            .entry(uri.clone())
            .or_default();

        match file.sources.iter_mut().find(|(name, _)| name == server) {
            Some((_, stored)) if *stored == params.diagnostics => return None,
            Some((_, stored)) => *stored = params.diagnostics,
            None if params.diagnostics.is_empty() => return None,
            None => file
                .sources
                .push((server.to_string(), params.diagnostics)),
        }

        Some(DiagnosticsUpdate {
            diagnostics: file.merged(),
            uri,
        })
    }

    /// Merged diagnostics for `uri` under `root`; empty when unknown.
    #[must_use]
    pub fn get(&self, root: &Path, uri: &str) -> Vec<Diagnostic> {
        self.records()
            .get(root)
            .and_then(|files| files.get(uri))
            .map(FileRecords::merged)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use lsp_types::{Position, Range, Uri};

    use super::*;

    fn diag(message: &str) -> Diagnostic {
        Diagnostic {
            range: Range::new(Position::new(0, 0), Position::new(0, 1)),
            message: message.to_string(),
            ..Default::default()
        }
    }

    fn params(uri: &str, diagnostics: Vec<Diagnostic>) -> PublishDiagnosticsParams {
        PublishDiagnosticsParams {
            uri: uri.parse::<Uri>().unwrap(),
            diagnostics,
            version: None,
        }
    }

    const A: &str = "file:///proj/a.ts";

    #[test]
    fn identical_reports_forward_once() {
        let center = DiagnosticsCenter::new();
        let root = Path::new("/proj");
        let first = center.set(root, "ts-ls", params(A, vec![diag("x")]));
        assert_eq!(first.unwrap().diagnostics, vec![diag("x")]);
        assert!(center.set(root, "ts-ls", params(A, vec![diag("x")])).is_none());
    }

    #[test]
    fn empty_reports_are_suppressed_until_something_changes() {
        let center = DiagnosticsCenter::new();
        let root = Path::new("/proj");
        assert!(center.set(root, "ts-ls", params(A, Vec::new())).is_none());

        center.set(root, "ts-ls", params(A, vec![diag("x")])).unwrap();
        // Clearing a non-empty report is a change.
        let cleared = center.set(root, "ts-ls", params(A, Vec::new())).unwrap();
        assert!(cleared.diagnostics.is_empty());
        assert!(center.set(root, "ts-ls", params(A, Vec::new())).is_none());
    }

    #[test]
    fn reports_from_servers_are_concatenated() {
        let center = DiagnosticsCenter::new();
        let root = Path::new("/proj");
        center.set(root, "ts-ls", params(A, vec![diag("type")]));
        let merged = center
            .set(root, "eslint", params(A, vec![diag("lint")]))
            .unwrap();
        assert_eq!(merged.uri, A);
        assert_eq!(merged.diagnostics, vec![diag("type"), diag("lint")]);

        // Replacing one source keeps the other in place.
        let merged = center
            .set(root, "ts-ls", params(A, vec![diag("type2")]))
            .unwrap();
        assert_eq!(merged.diagnostics, vec![diag("type2"), diag("lint")]);
        assert_eq!(center.get(root, A), vec![diag("type2"), diag("lint")]);
    }

    #[test]
    fn lookups_are_scoped_by_project() {
        let center = DiagnosticsCenter::new();
        center.set(Path::new("/proj"), "ts-ls", params(A, vec![diag("x")]));
        assert!(center.get(Path::new("/other"), A).is_empty());
        assert!(center.get(Path::new("/proj"), "file:///proj/b.ts").is_empty());
    }
}
