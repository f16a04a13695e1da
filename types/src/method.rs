//! The closed set of LSP methods the editor may drive.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported method: {0}")]
pub struct MethodParseError(pub String);

/// An editor-facing LSP method.
///
/// Every variant has exactly one wire name; adding a variant forces the
/// capability table and the feature dispatch to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    DidOpen,
    DidClose,
    DidChange,
    WillSave,
    DidSave,
    Completion,
    CompletionResolve,
    Definition,
    Declaration,
    TypeDefinition,
    Implementation,
    References,
    Hover,
    SignatureHelp,
    Rename,
    PrepareRename,
    Formatting,
}

impl Method {
    pub const ALL: [Method; 17] = [
        Method::DidOpen,
        Method::DidClose,
        Method::DidChange,
        Method::WillSave,
        Method::DidSave,
        Method::Completion,
        Method::CompletionResolve,
        Method::Definition,
        Method::Declaration,
        Method::TypeDefinition,
        Method::Implementation,
        Method::References,
        Method::Hover,
        Method::SignatureHelp,
        Method::Rename,
        Method::PrepareRename,
        Method::Formatting,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::DidOpen => "textDocument/didOpen",
            Method::DidClose => "textDocument/didClose",
            Method::DidChange => "textDocument/didChange",
            Method::WillSave => "textDocument/willSave",
            Method::DidSave => "textDocument/didSave",
            Method::Completion => "textDocument/completion",
            Method::CompletionResolve => "completionItem/resolve",
            Method::Definition => "textDocument/definition",
            Method::Declaration => "textDocument/declaration",
            Method::TypeDefinition => "textDocument/typeDefinition",
            Method::Implementation => "textDocument/implementation",
            Method::References => "textDocument/references",
            Method::Hover => "textDocument/hover",
            Method::SignatureHelp => "textDocument/signatureHelp",
            Method::Rename => "textDocument/rename",
            Method::PrepareRename => "textDocument/prepareRename",
            Method::Formatting => "textDocument/formatting",
        }
    }

    /// Notifications that keep the server's view of a document in sync.
    #[must_use]
    pub const fn is_text_sync(self) -> bool {
        matches!(
            self,
            Method::DidOpen | Method::DidClose | Method::DidChange | Method::WillSave | Method::DidSave
        )
    }

    /// Every edit must reach the server, so superseded changes are still delivered.
    #[must_use]
    pub const fn is_exempt_from_staleness(self) -> bool {
        matches!(self, Method::DidChange)
    }

    /// Methods that open the document on a client before running, when needed.
    #[must_use]
    pub const fn requires_open_document(self) -> bool {
        !matches!(
            self,
            Method::DidOpen | Method::DidClose | Method::CompletionResolve
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = MethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| MethodParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_method_round_trips_through_its_wire_name() {
        for method in Method::ALL {
            assert_eq!(method.as_str().parse::<Method>(), Ok(method));
        }
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = "textDocument/codeLens".parse::<Method>().unwrap_err();
        assert_eq!(err.0, "textDocument/codeLens");
    }

    #[test]
    fn only_did_change_skips_staleness() {
        let exempt: Vec<_> = Method::ALL
            .into_iter()
            .filter(|m| m.is_exempt_from_staleness())
            .collect();
        assert_eq!(exempt, vec![Method::DidChange]);
    }

    #[test]
    fn open_and_close_never_auto_open() {
        assert!(!Method::DidOpen.requires_open_document());
        assert!(!Method::DidClose.requires_open_document());
        assert!(Method::DidChange.requires_open_document());
        assert!(Method::Definition.requires_open_document());
    }
}
