//! Method → server capability table.

use rocks_types::Method;
use serde_json::Value;

/// What a server must advertise before a method may be sent to it.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Requirement {
    /// Always allowed.
    None,
    /// A top-level `ServerCapabilities` member that must be truthy.
    Provider(&'static str),
    Check(fn(&Value) -> bool),
}

pub(crate) const fn requirement(method: Method) -> Requirement {
    match method {
        Method::DidOpen
        | Method::DidClose
        | Method::DidChange
        | Method::WillSave
        | Method::DidSave => Requirement::None,
        Method::Completion => Requirement::Provider("completionProvider"),
        Method::CompletionResolve => Requirement::Check(resolve_supported),
        Method::Definition => Requirement::Provider("definitionProvider"),
        Method::Declaration => Requirement::Provider("declarationProvider"),
        Method::TypeDefinition => Requirement::Provider("typeDefinitionProvider"),
        Method::Implementation => Requirement::Provider("implementationProvider"),
        Method::References => Requirement::Provider("referencesProvider"),
        Method::Hover => Requirement::Provider("hoverProvider"),
        Method::SignatureHelp => Requirement::Provider("signatureHelpProvider"),
        Method::Rename => Requirement::Provider("renameProvider"),
        Method::PrepareRename => Requirement::Check(prepare_rename_supported),
        Method::Formatting => Requirement::Provider("documentFormattingProvider"),
    }
}

/// Whether `capabilities` (serialized `ServerCapabilities`) allow `method`.
pub(crate) fn satisfied(method: Method, capabilities: &Value) -> bool {
    match requirement(method) {
        Requirement::None => true,
        Requirement::Provider(field) => capabilities.get(field).is_some_and(truthy),
        Requirement::Check(check) => check(capabilities),
    }
}

fn resolve_supported(capabilities: &Value) -> bool {
    capabilities
        .pointer("/completionProvider/resolveProvider")
        .is_some_and(truthy)
}

fn prepare_rename_supported(capabilities: &Value) -> bool {
    capabilities
        .pointer("/renameProvider/prepareProvider")
        .is_some_and(truthy)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn text_sync_needs_nothing() {
        for method in Method::ALL.into_iter().filter(|m| m.is_text_sync()) {
            assert!(satisfied(method, &json!({})));
        }
    }

    #[test]
    fn provider_must_be_truthy() {
        assert!(!satisfied(Method::Definition, &json!({})));
        assert!(!satisfied(Method::Definition, &json!({"definitionProvider": false})));
        assert!(satisfied(Method::Definition, &json!({"definitionProvider": true})));
        assert!(satisfied(
            Method::Definition,
            &json!({"definitionProvider": {"workDoneProgress": false}})
        ));
    }

    #[test]
    fn resolve_requires_resolve_provider() {
        assert!(!satisfied(
            Method::CompletionResolve,
            &json!({"completionProvider": {"triggerCharacters": ["."]}})
        ));
        assert!(satisfied(
            Method::CompletionResolve,
            &json!({"completionProvider": {"resolveProvider": true}})
        ));
    }

    #[test]
    fn prepare_rename_requires_prepare_provider() {
        assert!(satisfied(Method::Rename, &json!({"renameProvider": true})));
        assert!(!satisfied(Method::PrepareRename, &json!({"renameProvider": true})));
        assert!(satisfied(
            Method::PrepareRename,
            &json!({"renameProvider": {"prepareProvider": true}})
        ));
    }
}
