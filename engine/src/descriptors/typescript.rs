//! typescript-language-server.

use std::path::Path;

use rocks_lsp::ServerDescriptor;
use serde_json::{Value, json};

use super::strings;

pub const NAME: &str = "ts-ls";

pub struct TypeScript {
    args: Vec<String>,
    extensions: Vec<String>,
}

impl TypeScript {
    #[must_use]
    pub fn new() -> Self {
        Self {
            args: strings(&["--stdio"]),
            extensions: strings(&["tsx", "jsx", "ts", "js", "mjs", "mts"]),
        }
    }
}

impl Default for TypeScript {
    fn default() -> Self {
        Self::new()
    }
}

fn language_settings() -> Value {
    json!({
        "autoClosingTags": true,
        "implicitProjectConfig": {"checkJs": false, "experimentalDecorators": false},
        "preferences": {
            "importModuleSpecifier": "auto",
            "quoteStyle": "auto",
            "renameShorthandProperties": true
        },
        "referencesCodeLens": {"enabled": false},
        "suggest": {
            "autoImports": true,
            "completeFunctionCalls": false,
            "completeJSDocs": true,
            "enabled": true,
            "names": true,
            "paths": true
        },
        "suggestionActions": {"enabled": true},
        "updateImportsOnFileMove": {"enabled": "prompt"},
        "validate": {"enable": true},
        "format": {"enable": false},
        "inlayHints": {
            "includeInlayEnumMemberValueHints": true,
            "includeInlayFunctionLikeReturnTypeHints": true,
            "includeInlayFunctionParameterTypeHints": true,
            "includeInlayParameterNameHints": "none",
            "includeInlayParameterNameHintsWhenArgumentMatchesName": true,
            "includeInlayPropertyDeclarationTypeHints": true,
            "includeInlayVariableTypeHints": true
        }
    })
}

impl ServerDescriptor for TypeScript {
    fn name(&self) -> &str {
        NAME
    }

    fn command(&self) -> &str {
        "typescript-language-server"
    }

    fn args(&self) -> &[String] {
        &self.args
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn activate(&self, _file: &Path, _root: &Path) -> bool {
        true
    }

    fn settings(&self) -> Value {
        json!({
            "javascript": language_settings(),
            "typescript": language_settings(),
            "completions": {"completeFunctionCalls": true}
        })
    }

    fn initialization_options(&self) -> Option<Value> {
        Some(json!({
            "logVerbosity": "off",
            "maxTsServerMemory": 3072,
            "preferences": {
                "includePackageJsonAutoImports": "on",
                "includeAutomaticOptionalChainCompletions": true
            },
            "tsserver": {"logVerbosity": "off"}
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_script_files_everywhere() {
        let ts = TypeScript::new();
        for ext in ["ts", "tsx", ".jsx", "mjs", "mts"] {
            assert!(ts.supports_extension(ext), "{ext}");
        }
        assert!(!ts.supports_extension("vue"));
        assert!(ts.activate(Path::new("/x/a.ts"), Path::new("/x")));
        assert_eq!(ts.settings()["typescript"]["validate"]["enable"], true);
    }
}
