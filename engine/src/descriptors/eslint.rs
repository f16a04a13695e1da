//! vscode-eslint-language-server, active in projects with an eslint config.

use std::path::Path;

use lsp_types::ConfigurationItem;
use rocks_lsp::ServerDescriptor;
use rocks_lsp::protocol::{document_path, lsp_uri};
use rocks_types::FileProjectIndex;
use serde_json::{Value, json};

use super::strings;

pub const NAME: &str = "eslint";

const CONFIG_FILES: [&str; 10] = [
    "eslint.config.js",
    "eslint.config.mjs",
    "eslint.config.cjs",
    ".eslintrc",
    ".eslintrc.js",
    ".eslintrc.cjs",
    ".eslintrc.json",
    ".eslintrc.yml",
    ".eslintrc.yaml",
    "package.json",
];

pub struct Eslint {
    args: Vec<String>,
    extensions: Vec<String>,
}

impl Eslint {
    #[must_use]
    pub fn new() -> Self {
        Self {
            args: strings(&["--stdio"]),
            extensions: strings(&["ts", "tsx", "js", "jsx", "vue"]),
        }
    }
}

impl Default for Eslint {
    fn default() -> Self {
        Self::new()
    }
}

/// `package.json` only counts when it carries an `eslintConfig` member.
fn has_eslint_config(root: &Path) -> bool {
    CONFIG_FILES.iter().any(|name| {
        let path = root.join(name);
        if *name != "package.json" {
            return path.is_file();
        }
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(&text).ok())
            .is_some_and(|pkg| pkg.get("eslintConfig").is_some())
    })
}

fn workspace_settings(root: Option<&Path>) -> Value {
    let workspace_folder = root.and_then(|root| {
        let uri = lsp_uri(root).ok()?;
        let name = root.file_name()?.to_string_lossy().into_owned();
        Some(json!({"uri": uri.as_str(), "name": name}))
    });
    json!({
        "validate": "on",
        "packageManager": "npm",
        "useESLintClass": false,
        "experimental": {"useFlatConfig": false},
        "codeAction": {
            "disableRuleComment": {"enable": true, "location": "separateLine"},
            "showDocumentation": {"enable": true}
        },
        "codeActionOnSave": {"enable": false, "mode": "all"},
        "format": false,
        "quiet": false,
        "onIgnoredFiles": "off",
        "options": {},
        "rulesCustomizations": [],
        "run": "onType",
        "problems": {"shortenToSingleLine": false},
        "nodePath": null,
        "workingDirectory": {"mode": "location"},
        "workspaceFolder": workspace_folder
    })
}

impl ServerDescriptor for Eslint {
    fn name(&self) -> &str {
        NAME
    }

    fn command(&self) -> &str {
        "vscode-eslint-language-server"
    }

    fn args(&self) -> &[String] {
        &self.args
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn activate(&self, _file: &Path, root: &Path) -> bool {
        has_eslint_config(root)
    }

    /// The eslint server pulls its settings per document; each answer names
    /// the workspace folder the document belongs to.
    fn configuration(&self, items: &[ConfigurationItem], index: &FileProjectIndex) -> Vec<Value> {
        items
            .iter()
            .map(|item| {
                let root = item
                    .scope_uri
                    .as_ref()
                    .and_then(|uri| index.get(uri.as_str()))
                    .or_else(|| {
                        item.scope_uri
                            .as_ref()
                            .and_then(|uri| document_path(uri.as_str()).parent().map(Path::to_path_buf))
                    });
                workspace_settings(root.as_deref())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use lsp_types::Uri;

    use super::*;

    #[test]
    fn needs_a_config_file() {
        let eslint = Eslint::new();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let file = root.join("a.ts");
        assert!(!eslint.activate(&file, root));

        std::fs::write(root.join("package.json"), r#"{"name": "x"}"#).unwrap();
        assert!(!eslint.activate(&file, root));

        std::fs::write(root.join("package.json"), r#"{"eslintConfig": {}}"#).unwrap();
        assert!(eslint.activate(&file, root));
    }

    #[test]
    fn rc_file_activates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".eslintrc.json"), "{}").unwrap();
        assert!(Eslint::new().activate(&dir.path().join("a.vue"), dir.path()));
    }

    #[cfg(not(windows))]
    #[test]
    fn configuration_names_the_indexed_project() {
        let index = FileProjectIndex::new();
        index.insert("file:///proj/src/a.ts", "/proj");
        let items = vec![
            ConfigurationItem {
                scope_uri: Some("file:///proj/src/a.ts".parse::<Uri>().unwrap()),
                section: Some(String::new()),
            },
            ConfigurationItem {
                scope_uri: Some("file:///other/b.ts".parse::<Uri>().unwrap()),
                section: None,
            },
        ];
        let answers = Eslint::new().configuration(&items, &index);
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0]["workspaceFolder"]["uri"], "file:///proj");
        assert_eq!(answers[0]["workspaceFolder"]["name"], "proj");
        assert_eq!(answers[1]["workspaceFolder"]["name"], "other");
        assert_eq!(answers[0]["validate"], "on");
    }
}
