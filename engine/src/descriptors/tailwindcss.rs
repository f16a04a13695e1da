//! tailwindcss-language-server, active only in projects with a tailwind config.

use std::path::Path;

use lsp_types::InitializeResult;
use rocks_lsp::ServerDescriptor;
use serde_json::{Map, Value, json};

use super::strings;

pub const NAME: &str = "tailwindcss";

const CONFIG_DIRS: [&str; 3] = ["", "config", "assets"];
const CONFIG_FILES: [&str; 3] = [
    "tailwind.config.js",
    "tailwind.config.cjs",
    "tailwind.config.ts",
];

pub struct Tailwind {
    args: Vec<String>,
    extensions: Vec<String>,
}

impl Tailwind {
    #[must_use]
    pub fn new() -> Self {
        Self {
            args: strings(&["--stdio"]),
            extensions: strings(&["tsx", "jsx"]),
        }
    }
}

impl Default for Tailwind {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerDescriptor for Tailwind {
    fn name(&self) -> &str {
        NAME
    }

    fn command(&self) -> &str {
        "tailwindcss-language-server"
    }

    fn args(&self) -> &[String] {
        &self.args
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn activate(&self, _file: &Path, root: &Path) -> bool {
        CONFIG_FILES.iter().any(|file| {
            CONFIG_DIRS
                .iter()
                .any(|dir| root.join(dir).join(file).is_file())
        })
    }

    fn settings(&self) -> Value {
        json!({
            "editor": {
                "userLanguages": {"eelixir": "html-eex", "eruby": "erb"}
            },
            "tailwindCSS": {
                "emmetCompletions": false,
                "showPixelEquivalents": true,
                "rootFontSize": 16,
                "validate": true,
                "hovers": true,
                "suggestions": true,
                "codeActions": true,
                "lint": {
                    "invalidScreen": "error",
                    "invalidVariant": "error",
                    "invalidTailwindDirective": "error",
                    "invalidApply": "error",
                    "invalidConfigPath": "error",
                    "cssConflict": "warning",
                    "recommendedVariantOrder": "warning"
                },
                "experimental": {"classRegex": ""},
                "classAttributes": ["class", "className", "ngClass"]
            }
        })
    }

    /// The `editor` and `tailwindCSS` settings flattened into one object.
    fn initialization_options(&self) -> Option<Value> {
        let settings = self.settings();
        let mut options = Map::new();
        for section in ["editor", "tailwindCSS"] {
            if let Some(Value::Object(members)) = settings.get(section) {
                options.extend(members.clone());
            }
        }
        Some(Value::Object(options))
    }

    /// Completion must also trigger inside dashed class names.
    fn post_initialize(&self, result: &mut InitializeResult) {
        if let Some(triggers) = result
            .capabilities
            .completion_provider
            .as_mut()
            .and_then(|c| c.trigger_characters.as_mut())
        {
            triggers.push("-".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use lsp_types::{CompletionOptions, ServerCapabilities};

    use super::*;

    #[test]
    fn activates_on_config_in_known_dirs() {
        let tw = Tailwind::new();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let file = root.join("src/App.tsx");
        assert!(!tw.activate(&file, root));

        std::fs::create_dir(root.join("assets")).unwrap();
        std::fs::write(root.join("assets/tailwind.config.cjs"), "").unwrap();
        assert!(tw.activate(&file, root));
    }

    #[test]
    fn root_config_activates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tailwind.config.ts"), "").unwrap();
        assert!(Tailwind::new().activate(&dir.path().join("a.jsx"), dir.path()));
    }

    #[test]
    fn dash_is_appended_to_existing_triggers_only() {
        let tw = Tailwind::new();
        let mut result = InitializeResult {
            capabilities: ServerCapabilities {
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec!["\"".to_string()]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: None,
        };
        tw.post_initialize(&mut result);
        assert_eq!(
            result.capabilities.completion_provider.unwrap().trigger_characters,
            Some(vec!["\"".to_string(), "-".to_string()])
        );

        let mut bare = InitializeResult::default();
        tw.post_initialize(&mut bare);
        assert!(bare.capabilities.completion_provider.is_none());
    }

    #[test]
    fn initialization_options_flatten_sections() {
        let options = Tailwind::new().initialization_options().unwrap();
        assert_eq!(options["userLanguages"]["eruby"], "erb");
        assert_eq!(options["rootFontSize"], 16);
        assert!(options.get("tailwindCSS").is_none());
    }
}
