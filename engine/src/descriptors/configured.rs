//! Descriptors declared in the config file.

use std::fs;
use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use rocks_config::ServerEntry;
use rocks_lsp::ServerDescriptor;
use serde_json::Value;

pub struct Configured {
    name: String,
    entry: ServerEntry,
    /// `None` when the entry lists no markers.
    markers: Option<GlobSet>,
}

impl Configured {
    pub fn new(name: &str, entry: ServerEntry) -> Result<Self, globset::Error> {
        let markers = if entry.root_markers.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for marker in &entry.root_markers {
                let mut glob = GlobBuilder::new(marker.trim());
                if cfg!(windows) {
                    glob.case_insensitive(true);
                }
                builder.add(glob.build()?);
            }
            Some(builder.build()?)
        };
        Ok(Self {
            name: name.to_string(),
            entry,
            markers,
        })
    }
}

impl ServerDescriptor for Configured {
    fn name(&self) -> &str {
        &self.name
    }

    fn command(&self) -> &str {
        &self.entry.command
    }

    fn args(&self) -> &[String] {
        &self.entry.args
    }

    fn extensions(&self) -> &[String] {
        &self.entry.file_extensions
    }

    /// Active when any entry directly under `root` matches a marker glob.
    fn activate(&self, _file: &Path, root: &Path) -> bool {
        let Some(markers) = &self.markers else {
            return true;
        };
        let Ok(entries) = fs::read_dir(root) else {
            return false;
        };
        entries
            .filter_map(Result::ok)
            .any(|entry| markers.is_match(entry.file_name()))
    }

    fn settings(&self) -> Value {
        self.entry.settings.clone()
    }

    fn initialization_options(&self) -> Option<Value> {
        self.entry.initialization_options.clone()
    }
}

#[cfg(test)]
mod tests {
    use rocks_config::RocksConfig;

    use super::*;

    fn entry(markers: &str) -> ServerEntry {
        let config = RocksConfig::from_toml_str(&format!(
            r#"
            [servers.pyright]
            command = "pyright-langserver"
            args = ["--stdio"]
            file_extensions = ["py"]
            root_markers = [{markers}]
            initialization_options = {{ a = 1 }}
            "#
        ))
        .unwrap();
        config.servers["pyright"].clone()
    }

    #[test]
    fn markers_gate_activation() {
        let pyright = Configured::new("pyright", entry(r#""pyproject.toml", "setup.*""#)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.py");
        assert!(!pyright.activate(&file, dir.path()));

        std::fs::write(dir.path().join("setup.cfg"), "").unwrap();
        assert!(pyright.activate(&file, dir.path()));
    }

    #[test]
    fn no_markers_is_always_active() {
        let pyright = Configured::new("pyright", entry("")).unwrap();
        assert!(pyright.activate(Path::new("/nowhere/a.py"), Path::new("/nowhere")));
        assert_eq!(pyright.command(), "pyright-langserver");
        assert!(pyright.supports_extension(".py"));
        assert_eq!(pyright.initialization_options().unwrap()["a"], 1);
    }

    #[test]
    fn invalid_globs_are_rejected() {
        assert!(Configured::new("pyright", entry(r#""[unclosed""#)).is_err());
    }
}
