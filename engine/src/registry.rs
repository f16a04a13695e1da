//! Server registry: which descriptors apply to a file in a project.

use std::path::Path;
use std::sync::Arc;

use rocks_lsp::ServerDescriptor;

/// Source of the descriptor list, assembled once at startup.
pub trait DescriptorProvider: Send + Sync {
    fn descriptors(&self) -> Vec<Arc<dyn ServerDescriptor>>;
}

/// A fixed list of descriptors.
pub struct StaticProvider(pub Vec<Arc<dyn ServerDescriptor>>);

impl DescriptorProvider for StaticProvider {
    fn descriptors(&self) -> Vec<Arc<dyn ServerDescriptor>> {
        self.0.clone()
    }
}

/// Whether a server executable is installed.
pub trait CommandLookup: Send + Sync {
    fn is_installed(&self, command: &str) -> bool;
}

/// Looks commands up on `PATH`.
pub struct PathLookup;

impl CommandLookup for PathLookup {
    fn is_installed(&self, command: &str) -> bool {
        which::which(command).is_ok()
    }
}

pub struct ServerRegistry {
    descriptors: Vec<Arc<dyn ServerDescriptor>>,
    lookup: Arc<dyn CommandLookup>,
}

impl ServerRegistry {
    pub fn new(provider: &dyn DescriptorProvider, lookup: Arc<dyn CommandLookup>) -> Self {
        let registry = Self {
            descriptors: provider.descriptors(),
            lookup,
        };
        tracing::info!(servers = ?registry.names(), "Loaded server descriptors");
        registry
    }

    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<Arc<dyn ServerDescriptor>> {
        self.descriptors.iter().find(|d| d.name() == name).cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name()).collect()
    }

    /// Descriptors covering `file`'s extension whose command is installed and
    /// whose activation predicate accepts `(file, root)`, in registration order.
    #[must_use]
    pub fn find_clients(&self, file: &Path, root: &Path) -> Vec<Arc<dyn ServerDescriptor>> {
        let Some(ext) = file.extension().and_then(|e| e.to_str()) else {
            return Vec::new();
        };
        self.descriptors
            .iter()
            .filter(|d| d.supports_extension(ext))
            .filter(|d| {
                let installed = self.lookup.is_installed(d.command());
                if !installed {
                    tracing::debug!(server = d.name(), command = d.command(), "Command not on PATH");
                }
                installed
            })
            .filter(|d| d.activate(file, root))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rocks_lsp::testing::StaticDescriptor;

    use super::*;

    struct Installed(HashSet<&'static str>);

    impl CommandLookup for Installed {
        fn is_installed(&self, command: &str) -> bool {
            self.0.contains(command)
        }
    }

    fn registry(installed: &[&'static str]) -> ServerRegistry {
        let provider = StaticProvider(vec![
            Arc::new(StaticDescriptor::new("ts-ls", &["ts", ".tsx"])),
            Arc::new(StaticDescriptor::new("tailwindcss", &["tsx"])),
            Arc::new(StaticDescriptor::new("eslint", &["ts", "tsx"]).inactive()),
        ]);
        ServerRegistry::new(
            &provider,
            Arc::new(Installed(installed.iter().copied().collect())),
        )
    }

    #[test]
    fn matches_extension_with_or_without_dot() {
        let registry = registry(&["ts-ls", "tailwindcss", "eslint"]);
        let names = |file: &str| -> Vec<String> {
            registry
                .find_clients(Path::new(file), Path::new("/proj"))
                .iter()
                .map(|d| d.name().to_string())
                .collect()
        };
        assert_eq!(names("/proj/a.ts"), ["ts-ls"]);
        assert_eq!(names("/proj/b.tsx"), ["ts-ls", "tailwindcss"]);
        assert!(names("/proj/README").is_empty());
        assert!(names("/proj/main.rs").is_empty());
    }

    #[test]
    fn missing_executables_are_skipped() {
        let registry = registry(&["tailwindcss"]);
        let found = registry.find_clients(Path::new("/proj/b.tsx"), Path::new("/proj"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "tailwindcss");
    }

    #[test]
    fn lookup_by_name() {
        let registry = registry(&[]);
        assert!(registry.descriptor("eslint").is_some());
        assert!(registry.descriptor("pyright").is_none());
        assert_eq!(registry.names(), ["ts-ls", "tailwindcss", "eslint"]);
    }
}
