//! Built-in server descriptors plus the ones declared in config.

mod configured;
mod eslint;
mod tailwindcss;
mod typescript;

use std::sync::Arc;

use rocks_config::RocksConfig;
use rocks_lsp::ServerDescriptor;

pub use configured::Configured;
pub use eslint::Eslint;
pub use tailwindcss::Tailwind;
pub use typescript::TypeScript;

use crate::registry::DescriptorProvider;

/// Name of the descriptor the `restart` maintenance call targets.
pub const TYPESCRIPT: &str = typescript::NAME;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[must_use]
pub fn builtin() -> Vec<Arc<dyn ServerDescriptor>> {
    vec![
        Arc::new(TypeScript::new()),
        Arc::new(Tailwind::new()),
        Arc::new(Eslint::new()),
    ]
}

/// Built-ins minus the disabled ones, then configured servers.
///
/// A configured server named like a built-in replaces it.
pub struct ConfigProvider {
    descriptors: Vec<Arc<dyn ServerDescriptor>>,
}

impl ConfigProvider {
    #[must_use]
    pub fn new(config: &RocksConfig) -> Self {
        let mut configured: Vec<Arc<dyn ServerDescriptor>> = Vec::new();
        for (name, entry) in &config.servers {
            match Configured::new(name, entry.clone()) {
                Ok(descriptor) => configured.push(Arc::new(descriptor)),
                Err(e) => tracing::warn!(server = %name, "Skipping server with invalid root marker: {e}"),
            }
        }

        let mut descriptors: Vec<Arc<dyn ServerDescriptor>> = builtin()
            .into_iter()
            .filter(|d| !config.is_disabled(d.name()))
            .filter(|d| !config.servers.contains_key(d.name()))
            .collect();
        descriptors.extend(
            configured
                .into_iter()
                .filter(|d| !config.is_disabled(d.name())),
        );
        Self { descriptors }
    }
}

impl DescriptorProvider for ConfigProvider {
    fn descriptors(&self) -> Vec<Arc<dyn ServerDescriptor>> {
        self.descriptors.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(provider: &ConfigProvider) -> Vec<String> {
        provider
            .descriptors()
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    #[test]
    fn defaults_to_builtins() {
        let provider = ConfigProvider::new(&RocksConfig::default());
        assert_eq!(names(&provider), ["ts-ls", "tailwindcss", "eslint"]);
    }

    #[test]
    fn disabled_and_overridden_builtins_are_dropped() {
        let config = RocksConfig::from_toml_str(
            r#"
            disabled = ["eslint"]

            [servers.ts-ls]
            command = "vtsls"
            args = ["--stdio"]
            file_extensions = ["ts"]

            [servers.pyright]
            command = "pyright-langserver"
            file_extensions = ["py"]
            "#,
        )
        .unwrap();
        let provider = ConfigProvider::new(&config);
        assert_eq!(names(&provider), ["tailwindcss", "pyright", "ts-ls"]);
        let ts = provider
            .descriptors()
            .into_iter()
            .find(|d| d.name() == TYPESCRIPT)
            .unwrap();
        assert_eq!(ts.command(), "vtsls");
    }
}
