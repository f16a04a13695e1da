//! File logging with a reloadable level.
//!
//! stdout carries the editor protocol, so logs only ever go to a file. When
//! no candidate file can be opened the bridge runs without logs.

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::{env, process};

use anyhow::Context;
use rocks_config::LogConfig;
use rocks_engine::LogControl;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

const TRACE: &str = "trace";

pub struct Logging {
    handle: reload::Handle<EnvFilter, Registry>,
    /// Directive restored when tracing is switched off.
    base: String,
    tracing: AtomicBool,
    file: Option<PathBuf>,
}

impl Logging {
    /// Install the global subscriber. `RUST_LOG` wins over the configured level.
    pub fn init(config: &LogConfig) -> Self {
        let base = env::var(EnvFilter::DEFAULT_ENV)
            .ok()
            .filter(|directive| !directive.trim().is_empty())
            .unwrap_or_else(|| config.level.clone());
        let filter = EnvFilter::try_new(&base).unwrap_or_else(|_| EnvFilter::new("info"));
        let (filter, handle) = reload::Layer::new(filter);

        let (log_file, init_warnings) = open_log_file(config);
        let file = match log_file {
            Some((path, file)) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                    .init();
                tracing::info!(path = %path.display(), "Logging initialized");
                Some(path)
            }
            None => {
                tracing_subscriber::registry().with(filter).init();
                None
            }
        };
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }

        Self {
            handle,
            base,
            tracing: AtomicBool::new(false),
            file,
        }
    }
}

impl LogControl for Logging {
    fn toggle_trace(&self) -> anyhow::Result<bool> {
        let enable = !self.tracing.load(Ordering::SeqCst);
        let directive = if enable { TRACE } else { self.base.as_str() };
        let filter = EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log directive `{directive}`"))?;
        self.handle
            .reload(filter)
            .context("failed to reload the log filter")?;
        self.tracing.store(enable, Ordering::SeqCst);
        tracing::info!(tracing = enable, "Log level changed");
        Ok(enable)
    }

    fn log_file(&self) -> Option<PathBuf> {
        self.file.clone()
    }
}

fn open_log_file(config: &LogConfig) -> (Option<(PathBuf, File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates(config) {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates(config: &LogConfig) -> Vec<PathBuf> {
    let name = format!("lsp-rocks-{}.log", process::id());
    let mut candidates = Vec::new();

    if let Some(file) = &config.file {
        candidates.push(file.clone());
    }
    if let Some(cache) = dirs::cache_dir() {
        candidates.push(cache.join("lsp-rocks").join("logs").join(&name));
    }
    candidates.push(env::temp_dir().join(name));

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_file_comes_first() {
        let config = LogConfig {
            level: "debug".into(),
            file: Some(PathBuf::from("/var/log/rocks.log")),
        };
        let candidates = log_file_candidates(&config);
        assert_eq!(candidates[0], PathBuf::from("/var/log/rocks.log"));
        let last = candidates.last().unwrap();
        assert!(last.starts_with(env::temp_dir()));
        assert!(
            last.file_name()
                .unwrap()
                .to_string_lossy()
                .contains(&process::id().to_string())
        );
    }

    #[test]
    fn unwritable_candidates_fall_through() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let config = LogConfig {
            level: "info".into(),
            file: Some(blocker.join("rocks.log")),
        };

        let (opened, warnings) = open_log_file(&config);
        let (path, _) = opened.unwrap();
        assert_ne!(path, blocker.join("rocks.log"));
        assert!(warnings[0].contains("not-a-dir"));
    }
}
