use std::collections::HashMap;
use std::env;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use time::UtcOffset;

use crate::net;
use crate::snapshot;

pub const DEFAULT_API_BASE: &str = "https://civitai.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const USER_AGENT: &str = concat!("modelsync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// `None` when unset, otherwise whether the value reads as enabled.
    pub(crate) fn toggle(&self, key: &str) -> Option<bool> {
        self.var(key).map(|raw| {
            let value = raw.trim().to_ascii_lowercase();
            !matches!(value.as_str(), "" | "0" | "false" | "no" | "off")
        })
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// How the HTTP client used for catalog and asset requests is built.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub keep_proxies: bool,
    pub progress: bool,
}

impl HttpSettings {
    /// Settings for this process: proxy policy from `MODELSYNC_KEEP_PROXIES`
    /// and the standard proxy variables, progress from `MODELSYNC_PROGRESS`
    /// or whether stderr is a terminal.
    pub fn from_env(timeout: Duration) -> Self {
        Self::from_snapshot(&EnvSnapshot::capture(), timeout)
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot, timeout: Duration) -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            timeout,
            keep_proxies: net::keep_proxies(snapshot),
            progress: snapshot
                .toggle("MODELSYNC_PROGRESS")
                .unwrap_or_else(|| io::stderr().is_terminal()),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            keep_proxies: false,
            progress: false,
        }
    }
}

/// What the engine may do with `.inc` and `.invalid` marker files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerPolicy {
    /// Delete a leftover `.inc` marker before renaming a new incomplete file
    /// onto it. When disabled a leftover marker aborts the run.
    pub remove_stale_incomplete: bool,
    /// Write `{file}.invalid` next to a file whose digest did not match.
    pub write_invalid: bool,
}

impl Default for MarkerPolicy {
    fn default() -> Self {
        Self {
            remove_stale_incomplete: true,
            write_invalid: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub root: PathBuf,
    pub api_base: String,
    pub dry_run: bool,
    pub allow_unsafe: bool,
    pub markers: MarkerPolicy,
    pub http: HttpSettings,
    /// Offset used to stamp archived snapshots, read once at startup.
    pub archive_offset: UtcOffset,
}

impl SyncConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            dry_run: false,
            allow_unsafe: false,
            markers: MarkerPolicy::default(),
            http: HttpSettings::default(),
            archive_offset: snapshot::local_offset(),
        }
    }
}
