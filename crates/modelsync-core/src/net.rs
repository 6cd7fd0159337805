use reqwest::blocking::Client;

use crate::config::{EnvSnapshot, HttpSettings};

const PROXY_KEYS: &[&str] = &[
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
];

/// Decide whether requests should honor standard proxy environment variables.
///
/// Behavior:
/// - `MODELSYNC_KEEP_PROXIES=1/true/yes/on` forces proxies on.
/// - `MODELSYNC_KEEP_PROXIES=0/false/no/off/""` forces proxies off.
/// - If unset, proxies are enabled only when at least one proxy env var is set.
pub(crate) fn keep_proxies(snapshot: &EnvSnapshot) -> bool {
    snapshot.toggle("MODELSYNC_KEEP_PROXIES").unwrap_or_else(|| {
        PROXY_KEYS.iter().any(|key| {
            snapshot
                .var(key)
                .is_some_and(|value| !value.trim().is_empty())
        })
    })
}

/// Build a blocking client; [`crate::http_clients`] shares one between the
/// catalog and the transfer executor.
pub(crate) fn build_client(settings: &HttpSettings) -> reqwest::Result<Client> {
    let mut builder = Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(settings.timeout);
    if !settings.keep_proxies {
        builder = builder.no_proxy();
    }
    builder.build()
}
