pub mod gitter;
pub mod stream;

use crate::config::HttpConfig;
use anyhow::{Context, Result};
use std::time::Duration;

/// Build the HTTP client shared by the room directory and every room listener.
///
/// Only the connect phase is bounded; room streams stay open for as long as
/// the process runs.
pub fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(5)
        .user_agent(concat!("roomwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

/// Join a base URL and a path without doubling the slash
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
