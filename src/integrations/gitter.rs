//! Gitter REST API: room discovery and the current user.

use crate::config::GitterConfig;
use crate::data::{Room, User};
use crate::integrations::join_url;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Where the rooms to monitor and the acting account come from
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Every room the account has joined
    async fn list_rooms(&self) -> Result<Vec<Room>>;

    /// The account the API token belongs to
    async fn current_user(&self) -> Result<User>;
}

pub struct GitterClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitterClient {
    pub fn new(http: reqwest::Client, config: &GitterConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            token: config.token.clone(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = join_url(&self.api_url, path);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to reach Gitter API at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gitter API returned {} for {}: {}", status, path, body.trim());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse Gitter response from {}", path))
    }
}

#[async_trait]
impl RoomDirectory for GitterClient {
    async fn list_rooms(&self) -> Result<Vec<Room>> {
        self.get_json("v1/rooms").await
    }

    async fn current_user(&self) -> Result<User> {
        let users: Vec<User> = self.get_json("v1/user").await?;
        users
            .into_iter()
            .next()
            .context("Gitter API returned no current user")
    }
}
