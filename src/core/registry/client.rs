use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::models::{Project, SearchResults, VersionRecord};
use crate::core::error::{PackError, PackResult};
use crate::core::http::get_with_retry;

pub const MODRINTH_API_BASE: &str = "https://api.modrinth.com/v2";

/// Registry endpoint configuration, constructed by the caller and
/// passed in explicitly — there is no process-wide client state.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub base_url: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: MODRINTH_API_BASE.to_string(),
        }
    }
}

/// Read-only façade over the registry endpoints the core needs.
///
/// A trait seam so the resolver can run against an in-memory registry
/// in tests. The real implementation is [`ModrinthClient`].
#[async_trait]
pub trait Registry: Send + Sync {
    /// Ranked candidate hits for a free-form query, pre-filtered by
    /// game version and loader.
    async fn search(
        &self,
        query: &str,
        game_version: &str,
        loader: &str,
        limit: u32,
    ) -> PackResult<SearchResults>;

    /// Full project record by id or slug.
    async fn project(&self, id_or_slug: &str) -> PackResult<Project>;

    /// Versions of a project compatible with the game version and loader.
    async fn versions(
        &self,
        id_or_slug: &str,
        game_version: &str,
        loader: &str,
    ) -> PackResult<Vec<VersionRecord>>;
}

/// Stateless HTTP façade over the Modrinth v2 API. Pure
/// request/response; no resolution logic lives here.
pub struct ModrinthClient {
    client: Client,
    config: RegistryConfig,
}

impl ModrinthClient {
    /// The session is owned by the caller and lent to this façade.
    pub fn new(client: Client, config: RegistryConfig) -> Self {
        Self { client, config }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> PackResult<T> {
        debug!("GET {}", url);
        let response = get_with_retry(&self.client, url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PackError::RegistryStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl Registry for ModrinthClient {
    async fn search(
        &self,
        query: &str,
        game_version: &str,
        loader: &str,
        limit: u32,
    ) -> PackResult<SearchResults> {
        let facets = format!(
            r#"[["versions:{game_version}"],["categories:{loader}"],["project_type:mod"]]"#
        );
        let url = format!(
            "{}/search?query={}&facets={}&limit={}",
            self.config.base_url,
            query.replace(' ', "+"),
            facets,
            limit
        );
        self.get_json(&url).await
    }

    async fn project(&self, id_or_slug: &str) -> PackResult<Project> {
        let url = format!("{}/project/{}", self.config.base_url, id_or_slug);
        self.get_json(&url).await
    }

    async fn versions(
        &self,
        id_or_slug: &str,
        game_version: &str,
        loader: &str,
    ) -> PackResult<Vec<VersionRecord>> {
        let url = format!(
            r#"{}/project/{}/version?game_versions=["{}"]&loaders=["{}"]"#,
            self.config.base_url, id_or_slug, game_version, loader
        );
        self.get_json(&url).await
    }
}
