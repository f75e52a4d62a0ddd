//! Thin HTTP client over the two endpoints the catalog consumes: a
//! tree-listing endpoint and a raw-content endpoint, addressed by path.

use reqwest::Client as ReqwestClient;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::error::CatalogError;

/// Client for the remote community dump catalog.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    tree_endpoint: Url,
    raw_base: Url,
    reqwest_client: ReqwestClient,
}

impl CatalogClient {
    /// Build a client from a tree-listing endpoint and a raw-content base
    /// URL that a dump's path is appended to.
    pub fn new(tree_endpoint: &str, raw_base: &str) -> Result<Self, CatalogError> {
        Ok(Self {
            tree_endpoint: Url::parse(tree_endpoint)
                .map_err(|err| CatalogError::malformed_response(format!("invalid tree endpoint: {err}")))?,
            raw_base: Url::parse(raw_base)
                .map_err(|err| CatalogError::malformed_response(format!("invalid raw base: {err}")))?,
            reqwest_client: ReqwestClient::builder()
                .build()
                .map_err(CatalogError::remote_fetch_failed)?,
        })
    }

    /// Fetch the full recursive tree listing and return the raw `path`
    /// strings of every entry.
    pub async fn fetch_tree_paths(&self) -> Result<Vec<String>, CatalogError> {
        debug!(url = %self.tree_endpoint, "catalog: fetching remote tree listing");
        let resp = self
            .reqwest_client
            .get(self.tree_endpoint.clone())
            .send()
            .await?
            .error_for_status()?;
        let body: Value = resp.json().await?;
        let entries = body
            .get("tree")
            .and_then(Value::as_array)
            .ok_or_else(|| CatalogError::malformed_response("tree listing response had no `tree` array"))?;
        Ok(entries
            .iter()
            .filter_map(|entry| entry.get("path").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Fetch the raw bytes of one dump, addressed by its repository path.
    pub async fn fetch_raw(&self, path: &str) -> Result<Vec<u8>, CatalogError> {
        let url = self
            .raw_base
            .join(path)
            .map_err(|err| CatalogError::malformed_response(format!("cannot join raw path {path:?}: {err}")))?;
        debug!(%url, "catalog: fetching raw dump");
        let resp = self.reqwest_client.get(url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}
