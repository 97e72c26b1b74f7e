use crate::location::{LocationPatch, LocationRecord, TrackedEntity};
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;

/// HTTP settings for the snapshot/command API.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the tracking API
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "http://localhost:8080/api/tracking".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// Client for the tracking HTTP API: snapshot reads and fire-and-forget
/// position reports. Alternate ingestion/egress path that bypasses the
/// socket but writes through the same entity store.
pub struct TrackingApi {
    http_client: Client,
    base_url: String,
}

impl TrackingApi {
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_base_url(config.base_url.clone())
    }

    /// Create a client with an explicit base URL (for testing with a mock
    /// server).
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// GET {base}/locations — current locations of all tracked entities.
    pub async fn get_locations(&self) -> Result<Vec<LocationRecord>> {
        let url = format!("{}/locations", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Failed to request locations")?;

        if !response.status().is_success() {
            return Err(anyhow!("GET /locations returned {}", response.status()));
        }

        response
            .json::<Vec<LocationRecord>>()
            .await
            .context("Failed to parse locations response")
    }

    /// GET {base}/entities — metadata for all tracked entities.
    pub async fn get_entities(&self) -> Result<Vec<TrackedEntity>> {
        let url = format!("{}/entities", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Failed to request entities")?;

        if !response.status().is_success() {
            return Err(anyhow!("GET /entities returned {}", response.status()));
        }

        response
            .json::<Vec<TrackedEntity>>()
            .await
            .context("Failed to parse entities response")
    }

    /// POST {base}/update — report this client's own position. Rejects an
    /// out-of-bounds coordinate before anything hits the wire.
    pub async fn post_update(&self, patch: &LocationPatch) -> Result<()> {
        if !patch.coordinates_valid() {
            return Err(anyhow!(
                "patch for {} carries coordinates outside WGS84 bounds",
                patch.entity_id
            ));
        }

        let url = format!("{}/update", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(patch)
            .send()
            .await
            .context("Failed to post location update")?;

        if !response.status().is_success() {
            return Err(anyhow!("POST /update returned {}", response.status()));
        }

        Ok(())
    }
}
