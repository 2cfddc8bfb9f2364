//! Remote Bucket Client — the backend's bucket-management API.
//!
//! Pure transport: create/get/delete/list against the JSON control plane,
//! with failures mapped through `error::map_control_plane`. All calls take
//! the backend-side bucket name; gateway-facing identity never crosses
//! this boundary.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::errors::GatewayResult;
use crate::remote::{authorize, error::map_control_plane};

/// A bucket as the control plane reports it.
#[derive(Debug, Deserialize)]
pub struct RemoteBucket {
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ListBucketsBody {
    #[serde(default)]
    buckets: Vec<RemoteBucket>,
}

#[derive(Clone)]
pub struct RemoteBucketClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RemoteBucketClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/v1/buckets{}", self.base_url, suffix)
    }

    pub async fn create_bucket(&self, backend_name: &str) -> GatewayResult<RemoteBucket> {
        let req = self.http.post(self.url("")).json(&json!({ "name": backend_name }));
        let resp = authorize(req, &self.token).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(map_control_plane(status, &resp.text().await.unwrap_or_default()));
        }
        let bucket = resp.json::<RemoteBucket>().await?;
        debug!(
            "created backend bucket {} (created_at {:?})",
            bucket.name, bucket.created_at
        );
        Ok(bucket)
    }

    pub async fn get_bucket(&self, backend_name: &str) -> GatewayResult<RemoteBucket> {
        let req = self.http.get(self.url(&format!("/{}", backend_name)));
        let resp = authorize(req, &self.token).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(map_control_plane(status, &resp.text().await.unwrap_or_default()));
        }
        Ok(resp.json::<RemoteBucket>().await?)
    }

    pub async fn delete_bucket(&self, backend_name: &str) -> GatewayResult<()> {
        let req = self.http.delete(self.url(&format!("/{}", backend_name)));
        let resp = authorize(req, &self.token).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(map_control_plane(status, &resp.text().await.unwrap_or_default()));
        }
        debug!("deleted backend bucket {}", backend_name);
        Ok(())
    }

    pub async fn list_buckets(&self) -> GatewayResult<Vec<RemoteBucket>> {
        let req = self.http.get(self.url(""));
        let resp = authorize(req, &self.token).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(map_control_plane(status, &resp.text().await.unwrap_or_default()));
        }
        Ok(resp.json::<ListBucketsBody>().await?.buckets)
    }
}
