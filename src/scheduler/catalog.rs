//! Propagation of derived system health to the system catalog
//!
//! The hub is not the source of truth for systems; it only pushes the
//! reduced status of each system to an external catalog service.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::HealthStatus;

/// Receiver of aggregate system statuses
#[async_trait]
pub trait SystemCatalog: Send + Sync {
    async fn update_system_status(&self, system_id: &str, status: HealthStatus) -> Result<()>;
}

/// Catalog used when none is configured; only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCatalog;

#[async_trait]
impl SystemCatalog for NullCatalog {
    async fn update_system_status(&self, system_id: &str, status: HealthStatus) -> Result<()> {
        debug!(system_id, %status, "no catalog configured, dropping status update");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusUpdate {
    status: HealthStatus,
}

/// Catalog reached over HTTP: `PUT {base}/api/v1/systems/{id}/status`
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build catalog HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn status_url(&self, system_id: &str) -> String {
        format!("{}/api/v1/systems/{}/status", self.base_url, system_id)
    }
}

#[async_trait]
impl SystemCatalog for HttpCatalog {
    #[instrument(skip(self))]
    async fn update_system_status(&self, system_id: &str, status: HealthStatus) -> Result<()> {
        let mut request = self
            .client
            .put(self.status_url(system_id))
            .json(&StatusUpdate { status });

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("failed to reach catalog for system '{system_id}'"))?;

        if !response.status().is_success() {
            bail!(
                "catalog rejected status update for '{}': HTTP {}",
                system_id,
                response.status()
            );
        }

        info!(system_id, %status, "system status propagated");
        Ok(())
    }
}
