use std::time::Duration;

use anyhow::{Context, Result};
use autoapp_core::AppError;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::debug;

use crate::IndexConfig;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of simple-index listing pages.
pub trait PackageIndex {
    fn index_url(&self) -> &str;

    /// The listing page for `name`. Unknown packages fail with
    /// [`AppError::NotFound`].
    fn listing(&self, name: &str) -> Result<String>;

    fn package_url(&self, name: &str) -> String {
        format!("{}{}/", self.index_url(), name)
    }
}

#[derive(Debug)]
pub struct HttpIndex {
    config: IndexConfig,
    client: Client,
}

impl HttpIndex {
    pub fn new(config: IndexConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("autoapp/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build index http client")?;
        Ok(Self { config, client })
    }
}

impl PackageIndex for HttpIndex {
    fn index_url(&self) -> &str {
        &self.config.url
    }

    fn listing(&self, name: &str) -> Result<String> {
        let url = self.package_url(name);
        debug!("fetching {url}");

        let mut request = self.client.get(&url);
        if let Some(auth) = &self.config.auth {
            request = request.basic_auth(&auth.username, auth.password.as_deref());
        }

        let response = request
            .send()
            .with_context(|| format!("Failed to read from {url}"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound {
                name: name.to_string(),
                index_url: self.config.url.clone(),
            }
            .into());
        }

        let response = response
            .error_for_status()
            .with_context(|| format!("Failed to read from {url}"))?;
        response
            .text()
            .with_context(|| format!("Failed to read listing body from {url}"))
    }
}
