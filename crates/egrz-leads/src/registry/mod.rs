//! Client of the ЕГРЗ open data registry.
mod filter;
mod model;
mod parsing;

pub(crate) use model::*;

use crate::http::HttpClientError;
use crate::prelude::*;
use crate::regions::RegionLabel;
use crate::util::retry::{retry, FixedDelay};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct Config {
    #[serde(default = "default_base_url")]
    pub(crate) base_url: url::Url,

    #[serde(default = "default_page_size")]
    pub(crate) page_size: u32,

    /// The registry server still speaks old TLS versions and needs unsafe
    /// legacy renegotiation. The latter is enabled via `OPENSSL_CONF` of the
    /// deployment, we only switch to the native TLS backend here.
    #[serde(default = "default_legacy_tls")]
    pub(crate) legacy_tls: bool,

    #[serde(default = "default_retry_attempts")]
    pub(crate) retry_attempts: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub(crate) retry_delay_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub(crate) timeout_secs: u64,
}

fn default_base_url() -> url::Url {
    "https://open-api.egrz.ru"
        .parse()
        .expect("BUG: invalid default registry URL")
}

fn default_page_size() -> u32 {
    1000
}

fn default_legacy_tls() -> bool {
    true
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RegistryError {
    #[error("Registry is unreachable after all retries")]
    TransientFetch { source: HttpClientError },

    #[error("Registry responded with an error")]
    BadStatus { source: HttpClientError },

    #[error("Failed to parse the registry export: {message}")]
    Parse { message: String },
}

/// Source of raw registry records for a region and a calendar day.
#[async_trait]
pub(crate) trait RegistrySource: Send + Sync {
    async fn fetch(&self, region: &RegionLabel, date: NaiveDate) -> Result<Vec<RawRecord>>;
}

pub(crate) struct Client {
    http: crate::http::Client,
    endpoint: url::Url,
    page_size: u32,
    retry_policy: FixedDelay,
}

impl Client {
    pub(crate) fn new(config: Config) -> Result<Self> {
        let mut builder =
            crate::http::base_client_builder().timeout(Duration::from_secs(config.timeout_secs));

        if config.legacy_tls {
            builder = builder
                .use_native_tls()
                .min_tls_version(reqwest::tls::Version::TLS_1_0);
        }

        let base = builder
            .build()
            .fatal_ctx(|| "Failed to build the registry HTTP client")?;

        let endpoint = config
            .base_url
            .join("/api/PublicRegistrationBook/openDataFile")
            .fatal_ctx(|| format!("Invalid registry base URL: {}", config.base_url))?;

        Ok(Self {
            http: crate::http::create_client_without_retries(base),
            endpoint,
            page_size: config.page_size,
            retry_policy: FixedDelay {
                attempts: config.retry_attempts.max(1),
                delay: Duration::from_secs(config.retry_delay_secs),
            },
        })
    }

    async fn download(&self, filter: &str) -> Result<String, HttpClientError> {
        let page_size = self.page_size.to_string();
        self.http
            .get(self.endpoint.clone())
            .query(&[
                ("$filter", filter),
                ("$top", page_size.as_str()),
                ("fileType", "csv"),
            ])
            .read_text()
            .await
    }
}

fn is_transient(err: &HttpClientError) -> bool {
    match err {
        HttpClientError::BadResponseStatusCode { status, .. } => status.is_server_error(),
        _ => err.is_transient_network(),
    }
}

#[async_trait]
impl RegistrySource for Client {
    #[instrument(skip_all, fields(region = %region, %date))]
    async fn fetch(&self, region: &RegionLabel, date: NaiveDate) -> Result<Vec<RawRecord>> {
        let filter = filter::region_day_filter(region, date);

        let payload = retry(&self.retry_policy, || self.download(&filter), is_transient)
            .with_duration_log("Downloaded the registry export")
            .await
            .map_err(|source| {
                if is_transient(&source) {
                    RegistryError::TransientFetch { source }
                } else {
                    RegistryError::BadStatus { source }
                }
            })?;

        let records = parsing::parse_export(&payload)?;

        debug!(records = records.len(), "Fetched registry records");

        Ok(records)
    }
}
