//! Remote statistics pages.
//!
//! A single blocking GET per call: no retries, no redirects beyond what the
//! client does by default. Any failure, including a timeout, comes back as a
//! [`FetchError`] for the resolver to downgrade into a warning.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use tracing::debug;

use crate::error::{AppError, FetchError};

const USER_AGENT: &str = concat!("esg-bonds/", env!("CARGO_PKG_VERSION"));

/// Body of a successful fetch.
#[derive(Debug, Clone)]
pub struct RemoteDocument {
    pub url: String,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

/// Anything that can fetch a document by URL.
pub trait RemoteSource {
    fn fetch(&self, url: &str) -> Result<RemoteDocument, FetchError>;
}

pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::new(4, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl RemoteSource for HttpSource {
    fn fetch(&self, url: &str) -> Result<RemoteDocument, FetchError> {
        debug!(url, "fetching remote document");

        let resp = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        if body.trim().is_empty() {
            return Err(FetchError::Body {
                url: url.to_string(),
                message: "empty response body".to_string(),
            });
        }

        Ok(RemoteDocument {
            url: url.to_string(),
            body,
            fetched_at: Utc::now(),
        })
    }
}
