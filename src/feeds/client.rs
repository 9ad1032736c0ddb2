use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::records::CveRecord;
use super::{CvePage, DomainLookup, FeedEnvelope, FeedKind};

pub const MAX_CVE_PAGE_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid feed base URL: {url}")]
    InvalidBaseUrl { url: String },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode feed from {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read feed file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid page request: page {page}, page_size {page_size} (page >= 1, page_size 1..=1000)")]
    InvalidPageRequest { page: usize, page_size: usize },
}

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_seconds: 10,
            user_agent: concat!("menaxa/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Query for the server-paginated `/get-cves` endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CveQuery {
    pub year: Option<i32>,
    pub page: usize,
    pub page_size: usize,
}

impl Default for CveQuery {
    fn default() -> Self {
        Self {
            year: None,
            page: 1,
            page_size: 100,
        }
    }
}

impl CveQuery {
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.page == 0 || self.page_size == 0 || self.page_size > MAX_CVE_PAGE_SIZE {
            return Err(FeedError::InvalidPageRequest {
                page: self.page,
                page_size: self.page_size,
            });
        }
        Ok(())
    }
}

/// Feeds arrive either enveloped or, in older snapshots, as a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedBody<T> {
    List(Vec<T>),
    Envelope(FeedEnvelope<T>),
}

pub fn decode_envelope<T: DeserializeOwned>(
    bytes: &[u8],
    origin: &str,
) -> Result<FeedEnvelope<T>, FeedError> {
    let body: FeedBody<T> = serde_json::from_slice(bytes).map_err(|e| FeedError::Decode {
        origin: origin.to_string(),
        source: e,
    })?;
    Ok(match body {
        FeedBody::List(data) => FeedEnvelope {
            last_updated: None,
            total_records: Some(data.len()),
            data,
        },
        FeedBody::Envelope(envelope) => envelope,
    })
}

pub async fn read_feed_file<T: DeserializeOwned>(path: &str) -> Result<FeedEnvelope<T>, FeedError> {
    let path = crate::config::expand_tilde_string(path);
    let bytes = tokio::fs::read(Path::new(&path))
        .await
        .map_err(|e| FeedError::FileRead {
            path: path.clone(),
            source: e,
        })?;
    decode_envelope(&bytes, &path)
}

/// Outcome of one feed load as a view consumes it: on failure the records are
/// empty and `error` carries the message for an inline retry prompt.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedLoad<T> {
    pub records: Vec<T>,
    pub last_updated: Option<String>,
    pub error: Option<String>,
}

impl<T> FeedLoad<T> {
    pub fn from_result(feed: FeedKind, result: Result<FeedEnvelope<T>, FeedError>) -> Self {
        match result {
            Ok(envelope) => Self {
                records: envelope.data,
                last_updated: envelope.last_updated,
                error: None,
            },
            Err(e) => {
                warn!(feed = %feed, error = %e, "feed load failed, showing an empty table");
                Self {
                    records: Vec::new(),
                    last_updated: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct FeedClient {
    http: reqwest::Client,
    base_url: String,
}

impl FeedClient {
    pub fn new(options: &ClientOptions) -> Result<Self, FeedError> {
        let base_url = options.base_url.trim().trim_end_matches('/').to_string();
        if reqwest::Url::parse(&base_url).is_err() {
            return Err(FeedError::InvalidBaseUrl {
                url: options.base_url.clone(),
            });
        }
        let http = reqwest::Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(Duration::from_secs(options.timeout_seconds.max(1)))
            .build()
            .map_err(|e| FeedError::HttpClientBuild { source: e })?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn get_bytes(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>, FeedError> {
        debug!(%url, ?query, "fetching feed");
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FeedError::Request {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(|e| FeedError::Request {
            url: url.to_string(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }

    /// Fetches one client-paginated feed.
    pub async fn fetch_feed<T: DeserializeOwned>(
        &self,
        feed: FeedKind,
    ) -> Result<FeedEnvelope<T>, FeedError> {
        let url = self.url_for(feed.endpoint());
        let bytes = self.get_bytes(&url, &[]).await?;
        decode_envelope(&bytes, &url)
    }

    /// Fetches a feed from a full URL, e.g. a year snapshot behind the proxy.
    pub async fn fetch_url<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<FeedEnvelope<T>, FeedError> {
        let bytes = self.get_bytes(url, &[]).await?;
        decode_envelope(&bytes, url)
    }

    pub async fn fetch_cves(&self, query: &CveQuery) -> Result<CvePage<CveRecord>, FeedError> {
        query.validate()?;
        let url = self.url_for(FeedKind::Cves.endpoint());
        let mut params = vec![
            ("page", query.page.to_string()),
            ("page_size", query.page_size.to_string()),
        ];
        if let Some(year) = query.year {
            params.push(("year", year.to_string()));
        }
        let bytes = self.get_bytes(&url, &params).await?;
        serde_json::from_slice(&bytes).map_err(|e| FeedError::Decode {
            origin: url,
            source: e,
        })
    }

    pub async fn lookup_domain(&self, domain: &str) -> Result<DomainLookup, FeedError> {
        let url = self.url_for("/search");
        let bytes = self
            .get_bytes(&url, &[("domain", domain.trim().to_string())])
            .await?;
        serde_json::from_slice(&bytes).map_err(|e| FeedError::Decode {
            origin: url,
            source: e,
        })
    }
}
