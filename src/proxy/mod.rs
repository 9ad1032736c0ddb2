//! Edge proxy for year-keyed CVE snapshots.
//!
//! ```text
//! GET /{YYYY}.json
//!   Header: x-upstream-token (only when a token is configured)
//!   Forwards to: {origin_base_url}/{YYYY}.json
//! ```
//!
//! Responses drop `set-cookie` and carry `Cache-Control: public, max-age=300`.
//! Status mapping: 404 for any other path or method, 500 when no origin is
//! configured, 401 for a missing or wrong token, the upstream status when the
//! origin answers, 502 when it cannot be reached.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use regex::Regex;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const TOKEN_HEADER: &str = "x-upstream-token";
pub const CACHE_POLICY: &str = "public, max-age=300";
pub const ORIGIN_ENV: &str = "ORIGIN_BASE_URL";
pub const TOKEN_ENV: &str = "UPSTREAM_PROXY_TOKEN";

static YEAR_PATH_RE: OnceLock<Regex> = OnceLock::new();

fn year_path_re() -> &'static Regex {
    YEAR_PATH_RE.get_or_init(|| Regex::new(r"^/\d{4}\.json$").expect("year path pattern"))
}

pub fn is_year_path(path: &str) -> bool {
    year_path_re().is_match(path)
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("not found")]
    NotFound,

    #[error("origin is not configured")]
    NotConfigured,

    #[error("unauthorized")]
    Unauthorized,

    #[error("upstream {url} unreachable: {message}")]
    Unreachable { url: String, message: String },

    #[error("invalid listen address '{addr}': {source}")]
    InvalidListen {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to build upstream client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("server error: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Unreachable { .. } => StatusCode::BAD_GATEWAY,
            Self::NotConfigured
            | Self::InvalidListen { .. }
            | Self::HttpClientBuild { .. }
            | Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    pub origin_base_url: Option<String>,
    pub upstream_token: Option<String>,
    pub listen: String,
    pub timeout_seconds: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            origin_base_url: None,
            upstream_token: None,
            listen: "127.0.0.1:8787".to_string(),
            timeout_seconds: 30,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ProxyConfig {
    /// Environment variables win over whatever the config file set.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(origin) = non_empty(lookup(ORIGIN_ENV)) {
            self.origin_base_url = Some(origin);
        }
        if let Some(token) = non_empty(lookup(TOKEN_ENV)) {
            self.upstream_token = Some(token);
        }
        self
    }

    pub fn from_env(self) -> Self {
        self.with_env_overrides(|key| std::env::var(key).ok())
    }

    fn origin(&self) -> Option<&str> {
        self.origin_base_url
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
    }

    fn token(&self) -> Option<&str> {
        self.upstream_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Origin fetcher; the HTTP implementation is [`HttpUpstream`].
pub trait Upstream: Clone + Send + Sync + 'static {
    fn fetch(&self, url: String) -> impl Future<Output = Result<UpstreamResponse, ProxyError>> + Send;
}

#[derive(Clone, Debug)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout_seconds: u64) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds.max(1)))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ProxyError::HttpClientBuild { source: e })?;
        Ok(Self { client })
    }
}

impl Upstream for HttpUpstream {
    async fn fetch(&self, url: String) -> Result<UpstreamResponse, ProxyError> {
        let unreachable = |e: reqwest::Error| ProxyError::Unreachable {
            url: url.clone(),
            message: e.to_string(),
        };
        let response = self.client.get(&url).send().await.map_err(unreachable)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.bytes().await.map_err(unreachable)?.to_vec();
        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

#[derive(Clone)]
struct ProxyState<U> {
    config: Arc<ProxyConfig>,
    upstream: U,
}

fn is_hop_header(name: &str) -> bool {
    matches!(
        name,
        "connection" | "keep-alive" | "transfer-encoding" | "content-length" | "upgrade" | "te"
    )
}

async fn forward<U: Upstream>(
    State(state): State<ProxyState<U>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let path = uri.path();
    if method != Method::GET || !is_year_path(path) {
        return Err(ProxyError::NotFound);
    }
    let origin = state.config.origin().ok_or(ProxyError::NotConfigured)?;
    if let Some(expected) = state.config.token() {
        let presented = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            debug!(%path, "rejecting request with a bad upstream token");
            return Err(ProxyError::Unauthorized);
        }
    }

    let url = format!("{}/{}", origin.trim_end_matches('/'), path.trim_start_matches('/'));
    let upstream = state.upstream.fetch(url.clone()).await.map_err(|e| {
        warn!(%url, error = %e, "upstream fetch failed");
        e
    })?;

    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    if !status.is_success() {
        info!(%url, status = upstream.status, "upstream answered with an error status");
    }
    let mut out = HeaderMap::new();
    for (name, value) in upstream.headers.iter() {
        let lowered = name.to_ascii_lowercase();
        if lowered == SET_COOKIE.as_str()
            || lowered == CACHE_CONTROL.as_str()
            || is_hop_header(&lowered)
        {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(lowered.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            out.append(name, value);
        }
    }
    out.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_POLICY));
    Ok((status, out, upstream.body).into_response())
}

pub fn router<U: Upstream>(config: ProxyConfig, upstream: U) -> Router {
    let state = ProxyState {
        config: Arc::new(config),
        upstream,
    };
    Router::new()
        .fallback(forward::<U>)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(config: ProxyConfig) -> Result<(), ProxyError> {
    let addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|e| ProxyError::InvalidListen {
            addr: config.listen.clone(),
            source: e,
        })?;
    if config.origin().is_none() {
        warn!("no origin configured; every request will answer 500");
    }
    let upstream = HttpUpstream::new(config.timeout_seconds)?;
    let app = router(config, upstream);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ProxyError::Io { source: e })?;
    info!("proxy listening on {}", addr);
    axum::serve(listener, app)
        .await
        .map_err(|e| ProxyError::Io { source: e })
}
