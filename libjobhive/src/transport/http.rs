//! `reqwest`-backed transport

use async_trait::async_trait;
use reqwest::Url;

use super::{ApiRequest, ApiResponse, Method, Transport};
use crate::config::ApiConfig;
use crate::error::{ApiError, ConfigError, Result};

/// Sends requests to the configured API base URL
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Build a transport from the API configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `base_url` is not an absolute
    /// http(s) URL, or if the HTTP client cannot be built (for example when
    /// the TLS backend fails to initialize).
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "api.base_url".to_string(),
                message: format!("'{}' is not an absolute URL", config.base_url),
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("jobhive/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "api".to_string(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, base_url })
    }

    /// Base URL plus the request's segments, each percent-encoded
    fn url(&self, request: &ApiRequest) -> std::result::Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport(format!("cannot append a path to {}", self.base_url)))?
            .pop_if_empty()
            .extend(&request.segments);
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> std::result::Result<ApiResponse, ApiError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
        };
        let url = self.url(&request)?;

        let mut builder = self.client.request(method, url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!("{} {}", request.method, request.path);

        let response = builder.send().await.map_err(|e| {
            tracing::debug!("{} {} failed: {}", request.method, request.path, e);
            ApiError::Transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(format!("failed to read response body: {}", e)))?;

        tracing::debug!("{} {} -> {}", request.method, request.path, status);
        Ok(ApiResponse { status, body })
    }
}
