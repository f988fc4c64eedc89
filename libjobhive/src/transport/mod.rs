//! HTTP seam between the client core and the JobHive backend
//!
//! Everything that talks to the network goes through the `Transport` trait
//! so the stores and queries can be exercised against `mock::MockTransport`
//! in tests and against `http::HttpTransport` in the apps.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::error::{ApiError, DecodeError};
use crate::token_store::TOKEN_KEY;

pub mod http;

// Public so integration tests can script backend responses
pub mod mock;

/// HTTP methods used by the JobHive API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request relative to the configured API base URL
///
/// `path` is the unencoded form used for logging and mock routing. The
/// wire URL is built from `segments`, each percent-encoded on its own, so
/// an id containing `/` or `?` stays inside its segment.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path starting with `/`, without query string
    pub path: String,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Request for a fixed path such as `/companies/top-hiring-companies`
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let segments = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            method,
            path,
            segments,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    /// Append one path segment taken from data (an id), encoded on the wire
    pub fn segment(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        self.path = format!("{}/{}", self.path.trim_end_matches('/'), value);
        self.segments.push(value);
        self
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach the bearer token as `x-auth-token: Bearer {token}`
    pub fn bearer(mut self, token: &SecretString) -> Self {
        self.headers.push((
            TOKEN_KEY.to_string(),
            format!("Bearer {}", token.expose_secret()),
        ));
        self
    }

    /// Value of a header, for inspection in tests and logging decisions
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status code and raw body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode a successful response body into `T`
    ///
    /// # Errors
    ///
    /// - `ApiError::Status` for any non-2xx status
    /// - `ApiError::Decode` when the body does not match `T`
    pub fn decode<T: DeserializeOwned>(&self, resource: &str) -> Result<T, ApiError> {
        if !self.is_success() {
            return Err(ApiError::Status {
                status: self.status,
                body: self.body.clone(),
            });
        }
        serde_json::from_str(&self.body)
            .map_err(|e| DecodeError::new(resource, e.to_string()).into())
    }
}

/// Performs HTTP exchanges with the backend
///
/// Implementations return `Ok` for every response that arrived, whatever
/// its status; `Err(ApiError::Transport)` means no response was received.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TopCompany;

    #[test]
    fn test_bearer_header() {
        let token = SecretString::from("abc".to_string());
        let request = ApiRequest::get("/auth/me").bearer(&token);
        assert_eq!(request.header("X-Auth-Token"), Some("Bearer abc"));
    }

    #[test]
    fn test_segments_keep_ids_whole() {
        let request = ApiRequest::patch("/applications")
            .segment("a/1?x")
            .segment("updateStatus");
        assert_eq!(request.segments, vec!["applications", "a/1?x", "updateStatus"]);
        assert_eq!(request.path, "/applications/a/1?x/updateStatus");
    }

    #[test]
    fn test_decode_success() {
        let response = ApiResponse::new(200, r#"[{"id":"c1","name":"Acme","jobCount":3}]"#);
        let top: Vec<TopCompany> = response.decode("top-companies").unwrap();
        assert_eq!(top.len(), 1);
    }

    #[test]
    fn test_decode_non_success_status() {
        let response = ApiResponse::new(404, "not found");
        let err = response.decode::<Vec<TopCompany>>("top-companies").unwrap_err();
        assert_eq!(
            err,
            ApiError::Status {
                status: 404,
                body: "not found".to_string()
            }
        );
    }

    #[test]
    fn test_decode_shape_mismatch() {
        let response = ApiResponse::new(200, r#"{"companies":[]}"#);
        let err = response.decode::<Vec<TopCompany>>("top-companies").unwrap_err();
        match err {
            ApiError::Decode(decode) => assert_eq!(decode.resource, "top-companies"),
            other => panic!("Expected decode error, got {:?}", other),
        }
    }
}
