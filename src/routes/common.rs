//! Shared request/response plumbing for the JSON API

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
    AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE,
};
use hyper::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{error, warn};

use crate::auth::{UserIdentity, SESSION_COOKIE};
use crate::listing::ListingCursor;
use crate::server::AppState;
use crate::types::{FavorrError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest JSON body accepted by any endpoint
pub const MAX_JSON_BYTES: usize = 64 * 1024;

/// A fully read HTTP request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub peer: Option<SocketAddr>,
}

impl ApiRequest {
    /// Request for `uri` (path plus optional query) with no headers or body
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (uri.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            peer: None,
        }
    }

    /// Request from hyper parts and an already collected body
    pub fn from_parts(parts: hyper::http::request::Parts, body: Bytes, peer: SocketAddr) -> Self {
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
            peer: Some(peer),
        }
    }

    /// Add a header; values that are not valid header text are dropped
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header(AUTHORIZATION, &format!("Bearer {}", token))
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json<T: Serialize>(self, body: &T) -> Self {
        let json = serde_json::to_vec(body).unwrap_or_default();
        self.with_header(CONTENT_TYPE, "application/json")
            .with_body(json)
    }

    pub fn header(&self, name: HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decode the JSON body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.len() > MAX_JSON_BYTES {
            return Err(FavorrError::Validation("Request body too large".into()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| FavorrError::Validation(format!("Invalid JSON body: {}", e)))
    }

    /// Decode the query string
    pub fn query<T: DeserializeOwned>(&self) -> Result<T> {
        serde_urlencoded::from_str(self.query.as_deref().unwrap_or(""))
            .map_err(|e| FavorrError::Validation(format!("Invalid query string: {}", e)))
    }

    /// Token from the Authorization header or the session cookie
    pub fn token(&self) -> Option<&str> {
        crate::auth::extract_token_from_header(self.header(AUTHORIZATION))
            .or_else(|| crate::auth::extract_token_from_cookie(self.header(COOKIE)))
    }

    /// Resolve the caller, failing with `Unauthenticated`
    pub fn identity(&self, state: &AppState) -> Result<UserIdentity> {
        state
            .identity
            .identify(self.header(AUTHORIZATION), self.header(COOKIE))
    }
}

/// Paging parameters shared by every listing endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub skip: Option<i64>,
    pub status: Option<String>,
    pub role: Option<String>,
}

impl ListQuery {
    pub fn cursor(&self) -> Result<ListingCursor> {
        ListingCursor::from_query(self.limit, self.skip)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

fn add_cors(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    bytes_response(status, "application/json", Bytes::from(json))
}

pub fn bytes_response(status: StatusCode, content_type: &'static str, data: Bytes) -> Response<BoxBody> {
    let mut response = Response::new(full_body(data));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    add_cors(headers);
    response
}

/// Map an error onto its status code and `{ error, code }` body
pub fn error_response(err: FavorrError) -> Response<BoxBody> {
    let status = err.status_code();
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }
    json_response(
        status,
        &ErrorResponse {
            code: err.code(),
            error: err.to_string(),
        },
    )
}

pub fn cors_preflight() -> Response<BoxBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    add_cors(headers);
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

/// Attach the session cookie; `None` clears it
pub fn with_session_cookie(
    mut response: Response<BoxBody>,
    token: Option<&str>,
    max_age: u64,
) -> Result<Response<BoxBody>> {
    let cookie = match token {
        Some(token) => format!(
            "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
            SESSION_COOKIE, token, max_age
        ),
        None => format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", SESSION_COOKIE),
    };
    let value = HeaderValue::from_str(&cookie)
        .map_err(|e| FavorrError::Internal(format!("Invalid cookie value: {}", e)))?;
    response.headers_mut().insert(SET_COOKIE, value);
    Ok(response)
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_splits_query() {
        let req = ApiRequest::new(Method::GET, "/api/leaderboard?limit=10&skip=20");
        assert_eq!(req.path, "/api/leaderboard");
        let query: ListQuery = req.query().unwrap();
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.skip, Some(20));
    }

    #[test]
    fn test_bad_query_is_validation_error() {
        let req = ApiRequest::new(Method::GET, "/api/leaderboard?limit=many");
        let err = req.query::<ListQuery>().unwrap_err();
        assert!(matches!(err, FavorrError::Validation(_)));
    }

    #[test]
    fn test_token_prefers_header() {
        let req = ApiRequest::new(Method::GET, "/api/users/me")
            .with_header(COOKIE, "access_token=from-cookie")
            .with_bearer("from-header");
        assert_eq!(req.token(), Some("from-header"));

        let cookie_only =
            ApiRequest::new(Method::GET, "/api/users/me").with_header(COOKIE, "access_token=abc");
        assert_eq!(cookie_only.token(), Some("abc"));
    }

    #[test]
    fn test_error_response_status() {
        let response = error_response(FavorrError::AlreadyClaimed);
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_session_cookie_flags() {
        let response = with_session_cookie(
            json_response(StatusCode::OK, &serde_json::json!({})),
            Some("tok"),
            3600,
        )
        .unwrap();
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("access_token=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=3600"));
    }
}
