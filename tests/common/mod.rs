//! Shared fixtures for the integration tests
//!
//! Everything runs against the in-memory store, driven through
//! `routes::dispatch` without opening a socket.

#![allow(dead_code)]

use clap::Parser;
use http_body_util::BodyExt;
use hyper::header::{HeaderMap, SET_COOKIE};
use hyper::{Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use favorr::auth::UserIdentity;
use favorr::config::Args;
use favorr::db::schemas::UserDoc;
use favorr::db::Stores;
use favorr::files::LocalFileStore;
use favorr::ledger::FavorCatalog;
use favorr::logging::AuditLogger;
use favorr::routes::{self, ApiRequest};
use favorr::AppState;

pub const SECRET: &str = "integration-test-secret-at-least-32-chars";
pub const PASSWORD: &str = "correct horse battery";

pub struct TestApp {
    pub state: Arc<AppState>,
    _uploads: TempDir,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Response {
    pub fn cookie(&self) -> Option<&str> {
        self.headers.get(SET_COOKIE).and_then(|v| v.to_str().ok())
    }
}

pub async fn app() -> TestApp {
    let uploads = TempDir::new().unwrap();
    let upload_dir = uploads.path().to_str().unwrap().to_string();
    let args = Args::parse_from([
        "favorr",
        "--dev-mode",
        "--store",
        "memory",
        "--jwt-secret",
        SECRET,
        "--upload-dir",
        upload_dir.as_str(),
        "--max-upload-bytes",
        "65536",
    ]);

    let files = LocalFileStore::new(args.upload_dir.clone(), args.max_upload_bytes);
    files.init().await.unwrap();

    let state = AppState::new(
        args,
        Stores::memory(),
        "memory",
        FavorCatalog::builtin(),
        Arc::new(files),
        AuditLogger::new(),
    )
    .unwrap();

    TestApp {
        state: Arc::new(state),
        _uploads: uploads,
    }
}

impl TestApp {
    pub async fn send(&self, req: ApiRequest) -> Response {
        let response = routes::dispatch(&self.state, req).await;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Response {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        let mut req = ApiRequest::new(Method::GET, uri);
        if let Some(token) = token {
            req = req.with_bearer(token);
        }
        self.send(req).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        let mut req = ApiRequest::new(Method::POST, uri).with_json(&body);
        if let Some(token) = token {
            req = req.with_bearer(token);
        }
        self.send(req).await
    }

    /// Register through the API; returns (token, user id)
    pub async fn register(&self, username: &str) -> (String, String) {
        let response = self
            .post(
                "/api/users/register",
                None,
                json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                    "passwordConfirmation": PASSWORD,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        (
            response.body["token"].as_str().unwrap().to_string(),
            response.body["user"]["id"].as_str().unwrap().to_string(),
        )
    }
}

/// Insert a user straight into the store, skipping password hashing
pub async fn seed_user(stores: &Stores, username: &str) -> UserIdentity {
    let user = stores
        .users
        .insert_user(UserDoc::new(
            username.to_string(),
            format!("{username}@example.com"),
            "unused".to_string(),
        ))
        .await
        .unwrap();
    UserIdentity {
        user_id: user.id,
        username: user.username,
    }
}

pub async fn completed_count(stores: &Stores, user_id: &str) -> i64 {
    stores
        .users
        .find_user_by_id(user_id)
        .await
        .unwrap()
        .unwrap()
        .completed_count
}
