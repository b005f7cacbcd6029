//! Common test utilities and helpers

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
};
use classpulse_core::{
    api::{AppState, EventBroadcaster, USER_EMAIL_HEADER},
    ClassDirectory, ClassId, ClassInfo, ConnectionMode, DocumentStore, LibsqlStore,
};
use std::sync::Arc;
use tempfile::TempDir;

pub const TUTOR: &str = "tutor@uni.edu";
pub const ALICE: &str = "alice@uni.edu";
pub const BOB: &str = "bob@uni.edu";
pub const OUTSIDER: &str = "mallory@elsewhere.edu";

/// Roster with one closed class and one open class
pub fn test_directory() -> ClassDirectory {
    ClassDirectory::new(vec![
        ClassInfo {
            id: ClassId::new("cp2106"),
            name: "Orbital".to_string(),
            tutors: vec![TUTOR.to_string()],
            students: vec![ALICE.to_string(), BOB.to_string()],
        },
        ClassInfo {
            id: ClassId::new("open101"),
            name: "Open lecture".to_string(),
            tutors: vec![TUTOR.to_string()],
            students: vec![],
        },
    ])
}

pub fn test_state(store: Arc<dyn DocumentStore>) -> AppState {
    AppState::new(store, test_directory(), EventBroadcaster::new(100), "test")
}

/// Create a file-backed libsql store in a temporary directory
///
/// libSQL's `:memory:` databases are per connection, so persistence tests
/// need a real file.
pub async fn create_test_store() -> (LibsqlStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let store = LibsqlStore::new_with_validation(
        ConnectionMode::Local(db_path.to_str().unwrap().to_string()),
        true,
        16,
    )
    .await
    .expect("Failed to create test store");

    (store, temp_dir)
}

pub fn request(method: &str, uri: &str, email: Option<&str>) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(email) = email {
        builder = builder.header(USER_EMAIL_HEADER, email);
    }
    builder
}

pub fn json_request(method: &str, uri: &str, email: Option<&str>, body: serde_json::Value) -> Request<Body> {
    request(method, uri, email)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str, email: Option<&str>) -> Request<Body> {
    request(method, uri, email).body(Body::empty()).unwrap()
}

pub fn form_request(uri: &str, email: Option<&str>, body: &str) -> Request<Body> {
    request("POST", uri, email)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}
