use axum::{
    body::Body,
    http::{Method, Request, Response},
    Router,
};
use http_body_util::BodyExt;

use blockdrop::server::{create_router, AppState};

use super::TestEnv;

//===========
// App Factory
//===========
pub fn create_test_app(env: &TestEnv) -> Router {
    create_router(&AppState::new(env.service.clone()))
}

//=================
// Request Builders
//=================
pub fn build_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "localhost:8420");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("Failed to build request")
}

pub fn build_json_request(
    method: Method,
    uri: &str,
    json: serde_json::Value,
    token: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "localhost:8420")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(
            serde_json::to_vec(&json).expect("Failed to serialize JSON"),
        ))
        .expect("Failed to build request")
}

pub fn build_block_request(token: &str, offset: u64, last: bool, data: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::PUT)
        .uri(format!("/rpc/upload/block?offset={offset}&last={last}"))
        .header("Authorization", format!("Bearer {token}"))
        .header("content-type", "application/octet-stream")
        .body(Body::from(data))
        .expect("Failed to build request")
}

//==================
// Response Helpers
//==================
pub async fn extract_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes()
        .to_vec()
}

pub async fn extract_json(response: Response<Body>) -> serde_json::Value {
    let bytes = extract_bytes(response).await;
    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}
