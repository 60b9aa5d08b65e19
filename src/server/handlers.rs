//! JSON and octet-stream handlers, one per RPC call.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::{BearerToken, Origin};
use super::state::AppState;
use crate::collab::FileInfo;
use crate::common::AppError;
use crate::transfer::{BlockReceipt, UploadStatus, VersionInfo};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UploadParameters {
    pub files: Vec<String>,
    #[serde(default)]
    pub recipients: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Deserialize)]
pub struct BlockParams {
    pub offset: u64,
    #[serde(default)]
    pub last: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub file_id: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub file_ids: Vec<u64>,
    pub recipients: String,
}

#[derive(Deserialize)]
pub struct ReadParams {
    pub offset: u64,
    pub size: usize,
}

#[derive(Deserialize)]
pub struct FinishRequest {
    #[serde(default)]
    pub successful: bool,
}

pub async fn login(
    State(state): State<AppState>,
    Origin(origin): Origin,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let token = state
        .service
        .login(&req.user_id, &req.password, &origin)
        .await?;
    Ok(Json(json!({ "token": token })))
}

pub async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<Value>, AppError> {
    state.service.logout(&token).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn check_session(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<Value>, AppError> {
    state.service.check_session(&token)?;
    Ok(Json(json!({ "valid": true })))
}

pub async fn upload_status(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<UploadStatus>, AppError> {
    Ok(Json(state.service.get_upload_status(&token).await?))
}

pub async fn define_upload_parameters(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(params): Json<UploadParameters>,
) -> Result<Json<Value>, AppError> {
    state
        .service
        .define_upload_parameters(&token, &params.files, &params.recipients, &params.comment)
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn start_uploading(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<Value>, AppError> {
    let file_name = state.service.start_uploading(&token).await?;
    Ok(Json(json!({ "fileName": file_name })))
}

pub async fn upload_block(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Query(params): Query<BlockParams>,
    body: Bytes,
) -> Result<Json<BlockReceipt>, AppError> {
    let receipt = state
        .service
        .upload_block(&token, params.offset, &body, params.last)
        .await?;
    Ok(Json(receipt))
}

pub async fn start_downloading(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<FileInfo>, AppError> {
    Ok(Json(
        state.service.start_downloading(&token, req.file_id).await?,
    ))
}

pub async fn download_block(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Query(params): Query<ReadParams>,
) -> Result<impl IntoResponse, AppError> {
    let block = state
        .service
        .download_block(&token, params.offset, params.size)
        .await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        block,
    ))
}

pub async fn list_download_files(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<Vec<FileInfo>>, AppError> {
    Ok(Json(state.service.list_download_files(&token).await?))
}

pub async fn share_files(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(req): Json<ShareRequest>,
) -> Result<Json<Value>, AppError> {
    state
        .service
        .share_files(&token, &req.file_ids, &req.recipients)
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn cancel(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<Value>, AppError> {
    state.service.cancel(&token).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn finish(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(req): Json<FinishRequest>,
) -> Result<Json<Value>, AppError> {
    state.service.finish(&token, req.successful).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn version(State(state): State<AppState>) -> Json<VersionInfo> {
    Json(state.service.version())
}
