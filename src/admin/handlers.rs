use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::security::{BlockSnapshot, GuardStats};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub guard_enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStatus {
    pub key: String,
    pub blocked: bool,
    pub block: Option<BlockSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnblockResult {
    pub key: String,
    /// Whether a live block was removed.
    pub released: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        guard_enabled: state.guard.is_enabled(),
    })
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<GuardStats> {
    Json(state.guard.stats())
}

pub async fn list_blocks(State(state): State<AdminState>) -> Json<Vec<BlockSnapshot>> {
    Json(state.guard.blocks())
}

pub async fn get_block(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> Json<BlockStatus> {
    let block = state.guard.block_info(&key);
    Json(BlockStatus {
        key,
        blocked: block.is_some(),
        block,
    })
}

pub async fn block_key(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> (StatusCode, Json<BlockSnapshot>) {
    tracing::info!(client = %key, "Manual block requested");
    (StatusCode::CREATED, Json(state.guard.manual_block(&key)))
}

pub async fn unblock_key(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> Json<UnblockResult> {
    tracing::info!(client = %key, "Manual unblock requested");
    let released = state.guard.manual_unblock(&key);
    Json(UnblockResult { key, released })
}
