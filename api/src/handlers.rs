use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::dto::{
    ChannelEnvelope, ChannelIdsResponse, ChannelResponse, FinalizeRequest, FinalizeResponse,
    SeedRequest, VoucherRequest,
};
use crate::dto::{parse_address, parse_channel_id};
use crate::error::AppError;
use crate::AppState;

pub async fn seed_handler(
    State(app): State<Arc<AppState>>,
    Json(request): Json<SeedRequest>,
) -> Result<Json<ChannelEnvelope>, AppError> {
    let (channel_id, owner, balance, expiry_timestamp) = request.parse()?;
    let channel = app.state.seed(channel_id, owner, balance, expiry_timestamp).await?;
    Ok(Json(ChannelEnvelope { channel: ChannelResponse::from(&channel) }))
}

pub async fn get_channel_handler(
    State(app): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
) -> Result<Json<ChannelEnvelope>, AppError> {
    let channel_id = parse_channel_id(&channel_id)?;
    let channel = app.state.get(channel_id).await?;
    Ok(Json(ChannelEnvelope { channel: ChannelResponse::from(&channel) }))
}

pub async fn validate_handler(
    State(app): State<Arc<AppState>>,
    Json(request): Json<VoucherRequest>,
) -> Result<StatusCode, AppError> {
    let voucher = request.canonicalize()?;
    app.state.validate(&voucher).await?;
    Ok(StatusCode::OK)
}

pub async fn settle_handler(
    State(app): State<Arc<AppState>>,
    Json(request): Json<VoucherRequest>,
) -> Result<Json<ChannelEnvelope>, AppError> {
    let voucher = request.canonicalize()?;
    let channel = app.state.settle(voucher).await?;
    Ok(Json(ChannelEnvelope { channel: ChannelResponse::from(&channel) }))
}

pub async fn finalize_handler(
    State(app): State<Arc<AppState>>,
    Json(request): Json<FinalizeRequest>,
) -> Result<Json<FinalizeResponse>, AppError> {
    let channel_id = parse_channel_id(&request.channel_id)?;
    let channel = app.state.get(channel_id).await?;
    let tx_hash = app.settlement.finalise(&channel).await?;
    let channel = app.state.mark_terminal(channel_id, tx_hash).await?;
    Ok(Json(FinalizeResponse {
        channel: ChannelResponse::from(&channel),
        transaction_hash: format!("0x{}", hex::encode(tx_hash.as_slice())),
    }))
}

pub async fn list_by_owner_handler(
    State(app): State<Arc<AppState>>,
    Path(owner): Path<String>,
) -> Result<Json<ChannelIdsResponse>, AppError> {
    let owner = parse_address(&owner)?;
    let ids = app.state.list_by_owner(owner).await;
    Ok(Json(ChannelIdsResponse {
        channel_ids: ids.iter().map(crate::dto::encode_channel_id).collect(),
    }))
}

pub async fn health_handler() -> StatusCode {
    StatusCode::OK
}
