//! HTTP handlers for operation endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{
    AdjustmentInput, DeliveryInput, HistoryQuery, Operation, ReceiptInput, TransferInput,
    TransitionInput,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::OperationService;
use crate::AppState;

/// Optional body of complete/cancel calls
#[derive(Debug, Default, Deserialize)]
pub struct ActorInput {
    pub user_id: Option<Uuid>,
}

fn service(state: &AppState) -> OperationService {
    OperationService::new(state.store.clone(), &state.config)
}

/// Record a receipt
pub async fn create_receipt(
    State(state): State<AppState>,
    payload: Result<Json<ReceiptInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Operation>)> {
    let Json(input) = payload?;
    let operation = service(&state).create_receipt(input).await?;
    Ok((StatusCode::CREATED, Json(operation)))
}

/// Record a delivery
pub async fn create_delivery(
    State(state): State<AppState>,
    payload: Result<Json<DeliveryInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Operation>)> {
    let Json(input) = payload?;
    let operation = service(&state).create_delivery(input).await?;
    Ok((StatusCode::CREATED, Json(operation)))
}

/// Record an internal transfer
pub async fn create_transfer(
    State(state): State<AppState>,
    payload: Result<Json<TransferInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Operation>)> {
    let Json(input) = payload?;
    let operation = service(&state).create_transfer(input).await?;
    Ok((StatusCode::CREATED, Json(operation)))
}

/// Record a stock adjustment
pub async fn create_adjustment(
    State(state): State<AppState>,
    payload: Result<Json<AdjustmentInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Operation>)> {
    let Json(input) = payload?;
    let operation = service(&state).create_adjustment(input).await?;
    Ok((StatusCode::CREATED, Json(operation)))
}

/// Operation history, most recent first
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<Operation>>> {
    let operations = service(&state).history(query.limit).await?;
    Ok(Json(operations))
}

/// Get an operation by reference number
pub async fn get_operation(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> AppResult<Json<Operation>> {
    let operation = service(&state).get(&reference).await?;
    Ok(Json(operation))
}

/// Complete an operation
pub async fn complete_operation(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    payload: Option<Json<ActorInput>>,
) -> AppResult<Json<Operation>> {
    let actor = payload.and_then(|Json(input)| input.user_id);
    let operation = service(&state).complete(&reference, actor).await?;
    Ok(Json(operation))
}

/// Cancel an operation
pub async fn cancel_operation(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> AppResult<Json<Operation>> {
    let operation = service(&state).cancel(&reference).await?;
    Ok(Json(operation))
}

/// Move an operation to another status
pub async fn transition_operation(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    payload: Result<Json<TransitionInput>, JsonRejection>,
) -> AppResult<Json<Operation>> {
    let Json(input) = payload?;
    let operation = service(&state).transition(&reference, input).await?;
    Ok(Json(operation))
}
