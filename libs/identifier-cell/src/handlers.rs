use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use tracing::info;

use shared_models::error::AppError;

use crate::models::{
    BackfillResponse, IdentifierKind, IdentifierResponse, TicketNumberRequest, TicketNumberResponse,
    TICKET_NUMBER_PREFIX, TICKET_NUMBER_WIDTH,
};
use crate::state::IdentifierCellState;

fn parse_kind(raw: &str) -> Result<IdentifierKind, AppError> {
    raw.parse::<IdentifierKind>().map_err(AppError::BadRequest)
}

pub async fn issue_identifier(
    State(state): State<Arc<IdentifierCellState>>,
    Path(kind): Path<String>,
) -> Result<Json<IdentifierResponse>, AppError> {
    let kind = parse_kind(&kind)?;
    let identifier = state.allocator.issue(kind).await?;

    Ok(Json(IdentifierResponse { kind, identifier }))
}

pub async fn issue_ticket_number(
    State(state): State<Arc<IdentifierCellState>>,
    request: Option<Json<TicketNumberRequest>>,
) -> Result<Json<TicketNumberResponse>, AppError> {
    // No body at all means the current month, same as `{}`.
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let number = match (request.year, request.month) {
        (Some(year), Some(month)) => {
            state
                .allocator
                .allocate_periodic(TICKET_NUMBER_PREFIX, year, month, TICKET_NUMBER_WIDTH)
                .await?
        }
        (None, None) => state.allocator.issue_ticket_number(Utc::now()).await?,
        _ => {
            return Err(AppError::BadRequest(
                "year and month must be given together".to_string(),
            ))
        }
    };

    Ok(Json(TicketNumberResponse { number }))
}

pub async fn run_backfill(
    State(state): State<Arc<IdentifierCellState>>,
    Path(kind): Path<String>,
) -> Result<Json<BackfillResponse>, AppError> {
    let kind = parse_kind(&kind)?;
    let assigned = state.backfill.backfill(kind).await?;

    info!("Admin backfill assigned {} {} identifiers", assigned, kind);
    Ok(Json(BackfillResponse { kind, assigned }))
}
