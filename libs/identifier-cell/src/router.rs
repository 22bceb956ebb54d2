use std::sync::Arc;
use axum::{
    Router,
    routing::post,
    middleware,
};

use shared_utils::extractor::admin_auth_middleware;
use crate::handlers::{issue_identifier, issue_ticket_number, run_backfill};
use crate::state::IdentifierCellState;

pub fn identifier_routes(state: Arc<IdentifierCellState>) -> Router {
    let admin_routes = Router::new()
        .route("/identifiers/{kind}", post(issue_identifier))
        .route("/tickets/number", post(issue_ticket_number))
        .route("/backfill/{kind}", post(run_backfill))
        .layer(middleware::from_fn_with_state(state.config.clone(), admin_auth_middleware));

    Router::new()
        .merge(admin_routes)
        .with_state(state)
}
