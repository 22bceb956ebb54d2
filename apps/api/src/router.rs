use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use identifier_cell::{identifier_routes, IdentifierCellState};

pub fn create_router(state: Arc<IdentifierCellState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic identifier API is running!" }))
        .nest("/admin", identifier_routes(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use identifier_cell::{MemoryCounterStore, MemoryEntityStore};
    use shared_utils::test_utils::TestConfig;
    use tower::ServiceExt;

    fn test_state() -> Arc<IdentifierCellState> {
        Arc::new(IdentifierCellState::new(
            TestConfig::default().to_arc(),
            Arc::new(MemoryCounterStore::default()),
            Arc::new(MemoryEntityStore::new()),
        ))
    }

    #[tokio::test]
    async fn test_root_is_public() {
        let response = create_router(test_state())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_routes_are_nested() {
        let test_config = TestConfig::default();
        let response = create_router(test_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/identifiers/doctor")
                    .header("authorization", test_config.bearer_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
