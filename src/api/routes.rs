use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(crate::api::handlers::health::health))
        .route(
            "/api/research",
            post(crate::api::handlers::research::research),
        )
}

/// Router with state, CORS and request tracing applied.
pub fn app(state: AppState) -> Router {
    create_router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
