use crate::{
    research::coordinator::{ResearchCoordinator, ResearchOptions},
    types::{AppError, ResearchReport, ResearchRequest, Result},
    AppState,
};
use axum::{extract::State, Json};
use tokio_util::sync::CancellationToken;

/// Run the literature pipeline for one query.
///
/// A `provider` in the body builds a dedicated coordinator for this request;
/// otherwise the shared one is used.
pub async fn research(
    State(state): State<AppState>,
    Json(payload): Json<ResearchRequest>,
) -> Result<Json<ResearchReport>> {
    if payload.query.trim().is_empty() {
        return Err(AppError::InvalidInput("query must not be blank".to_string()));
    }

    let options = ResearchOptions {
        top_k: payload.top_k,
        fanout: payload.fanout,
        deadline: None,
    };

    // Dropping the guard cancels retrieval if the client goes away.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let report = match payload.provider.as_deref() {
        Some(provider) => {
            tracing::info!(provider, "Building coordinator for provider override");
            let coordinator = ResearchCoordinator::from_config(&state.config, Some(provider)).await?;
            coordinator
                .research_with(&payload.query, options, cancel)
                .await?
        }
        None => {
            state
                .coordinator
                .research_with(&payload.query, options, cancel)
                .await?
        }
    };

    Ok(Json(report))
}
