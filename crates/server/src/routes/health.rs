use std::sync::Arc;

use axum::{Json, extract::State};
use gatehouse_api::HealthResponse;

use crate::Sessions;
use crate::error::ApiErr;

/// GET /api/health: pings the user store and the session store.
pub async fn health(State(sessions): State<Arc<Sessions>>) -> Result<Json<HealthResponse>, ApiErr> {
    sessions.check_health().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
