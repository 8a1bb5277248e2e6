//! HTTP transport for the control channel.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use helmet_params::{ControlChannel, EffectParameters, ParamError};
use serde_json::json;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub control: ControlChannel,
    pub index_path: Arc<PathBuf>,
}

/// Control-path failure mapped onto an HTTP response.
pub struct ApiError(ParamError);

impl From<ParamError> for ApiError {
    fn from(err: ParamError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!("rejected settings update: {}", self.0);
        let body = Json(json!({
            "status": "error",
            "error": self.0.to_string(),
        }));
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/settings", get(get_settings).post(update_settings))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - static control page, served as-is
async fn index(State(state): State<AppState>) -> Response {
    match tokio::fs::read(state.index_path.as_path()).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "text/html")], bytes).into_response(),
        Err(e) => {
            tracing::debug!("control page {} unavailable: {e}", state.index_path.display());
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// GET /settings - current parameter snapshot
async fn get_settings(State(state): State<AppState>) -> Json<EffectParameters> {
    Json(state.control.get_settings())
}

/// POST /settings - apply any subset of the settings keys
async fn update_settings(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.control.update_settings(&body)?;
    Ok(Json(json!({ "status": "success" })))
}
