//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and OpenAPI documentation.

use crate::{
    handlers,
    models::{ChatReply, ChatRequestPayload, ErrorResponse, LogRequestPayload, LogResponse, ReplyMessage},
    state::AppState,
};

use axum::{Router, routing::post};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::chat, handlers::log_entry),
    components(
        schemas(ChatRequestPayload, ChatReply, ReplyMessage, LogRequestPayload, LogResponse, ErrorResponse)
    ),
    tags(
        (name = "Tutor API", description = "Reading-comprehension tutor chat and participant logging")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/log", post(handlers::log_entry))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
