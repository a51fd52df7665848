//! Route handlers. Each handler is a thin adapter over [`crate::Gateway`].

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse},
    routing::{delete, get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use crate::error::AuthError;
use crate::SharedState;

pub fn router(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/", get(ping))
        .route("/providers", get(providers))
        // ── OAuth ────────────────────────────────────────────────────────
        .route("/integrations/connections", get(connections))
        .route("/integrations/{provider}/authorize", post(authorize))
        .route("/integrations/{provider}/oauth2callback", get(oauth_callback))
        .route("/integrations/{provider}/credentials", post(credentials))
        .route("/integrations/{provider}/load", post(load_items))
        .route("/integrations/{provider}/connection", delete(disconnect))
        .with_state(state)
}

async fn ping() -> impl IntoResponse {
    Json(json!({ "Ping": "Pong" }))
}

/// GET /providers — List configured OAuth providers.
async fn providers(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({ "data": state.gateway.providers() }))
}

#[derive(Deserialize)]
struct IdentityForm {
    user_id: String,
    org_id: String,
}

/// POST /integrations/:provider/authorize — Returns the provider authorize URL.
async fn authorize(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
    Form(form): Form<IdentityForm>,
) -> Result<Json<String>, AuthError> {
    let url = state
        .gateway
        .authorize(&provider, &form.user_id, &form.org_id)
        .await?;
    Ok(Json(url))
}

/// GET /integrations/:provider/oauth2callback — Provider redirect target.
async fn oauth_callback(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Html<String>, AuthError> {
    let page = state.gateway.oauth_callback(&provider, &query).await?;
    Ok(Html(page))
}

/// POST /integrations/:provider/credentials — One-shot credential pickup.
async fn credentials(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
    Form(form): Form<IdentityForm>,
) -> Result<Json<serde_json::Value>, AuthError> {
    let blob = state
        .gateway
        .consume_credentials(&provider, &form.user_id, &form.org_id)
        .await?;
    let value = serde_json::to_value(blob)
        .map_err(|e| AuthError::Internal(format!("failed to encode credentials: {e}")))?;
    Ok(Json(value))
}

#[derive(Deserialize)]
struct LoadForm {
    credentials: String,
}

/// POST /integrations/:provider/load — List items using a credential blob.
async fn load_items(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
    Form(form): Form<LoadForm>,
) -> Result<impl IntoResponse, AuthError> {
    let items = state
        .gateway
        .list_items(&provider, &form.credentials)
        .await?;
    Ok(Json(items))
}

#[derive(Deserialize)]
struct IdentityQuery {
    user_id: String,
    org_id: String,
}

/// GET /integrations/connections — Stored connections for an identity.
async fn connections(
    State(state): State<SharedState>,
    Query(q): Query<IdentityQuery>,
) -> Result<impl IntoResponse, AuthError> {
    let connections = state
        .gateway
        .list_connections(&q.user_id, &q.org_id)
        .await?;
    Ok(Json(json!({ "data": connections })))
}

/// DELETE /integrations/:provider/connection — Forget a stored connection.
async fn disconnect(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
    Query(q): Query<IdentityQuery>,
) -> Result<impl IntoResponse, AuthError> {
    state
        .gateway
        .disconnect(&provider, &q.user_id, &q.org_id)
        .await?;
    Ok(Json(json!({ "data": { "success": true } })))
}
