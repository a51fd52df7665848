//! HTTP router for integrations-auth.
//!
//! - `/`                                        — liveness ping
//! - `/providers`                               — configured providers
//! - `/integrations/{provider}/authorize`       — start an OAuth flow
//! - `/integrations/{provider}/oauth2callback`  — provider redirect target
//! - `/integrations/{provider}/credentials`     — one-shot credential pickup
//! - `/integrations/{provider}/load`            — list provider items
//! - `/integrations/connections`                — stored connections
//! - `/integrations/{provider}/connection`      — forget a stored connection

pub mod routes;

use crate::SharedState;
use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(state: SharedState) -> anyhow::Result<Router> {
    let origin: HeaderValue = state
        .config
        .frontend_origin
        .parse()
        .context("Invalid FRONTEND_ORIGIN")?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Ok(routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}
