//! Read-only standings API: axum HTTP server over the store query surface.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::db::store::Store;
use crate::monitoring::health::HealthState;

/// Shared state accessible by all dashboard route handlers.
#[derive(Clone)]
pub struct DashboardState {
    store: Arc<Store>,
    health: HealthState,
}

impl DashboardState {
    pub fn new(store: Store, health: HealthState) -> Self {
        Self {
            store: Arc::new(store),
            health,
        }
    }
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/seasons/current", get(current_season_handler))
        .route("/api/leagues", get(leagues_handler))
        .route("/api/leagues/{id}", get(league_detail_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the dashboard listener and serve until the server stops.
pub async fn serve_dashboard(state: DashboardState, bind: &str, port: u16) -> Result<()> {
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind dashboard server on {addr}"))?;
    info!(addr = %addr, "Dashboard server listening");

    axum::serve(listener, router(state))
        .await
        .context("Dashboard server error")
}

/// Spawn the dashboard next to the poll loop. A failure is logged, not fatal.
pub fn spawn_dashboard(state: DashboardState, bind: &str, port: u16) -> JoinHandle<()> {
    let bind = bind.to_string();

    tokio::spawn(async move {
        if let Err(e) = serve_dashboard(state, &bind, port).await {
            warn!(error = %e, "Dashboard unavailable, continuing without it");
        }
    })
}

// -- Route Handlers --

fn internal_error(e: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": e.to_string()})),
    )
        .into_response()
}

async fn health_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.health.to_json().await)
}

async fn current_season_handler(State(state): State<DashboardState>) -> Response {
    match state.store.current_season().await {
        Ok(season) => Json(json!(season)).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn leagues_handler(State(state): State<DashboardState>) -> Response {
    match state.store.list_active_leagues().await {
        Ok(leagues) => Json(json!(leagues)).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn league_detail_handler(
    State(state): State<DashboardState>,
    Path(id): Path<i64>,
) -> Response {
    let league = match state.store.get_league(id).await {
        Ok(Some(league)) => league,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": format!("league {id} not found")})),
            )
                .into_response()
        }
        Err(e) => return internal_error(e),
    };

    // A league's external id is the season id it is played under.
    let season_id = league.external_id.to_string();
    match state.store.teams_for_league(league.id, &season_id).await {
        Ok(teams) => Json(json!({"league": league, "standings": teams})).into_response(),
        Err(e) => internal_error(e),
    }
}
