//! Health and status HTTP routes
//!
//! - `GET /q/health/live` - process is up
//! - `GET /q/health/ready` - failover loops are running (either role)
//! - `GET /q/status` - instance id, role and resource state

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::node::FailoverNode;
use crate::role::Role;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub instance_id: String,
    pub role: Role,
    pub resource_connected: bool,
    pub running: bool,
}

pub fn create_router(node: Arc<FailoverNode>) -> Router {
    Router::new()
        .route("/q/health/live", get(live))
        .route("/q/health/ready", get(ready))
        .route("/q/status", get(status))
        .with_state(node)
}

async fn live() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

async fn ready(State(node): State<Arc<FailoverNode>>) -> (StatusCode, Json<HealthResponse>) {
    // A healthy standby is ready; only stopped loops are not.
    if node.is_running() {
        (StatusCode::OK, Json(HealthResponse { status: "UP" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "DOWN" }),
        )
    }
}

async fn status(State(node): State<Arc<FailoverNode>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        instance_id: node.identity().to_string(),
        role: node.role(),
        resource_connected: node.resource_connected(),
        running: node.is_running(),
    })
}
