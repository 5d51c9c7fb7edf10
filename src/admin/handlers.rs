use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::load_balancer::BackendSnapshot;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub strategy: &'static str,
    pub backends: usize,
    pub eligible: usize,
    /// Sum of eligible backends' weights.
    pub total_weight: f64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let pool = state.dispatcher.pool();
    let backends = pool.size();
    let eligible = pool.eligible().len();

    let status = match eligible {
        0 => "unavailable",
        n if n < backends => "degraded",
        _ => "operational",
    };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status,
        strategy: state.dispatcher.strategy_name(),
        backends,
        eligible,
        total_weight: pool.total_weight(),
    })
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendSnapshot>> {
    Json(state.dispatcher.pool().snapshot())
}
