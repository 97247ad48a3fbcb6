//! Registration request handling

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::routing::get;
use axum::{Json, Router};

use sx_core::wire::{RegisterQuery, RegisterResponse, RegistrationStatus, REGISTER_PATH};

use crate::registration::Registrar;

/// Build the registration router
pub fn router(registrar: Registrar) -> Router {
    Router::new()
        .route(REGISTER_PATH, get(register).post(register))
        .with_state(registrar)
}

/// Record a registration request
///
/// GET|POST /register?host=<claimed-hostname>
///
/// The address is always the transport peer, never anything the agent sends.
/// Always answers 200; failures are reported in the body and logged.
async fn register(
    State(registrar): State<Registrar>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    query: Option<Query<RegisterQuery>>,
) -> Json<RegisterResponse> {
    let claimed_identity = query.map(|Query(q)| q.host).unwrap_or_default();
    let source_address = peer.ip().to_canonical().to_string();

    let status = match registrar.register(&claimed_identity, &source_address).await {
        Ok(status) => status,
        Err(e) => {
            tracing::error!("Failed to record registration from {}: {}", source_address, e);
            RegistrationStatus::Failed
        }
    };

    Json(RegisterResponse::new(status))
}
