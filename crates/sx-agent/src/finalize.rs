//! Single-shot listener that receives the manager's public key
//!
//! The listener is bound before the agent registers, so the manager's push can
//! never arrive before it. It serves `POST /finalize` until one key has been
//! installed and then shuts itself down.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use ssh_key::{HashAlg, PublicKey};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use sx_core::traits::AccountProvisioner;
use sx_core::wire::FINALIZE_PATH;

/// How a finalize listener ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The manager's key was installed
    Installed { fingerprint: String },
    /// The listener was stopped before any key arrived
    Aborted,
}

struct FinalizeState {
    provisioner: Arc<dyn AccountProvisioner>,
    /// Fingerprint of the installed key, once there is one
    installed: Mutex<Option<String>>,
    done: CancellationToken,
}

/// Listener awaiting the manager's key push
pub struct FinalizeListener {
    listener: TcpListener,
    provisioner: Arc<dyn AccountProvisioner>,
}

impl FinalizeListener {
    pub async fn bind(bind_addr: &str, provisioner: Arc<dyn AccountProvisioner>) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind finalize listener to {}", bind_addr))?;
        Ok(Self {
            listener,
            provisioner,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until a key is installed or `cancel` fires
    pub async fn wait(self, cancel: CancellationToken) -> Result<FinalizeOutcome> {
        let state = Arc::new(FinalizeState {
            provisioner: self.provisioner,
            installed: Mutex::new(None),
            done: CancellationToken::new(),
        });
        let app = router(Arc::clone(&state));

        tracing::info!(
            "Awaiting manager approval on {}",
            self.listener.local_addr()?
        );

        let done = state.done.clone();
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = done.cancelled() => {}
                    _ = cancel.cancelled() => {}
                }
            })
            .await
            .context("Finalize listener failed")?;

        let installed = state.installed.lock().await.clone();
        Ok(match installed {
            Some(fingerprint) => FinalizeOutcome::Installed { fingerprint },
            None => FinalizeOutcome::Aborted,
        })
    }
}

fn router(state: Arc<FinalizeState>) -> Router {
    Router::new()
        .route(FINALIZE_PATH, post(finalize))
        .with_state(state)
}

/// Install the pushed public key
///
/// POST /finalize with the OpenSSH public key as the body
async fn finalize(State(state): State<Arc<FinalizeState>>, body: Bytes) -> (StatusCode, String) {
    let mut installed = state.installed.lock().await;
    if installed.is_some() {
        return (StatusCode::CONFLICT, "a key has already been installed".to_string());
    }

    let key = match parse_public_key(&body) {
        Ok(key) => key,
        Err(reason) => {
            tracing::warn!("Rejected key push: {}", reason);
            return (StatusCode::BAD_REQUEST, reason);
        }
    };
    let fingerprint = key.fingerprint(HashAlg::Sha256).to_string();
    let line = match key.to_openssh() {
        Ok(line) => format!("{}\n", line),
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()),
    };

    if let Err(e) = state.provisioner.install_trusted_key(line.as_bytes()).await {
        tracing::error!("Failed to install manager key: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    tracing::info!("Manager key {} received and installed", fingerprint);
    *installed = Some(fingerprint);
    state.done.cancel();
    (StatusCode::OK, "key installed".to_string())
}

/// Parse a single OpenSSH public key line
fn parse_public_key(body: &[u8]) -> Result<PublicKey, String> {
    let text = std::str::from_utf8(body).map_err(|_| "key is not valid UTF-8".to_string())?;
    let line = text.trim();
    if line.is_empty() {
        return Err("empty key".to_string());
    }
    PublicKey::from_openssh(line).map_err(|e| format!("not an OpenSSH public key: {}", e))
}
