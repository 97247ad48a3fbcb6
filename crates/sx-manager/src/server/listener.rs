//! Registration listener
//!
//! Binds the manager's registration port and serves `/register` until
//! cancelled.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::registration::Registrar;
use crate::server::handler::router;

/// HTTP server that accepts agent registrations
pub struct RegistrationServer {
    listener: TcpListener,
    registrar: Registrar,
}

impl RegistrationServer {
    /// Bind `bind_addr` and clear every outstanding request.
    ///
    /// Requests never survive a listener restart; an agent that registered
    /// with a previous daemon has to register again.
    pub async fn bind(registrar: Registrar, bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;

        registrar
            .state()
            .pending
            .reset()
            .await
            .context("Failed to clear pending registrations")?;
        tracing::info!("Cleared pending registration requests");

        Ok(Self {
            listener,
            registrar,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve registrations until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let local_addr = self.listener.local_addr()?;
        tracing::info!("Registration listener on {}", local_addr);

        let app = router(self.registrar);
        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            tracing::info!("Registration listener shutting down");
        })
        .await
        .context("Registration listener failed")?;

        Ok(())
    }
}
