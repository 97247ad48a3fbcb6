//! Registration request to a manager

use anyhow::{Context, Result};

use sx_core::config::AgentConfig;
use sx_core::wire::{register_url, RegisterQuery, RegisterResponse};
use sx_core::wire::RegistrationStatus;

/// Ask the manager at `manager` to trust this host.
///
/// The claimed identity travels in the query string; the manager takes the
/// address from the connection itself.
pub async fn send_registration(manager: &str, config: &AgentConfig) -> Result<RegistrationStatus> {
    let url = register_url(manager, config.manager_port);
    let query = RegisterQuery {
        host: config.claimed_identity(),
    };
    tracing::info!("Sending registration request to {} as '{}'", url, query.host);

    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(config.register_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .post(&url)
        .query(&query)
        .send()
        .await
        .with_context(|| format!("Could not reach manager at {}", url))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("Manager at {} responded {}", url, status);
    }

    let body: RegisterResponse = response
        .json()
        .await
        .context("Manager sent an unreadable registration response")?;
    Ok(body.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use axum::extract::Query;
    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn test_sends_claimed_identity() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let app = Router::new().route(
            sx_core::wire::REGISTER_PATH,
            post(move |Query(q): Query<RegisterQuery>| {
                let sink = Arc::clone(&sink);
                async move {
                    *sink.lock().await = Some(q.host);
                    Json(RegisterResponse::new(RegistrationStatus::Pending))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let config = AgentConfig {
            manager_port: port,
            hostname: Some("db-2".to_string()),
            ..AgentConfig::default()
        };
        let status = send_registration("127.0.0.1", &config).await.unwrap();

        assert_eq!(status, RegistrationStatus::Pending);
        assert_eq!(seen.lock().await.as_deref(), Some("db-2"));
    }

    #[tokio::test]
    async fn test_unreachable_manager_is_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = AgentConfig {
            manager_port: port,
            ..AgentConfig::default()
        };
        assert!(send_registration("127.0.0.1", &config).await.is_err());
    }
}
