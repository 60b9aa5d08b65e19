//! Runtime lifecycle: compose services, serve, and shut down.

use anyhow::{Context, Result};
use axum::Router;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::routes::create_router;
use super::state::AppState;
use crate::collab::{Authenticator, LocalFileManager, StaticAuthenticator, TracingAuditLog, User};
use crate::common::config::AppConfig;
use crate::session::{ExpirationSweeper, SessionRegistry};
use crate::transfer::{Collaborators, TransferService};

/// Origin recorded for the pre-seeded test-mode session.
pub const TEST_MODE_ORIGIN: &str = "test-url";

const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the server owns, built from one config.
pub struct Runtime {
    pub service: Arc<TransferService>,
    pub router: Router,
    /// `None` in test mode.
    pub sweeper: Option<ExpirationSweeper>,
    /// Token of the pre-seeded session in test mode.
    pub test_token: Option<String>,
}

pub async fn build_runtime(config: &AppConfig) -> Result<Runtime> {
    tokio::fs::create_dir_all(&config.storage.root)
        .await
        .context(format!(
            "Failed to create storage root {}",
            config.storage.root.display()
        ))?;

    let auth: Arc<dyn Authenticator> = Arc::new(StaticAuthenticator::new(config.users.clone()));
    let files = Arc::new(LocalFileManager::new(
        config.storage.root.clone(),
        auth.clone(),
    ));
    let registry = Arc::new(if config.test_mode.enabled {
        SessionRegistry::new_deterministic()
    } else {
        SessionRegistry::new()
    });

    let service = Arc::new(TransferService::new(
        registry,
        Collaborators {
            files,
            auth,
            audit: Arc::new(TracingAuditLog),
        },
        config.upload,
        config.sessions,
    ));

    let (sweeper, test_token) = if config.test_mode.enabled {
        let token = service
            .open_session(User::new(&config.test_mode.user_id), TEST_MODE_ORIGIN)
            .await;
        tracing::warn!(
            token = %token,
            user = %config.test_mode.user_id,
            "test mode: session expiry disabled"
        );
        (None, Some(token))
    } else {
        let sweeper = ExpirationSweeper::new(service.clone(), config.sessions.sweep_interval());
        (Some(sweeper), None)
    };

    let router = create_router(&AppState::new(service.clone()));

    Ok(Runtime {
        service,
        router,
        sweeper,
        test_token,
    })
}

/// Binds the listener, serves until Ctrl+C, then releases every session.
pub async fn serve(config: AppConfig) -> Result<()> {
    let Runtime {
        service,
        router,
        mut sweeper,
        ..
    } = build_runtime(&config).await?;

    let ip: IpAddr = config
        .server
        .bind
        .parse()
        .context(format!("Invalid bind address {:?}", config.server.bind))?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = std::net::TcpListener::bind(addr).context(
        "Failed to bind to port - port already in use.\n\n\
         Is another blockdrop instance running?\n\
         Or is another service using this port?",
    )?;
    listener
        .set_nonblocking(true)
        .context("Failed to set listener to non-blocking mode")?;
    let local_addr = listener.local_addr()?;

    let server_handle = axum_server::Handle::new();
    let root_token = CancellationToken::new();

    // Ctrl+C starts a graceful drain
    let signal_token = root_token.clone();
    let signal_handle = server_handle.clone();
    let ctrl_c_task = tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_err() {
                    tracing::error!("Failed to listen for Ctrl+C");
                    return;
                }
                tracing::info!("Ctrl+C received - initiating graceful shutdown");
                signal_handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN_TIMEOUT));
            }
            _ = signal_token.cancelled() => {}
        }
    });

    if let Some(sweeper) = sweeper.as_mut() {
        sweeper.start();
    }
    tracing::info!(
        addr = %local_addr,
        storage = %config.storage.root.display(),
        "blockdrop listening"
    );

    let served = axum_server::from_tcp(listener)
        .handle(server_handle)
        .serve(router.into_make_service())
        .await
        .context("Server error");

    root_token.cancel();
    let _ = ctrl_c_task.await;

    shutdown(sweeper, &service).await;
    served
}

//==========
// SHUTDOWN
//==========

/// Stop expiry, then release every remaining session and its staging files.
async fn shutdown(sweeper: Option<ExpirationSweeper>, service: &TransferService) {
    if let Some(mut sweeper) = sweeper {
        sweeper.stop().await;
    }

    let remaining = service.registry().len();
    if remaining > 0 {
        tracing::info!(remaining, "closing open sessions");
    }
    service.close_all().await;
    tracing::info!("Server shutdown complete");
}
