//! Mutating Admission Webhook for SGX Pods
//!
//! The API server sends every Pod CREATE/UPDATE to `POST /pods-sgx`. The
//! handler decodes the Pod, runs the [`crate::mutator`] engine and answers
//! with a JSON patch plus any warnings for the author.
//!
//! The webhook is registered with `failurePolicy: Ignore`, so an unreachable
//! or failing webhook never blocks Pod creation.

pub mod pod;
pub mod registration;

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tracing::{error, info};

use crate::config::ServeArgs;
use crate::{Error, Result};

/// HTTP path the mutator is served on
pub const WEBHOOK_PATH: &str = "/pods-sgx";

/// How long in-flight reviews may take to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Create the webhook router
///
/// - POST /pods-sgx - Mutate Pods requesting SGX EPC
/// - GET /healthz - Liveness probe
pub fn webhook_router() -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(pod::mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
}

/// Serve the webhook over HTTPS until SIGINT/SIGTERM
pub async fn start_webhook_server(args: &ServeArgs) -> Result<()> {
    let tls_config = RustlsConfig::from_pem_file(&args.tls_cert_file, &args.tls_key_file)
        .await
        .map_err(|e| {
            Error::config(format!(
                "TLS config error ({}, {}): {e}",
                args.tls_cert_file.display(),
                args.tls_key_file.display()
            ))
        })?;

    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    info!(addr = %args.listen_addr, path = WEBHOOK_PATH, "Starting SGX admission webhook");
    axum_server::bind_rustls(args.listen_addr, tls_config)
        .handle(handle)
        .serve(webhook_router().into_make_service())
        .await?;

    info!("SGX admission webhook stopped");
    Ok(())
}

async fn shutdown_on_signal(handle: Handle) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = ctrl_c => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for ctrl-c");
                return;
            }
        }
        _ = terminate => {}
    }

    info!(grace = ?SHUTDOWN_GRACE, "Shutdown signal received, draining connections");
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
