//! HTTP binding of the remote surface.
//!
//! ## Endpoints
//!
//! - `GET /` - status page
//! - `GET /start`, `GET /stop` - toggle the run flag
//! - `GET /calibLow`, `GET /calibHigh` - queue a calibration run
//! - `GET /setStrategy?value=N` - select a strategy
//! - `GET /setPID?p=&i=&d=` - update gains
//! - `GET /pollData` - drain buffered telemetry as CSV rows
//! - `GET /status` - status report as JSON
//! - `GET /download` - legacy hint
//!
//! The server runs on its own thread with a single-threaded tokio runtime and
//! talks to the control loop only through the shared [`RigContext`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tracing::{error, info, warn};

use crate::context::RigContext;
use crate::error::{RigError, RigResult};
use crate::remote::{self, GainsUpdate, NOT_FOUND, RemoteCommand, RemoteResponse};

type Params = Query<HashMap<String, String>>;

impl IntoResponse for RemoteResponse {
    fn into_response(self) -> Response {
        match self {
            RemoteResponse::Redirect(message) => {
                (StatusCode::FOUND, [(header::LOCATION, "/")], message).into_response()
            }
            RemoteResponse::Html(page) => Html(page).into_response(),
            RemoteResponse::Csv(rows) => {
                ([(header::CONTENT_TYPE, "text/plain")], rows).into_response()
            }
            RemoteResponse::Json(report) => Json(report).into_response(),
            RemoteResponse::Text(text) => text.into_response(),
        }
    }
}

/// Build the router over a shared context.
pub fn router(ctx: Arc<RigContext>) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/start", get(start_handler))
        .route("/stop", get(stop_handler))
        .route("/calibLow", get(calib_low_handler))
        .route("/calibHigh", get(calib_high_handler))
        .route("/setStrategy", get(set_strategy_handler))
        .route("/setPID", get(set_pid_handler))
        .route("/pollData", get(poll_data_handler))
        .route("/status", get(status_handler))
        .route("/download", get(download_handler))
        .fallback(not_found_handler)
        .with_state(ctx)
}

async fn home_handler(State(ctx): State<Arc<RigContext>>) -> RemoteResponse {
    remote::execute(&ctx, RemoteCommand::Home)
}

async fn start_handler(State(ctx): State<Arc<RigContext>>) -> RemoteResponse {
    remote::execute(&ctx, RemoteCommand::Start)
}

async fn stop_handler(State(ctx): State<Arc<RigContext>>) -> RemoteResponse {
    remote::execute(&ctx, RemoteCommand::Stop)
}

async fn calib_low_handler(State(ctx): State<Arc<RigContext>>) -> RemoteResponse {
    remote::execute(&ctx, RemoteCommand::CalibrateLow)
}

async fn calib_high_handler(State(ctx): State<Arc<RigContext>>) -> RemoteResponse {
    remote::execute(&ctx, RemoteCommand::CalibrateHigh)
}

async fn set_strategy_handler(
    State(ctx): State<Arc<RigContext>>,
    Query(params): Params,
) -> RemoteResponse {
    let strategy = remote::parse_strategy(params.get("value").map(String::as_str));
    remote::execute(&ctx, RemoteCommand::SetStrategy(strategy))
}

async fn set_pid_handler(
    State(ctx): State<Arc<RigContext>>,
    Query(params): Params,
) -> RemoteResponse {
    let arg = |name: &str| params.get(name).map(String::as_str);
    let update = GainsUpdate::parse(arg("p"), arg("i"), arg("d"));
    remote::execute(&ctx, RemoteCommand::SetGains(update))
}

async fn poll_data_handler(State(ctx): State<Arc<RigContext>>) -> RemoteResponse {
    remote::execute(&ctx, RemoteCommand::PollTelemetry)
}

async fn status_handler(State(ctx): State<Arc<RigContext>>) -> RemoteResponse {
    remote::execute(&ctx, RemoteCommand::Status)
}

async fn download_handler(State(ctx): State<Arc<RigContext>>) -> RemoteResponse {
    remote::execute(&ctx, RemoteCommand::Download)
}

async fn not_found_handler() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, NOT_FOUND)
}

/// Serve until Ctrl-C or until `shutdown` is set elsewhere.
///
/// Ctrl-C also sets `shutdown` so the control loop stops too.
pub async fn serve(ctx: Arc<RigContext>, addr: SocketAddr, shutdown: Arc<AtomicBool>) -> RigResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("remote surface listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("remote surface stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: Arc<AtomicBool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received, shutting down");
    };
    let stopped = async {
        while !shutdown.load(Ordering::Relaxed) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = stopped => {}
    }
    shutdown.store(true, Ordering::Relaxed);
}

/// Run [`serve`] on a dedicated thread.
pub fn spawn(
    ctx: Arc<RigContext>,
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<RigResult<()>> {
    thread::spawn(move || -> RigResult<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let result = runtime.block_on(serve(ctx, addr, Arc::clone(&shutdown)));
        if let Err(e) = &result {
            error!(error = %e, "remote surface failed");
            // Without a remote surface the rig cannot be stopped remotely.
            shutdown.store(true, Ordering::Relaxed);
        }
        result
    })
}

/// Wait for the server thread started by [`spawn`] and return how it ended.
pub fn join(handle: JoinHandle<RigResult<()>>) -> RigResult<()> {
    handle.join().unwrap_or(Err(RigError::ServerPanicked))
}
