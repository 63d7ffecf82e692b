use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

use crate::{
    candidates::{self, StaticPool},
    config::{self, RunConfig},
    geo::CountryResolver,
    scheduler::{self, RunProgress},
    types::ProbeReport,
};

#[derive(Clone)]
pub struct AppState {
    resolver: Arc<dyn CountryResolver>,
    inner: Arc<RwLock<ServerState>>, // shared mutable state for progress/results
}

#[derive(Debug)]
struct ServerState {
    status: Status,
    report: Option<ProbeReport>,
    progress: Option<RunProgress>,
    cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Status {
    pub scanned: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub failed: u64,
    pub state: String, // "idle" | "running" | "done"
}

#[derive(Debug, Deserialize)]
pub struct ProbeRequest {
    /// Candidate list lines: plain IPs, `ip:port`, or CIDR blocks.
    pub candidates: Vec<String>,
    /// Comma-separated target countries, e.g. `"US,HK"`.
    pub countries: String,
    /// Comma-separated per-country counts, e.g. `"20,5"`.
    pub counts: String,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_candidates: Option<usize>,
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
}

pub async fn spawn_server(bind: &str, resolver: Arc<dyn CountryResolver>) -> Result<()> {
    let state = AppState {
        resolver,
        inner: Arc::new(RwLock::new(ServerState {
            status: Status {
                state: "idle".into(),
                ..Status::default()
            },
            report: None,
            progress: None,
            cancel: None,
        })),
    };

    let api = Router::new()
        .route("/status", get(get_status))
        .route("/probe", post(post_probe))
        .route("/results", get(get_results))
        .with_state(state.clone());

    let static_svc = ServeDir::new("ui").append_index_html_on_directories(true);

    let app = Router::new().nest("/api", api).fallback_service(static_svc);

    println!("Serving status UI on http://{}", bind);
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let out = if let Some(p) = s.progress.as_ref() {
        use std::sync::atomic::Ordering;
        Status {
            scanned: p.scanned.load(Ordering::Relaxed),
            accepted: p.accepted.load(Ordering::Relaxed),
            rejected: p.rejected.load(Ordering::Relaxed),
            failed: p.failed.load(Ordering::Relaxed),
            state: s.status.state.clone(),
        }
    } else {
        s.status.clone()
    };
    (StatusCode::OK, Json(out))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(report) = s.report.as_ref() {
        (StatusCode::OK, Json(report.clone())).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn post_probe(State(app): State<AppState>, Json(req): Json<ProbeRequest>) -> impl IntoResponse {
    let countries = match config::parse_countries_arg(&req.countries) {
        Ok(c) => c,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid countries: {e}")).into_response(),
    };
    let counts = match config::parse_counts_arg(&countries, &req.counts) {
        Ok(c) => c,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid counts: {e}")).into_response(),
    };

    let ports = if req.ports.is_empty() {
        vec![8443]
    } else {
        req.ports
    };

    let run_config = RunConfig {
        countries,
        counts,
        ports,
        max_concurrent: req.concurrency.unwrap_or(30),
        timeout: Duration::from_millis(req.timeout_ms.unwrap_or(5_000)),
        max_candidates: req.max_candidates.unwrap_or(0),
        max_latency_ms: req.max_latency_ms.unwrap_or(0),
    };
    if let Err(e) = run_config.validate() {
        return (StatusCode::BAD_REQUEST, format!("invalid config: {e}")).into_response();
    }

    let pool = candidates::parse_candidates_str(
        &req.candidates.join("\n"),
        candidates::DEFAULT_CIDR_SAMPLES,
    );
    if pool.is_empty() {
        return (StatusCode::BAD_REQUEST, "no usable candidates".to_string()).into_response();
    }

    let progress = RunProgress::new();
    let cancel = CancellationToken::new();

    {
        let mut s = app.inner.write().await;
        // Cancel any run already in flight
        if let Some(c) = s.cancel.take() {
            c.cancel();
        }
        s.status = Status {
            state: "running".into(),
            ..Status::default()
        };
        s.report = None;
        s.progress = Some(progress.clone());
        s.cancel = Some(cancel.clone());
    }

    let app2 = app.clone();
    tokio::spawn(async move {
        let mut source = StaticPool::new(pool);
        let res = scheduler::run_probe_scan_with_shared(
            &mut source,
            app2.resolver.clone(),
            &run_config,
            cancel.clone(),
            progress.clone(),
        )
        .await;

        let mut s = app2.inner.write().await;
        match res {
            Ok(report) => {
                s.status = Status {
                    scanned: report.scanned,
                    accepted: report.accepted,
                    rejected: report.rejected,
                    failed: report.failed,
                    state: "done".into(),
                };
                s.report = Some(report);
                s.progress = None;
                s.cancel = None;
            }
            Err(e) => {
                s.status.state = "idle".into();
                s.progress = None;
                s.cancel = None;
                eprintln!("probe run error: {e}");
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(Status {
            state: "running".into(),
            ..Status::default()
        }),
    )
        .into_response()
}
