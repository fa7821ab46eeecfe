use crate::{models::DiagnosticsResponse, AppState};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

#[derive(Default)]
struct ProcessUsage {
    cpu: f32,
    used: u64,
    free: u64,
    total: u64,
}

fn sample_usage() -> ProcessUsage {
    let monitor = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
    let Ok(mut sys) = monitor.lock() else {
        return ProcessUsage::default();
    };
    sys.refresh_cpu();
    sys.refresh_memory();
    ProcessUsage {
        cpu: sys.global_cpu_info().cpu_usage(),
        used: sys.used_memory(),
        free: sys.free_memory(),
        total: sys.total_memory(),
    }
}

/// Report sessions, connections and host resource usage
pub async fn diagnostics(
    State(app_state): State<Arc<AppState>>,
) -> (StatusCode, Json<DiagnosticsResponse>) {

    let stats = app_state.registry.stats().await;
    let n_conn = app_state.connections.load(Ordering::SeqCst);
    let usage = sample_usage();

    info!(
        "Diagnostics: CPU {:.2}%, mem {}/{} MB, {} connections, {} sessions ({} idle)",
        usage.cpu,
        usage.used / 1024 / 1024,
        usage.total / 1024 / 1024,
        n_conn,
        stats.sessions,
        stats.idle_sessions
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn,
            n_sessions: stats.sessions,
            n_idle_sessions: stats.idle_sessions,
            uptime_secs: app_state.started_at.elapsed().as_secs(),
            cpu_usage: usage.cpu,
            memory_alloc: usage.used,
            memory_total: usage.total,
            memory_free: usage.free,
        }),
    )
}
