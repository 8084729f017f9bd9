//! Scheduler module for running a probe pass and recording its results.

mod retention;

pub use retention::*;

use crate::config::{ConfigError, MonitorConfig, RunConfig, ServiceTargets};
use crate::history::StoreError;
use crate::probe::{
    CertError, CertInspector, EndpointResult, HttpTransport, ProbeLog, Prober, TlsInspector,
    Transport,
};
use crate::status::Health;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error(transparent)]
    Cert(#[from] CertError),
    #[error("failed to write report: {0}")]
    Report(#[from] std::io::Error),
}

/// Outcome of probing all endpoints of one service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceResult {
    pub name: String,
    pub status: Health,
    pub endpoints: Vec<EndpointResult>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub attempt_num: u32,
    pub success_num: u32,
}

impl ServiceResult {
    pub fn from_endpoints(
        name: String,
        start_time: DateTime<Utc>,
        endpoints: Vec<EndpointResult>,
    ) -> Self {
        let status = Health::merge(endpoints.iter().map(|ep| ep.status));
        let end_time = endpoints
            .iter()
            .map(|ep| ep.end_time)
            .max()
            .map_or(start_time, |end| end.max(start_time));

        Self {
            name,
            status,
            start_time,
            end_time,
            attempt_num: endpoints.iter().map(|ep| ep.attempt_num).sum(),
            success_num: endpoints.iter().map(|ep| ep.success_num).sum(),
            endpoints,
        }
    }
}

/// Settings shared by every probe in a pass.
#[derive(Debug, Clone, Copy)]
pub struct PassSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub max_concurrency: usize,
    pub jitter_ms: u64,
}

/// Probe every endpoint of every service with bounded parallelism.
///
/// All probes are joined before returning; results keep configured order.
pub async fn run_pass<T, C>(
    prober: Arc<Prober<T, C>>,
    services: &[ServiceTargets],
    settings: PassSettings,
) -> Vec<ServiceResult>
where
    T: Transport + 'static,
    C: CertInspector + 'static,
{
    let semaphore = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));

    let mut pending = Vec::with_capacity(services.len());
    for service in services {
        let start_time = Utc::now();
        let handles: Vec<JoinHandle<EndpointResult>> = service
            .targets
            .iter()
            .map(|target| {
                let prober = prober.clone();
                let semaphore = semaphore.clone();
                let target = target.clone();
                let name = service.name.clone();

                tokio::spawn(async move {
                    // Add jitter to avoid thundering herd
                    if settings.jitter_ms > 0 {
                        let jitter = rand::random::<u64>() % settings.jitter_ms;
                        tokio::time::sleep(Duration::from_millis(jitter)).await;
                    }

                    // Hold permit until done
                    let _permit = semaphore.acquire_owned().await.ok();
                    prober
                        .probe(&name, &target, settings.timeout, settings.max_retries)
                        .await
                })
            })
            .collect();
        pending.push((service, start_time, handles));
    }

    let mut results = Vec::with_capacity(pending.len());
    for (service, start_time, handles) in pending {
        let mut endpoints = Vec::with_capacity(handles.len());
        for (target, handle) in service.targets.iter().zip(handles) {
            match handle.await {
                Ok(result) => endpoints.push(result),
                Err(e) => {
                    tracing::error!(
                        "Probe task for {} ({}) failed: {}",
                        service.name,
                        target.url,
                        e
                    );
                    endpoints.push(EndpointResult::aborted(target, format!("Error: {}", e)));
                }
            }
        }

        let result = ServiceResult::from_endpoints(service.name.clone(), start_time, endpoints);
        tracing::info!(
            "{}: {} ({}/{} attempts succeeded)",
            result.name,
            result.status,
            result.success_num,
            result.attempt_num
        );
        results.push(result);
    }

    results
}

/// Perform one full pass: load config, probe, and update the log store.
pub async fn run(cfg: &RunConfig) -> Result<Vec<ServiceResult>, RunError> {
    tracing::info!("Reading config from {}", cfg.config_path);
    let monitor = MonitorConfig::from_file(&cfg.config_path)?;
    let services = monitor.validate()?;

    let log = if cfg.verbose {
        ProbeLog::Verbose
    } else {
        ProbeLog::Quiet
    };
    let prober = Arc::new(Prober::new(HttpTransport::new()?, TlsInspector::new()?, log));

    let settings = PassSettings {
        timeout: monitor.timeout(),
        max_retries: monitor.max_retry_times,
        max_concurrency: cfg.max_concurrency,
        jitter_ms: cfg.probe_jitter_ms,
    };

    let endpoint_count: usize = services.iter().map(|s| s.targets.len()).sum();
    tracing::info!(
        "Starting pass over {} services ({} endpoints)",
        services.len(),
        endpoint_count
    );

    let results = run_pass(prober, &services, settings).await;

    let count = |health: Health| results.iter().filter(|r| r.status == health).count();
    tracing::info!(
        "Pass complete: {} up, {} partial, {} down",
        count(Health::Up),
        count(Health::Partial),
        count(Health::Down)
    );

    update_log(&cfg.log_path, &results, monitor.max_log_days)?;

    if let Some(path) = &cfg.report_path {
        write_report(path, &results)?;
        tracing::info!("Wrote run report to {}", path);
    }

    Ok(results)
}

/// Write this run's service results as pretty JSON.
fn write_report<P: AsRef<Path>>(path: P, results: &[ServiceResult]) -> Result<(), std::io::Error> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_vec_pretty(results)?;
    fs::write(path, content)
}
