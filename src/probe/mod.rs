//! Probe module for endpoint monitoring.
//!
//! Drives the retry loop for one endpoint over an HTTP transport, with
//! optional certificate inspection for HTTPS targets.

mod cert;
mod evaluate;
mod http;

pub use cert::*;
pub use evaluate::*;
pub use http::*;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;

use crate::config::{HighlightSegment, ProbeTarget};
use crate::status::Health;

/// Errors from a single attempt. These are retried, never propagated.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Network(String),
    #[error("failed to read body: {message}")]
    Body { status: u16, message: String },
}

impl AttemptError {
    /// Human-readable failure detail recorded on the endpoint result.
    pub fn detail(&self) -> String {
        match self {
            AttemptError::Body { status, message } => {
                format!("StatusCode: {}, Error: {}", status, message)
            }
            other => format!("StatusCode: N/A, Error: {}", other),
        }
    }
}

/// How much attempt-level detail the prober logs.
///
/// Request lines and success details can carry secrets in URLs, so they are
/// only emitted in `Verbose` mode. Failures are always logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeLog {
    #[default]
    Quiet,
    Verbose,
}

/// Outcome of probing one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointResult {
    pub url: String,
    pub method: String,
    /// Configured request body.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
    pub status: Health,
    /// Status code of the last received response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Largest latency among successful attempts.
    #[serde(rename = "response_time_ms", serialize_with = "as_millis")]
    pub response_time: Duration,
    pub attempt_num: u32,
    pub success_num: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failure_details: Vec<String>,
    /// Body of the last failed attempt; cleared on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    pub is_https: bool,
    pub cert_remaining_days: i64,
    pub is_cert_expired: bool,
    pub display_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub highlight_segments: Vec<HighlightSegment>,
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl EndpointResult {
    /// A result for an endpoint whose probe never ran to completion.
    pub fn aborted(target: &ProbeTarget, detail: String) -> Self {
        let now = Utc::now();
        Self {
            url: target.url.clone(),
            method: target.method.to_string(),
            body: target.body.clone(),
            status: Health::Down,
            status_code: None,
            start_time: now,
            end_time: now,
            response_time: Duration::ZERO,
            attempt_num: 0,
            success_num: 0,
            failure_details: vec![detail],
            response_body: None,
            is_https: false,
            cert_remaining_days: 0,
            is_cert_expired: false,
            display_url: target.display_url.clone(),
            highlight_segments: target.highlight_segments.clone(),
        }
    }
}

/// Probes endpoints with retries.
#[derive(Debug, Clone)]
pub struct Prober<T, C> {
    transport: T,
    inspector: C,
    log: ProbeLog,
}

impl<T: Transport, C: CertInspector> Prober<T, C> {
    pub fn new(transport: T, inspector: C, log: ProbeLog) -> Self {
        Self {
            transport,
            inspector,
            log,
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Probe one endpoint, making up to `max_retries` attempts and stopping
    /// at the first success.
    pub async fn probe(
        &self,
        service: &str,
        target: &ProbeTarget,
        timeout: Duration,
        max_retries: u32,
    ) -> EndpointResult {
        let mut failure_details = Vec::new();
        let mut attempt_num = 0;
        let mut success_num = 0;
        let mut status_code = None;
        let mut response_body = None;
        let mut max_response_time = Duration::ZERO;

        let mut is_https = target.is_https();
        let mut cert_remaining_days = 0;
        let mut is_cert_expired = false;

        if is_https {
            match self.inspector.inspect(&target.request_url, timeout).await {
                Ok(cert) => {
                    cert_remaining_days = cert.days_remaining;
                    is_cert_expired = cert.expired;
                    if self.log == ProbeLog::Verbose {
                        tracing::info!(
                            "[{}] certificate for {}: {} days remaining, expired: {}",
                            service,
                            target.request_url,
                            cert.days_remaining,
                            cert.expired
                        );
                    }
                }
                Err(e) => {
                    is_https = false;
                    tracing::warn!(
                        "[{}] certificate check failed for {}: {}",
                        service,
                        target.url,
                        e
                    );
                    failure_details.push(format!("SSL Certificate Error: {}", e));
                }
            }
        }

        let request = ProbeRequest {
            method: target.method,
            url: &target.request_url,
            headers: &target.headers,
            body: &target.request_body,
        };

        let start_time = Utc::now();
        for attempt in 1..=max_retries {
            attempt_num += 1;
            if self.log == ProbeLog::Verbose {
                tracing::info!(
                    "[{}] {} {} (attempt {}/{})",
                    service,
                    target.method,
                    target.request_url,
                    attempt,
                    max_retries
                );
            }

            let response = match self.transport.send(request, timeout).await {
                Ok(response) => response,
                Err(e) => {
                    if let AttemptError::Body { status, .. } = &e {
                        status_code = Some(*status);
                    }
                    tracing::warn!("[{}] FAILED {} - {}", service, target.url, e.detail());
                    failure_details.push(e.detail());
                    continue;
                }
            };

            status_code = Some(response.status);

            if evaluate(
                target.expected_status,
                target.response_regex.as_ref(),
                response.status,
                &response.body,
            ) {
                success_num += 1;
                max_response_time = max_response_time.max(response.latency);
                response_body = None;
                if self.log == ProbeLog::Verbose {
                    tracing::info!(
                        "[{}] SUCCESS {} {} (attempt {}/{}) - Response Time: {} ms, Status Code: {}",
                        service,
                        target.method,
                        target.request_url,
                        attempt,
                        max_retries,
                        response.latency.as_millis(),
                        response.status
                    );
                }
                break;
            }

            let detail = format!("StatusCode or ResponseRegex mismatch: {}", response.status);
            tracing::warn!("[{}] FAILED {} - {}", service, target.url, detail);
            failure_details.push(detail);
            response_body = Some(response.body);
        }
        let end_time = Utc::now();

        EndpointResult {
            url: target.url.clone(),
            method: target.method.to_string(),
            body: target.body.clone(),
            status: if success_num > 0 { Health::Up } else { Health::Down },
            status_code,
            start_time,
            end_time,
            response_time: max_response_time,
            attempt_num,
            success_num,
            failure_details,
            response_body,
            is_https,
            cert_remaining_days,
            is_cert_expired,
            display_url: target.display_url.clone(),
            highlight_segments: target.highlight_segments.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport and inspector for exercising the prober offline.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays canned outcomes in order; fails with a network error once
    /// the script runs out.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Result<ProbeResponse, AttemptError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        pub fn new(script: Vec<Result<ProbeResponse, AttemptError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub fn ok(status: u16, body: &str, latency_ms: u64) -> Result<ProbeResponse, AttemptError> {
        Ok(ProbeResponse {
            status,
            body: body.to_string(),
            latency: Duration::from_millis(latency_ms),
        })
    }

    pub fn refused() -> Result<ProbeResponse, AttemptError> {
        Err(AttemptError::Network("connection refused".to_string()))
    }

    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            _request: ProbeRequest<'_>,
            _timeout: Duration,
        ) -> Result<ProbeResponse, AttemptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(refused)
        }
    }

    /// Returns a fixed certificate status, or fails when `None`.
    #[derive(Debug, Clone, Copy)]
    pub struct FixedInspector(pub Option<CertStatus>);

    impl CertInspector for FixedInspector {
        async fn inspect(&self, _url: &str, _timeout: Duration) -> Result<CertStatus, CertError> {
            self.0.ok_or(CertError::NoCertificate)
        }
    }
}
