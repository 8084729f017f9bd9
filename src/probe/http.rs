//! HTTP transport for probe attempts.

use std::collections::BTreeMap;
use std::error::Error as _;
use std::future::Future;
use std::time::{Duration, Instant};

use super::AttemptError;
use crate::config::ProbeMethod;

/// One request to send.
#[derive(Debug, Clone, Copy)]
pub struct ProbeRequest<'a> {
    pub method: ProbeMethod,
    pub url: &'a str,
    pub headers: &'a BTreeMap<String, String>,
    pub body: &'a str,
}

/// A fully received response.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
    /// Time from sending the request until the body was read.
    pub latency: Duration,
}

/// Executes a single request-response cycle under a timeout.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: ProbeRequest<'_>,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProbeResponse, AttemptError>> + Send;
}

/// Transport backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("uptrail/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn send(
        &self,
        request: ProbeRequest<'_>,
        timeout: Duration,
    ) -> Result<ProbeResponse, AttemptError> {
        let method = match request.method {
            ProbeMethod::Get => reqwest::Method::GET,
            ProbeMethod::Post => reqwest::Method::POST,
            ProbeMethod::Put => reqwest::Method::PUT,
        };

        let mut builder = self.client.request(method, request.url).timeout(timeout);
        for (name, value) in request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.to_string());
        }

        let start = Instant::now();

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Timeout(timeout)
            } else {
                AttemptError::Network(describe(&e))
            }
        })?;

        let status = response.status().as_u16();

        // Read the full body to measure complete transfer time
        let body = response.text().await.map_err(|e| AttemptError::Body {
            status,
            message: describe(&e),
        })?;

        Ok(ProbeResponse {
            status,
            body,
            latency: start.elapsed(),
        })
    }
}

/// Render a reqwest error with its underlying causes.
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
