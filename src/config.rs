//! Configuration module for uptrail.
//!
//! Run-level settings come from environment variables with sensible defaults.
//! The monitored services live in a YAML monitor file.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types. All of these abort the run.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("service {service}: method {method:?} not supported for {url}")]
    UnsupportedMethod {
        service: String,
        url: String,
        method: String,
    },
    #[error("service {service}: invalid response_regex for {url}: {source}")]
    InvalidRegex {
        service: String,
        url: String,
        #[source]
        source: regex::Error,
    },
    #[error("service name must not be empty")]
    EmptyServiceName,
}

/// Run configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Path to the YAML monitor file (default: "config.yaml")
    pub config_path: String,
    /// Path to the JSON log store (default: "data/uptrail_log.json")
    pub log_path: String,
    /// Maximum number of endpoints probed at once (default: 8)
    pub max_concurrency: usize,
    /// Upper bound of the random delay before a probe starts (default: 100)
    pub probe_jitter_ms: u64,
    /// Log per-attempt details (default: false)
    pub verbose: bool,
    /// Where to write the per-run result report, if anywhere
    pub report_path: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            config_path: "config.yaml".to_string(),
            log_path: "data/uptrail_log.json".to_string(),
            max_concurrency: 8,
            probe_jitter_ms: 100,
            verbose: false,
            report_path: None,
        }
    }
}

impl RunConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPTRAIL_CONFIG_PATH`: monitor file path (default: "config.yaml")
    /// - `UPTRAIL_LOG_PATH`: log store path (default: "data/uptrail_log.json")
    /// - `UPTRAIL_MAX_CONCURRENCY`: probe parallelism (default: 8)
    /// - `UPTRAIL_PROBE_JITTER_MS`: max start jitter (default: 100)
    /// - `UPTRAIL_VERBOSE`: `1` or `true` enables attempt details
    /// - `UPTRAIL_REPORT_PATH`: write this run's results as JSON (default: unset)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(path) = env::var("UPTRAIL_CONFIG_PATH") {
            cfg.config_path = path;
        }

        if let Ok(path) = env::var("UPTRAIL_LOG_PATH") {
            cfg.log_path = path;
        }

        if let Ok(n) = env::var("UPTRAIL_MAX_CONCURRENCY") {
            if let Ok(n) = n.parse::<usize>() {
                if n > 0 {
                    cfg.max_concurrency = n;
                }
            }
        }

        if let Ok(ms) = env::var("UPTRAIL_PROBE_JITTER_MS") {
            if let Ok(ms) = ms.parse() {
                cfg.probe_jitter_ms = ms;
            }
        }

        if let Ok(v) = env::var("UPTRAIL_VERBOSE") {
            cfg.verbose = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Ok(path) = env::var("UPTRAIL_REPORT_PATH") {
            if !path.is_empty() {
                cfg.report_path = Some(path);
            }
        }

        cfg
    }
}

fn default_timeout() -> u64 {
    5
}

fn default_max_retry_times() -> u32 {
    2
}

fn default_max_log_days() -> i64 {
    3
}

/// The monitor file.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Per-attempt timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_retry_times")]
    pub max_retry_times: u32,
    #[serde(default = "default_max_log_days")]
    pub max_log_days: i64,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// One endpoint as written in the monitor file.
///
/// The `parsed_*` fields carry values already expanded by the parameter
/// resolver; when absent the raw fields are sent as-is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub response_regex: String,
    #[serde(default)]
    pub parsed_url: Option<String>,
    #[serde(default)]
    pub parsed_headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub parsed_body: Option<String>,
    #[serde(default)]
    pub display_url: Option<String>,
    #[serde(default)]
    pub highlight_segments: Vec<HighlightSegment>,
}

/// A piece of the display URL, flagged when it came from a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSegment {
    pub text: String,
    #[serde(default)]
    pub is_param: bool,
}

/// HTTP methods a probe may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Get,
    Post,
    Put,
}

impl ProbeMethod {
    /// Parse a configured method. Empty means GET.
    pub fn parse(method: &str) -> Option<Self> {
        match method.trim().to_ascii_uppercase().as_str() {
            "" | "GET" => Some(ProbeMethod::Get),
            "POST" => Some(ProbeMethod::Post),
            "PUT" => Some(ProbeMethod::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMethod::Get => "GET",
            ProbeMethod::Post => "POST",
            ProbeMethod::Put => "PUT",
        }
    }
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated endpoint, ready to probe.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    /// Source URL as configured; keys the endpoint's history.
    pub url: String,
    /// URL actually requested.
    pub request_url: String,
    pub method: ProbeMethod,
    pub headers: BTreeMap<String, String>,
    /// Configured request body, kept for reporting.
    pub body: String,
    /// Body actually sent.
    pub request_body: String,
    pub expected_status: Option<u16>,
    pub response_regex: Option<Regex>,
    pub display_url: String,
    pub highlight_segments: Vec<HighlightSegment>,
}

impl ProbeTarget {
    /// Build a target with default expectations.
    #[cfg(test)]
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            request_url: url.to_string(),
            method: ProbeMethod::Get,
            headers: BTreeMap::new(),
            body: String::new(),
            request_body: String::new(),
            expected_status: None,
            response_regex: None,
            display_url: url.to_string(),
            highlight_segments: Vec::new(),
        }
    }

    pub fn is_https(&self) -> bool {
        self.request_url
            .get(..8)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
    }
}

/// A service and its validated targets.
#[derive(Debug, Clone)]
pub struct ServiceTargets {
    pub name: String,
    pub targets: Vec<ProbeTarget>,
}

impl MonitorConfig {
    /// Read and parse a monitor file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Check methods and regexes, and resolve request fields.
    pub fn validate(&self) -> Result<Vec<ServiceTargets>, ConfigError> {
        self.services
            .iter()
            .map(|svc| {
                if svc.name.trim().is_empty() {
                    return Err(ConfigError::EmptyServiceName);
                }
                let targets = svc
                    .endpoints
                    .iter()
                    .map(|ep| build_target(&svc.name, ep))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ServiceTargets {
                    name: svc.name.clone(),
                    targets,
                })
            })
            .collect()
    }
}

fn build_target(service: &str, ep: &EndpointConfig) -> Result<ProbeTarget, ConfigError> {
    let method = ProbeMethod::parse(&ep.method).ok_or_else(|| ConfigError::UnsupportedMethod {
        service: service.to_string(),
        url: ep.url.clone(),
        method: ep.method.clone(),
    })?;

    let response_regex = if ep.response_regex.is_empty() {
        None
    } else {
        let re = Regex::new(&ep.response_regex).map_err(|source| ConfigError::InvalidRegex {
            service: service.to_string(),
            url: ep.url.clone(),
            source,
        })?;
        Some(re)
    };

    let request_url = ep.parsed_url.clone().unwrap_or_else(|| ep.url.clone());
    let url = if ep.url.is_empty() {
        request_url.clone()
    } else {
        ep.url.clone()
    };

    // Highlight data only makes sense against the template URL.
    let (display_url, highlight_segments) = if ep.url.is_empty() {
        (request_url.clone(), Vec::new())
    } else {
        (
            ep.display_url.clone().unwrap_or_else(|| url.clone()),
            ep.highlight_segments.clone(),
        )
    };

    Ok(ProbeTarget {
        url,
        request_url,
        method,
        headers: ep.parsed_headers.clone().unwrap_or_else(|| ep.headers.clone()),
        body: ep.body.clone(),
        request_body: ep.parsed_body.clone().unwrap_or_else(|| ep.body.clone()),
        expected_status: (ep.status_code != 0).then_some(ep.status_code),
        response_regex,
        display_url,
        highlight_segments,
    })
}
