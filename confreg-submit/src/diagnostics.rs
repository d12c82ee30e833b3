//! Network diagnostics
//!
//! Answers "why did my registration end up queued?" by checking, in order:
//! the store API probe, plain reachability of the store base URL, and an
//! optional external URL that separates a store outage from no network at
//! all. Never fails; every outcome is a [`DiagnosticCheck`].

use chrono::{DateTime, Utc};
use confreg_common::time;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;

use crate::primary::ConnectivityProbe;

/// One diagnostic check result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticCheck {
    pub test: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Full diagnostics run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsReport {
    pub timestamp: DateTime<Utc>,
    pub tests: Vec<DiagnosticCheck>,
}

impl DiagnosticsReport {
    pub fn all_passed(&self) -> bool {
        self.tests.iter().all(|t| t.success)
    }
}

/// Diagnostics runner
#[derive(Clone)]
pub struct NetworkDiagnostics {
    probe: ConnectivityProbe,
    base_url: String,
    external_url: Option<String>,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl NetworkDiagnostics {
    pub fn new(
        probe: ConnectivityProbe,
        base_url: impl Into<String>,
        external_url: Option<String>,
        http_client: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        Self {
            probe,
            base_url: base_url.into(),
            external_url,
            http_client,
            timeout,
        }
    }

    pub async fn run(&self) -> DiagnosticsReport {
        info!("Running network diagnostics");

        let mut tests = Vec::with_capacity(3);

        let probe = self.probe.check().await;
        tests.push(DiagnosticCheck {
            test: "Store API probe".to_string(),
            success: probe.reachable,
            status: probe
                .detail
                .strip_prefix("HTTP ")
                .and_then(|s| s.parse().ok()),
            error: (!probe.reachable).then(|| probe.detail.clone()),
            elapsed_ms: probe.elapsed_ms,
        });

        tests.push(self.timed_head("Base URL reachability", &self.base_url).await);

        if let Some(url) = &self.external_url {
            tests.push(self.timed_head("External connectivity", url).await);
        }

        let report = DiagnosticsReport {
            timestamp: time::now(),
            tests,
        };
        info!(passed = report.all_passed(), "Network diagnostics finished");
        report
    }

    /// HEAD request; any answer below 500 counts as reachable
    async fn timed_head(&self, test: &str, url: &str) -> DiagnosticCheck {
        let start = Instant::now();
        let result = self.http_client.head(url).timeout(self.timeout).send().await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                DiagnosticCheck {
                    test: test.to_string(),
                    success: status < 500,
                    status: Some(status),
                    error: None,
                    elapsed_ms,
                }
            }
            Err(e) => DiagnosticCheck {
                test: test.to_string(),
                success: false,
                status: None,
                error: Some(e.to_string()),
                elapsed_ms,
            },
        }
    }
}
