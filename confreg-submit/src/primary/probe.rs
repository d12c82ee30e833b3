//! Connectivity Probe
//!
//! Cheap pre-flight check so the submitter does not burn its retry budget
//! against a store that is down or refusing us. A success status or 404
//! (what `HEAD /rest/v1/` usually returns) means reachable. Anything else,
//! including 401/403 from a bad key, and transport errors or timeouts mean
//! unreachable.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::PrimaryStore;

/// Default probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one reachability check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub reachable: bool,
    /// HTTP status or failure description
    pub detail: String,
    pub elapsed_ms: u64,
}

/// Reachability check against the primary store
#[derive(Clone)]
pub struct ConnectivityProbe {
    store: Arc<dyn PrimaryStore>,
    timeout: Duration,
}

impl ConnectivityProbe {
    pub fn new(store: Arc<dyn PrimaryStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the check. Never fails: every outcome is a [`ProbeReport`].
    ///
    /// The timeout is enforced here as well as on the request itself, so a
    /// store implementation that ignores it still cannot hang the caller.
    pub async fn check(&self) -> ProbeReport {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.store.ping(self.timeout)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let (reachable, detail) = match result {
            Ok(Ok(status)) if is_reachable_status(status) => (true, format!("HTTP {}", status)),
            Ok(Ok(status)) => (false, format!("HTTP {}", status)),
            Ok(Err(e)) => (false, e.to_string()),
            Err(_) => (
                false,
                format!("no response within {} ms", self.timeout.as_millis()),
            ),
        };

        tracing::debug!(reachable, detail = %detail, elapsed_ms, "Connectivity probe finished");

        ProbeReport {
            reachable,
            detail,
            elapsed_ms,
        }
    }
}

/// 2xx or 404 Not Found
fn is_reachable_status(status: u16) -> bool {
    (200..300).contains(&status) || status == 404
}
