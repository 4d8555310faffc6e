use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hearth_http::{DispatchHook, Request, StatusCode};
use tracing::warn;

/// Liveness feed driven by request dispatch.
///
/// Every dispatched request feeds the heartbeat; an external watchdog can
/// poll [`since_last_feed`](Heartbeat::since_last_feed). Server errors are
/// counted separately.
#[derive(Debug)]
pub struct Heartbeat {
    started: Instant,
    last_feed: Mutex<Option<Instant>>,
    served: AtomicU64,
    failed: AtomicU64,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            last_feed: Mutex::new(None),
            served: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    fn feed(&self) {
        let mut last = self.last_feed.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(Instant::now());
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time since the last dispatched request, `None` before the first.
    pub fn since_last_feed(&self) -> Option<Duration> {
        let last = self.last_feed.lock().unwrap_or_else(|e| e.into_inner());
        last.map(|at| at.elapsed())
    }

    /// Requests answered so far.
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Requests answered with a 5xx status.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DispatchHook for Heartbeat {
    async fn before(&self, _request: &Request) {
        self.feed();
    }

    async fn after(&self, request: &Request, status: StatusCode) {
        self.served.fetch_add(1, Ordering::Relaxed);
        if status.as_u16() >= 500 {
            self.failed.fetch_add(1, Ordering::Relaxed);
            warn!(method = %request.method, path = %request.path, %status, "request failed");
        }
        self.feed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_http::Method;

    #[tokio::test]
    async fn counts_requests_and_failures() {
        let hb = Heartbeat::new();
        assert!(hb.since_last_feed().is_none());

        let req = Request::new(Method::Get, "/health");
        hb.before(&req).await;
        hb.after(&req, StatusCode::OK).await;
        hb.before(&req).await;
        hb.after(&req, StatusCode::INTERNAL_SERVER_ERROR).await;

        assert_eq!(hb.served(), 2);
        assert_eq!(hb.failed(), 1);
        assert!(hb.since_last_feed().is_some());
    }
}
