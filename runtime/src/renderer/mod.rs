//! Renderer abstraction for browser sessions that observe network responses.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). Every launch
//! is an isolated session whose response traffic is fed to a `ResponseObserver`.

pub mod chromium;
pub mod listener;
pub mod proxy;

use crate::capture::CaptureSignal;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub use proxy::ProxySettings;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Session-wide launch settings.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    pub user_agent: Option<String>,
    pub proxy: Option<ProxySettings>,
}

/// Decides which responses are captured and stores the first decoded match.
#[derive(Debug, Clone)]
pub struct ResponseObserver {
    pattern: String,
    signal: Arc<CaptureSignal>,
}

impl ResponseObserver {
    /// Observe responses whose URL contains `pattern` (case-insensitive).
    pub fn new(pattern: &str, signal: Arc<CaptureSignal>) -> Self {
        Self {
            pattern: pattern.to_lowercase(),
            signal,
        }
    }

    /// Whether a response with this URL and status should be captured.
    pub fn matches(&self, url: &str, status: u16) -> bool {
        status == 200 && url.to_lowercase().contains(&self.pattern)
    }

    /// True once something has been captured; observers can stop listening.
    pub fn is_satisfied(&self) -> bool {
        self.signal.is_captured()
    }

    /// Decode a matching body as JSON and offer it to the signal.
    pub fn offer_body(&self, url: &str, body: &str) -> bool {
        match serde_json::from_str(body) {
            Ok(value) => {
                let accepted = self.signal.offer(value);
                if accepted {
                    info!("captured response from {url}");
                }
                accepted
            }
            Err(e) => {
                warn!("matching response from {url} is not JSON: {e}");
                false
            }
        }
    }
}

/// A browser engine that launches isolated sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Launch a fresh session that reports responses to `observer`.
    async fn launch(&self, observer: ResponseObserver) -> Result<Box<dyn RenderContext>>;
    /// Number of sessions launched and not yet closed.
    fn active_sessions(&self) -> usize;
}

/// One live browser session.
#[async_trait]
pub trait RenderContext: Send {
    /// Navigate to a URL and wait for the load event, bounded by `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Tear the whole session down.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A renderer used when Chromium is unavailable. Launching always fails,
/// so browser-mode harvests report a capture error instead of running.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn launch(&self, _observer: ResponseObserver) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("Browser not available: no Chromium found"))
    }
    fn active_sessions(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_matching() {
        let observer = ResponseObserver::new("/Info/Container", Arc::new(CaptureSignal::new()));
        assert!(observer.matches("https://csqaq.com/proxies/api/v1/info/container_data_info", 200));
        assert!(!observer.matches("https://csqaq.com/proxies/api/v1/info/container_data_info", 304));
        assert!(!observer.matches("https://csqaq.com/static/app.js", 200));
    }

    #[test]
    fn test_observer_first_body_wins() {
        let signal = Arc::new(CaptureSignal::new());
        let observer = ResponseObserver::new("api", Arc::clone(&signal));
        assert!(!observer.offer_body("u", "<html>"));
        assert!(!observer.is_satisfied());
        assert!(observer.offer_body("u", r#"{"data": [1]}"#));
        assert!(!observer.offer_body("u", r#"{"data": [2]}"#));
        assert_eq!(signal.get().unwrap()["data"][0], 1);
    }

    #[tokio::test]
    async fn test_noop_renderer_fails_to_launch() {
        let observer = ResponseObserver::new("x", Arc::new(CaptureSignal::new()));
        assert!(NoopRenderer.launch(observer).await.is_err());
        assert_eq!(NoopRenderer.active_sessions(), 0);
    }
}
