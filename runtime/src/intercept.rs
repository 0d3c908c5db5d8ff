//! Interception controller: drive a browser session to a page and capture one
//! JSON response fired by the page's own scripts.
//!
//! Waiting is layered in increasing aggressiveness: an event-driven wait on
//! the capture signal, a bounded poll, then one scroll nudge and a final
//! short wait. The session is closed on every exit path.

use crate::capture::CaptureSignal;
use crate::error::CaptureError;
use crate::renderer::{RenderContext, Renderer, ResponseObserver};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const SCROLL_NUDGE_JS: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Timing of the post-navigation wait stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Event-driven wait for the first matching response.
    pub direct_wait: Duration,
    /// Interval of the polling stage.
    pub poll_interval: Duration,
    /// Upper bound of the polling stage.
    pub poll_ceiling: Duration,
    /// Final wait after the scroll nudge.
    pub nudge_wait: Duration,
    /// How often the polling stage reports progress.
    pub progress_log_every: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            direct_wait: Duration::from_secs(20),
            poll_interval: Duration::from_millis(200),
            poll_ceiling: Duration::from_secs(15),
            nudge_wait: Duration::from_secs(3),
            progress_log_every: Duration::from_secs(2),
        }
    }
}

/// Captures responses through a [`Renderer`]; each call gets its own session.
#[derive(Clone)]
pub struct Interceptor {
    renderer: Arc<dyn Renderer>,
    policy: WaitPolicy,
}

impl Interceptor {
    pub fn new(renderer: Arc<dyn Renderer>, policy: WaitPolicy) -> Self {
        Self { renderer, policy }
    }

    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Navigate to `page_url` and return the first 200 response whose URL
    /// contains `pattern`, decoded as JSON.
    pub async fn intercept(
        &self,
        page_url: &str,
        pattern: &str,
        timeout_ms: u64,
        settle_delay_ms: u64,
    ) -> Result<Value, CaptureError> {
        let signal = Arc::new(CaptureSignal::new());
        let observer = ResponseObserver::new(pattern, Arc::clone(&signal));

        info!("intercepting {pattern} from {page_url}");
        let mut ctx = self
            .renderer
            .launch(observer)
            .await
            .map_err(|e| CaptureError::Launch(format!("{e:#}")))?;

        let outcome = self
            .drive(ctx.as_mut(), &signal, page_url, timeout_ms, settle_delay_ms)
            .await;

        if let Err(e) = ctx.close().await {
            warn!("failed to close browser session: {e:#}");
        }

        match &outcome {
            Ok(_) => info!("captured {pattern} from {page_url}"),
            Err(e) => warn!("capture from {page_url} failed: {e}"),
        }
        outcome
    }

    async fn drive(
        &self,
        ctx: &mut dyn RenderContext,
        signal: &CaptureSignal,
        page_url: &str,
        timeout_ms: u64,
        settle_delay_ms: u64,
    ) -> Result<Value, CaptureError> {
        let started = Instant::now();

        match ctx.navigate(page_url, timeout_ms).await {
            Ok(nav) => debug!("loaded {} in {}ms", nav.final_url, nav.load_time_ms),
            Err(e) => {
                if let Some(captured) = signal.get() {
                    warn!("navigation error after capture, keeping captured response: {e:#}");
                    return Ok(captured);
                }
                return Err(CaptureError::Navigation(format!("{e:#}")));
            }
        }

        if settle_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(settle_delay_ms)).await;
        }
        if let Some(captured) = signal.get() {
            return Ok(captured);
        }

        debug!(
            "waiting up to {}ms for a matching response",
            self.policy.direct_wait.as_millis()
        );
        if let Some(captured) = signal.wait(self.policy.direct_wait).await {
            return Ok(captured);
        }

        let poll_started = Instant::now();
        let mut last_report = poll_started;
        while poll_started.elapsed() < self.policy.poll_ceiling {
            tokio::time::sleep(self.policy.poll_interval).await;
            if let Some(captured) = signal.get() {
                return Ok(captured);
            }
            if last_report.elapsed() >= self.policy.progress_log_every {
                info!(
                    "still waiting for {page_url} ({}s)",
                    poll_started.elapsed().as_secs()
                );
                last_report = Instant::now();
            }
        }

        debug!("no response yet, nudging page with a scroll");
        if let Err(e) = ctx.execute_js(SCROLL_NUDGE_JS).await {
            debug!("scroll nudge failed: {e:#}");
        }
        if let Some(captured) = signal.wait(self.policy.nudge_wait).await {
            return Ok(captured);
        }

        Err(CaptureError::Timeout {
            waited_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.direct_wait, Duration::from_secs(20));
        assert_eq!(policy.poll_interval, Duration::from_millis(200));
        assert_eq!(policy.poll_ceiling, Duration::from_secs(15));
        assert_eq!(policy.nudge_wait, Duration::from_secs(3));
    }
}
