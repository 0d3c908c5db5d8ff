//! Chromium-based renderer using chromiumoxide.
//!
//! Each launch starts its own Chromium process with a throwaway profile, so
//! sessions never share cookies or cached responses.

use super::listener::{listen_for_responses, ResponseBody, ResponseSeen};
use super::{LaunchOptions, NavigationResult, RenderContext, Renderer, ResponseObserver};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::auth::Credentials;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventResponseReceived,
    GetResponseBodyParams, RequestId,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. CASE_HARVEST_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("CASE_HARVEST_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 3. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer. Holds launch settings only; every session is a new process.
pub struct ChromiumRenderer {
    options: LaunchOptions,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    pub fn new(options: LaunchOptions) -> Self {
        Self {
            options,
            active_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn browser_config(&self, profile_dir: &PathBuf) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile_dir)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");

        if let Some(path) = find_chromium() {
            builder = builder.chrome_executable(path);
        }
        if !self.options.headless {
            builder = builder.with_head();
        }
        if let Some(proxy) = &self.options.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.server));
        }

        builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn launch(&self, observer: ResponseObserver) -> Result<Box<dyn RenderContext>> {
        let profile_dir =
            std::env::temp_dir().join(format!("case-harvest-{}", uuid::Uuid::new_v4()));
        let config = self.browser_config(&profile_dir)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        // From here on the context owns the process; dropping it cleans up.
        let mut ctx = ChromiumContext {
            browser: Some(browser),
            page: None,
            handler_task,
            listener_task: None,
            profile_dir,
            active_count: Arc::clone(&self.active_count),
        };
        self.active_count.fetch_add(1, Ordering::Relaxed);

        let page = ctx
            .browser
            .as_ref()
            .context("browser already closed")?
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        if let Some(ua) = &self.options.user_agent {
            page.set_user_agent(ua.as_str())
                .await
                .context("failed to set user agent")?;
        }
        if let Some(proxy) = &self.options.proxy {
            if let (Some(username), Some(password)) = (&proxy.username, &proxy.password) {
                page.authenticate(Credentials {
                    username: username.clone(),
                    password: password.clone(),
                })
                .await
                .context("failed to set proxy credentials")?;
            }
        }

        page.execute(EnableParams::default())
            .await
            .context("failed to enable network events")?;
        let listener = spawn_response_listener(page.clone(), observer).await?;

        ctx.page = Some(page);
        ctx.listener_task = Some(listener);
        Ok(Box::new(ctx))
    }

    fn active_sessions(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// Watch response traffic; fetch the body of matching responses once they finish loading.
async fn spawn_response_listener(
    page: Page,
    observer: ResponseObserver,
) -> Result<JoinHandle<()>> {
    let responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .context("failed to subscribe to responses")?
        .map(|event| ResponseSeen {
            request_id: event.request_id.inner().clone(),
            url: event.response.url.clone(),
            status: u16::try_from(event.response.status).unwrap_or(0),
        })
        .boxed();
    let finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .context("failed to subscribe to loading events")?
        .map(|event| event.request_id.inner().clone())
        .boxed();
    let failed = page
        .event_listener::<EventLoadingFailed>()
        .await
        .context("failed to subscribe to loading failures")?
        .map(|event| event.request_id.inner().clone())
        .boxed();

    Ok(tokio::spawn(listen_for_responses(
        responses,
        finished,
        failed,
        observer,
        move |request_id| {
            let page = page.clone();
            async move {
                let resp = page
                    .execute(GetResponseBodyParams::new(RequestId::new(request_id)))
                    .await?;
                Ok(ResponseBody {
                    body: resp.result.body.clone(),
                    base64_encoded: resp.result.base64_encoded,
                })
            }
        },
    )))
}

/// A single Chromium session: process, handler task, page and response listener.
pub struct ChromiumContext {
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    listener_task: Option<JoinHandle<()>>,
    profile_dir: PathBuf,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumContext {
    fn page(&self) -> Result<&Page> {
        self.page.as_ref().context("page already closed")
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();
        let page = self.page()?;

        let result = tokio::time::timeout(Duration::from_millis(timeout_ms), page.goto(url)).await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        if let Some(listener) = self.listener_task.take() {
            listener.abort();
        }
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }
        let mut outcome = Ok(());
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                outcome = Err(anyhow::anyhow!("failed to close browser: {e}"));
                let _ = browser.kill().await;
            }
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
        let _ = tokio::fs::remove_dir_all(&self.profile_dir).await;
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        debug!("browser session closed");
        outcome
    }
}

impl Drop for ChromiumContext {
    fn drop(&mut self) {
        // `close` takes the browser; if it is still here the caller skipped it.
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        warn!("browser session dropped without close, cleaning up in background");
        if let Some(listener) = self.listener_task.take() {
            listener.abort();
        }
        self.handler_task.abort();
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let profile_dir = std::mem::take(&mut self.profile_dir);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = browser.kill().await;
                let _ = browser.wait().await;
                let _ = tokio::fs::remove_dir_all(&profile_dir).await;
            });
        }
    }
}
