//! Response listener loop, independent of the browser engine.
//!
//! The engine reports three event kinds per request on separate streams, so
//! their relative order is not guaranteed. The loop pairs them by request id
//! in whichever order they arrive.

use super::ResponseObserver;
use anyhow::{Context, Result};
use base64::Engine;
use futures::{Stream, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use tracing::{debug, warn};

/// Finished request ids remembered while their response event is still outstanding.
const EARLY_FINISH_CAPACITY: usize = 512;

/// A response header arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSeen {
    pub request_id: String,
    pub url: String,
    pub status: u16,
}

/// A response body as the engine returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBody {
    pub body: String,
    pub base64_encoded: bool,
}

impl ResponseBody {
    pub fn into_text(self) -> Result<String> {
        if !self.base64_encoded {
            return Ok(self.body);
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.body.as_bytes())
            .context("undecodable base64 body")?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Bounded set of ids that finished before their response was seen.
#[derive(Default)]
struct EarlyFinishes {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl EarlyFinishes {
    fn insert(&mut self, id: String) {
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > EARLY_FINISH_CAPACITY {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
    }

    fn take(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            self.order.retain(|x| x != id);
            true
        } else {
            false
        }
    }
}

/// Feed matching response bodies to `observer` until it is satisfied or every
/// stream ends. `fetch_body` is called once per matching, finished request.
pub async fn listen_for_responses<R, F, X, B, Fut>(
    mut responses: R,
    mut finished: F,
    mut failed: X,
    observer: ResponseObserver,
    mut fetch_body: B,
) where
    R: Stream<Item = ResponseSeen> + Unpin,
    F: Stream<Item = String> + Unpin,
    X: Stream<Item = String> + Unpin,
    B: FnMut(String) -> Fut,
    Fut: Future<Output = Result<ResponseBody>>,
{
    // request id → URL, for matches whose body is not complete yet
    let mut pending: HashMap<String, String> = HashMap::new();
    let mut early = EarlyFinishes::default();

    loop {
        let ready = tokio::select! {
            biased;

            Some(seen) = responses.next() => {
                if !observer.matches(&seen.url, seen.status) {
                    continue;
                }
                debug!("matching response {} {}", seen.status, seen.url);
                if early.take(&seen.request_id) {
                    Some((seen.request_id, seen.url))
                } else {
                    pending.insert(seen.request_id, seen.url);
                    None
                }
            }
            Some(id) = finished.next() => {
                match pending.remove(&id) {
                    Some(url) => Some((id, url)),
                    None => {
                        early.insert(id);
                        None
                    }
                }
            }
            Some(id) = failed.next() => {
                early.take(&id);
                if let Some(url) = pending.remove(&id) {
                    warn!("matching request to {url} failed to load");
                }
                None
            }
            else => break,
        };

        let Some((id, url)) = ready else {
            continue;
        };
        match fetch_body(id).await.and_then(ResponseBody::into_text) {
            Ok(body) => {
                observer.offer_body(&url, &body);
            }
            Err(e) => warn!("failed to read response body from {url}: {e:#}"),
        }
        if observer.is_satisfied() {
            break;
        }
    }
}
