pub mod redirect_limiter;
pub mod state;

use crate::hostname::Hostname;
use crate::model::{related_domains, ScanResult};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::fetch;
use chromiumoxide::cdp::browser_protocol::network;
use chromiumoxide::cdp::browser_protocol::page;
use futures::StreamExt;
use redirect_limiter::{follow_document_redirects, LimiterOutcome};
use reqwest::Client;
use state::ScanState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant as TokioInstant;
use tracing::{debug, warn};

const LOOP_DETECTED_BODY: &str = "Loop Detected: too many redirects";

/// Why a browser-backed scan did not produce a [`ScanResult`] (spec.md §4.6 edge cases).
#[derive(Debug)]
pub enum ScanFailure {
    Navigation(String),
    TooManyRedirects(usize),
    Timeout,
    Other(anyhow::Error),
}

impl std::fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanFailure::Navigation(msg) => write!(f, "navigation failed: {msg}"),
            ScanFailure::TooManyRedirects(n) => write!(f, "too many redirects ({n})"),
            ScanFailure::Timeout => write!(f, "scan exceeded its navigation timeout"),
            ScanFailure::Other(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ScanFailure {}

/// Drives a single browsing context through navigation, redirect interception and the
/// network-quiet settle heuristic (spec.md §4.5 Redirect Limiter, §4.6 Scan Engine).
///
/// Generalises the bombadil browser-instrumentation file's `Fetch.enable` /
/// `EventRequestPaused` / `FulfillRequestParams` pattern: that file rewrites script and
/// document bodies in place, this one fulfils the top-level document request with the
/// resolved response from an out-of-band redirect walk instead, so the in-context
/// redirect count never exceeds `max_redirect_steps` no matter how many hops the origin
/// server issues.
pub struct ScanEngine {
    redirect_client: Client,
    user_agent: String,
}

impl ScanEngine {
    pub fn new(user_agent: impl Into<String>) -> anyhow::Result<Self> {
        let redirect_client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self { redirect_client, user_agent: user_agent.into() })
    }

    pub async fn scan(
        &self,
        browser: &Browser,
        origin: &Hostname,
        start_url: &str,
        nav_timeout: Duration,
        quiet_window: Duration,
        max_redirect_steps: usize,
        max_domains: usize,
        max_redirect_log: usize,
    ) -> Result<ScanResult, ScanFailure> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScanFailure::Other(anyhow::anyhow!(e)))?;

        let result = self
            .scan_inner(
                &page,
                origin,
                start_url,
                nav_timeout,
                quiet_window,
                max_redirect_steps,
                max_domains,
                max_redirect_log,
            )
            .await;

        if let Err(e) = page.close().await {
            warn!(%origin, error = %e, "failed closing scan page");
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn scan_inner(
        &self,
        page: &chromiumoxide::Page,
        origin: &Hostname,
        start_url: &str,
        nav_timeout: Duration,
        quiet_window: Duration,
        max_redirect_steps: usize,
        max_domains: usize,
        max_redirect_log: usize,
    ) -> Result<ScanResult, ScanFailure> {
        page.execute(
            network::SetUserAgentOverrideParams::builder()
                .user_agent(self.user_agent.clone())
                .build()
                .map_err(|e| ScanFailure::Other(anyhow::anyhow!(e)))?,
        )
        .await
        .map_err(|e| ScanFailure::Other(anyhow::anyhow!(e)))?;

        page.execute(
            page::SetDownloadBehaviorParams::builder()
                .behavior(page::SetDownloadBehaviorBehavior::Deny)
                .build()
                .map_err(|e| ScanFailure::Other(anyhow::anyhow!(e)))?,
        )
        .await
        .map_err(|e| ScanFailure::Other(anyhow::anyhow!(e)))?;

        page.execute(network::EnableParams::default())
            .await
            .map_err(|e| ScanFailure::Other(anyhow::anyhow!(e)))?;

        page.execute(
            fetch::EnableParams::builder()
                .pattern(
                    fetch::RequestPattern::builder()
                        .request_stage(fetch::RequestStage::Request)
                        .resource_type(network::ResourceType::Document)
                        .build(),
                )
                .build(),
        )
        .await
        .map_err(|e| ScanFailure::Other(anyhow::anyhow!(e)))?;

        let state = Arc::new(AsyncMutex::new(ScanState::new(max_domains, max_redirect_log)));

        let mut fetch_events = page
            .event_listener::<fetch::EventRequestPaused>()
            .await
            .map_err(|e| ScanFailure::Other(anyhow::anyhow!(e)))?;
        let mut network_request_events = page
            .event_listener::<network::EventRequestWillBeSent>()
            .await
            .map_err(|e| ScanFailure::Other(anyhow::anyhow!(e)))?;
        let mut network_response_events = page
            .event_listener::<network::EventResponseReceived>()
            .await
            .map_err(|e| ScanFailure::Other(anyhow::anyhow!(e)))?;

        let fetch_page = page.clone();
        let fetch_client = self.redirect_client.clone();
        let fetch_state = Arc::clone(&state);
        let fetch_task = tokio::spawn(async move {
            while let Some(event) = fetch_events.next().await {
                handle_paused_request(&fetch_page, &event, &fetch_client, &fetch_state, max_redirect_steps).await;
            }
        });

        let network_state = Arc::clone(&state);
        let network_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = network_request_events.next() => {
                        let host = host_of(&event.request.url);
                        network_state.lock().await.record_request_started(&host);
                        if event.resource_type != network::ResourceType::Document {
                            if let Some(redirect) = &event.redirect_response {
                                let from = redirect.url.clone();
                                let to = event.request.url.clone();
                                let status = redirect.status as u16;
                                network_state.lock().await.push_redirect(from, to, status);
                            }
                        }
                    }
                    Some(event) = network_response_events.next() => {
                        let host = host_of(&event.response.url);
                        network_state.lock().await.record_request_finished(&host);
                    }
                    else => break,
                }
            }
        });

        let deadline = TokioInstant::now() + nav_timeout;
        let nav_result = tokio::time::timeout(nav_timeout, page.goto(start_url)).await;

        match nav_result {
            Err(_) => {
                fetch_task.abort();
                network_task.abort();
                return Err(ScanFailure::Timeout);
            }
            Ok(Err(e)) => {
                let msg = e.to_string();
                if !msg.contains("Download is starting") && !msg.contains("net::ERR_ABORTED") {
                    fetch_task.abort();
                    network_task.abort();
                    return Err(ScanFailure::Navigation(msg));
                }
                debug!(%origin, "navigation aborted by a download, continuing settle loop");
            }
            Ok(Ok(_)) => {}
        }

        if let Some(n) = state.lock().await.redirect_limit_exceeded {
            fetch_task.abort();
            network_task.abort();
            return Err(ScanFailure::TooManyRedirects(n));
        }

        loop {
            {
                let guard = state.lock().await;
                if guard.is_quiet(quiet_window) {
                    break;
                }
                if let Some(n) = guard.redirect_limit_exceeded {
                    drop(guard);
                    fetch_task.abort();
                    network_task.abort();
                    return Err(ScanFailure::TooManyRedirects(n));
                }
            }
            if TokioInstant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let final_url = page.url().await.map_err(|e| ScanFailure::Other(anyhow::anyhow!(e)))?.unwrap_or_else(|| start_url.to_string());

        fetch_task.abort();
        network_task.abort();

        // No final `redirect_steps.len() > max_redirect_steps` guard here: the limiter
        // (C5, `redirect_limiter::follow_document_redirects`) already fails the scan via
        // `redirect_limit_exceeded` the moment the out-of-band walk itself passes
        // `max_redirect_steps`, so `redirect_steps` can never grow past that bound by the
        // time execution reaches this point. A second length check here would be the
        // degenerate kind spec.md §9 singles out, not a real invariant.
        let guard = state.lock().await;
        let related = related_domains(origin.as_str(), guard.seen_domains.iter().cloned());
        if guard.dropped_domains > 0 {
            warn!(%origin, dropped = guard.dropped_domains, "related-domain set hit max_domains, discarding overflow");
        }

        Ok(ScanResult {
            final_url,
            related_domains: related,
            redirect_chain: guard.redirect_steps.clone(),
        })
    }
}

/// Resolves one intercepted top-level document request and hands the browser either the
/// final response in the chain, or a synthetic 508 once `max_redirects` is exceeded.
///
/// Non-document requests are waved through unmodified — only the Document-typed pattern
/// is registered on `Fetch.enable`, so this branch exists purely as defensive
/// documentation of that invariant.
async fn handle_paused_request(
    page: &chromiumoxide::Page,
    event: &fetch::EventRequestPaused,
    client: &Client,
    state: &Arc<AsyncMutex<ScanState>>,
    max_redirects: usize,
) {
    if event.resource_type != network::ResourceType::Document {
        if let Ok(params) = fetch::ContinueRequestParams::builder().request_id(event.request_id.clone()).build() {
            let _ = page.execute(params).await;
        }
        return;
    }

    match follow_document_redirects(client, &event.request.url, max_redirects).await {
        Ok(LimiterOutcome::Resolved(resp)) => {
            {
                let mut guard = state.lock().await;
                for hop in &resp.hops {
                    guard.push_redirect(hop.from.clone(), hop.to.clone(), hop.status);
                }
            }
            let headers: Vec<fetch::HeaderEntry> = resp
                .headers
                .iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case("content-length"))
                .map(|(name, value)| fetch::HeaderEntry { name: name.clone(), value: value.clone() })
                .collect();
            let built = fetch::FulfillRequestParams::builder()
                .request_id(event.request_id.clone())
                .response_code(resp.status as i64)
                .response_headers(headers)
                .body(BASE64_STANDARD.encode(&resp.body))
                .build();
            match built {
                Ok(params) => {
                    if let Err(e) = page.execute(params).await {
                        warn!(error = %e, "failed fulfilling document request");
                    }
                }
                Err(e) => warn!(error = %e, "failed building FulfillRequestParams"),
            }
        }
        Ok(LimiterOutcome::LoopDetected(n)) => {
            state.lock().await.mark_redirect_limit_exceeded(n);
            let built = fetch::FulfillRequestParams::builder()
                .request_id(event.request_id.clone())
                .response_code(508)
                .body(BASE64_STANDARD.encode(LOOP_DETECTED_BODY))
                .build();
            if let Ok(params) = built {
                let _ = page.execute(params).await;
            }
        }
        Err(e) => {
            warn!(error = %e, "redirect limiter walk failed, continuing request unmodified");
            if let Ok(params) = fetch::ContinueRequestParams::builder().request_id(event.request_id.clone()).build() {
                let _ = page.execute(params).await;
            }
        }
    }
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_failure_display_reads_as_a_sentence() {
        assert_eq!(
            ScanFailure::TooManyRedirects(25).to_string(),
            "too many redirects (25)"
        );
        assert_eq!(ScanFailure::Timeout.to_string(), "scan exceeded its navigation timeout");
    }

    #[test]
    fn host_of_extracts_hostname() {
        assert_eq!(host_of("https://cdn.example.com/a.js"), "cdn.example.com");
        assert_eq!(host_of("not a url"), "");
    }
}
