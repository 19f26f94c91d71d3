use crate::browser_pool::BrowserPool;
use crate::cache::Cache;
use crate::config::Config;
use crate::error::ApiError;
use crate::hostname::Hostname;
use crate::model::{PrecheckReason, RedirectStep, ScanResult};
use crate::precheck::Precheck;
use crate::scan::{ScanEngine, ScanFailure};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

/// Outcome status surfaced to callers alongside a [`ScanResult`] (spec.md §4.7, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Skipped,
    Blocked,
}

/// Response payload assembled by [`Orchestrator::resolve`], independent of its eventual
/// JSON rendering at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct DomainResponse {
    pub domain: String,
    pub final_url: String,
    pub related_domains: Vec<String>,
    pub redirect_chain: Vec<RedirectStep>,
    pub cached: bool,
    pub cached_at: Option<i64>,
    pub ttl_at: Option<i64>,
    pub status: ResultStatus,
    pub reason: Option<String>,
    pub note: Option<String>,
}

/// Glues C1–C6 into the state machine spec.md §4.7 describes: cache-lookup → precheck →
/// escalate-to-browser → persist. Grounded on the teacher's `api/processor.rs` dispatch
/// style (a single free-standing async function threading a request through several
/// fallible stages, `#[instrument]`-annotated, matching on each stage's outcome).
pub struct Orchestrator {
    cache: Arc<Cache>,
    browser_pool: Arc<BrowserPool>,
    precheck: Arc<Precheck>,
    scan_engine: Arc<ScanEngine>,
    semaphore: Arc<Semaphore>,
    config: Config,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<Cache>,
        browser_pool: Arc<BrowserPool>,
        precheck: Arc<Precheck>,
        scan_engine: Arc<ScanEngine>,
        config: Config,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        Self { cache, browser_pool, precheck, scan_engine, semaphore, config }
    }

    #[instrument(skip(self), fields(domain = %raw))]
    pub async fn resolve(&self, raw: &str) -> Result<DomainResponse, ApiError> {
        let hostname = Hostname::normalise(raw)?;

        let cached = match self.cache.lookup(hostname.as_str()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%hostname, error = %e, "cache lookup failed, treating as miss");
                None
            }
        };

        if let Some(entry) = cached {
            info!(%hostname, "cache hit");
            return Ok(DomainResponse {
                domain: hostname.as_str().to_string(),
                final_url: entry.final_url,
                related_domains: entry.related_domains,
                redirect_chain: entry.redirect_chain,
                cached: true,
                cached_at: Some(entry.updated_at),
                ttl_at: Some(entry.ttl_at),
                status: ResultStatus::Ok,
                reason: None,
                note: None,
            });
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ApiError::internal("scan semaphore closed"))?;

        let outcome = self.precheck.run(hostname.as_str()).await;
        let reason = outcome.reason.clone();

        let response = match &reason {
            Some(PrecheckReason::Ok) => {
                self.browser_scan_or_blocked(&hostname, &outcome.start_url, None).await
            }
            Some(PrecheckReason::Attachment) => origin_only_response(
                &hostname,
                ResultStatus::Skipped,
                Some(PrecheckReason::Attachment.tag()),
                None,
            ),
            Some(PrecheckReason::NonHtml(ct)) => origin_only_response(
                &hostname,
                ResultStatus::Skipped,
                Some(PrecheckReason::NonHtml(ct.clone()).tag()),
                None,
            ),
            Some(PrecheckReason::RedirectToFile(target)) => origin_only_response(
                &hostname,
                ResultStatus::Skipped,
                Some(PrecheckReason::RedirectToFile(target.clone()).tag()),
                Some(target.clone()),
            ),
            Some(PrecheckReason::MarketingRedirect(target)) => {
                let note = PrecheckReason::MarketingRedirect(target.clone()).tag();
                self.browser_scan_or_blocked(&hostname, target, Some(note)).await
            }
            Some(PrecheckReason::Forbidden) => {
                match self.browser_scan_or_blocked(&hostname, &outcome.start_url, None).await {
                    ok @ DomainResponse { status: ResultStatus::Ok, .. } => ok,
                    _ => origin_only_response(
                        &hostname,
                        ResultStatus::Blocked,
                        Some(PrecheckReason::Forbidden.tag()),
                        None,
                    ),
                }
            }
            Some(PrecheckReason::RedirectLoop) => {
                if outcome.saw_html {
                    self.browser_scan_or_blocked(&hostname, &outcome.start_url, None).await
                } else {
                    origin_only_response(
                        &hostname,
                        ResultStatus::Skipped,
                        Some(PrecheckReason::RedirectLoop.tag()),
                        None,
                    )
                }
            }
            Some(PrecheckReason::TooManyRedirects(n)) => {
                if outcome.saw_html {
                    self.browser_scan_or_blocked(&hostname, &outcome.start_url, None).await
                } else {
                    origin_only_response(
                        &hostname,
                        ResultStatus::Skipped,
                        Some(PrecheckReason::TooManyRedirects(*n).tag()),
                        None,
                    )
                }
            }
            None => {
                // Transport error at pre-check: spec.md §4.3 says defer to the browser.
                self.browser_scan_or_blocked(&hostname, &outcome.start_url, None).await
            }
        };

        if response.status == ResultStatus::Blocked && response.reason.as_deref() == Some("forbidden") {
            return Err(ApiError::forbidden(format!("{hostname} blocked the scan with a 403")));
        }

        if response.status == ResultStatus::Ok {
            let result = ScanResult {
                final_url: response.final_url.clone(),
                related_domains: response.related_domains.clone(),
                redirect_chain: response.redirect_chain.clone(),
            };
            if let Err(e) = self.cache.upsert(hostname.as_str(), &result) {
                warn!(%hostname, error = %e, "failed to persist scan result to cache");
            }
        }

        Ok(response)
    }

    async fn browser_scan_or_blocked(
        &self,
        hostname: &Hostname,
        start_url: &str,
        note: Option<String>,
    ) -> DomainResponse {
        let browser = match self.browser_pool.acquire().await {
            Ok(b) => b,
            Err(e) => {
                warn!(%hostname, error = %e, "failed to acquire browser");
                return origin_only_response(hostname, ResultStatus::Blocked, Some("blocked".to_string()), None);
            }
        };

        let scan = self
            .scan_engine
            .scan(
                &browser,
                hostname,
                start_url,
                self.config.nav_timeout,
                self.config.quiet_window,
                self.config.max_redirect_steps,
                self.config.max_domains,
                self.config.max_redirect_log,
            )
            .await;

        match scan {
            Ok(result) => DomainResponse {
                domain: hostname.as_str().to_string(),
                final_url: result.final_url,
                related_domains: result.related_domains,
                redirect_chain: result.redirect_chain,
                cached: false,
                cached_at: None,
                ttl_at: None,
                status: ResultStatus::Ok,
                reason: None,
                note,
            },
            Err(ScanFailure::Navigation(msg)) if msg.to_ascii_lowercase().contains("403") => {
                warn!(%hostname, "scan inferred forbidden from a 403 substring in the navigation error");
                origin_only_response(hostname, ResultStatus::Blocked, Some("forbidden".to_string()), None)
            }
            Err(e) => {
                warn!(%hostname, error = %e, "browser scan failed, falling back to an origin-only response");
                if !self.browser_pool.is_connected().await {
                    self.browser_pool.recycle().await;
                }
                origin_only_response(hostname, ResultStatus::Blocked, Some("blocked".to_string()), None)
            }
        }
    }
}

fn origin_only_response(
    hostname: &Hostname,
    status: ResultStatus,
    reason: Option<String>,
    final_url: Option<String>,
) -> DomainResponse {
    DomainResponse {
        domain: hostname.as_str().to_string(),
        final_url: final_url.unwrap_or_else(|| format!("https://{}", hostname.as_str())),
        related_domains: vec![hostname.as_str().to_string()],
        redirect_chain: Vec::new(),
        cached: false,
        cached_at: None,
        ttl_at: None,
        status,
        reason,
        note: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ResultStatus::Ok).unwrap(), "\"ok\"");
        assert_eq!(serde_json::to_string(&ResultStatus::Skipped).unwrap(), "\"skipped\"");
        assert_eq!(serde_json::to_string(&ResultStatus::Blocked).unwrap(), "\"blocked\"");
    }

    #[test]
    fn origin_only_response_defaults_final_url_to_https_origin() {
        let hostname = Hostname::normalise("example.com").unwrap();
        let resp = origin_only_response(&hostname, ResultStatus::Skipped, Some("attachment".to_string()), None);
        assert_eq!(resp.final_url, "https://example.com");
        assert_eq!(resp.related_domains, vec!["example.com".to_string()]);
    }

    #[test]
    fn origin_only_response_honours_explicit_final_url() {
        let hostname = Hostname::normalise("example.com").unwrap();
        let resp = origin_only_response(
            &hostname,
            ResultStatus::Skipped,
            Some("redirect-to-file(https://example.com/f.zip)".to_string()),
            Some("https://example.com/f.zip".to_string()),
        );
        assert_eq!(resp.final_url, "https://example.com/f.zip");
    }
}
