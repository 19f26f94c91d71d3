use crate::model::PrecheckReason;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header, Client, StatusCode};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const DOWNLOADABLE_SUFFIXES: &[&str] = &[
    "zip", "pdf", "png", "jpg", "jpeg", "gif", "webp", "svg", "mp4", "mp3", "wav", "csv", "xls",
    "xlsx", "doc", "docx", "ppt", "pptx", "exe", "deb", "rpm", "apk", "tar", "tar.gz", "7z", "gz",
    "bz2",
];

static DOWNLOAD_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)download|file|export").expect("static pattern"));

/// Result of the HTTP pre-check walk (spec.md §4.3). `reason` is `None` only on a
/// transport error, per spec.md's "return `{skip:false}` — let the browser try".
#[derive(Debug, Clone)]
pub struct PrecheckOutcome {
    pub reason: Option<PrecheckReason>,
    pub skip_browser: bool,
    pub try_browser: bool,
    pub start_url: String,
    pub saw_html: bool,
}

/// Generalises `url_crawler::crawl_redirect_chain_with_config`'s manual-redirect loop
/// into the classifier spec.md §4.3 describes: a bounded walk that decides whether a
/// browser session is worth starting, and if so, against which URL.
pub struct Precheck {
    client: Client,
    max_redirects: usize,
}

impl Precheck {
    pub fn new(max_redirects: usize) -> anyhow::Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (compatible; DomainReconBot/1.0)")
            .build()?;
        Ok(Self { client, max_redirects })
    }

    pub async fn run(&self, domain: &str) -> PrecheckOutcome {
        self.run_from_url(domain, format!("https://{domain}")).await
    }

    /// Same walk as [`Precheck::run`] but starting from an arbitrary absolute URL;
    /// exposed separately so tests can point it at a local mock server. `domain` is
    /// carried only for log correlation — the walk itself follows `start` wherever
    /// it redirects.
    pub async fn run_from_url(&self, domain: &str, start: String) -> PrecheckOutcome {
        let mut current = start.clone();
        let mut visited: HashSet<String> = HashSet::new();
        let mut hops = 0usize;
        let mut saw_html = false;
        let mut followed_redirect = false;

        loop {
            let stripped = strip_fragment(&current);
            if !visited.insert(stripped) {
                warn!(%domain, url = %current, "pre-check detected a revisited URL");
                return PrecheckOutcome {
                    reason: Some(PrecheckReason::RedirectLoop),
                    skip_browser: !saw_html,
                    try_browser: saw_html,
                    start_url: start,
                    saw_html,
                };
            }
            if hops > self.max_redirects {
                warn!(%domain, hops, "pre-check exceeded max redirect hops");
                return PrecheckOutcome {
                    reason: Some(PrecheckReason::TooManyRedirects(hops)),
                    skip_browser: !saw_html,
                    try_browser: saw_html,
                    start_url: start,
                    saw_html,
                };
            }

            debug!(%domain, url = %current, hops, "pre-check hop");
            let resp = match self.client.get(&current).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(%domain, url = %current, error = %e, "pre-check transport error, deferring to browser");
                    return PrecheckOutcome {
                        reason: None,
                        skip_browser: false,
                        try_browser: true,
                        start_url: start,
                        saw_html,
                    };
                }
            };

            let status = resp.status();
            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let is_attachment = resp
                .headers()
                .get(header::CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_ascii_lowercase().contains("attachment"))
                .unwrap_or(false);
            let location = resp
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            if is_attachment {
                info!(%domain, url = %current, "pre-check found an attachment disposition");
                return PrecheckOutcome {
                    reason: Some(PrecheckReason::Attachment),
                    skip_browser: true,
                    try_browser: false,
                    start_url: start,
                    saw_html,
                };
            }

            if status == StatusCode::FORBIDDEN {
                info!(%domain, url = %current, "pre-check received 403");
                return PrecheckOutcome {
                    reason: Some(PrecheckReason::Forbidden),
                    skip_browser: false,
                    try_browser: true,
                    start_url: start,
                    saw_html,
                };
            }

            if status.is_redirection() {
                let Some(location) = location else {
                    warn!(%domain, url = %current, %status, "redirect status without Location header");
                    return PrecheckOutcome {
                        reason: Some(PrecheckReason::NonHtml(content_type)),
                        skip_browser: true,
                        try_browser: false,
                        start_url: start,
                        saw_html,
                    };
                };

                let next = match resolve(&current, &location) {
                    Some(u) => u,
                    None => {
                        warn!(%domain, %location, "could not resolve redirect Location");
                        return PrecheckOutcome {
                            reason: Some(PrecheckReason::NonHtml(content_type)),
                            skip_browser: true,
                            try_browser: false,
                            start_url: start,
                            saw_html,
                        };
                    }
                };

                if looks_downloadable(&next) {
                    info!(%domain, target = %next, "pre-check classified redirect target as a download");
                    return PrecheckOutcome {
                        reason: Some(PrecheckReason::RedirectToFile(next.clone())),
                        skip_browser: true,
                        try_browser: false,
                        start_url: next,
                        saw_html,
                    };
                }

                followed_redirect = true;
                hops += 1;
                current = next;
                continue;
            }

            if status.is_success() && content_type.starts_with("text/html") {
                saw_html = true;
                if followed_redirect {
                    info!(%domain, target = %current, "pre-check resolved a marketing redirect");
                    return PrecheckOutcome {
                        reason: Some(PrecheckReason::MarketingRedirect(current.clone())),
                        skip_browser: false,
                        try_browser: true,
                        start_url: current,
                        saw_html,
                    };
                }
                return PrecheckOutcome {
                    reason: Some(PrecheckReason::Ok),
                    skip_browser: false,
                    try_browser: true,
                    start_url: current,
                    saw_html,
                };
            }

            if status.is_success() {
                info!(%domain, %content_type, "pre-check classified response as non-HTML");
                return PrecheckOutcome {
                    reason: Some(PrecheckReason::NonHtml(content_type)),
                    skip_browser: true,
                    try_browser: false,
                    start_url: start,
                    saw_html,
                };
            }

            // Any other status (4xx besides 403, 5xx): treat conservatively as non-HTML,
            // skip the browser rather than point it at an error page.
            warn!(%domain, %status, "pre-check received an unclassified status");
            return PrecheckOutcome {
                reason: Some(PrecheckReason::NonHtml(format!("status {status}"))),
                skip_browser: true,
                try_browser: false,
                start_url: start,
                saw_html,
            };
        }
    }
}

fn strip_fragment(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut u) => {
            u.set_fragment(None);
            u.to_string()
        }
        Err(_) => url.to_string(),
    }
}

fn resolve(base: &str, location: &str) -> Option<String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return Some(location.to_string());
    }
    let base = Url::parse(base).ok()?;
    base.join(location).ok().map(|u| u.to_string())
}

fn looks_downloadable(url: &str) -> bool {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return false,
    };
    let path = parsed.path().to_ascii_lowercase();
    let suffix_match = DOWNLOADABLE_SUFFIXES
        .iter()
        .any(|ext| path.ends_with(&format!(".{ext}")));
    suffix_match || DOWNLOAD_KEYWORDS.is_match(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_downloadable_suffix() {
        assert!(looks_downloadable("https://example.com/report.pdf"));
        assert!(looks_downloadable("https://example.com/archive.tar.gz"));
        assert!(!looks_downloadable("https://example.com/about"));
    }

    #[test]
    fn detects_download_keyword_in_path() {
        assert!(looks_downloadable("https://example.com/download/file123"));
        assert!(looks_downloadable("https://example.com/export/report"));
    }

    #[test]
    fn resolves_relative_location() {
        let resolved = resolve("https://example.com/a/b", "/c").unwrap();
        assert_eq!(resolved, "https://example.com/c");
    }

    #[test]
    fn resolves_absolute_location_unchanged() {
        let resolved = resolve("https://example.com/a", "https://other.example/x").unwrap();
        assert_eq!(resolved, "https://other.example/x");
    }

    #[test]
    fn strip_fragment_removes_hash() {
        assert_eq!(
            strip_fragment("https://example.com/a#section"),
            "https://example.com/a"
        );
    }

    #[tokio::test]
    async fn classifies_plain_html_as_ok() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .create_async()
            .await;

        let precheck = Precheck::new(15).unwrap();
        let outcome = precheck.run_from_url("example.test", server.url()).await;
        assert_eq!(outcome.reason, Some(PrecheckReason::Ok));
        assert!(!outcome.skip_browser);
        assert!(outcome.saw_html);
    }

    #[tokio::test]
    async fn classifies_attachment() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-disposition", "attachment; filename=\"f.zip\"")
            .create_async()
            .await;

        let precheck = Precheck::new(15).unwrap();
        let outcome = precheck.run_from_url("example.test", server.url()).await;
        assert_eq!(outcome.reason, Some(PrecheckReason::Attachment));
        assert!(outcome.skip_browser);
    }

    #[tokio::test]
    async fn classifies_marketing_redirect() {
        let mut server = mockito::Server::new_async().await;
        let _landing = server
            .mock("GET", "/landing")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .create_async()
            .await;
        let _redirect = server
            .mock("GET", "/")
            .with_status(302)
            .with_header("location", "/landing")
            .create_async()
            .await;

        let precheck = Precheck::new(15).unwrap();
        let outcome = precheck.run_from_url("example.test", server.url()).await;
        match &outcome.reason {
            Some(PrecheckReason::MarketingRedirect(target)) => {
                assert!(target.ends_with("/landing"));
            }
            other => panic!("expected MarketingRedirect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn classifies_redirect_loop() {
        let mut server = mockito::Server::new_async().await;
        let _a = server
            .mock("GET", "/a")
            .with_status(302)
            .with_header("location", "/b")
            .create_async()
            .await;
        let _b = server
            .mock("GET", "/b")
            .with_status(302)
            .with_header("location", "/a")
            .create_async()
            .await;

        let precheck = Precheck::new(15).unwrap();
        let outcome = precheck.run_from_url("example.test", format!("{}/a", server.url())).await;
        assert_eq!(outcome.reason, Some(PrecheckReason::RedirectLoop));
        assert!(outcome.skip_browser);
    }

    #[tokio::test]
    async fn transport_error_defers_to_browser() {
        let precheck = Precheck::new(15).unwrap();
        let outcome = precheck.run("this-host-does-not-resolve.invalid").await;
        assert!(outcome.reason.is_none());
        assert!(!outcome.skip_browser);
    }
}
