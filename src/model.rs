use serde::{Deserialize, Serialize};

/// One document-level redirect hop (spec.md §3 `RedirectStep`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectStep {
    pub from: String,
    pub to: String,
    pub status: u16,
}

/// Closed set of pre-check classification tags (spec.md §4.3), carried through to the
/// orchestrator and, when present, to the HTTP response's `reason`/`note` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrecheckReason {
    Ok,
    Attachment,
    NonHtml(String),
    Forbidden,
    RedirectToFile(String),
    MarketingRedirect(String),
    RedirectLoop,
    TooManyRedirects(usize),
}

impl PrecheckReason {
    /// The tag string as it appears in `reason`/`note` fields on the wire.
    pub fn tag(&self) -> String {
        match self {
            PrecheckReason::Ok => "ok".to_string(),
            PrecheckReason::Attachment => "attachment".to_string(),
            PrecheckReason::NonHtml(ct) => format!("non-HTML ({ct})"),
            PrecheckReason::Forbidden => "forbidden".to_string(),
            PrecheckReason::RedirectToFile(url) => format!("redirect-to-file({url})"),
            PrecheckReason::MarketingRedirect(url) => format!("marketing-redirect({url})"),
            PrecheckReason::RedirectLoop => "redirect-loop".to_string(),
            PrecheckReason::TooManyRedirects(n) => format!("redirect-loop({n})"),
        }
    }
}

/// Immutable scan result (spec.md §3 `ScanResult`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub final_url: String,
    pub related_domains: Vec<String>,
    pub redirect_chain: Vec<RedirectStep>,
}

/// Tracker-domain filter used when assembling `related_domains` (spec.md §3, §9).
///
/// Substring match is intentionally coarse — it matches the upstream tool's behaviour
/// rather than a precise public-suffix-aware block list.
pub fn is_tracker_domain(host: &str) -> bool {
    host.contains("doubleclick") || host.contains("google")
}

/// Builds the sorted, deduplicated, filtered `related_domains` list, guaranteeing the
/// origin hostname is present (spec.md invariant 2).
pub fn related_domains(origin: &str, seen: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut domains: Vec<String> = seen.into_iter().filter(|d| !is_tracker_domain(d)).collect();
    domains.sort();
    domains.dedup();
    if !domains.iter().any(|d| d == origin) {
        domains.push(origin.to_string());
        domains.sort();
    }
    domains
}
