use crate::model::RedirectStep;
use crate::orchestrator::{DomainResponse, ResultStatus};
use serde::{Deserialize, Serialize};

/// Query parameters for `GET /domains` (spec.md §6).
#[derive(Debug, Deserialize)]
pub struct DomainQuery {
    pub domain: String,
}

/// Wire shape of a successful `/domains` response, matching spec.md §6's JSON example
/// field-for-field (`camelCase`, optional fields omitted rather than emitted as `null`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainResponseBody {
    pub domain: String,
    pub final_url: String,
    pub related_domains: Vec<String>,
    pub redirect_chain: Vec<RedirectStep>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_at: Option<i64>,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<DomainResponse> for DomainResponseBody {
    fn from(r: DomainResponse) -> Self {
        Self {
            domain: r.domain,
            final_url: r.final_url,
            related_domains: r.related_domains,
            redirect_chain: r.redirect_chain,
            cached: r.cached,
            cached_at: r.cached_at,
            ttl_at: r.ttl_at,
            status: r.status,
            reason: r.reason,
            note: r.note,
        }
    }
}

/// Error body shape shared by every non-2xx response (spec.md §6, §7).
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// `GET /health` response body.
#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub ok: bool,
    pub browser: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hostname::Hostname;

    #[test]
    fn response_body_omits_absent_optional_fields() {
        let hostname = Hostname::normalise("example.com").unwrap();
        let domain = DomainResponse {
            domain: hostname.as_str().to_string(),
            final_url: "https://example.com/".to_string(),
            related_domains: vec!["example.com".to_string()],
            redirect_chain: vec![],
            cached: false,
            cached_at: None,
            ttl_at: None,
            status: ResultStatus::Ok,
            reason: None,
            note: None,
        };
        let body: DomainResponseBody = domain.into();
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("cachedAt"));
        assert!(!json.contains("ttlAt"));
        assert!(!json.contains("reason"));
        assert!(json.contains("\"finalUrl\""));
        assert!(json.contains("\"relatedDomains\""));
    }

    #[test]
    fn response_body_includes_cache_fields_when_present() {
        let hostname = Hostname::normalise("example.com").unwrap();
        let domain = DomainResponse {
            domain: hostname.as_str().to_string(),
            final_url: "https://example.com/".to_string(),
            related_domains: vec!["example.com".to_string()],
            redirect_chain: vec![],
            cached: true,
            cached_at: Some(1000),
            ttl_at: Some(22600),
            status: ResultStatus::Ok,
            reason: None,
            note: None,
        };
        let body: DomainResponseBody = domain.into();
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"cachedAt\":1000"));
        assert!(json.contains("\"ttlAt\":22600"));
    }
}
