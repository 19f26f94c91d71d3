use crate::error::ApiError;
use tracing::{error, trace};
use url::Url;

/// Canonical ASCII hostname: IDNA-encoded, lowercase, no scheme or path, ≤253 octets.
///
/// The only way to construct one is [`Hostname::normalise`], so a live `Hostname`
/// value is always canonical by construction (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hostname(String);

const MAX_HOSTNAME_OCTETS: usize = 253;

impl Hostname {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts arbitrary user input and produces a canonical hostname or `BAD_DOMAIN`.
    ///
    /// Mirrors `url_validator::extract_domain`'s "trim, lowercase, parse" shape, extended
    /// with the scheme-sniffing and IDNA steps spec.md §4.1 requires.
    pub fn normalise(raw: &str) -> Result<Self, ApiError> {
        let trimmed = raw.trim().to_lowercase();
        if trimmed.is_empty() {
            error!("rejected empty hostname input");
            return Err(ApiError::bad_domain("empty input"));
        }

        let host = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Url::parse(&trimmed)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
        } else {
            match Url::parse(&format!("https://{trimmed}")) {
                Ok(u) => u.host_str().map(str::to_string),
                Err(_) => Some(trimmed.clone()),
            }
        };

        let host = match host {
            Some(h) if !h.is_empty() => h,
            _ => {
                error!(input = %raw, "could not extract a host from input");
                return Err(ApiError::bad_domain("no host could be extracted"));
            }
        };

        let ascii = idna::domain_to_ascii(&host).map_err(|e| {
            error!(input = %raw, error = %e, "IDNA encoding failed");
            ApiError::bad_domain(format!("invalid hostname: {e}"))
        })?;

        if ascii.is_empty() || ascii.len() > MAX_HOSTNAME_OCTETS {
            error!(input = %raw, len = ascii.len(), "hostname length out of bounds");
            return Err(ApiError::bad_domain("hostname length out of bounds"));
        }

        trace!(canonical = %ascii, "normalised hostname");
        Ok(Hostname(ascii))
    }
}

impl std::fmt::Display for Hostname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_https_scheme() {
        let h = Hostname::normalise("Example.com").unwrap();
        assert_eq!(h.as_str(), "example.com");
    }

    #[test]
    fn strips_scheme_and_path() {
        let h = Hostname::normalise("https://Example.com/a/b?x=1").unwrap();
        assert_eq!(h.as_str(), "example.com");
    }

    #[test]
    fn http_scheme_is_accepted() {
        let h = Hostname::normalise("http://example.com").unwrap();
        assert_eq!(h.as_str(), "example.com");
    }

    #[test]
    fn idna_encodes_unicode_hosts() {
        let h = Hostname::normalise("münchen.de").unwrap();
        assert!(h.as_str().starts_with("xn--"));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(Hostname::normalise("   ").is_err());
    }

    #[test]
    fn rejects_overlong_hostname() {
        let long = format!("{}.com", "a".repeat(260));
        assert!(Hostname::normalise(&long).is_err());
    }

    #[test]
    fn is_idempotent() {
        let once = Hostname::normalise("Example.COM").unwrap();
        let twice = Hostname::normalise(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }
}
