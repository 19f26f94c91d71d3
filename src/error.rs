use serde::Serialize;
use std::fmt;

/// Closed set of error codes surfaced on the HTTP boundary (spec.md §6, §7).
///
/// Internal fallibility uses `anyhow::Error` throughout, the way the teacher's
/// `ScreenshotTaker`/`ConnectionPool` methods do; this enum exists only at the edge
/// where an error becomes a status code and a `code` field in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadDomain,
    Forbidden,
    Internal,
    Timeout,
}

impl ErrorCode {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::BadDomain => 400,
            ErrorCode::Forbidden => 403,
            ErrorCode::Internal => 500,
            ErrorCode::Timeout => 504,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::BadDomain => "BAD_DOMAIN",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

/// An error with an attached boundary code, returned by the orchestrator.
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn bad_domain(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadDomain, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCode::Timeout, "request exceeded the hard deadline")
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
