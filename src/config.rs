use std::env;
use std::time::Duration;

/// Runtime configuration for the reconnaissance service, sourced from the environment
/// table in spec.md §6. Every variable is optional; defaults mirror the teacher's
/// `ApiConfig::default()` shape of "a plain struct with sane hardcoded fallbacks".
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub cache_ttl_seconds: u64,
    pub max_redirect_steps: usize,
    pub precheck_max_redirects: usize,
    pub nav_timeout: Duration,
    pub quiet_window: Duration,
    pub hard_timeout: Duration,
    pub concurrency: usize,
    pub max_domains: usize,
    pub max_redirect_log: usize,
    pub sqlite_path: String,
    pub chromium_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_u16("PORT", 3000),
            cache_ttl_seconds: env_u64("CACHE_TTL_SECONDS", 21_600),
            max_redirect_steps: env_usize("MAX_REDIRECT_STEPS", 20),
            precheck_max_redirects: env_usize("PRECHECK_MAX_REDIRECTS", 15),
            nav_timeout: Duration::from_millis(env_u64("NAV_TIMEOUT_MS", 30_000)),
            quiet_window: Duration::from_millis(env_u64("QUIET_WINDOW_MS", 650)),
            hard_timeout: Duration::from_millis(env_u64("HARD_TIMEOUT_MS", 70_000)),
            concurrency: env_usize("CONCURRENCY", 3),
            max_domains: env_usize("MAX_DOMAINS", 5000),
            max_redirect_log: env_usize("MAX_REDIRECT_LOG", 50),
            sqlite_path: env::var("SQLITE_PATH").unwrap_or_else(|_| "./cache.db".to_string()),
            chromium_path: env::var("CHROMIUM_PATH").ok(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_u16(key: &str, default: u16) -> u16 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
