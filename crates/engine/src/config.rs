use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rows requested per page, within `1..=MAX_PAGE_SIZE`.
    pub page_size: u32,
    /// Fetch the next page once the viewport is this close to the last
    /// loaded row.
    pub prefetch_threshold: usize,
    pub reap_interval: Duration,
    pub inactivity_timeout: Duration,
    pub pending_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            prefetch_threshold: 10,
            reap_interval: Duration::from_millis(1_000),
            inactivity_timeout: Duration::from_millis(3_000),
            pending_ttl: Duration::from_millis(5_000),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let page_size = env_parse("GRIDBASE_PAGE_SIZE").unwrap_or(defaults.page_size);
        let prefetch_threshold =
            env_parse("GRIDBASE_PREFETCH_THRESHOLD").unwrap_or(defaults.prefetch_threshold);
        let reap_interval = env_parse("GRIDBASE_REAP_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.reap_interval);
        let inactivity_timeout = env_parse("GRIDBASE_INACTIVITY_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.inactivity_timeout);
        let pending_ttl = env_parse("GRIDBASE_PENDING_TTL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.pending_ttl);
        Self {
            page_size,
            prefetch_threshold,
            reap_interval,
            inactivity_timeout,
            pending_ttl,
        }
        .normalized()
    }

    /// Clamp values the server would reject.
    pub fn normalized(mut self) -> Self {
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        if self.reap_interval.is_zero() {
            self.reap_interval = Self::default().reap_interval;
        }
        self
    }

    pub fn reap_config(&self) -> ReapConfig {
        ReapConfig {
            inactivity_timeout_ms: self.inactivity_timeout.as_millis() as u64,
            pending_ttl_ms: self.pending_ttl.as_millis() as u64,
        }
    }
}

/// Thresholds consumed by the pure reap step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapConfig {
    pub inactivity_timeout_ms: u64,
    pub pending_ttl_ms: u64,
}

impl Default for ReapConfig {
    fn default() -> Self {
        EngineConfig::default().reap_config()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
