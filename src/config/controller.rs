use super::env_var_non_empty;

pub const DEFAULT_SERVICE_USERNAME: &str = "chart_controller";

/// Password the proxy presents to the backend.
pub const PASSWORD_ENV: &str = "UI_SECRET";
/// When set to `true`, delete and download events are not published.
pub const TEST_MODE_ENV: &str = "UTTEST";
pub const CACHE_DRIVER_ENV: &str = "CHART_CACHE_DRIVER";
pub const REDIS_URL_ENV: &str = "_REDIS_URL";

/// Basic-auth credential injected into every request sent to the backend.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub driver: String,
    /// Driver specific connection string; empty for the memory driver.
    pub connection: String,
}

impl CacheConfig {
    #[must_use]
    pub fn new(driver: impl Into<String>, connection: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            connection: connection.into(),
        }
    }

    /// Reads `CHART_CACHE_DRIVER` and `_REDIS_URL`. Returns `None` when no driver is set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let driver = env_var_non_empty(CACHE_DRIVER_ENV)?;
        let connection = env_var_non_empty(REDIS_URL_ENV).unwrap_or_default();
        Some(Self { driver, connection })
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Base URL of the backend chart server.
    pub backend_url: String,
    /// Public endpoint of this service, used to turn absolute chart URLs back into
    /// backend paths.
    pub external_endpoint: String,
    pub credential: Credential,
    pub cache: Option<CacheConfig>,
    pub suppress_events: bool,
}

impl ControllerConfig {
    #[must_use]
    pub fn new(backend_url: impl Into<String>, external_endpoint: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            external_endpoint: external_endpoint.into(),
            credential: Credential {
                username: DEFAULT_SERVICE_USERNAME.to_string(),
                password: String::new(),
            },
            cache: None,
            suppress_events: false,
        }
    }

    #[must_use]
    pub fn from_env(backend_url: impl Into<String>, external_endpoint: impl Into<String>) -> Self {
        let mut config = Self::new(backend_url, external_endpoint);
        config.credential.password = env_var_non_empty(PASSWORD_ENV).unwrap_or_default();
        config.cache = CacheConfig::from_env();
        config.suppress_events =
            env_var_non_empty(TEST_MODE_ENV).is_some_and(|v| v.eq_ignore_ascii_case("true"));
        config
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.credential.password = password.into();
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_suppressed_events(mut self, suppress: bool) -> Self {
        self.suppress_events = suppress;
        self
    }
}
