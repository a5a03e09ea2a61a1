mod controller;
mod server;

pub use controller::{
    CACHE_DRIVER_ENV, CacheConfig, ControllerConfig, Credential, DEFAULT_SERVICE_USERNAME,
    PASSWORD_ENV, REDIS_URL_ENV, TEST_MODE_ENV,
};
pub use server::ServerConfig;

pub(crate) fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
