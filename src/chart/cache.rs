use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::registry::Registry;
use crate::types::ChartVersionDetails;

pub const DRIVER_MEMORY: &str = "memory";
pub const DRIVER_REDIS: &str = "redis";

pub const CACHE_TTL: Duration = Duration::from_secs(3600);
pub const MAX_CONNECT_ATTEMPTS: u32 = 10;

const MEMORY_CAPACITY: u64 = 10_000;
const REDIS_KEY_PREFIX: &str = "helm_chart_cache:";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("invalid connection string: {0}")]
    Connection(String),
}

/// What a driver holds for a key.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Details(Arc<ChartVersionDetails>),
    Raw(Vec<u8>),
}

/// Key/value storage behind [`ChartCache`].
#[async_trait]
pub trait CacheDriver: Send + Sync {
    /// Whether values can be kept as shared objects. Drivers that return `false`
    /// are handed JSON bytes.
    fn stores_objects(&self) -> bool;

    async fn put(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<(), CacheError>;
    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError>;
    async fn is_exist(&self, key: &str) -> Result<bool, CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Clone)]
struct MemoryEntry {
    value: CacheValue,
    ttl: Duration,
}

struct EntryTtl;

impl Expiry<String, MemoryEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process driver; entries expire individually after their TTL.
pub struct MemoryDriver {
    entries: Cache<String, MemoryEntry>,
}

impl MemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        let entries = Cache::builder()
            .max_capacity(MEMORY_CAPACITY)
            .expire_after(EntryTtl)
            .build();
        Self { entries }
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheDriver for MemoryDriver {
    fn stores_objects(&self) -> bool {
        true
    }

    async fn put(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), MemoryEntry { value, ttl })
            .await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn is_exist(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}

/// Remote key/value driver backed by redis. Values travel as JSON bytes.
pub struct RedisDriver {
    conn: ConnectionManager,
}

impl RedisDriver {
    pub async fn connect(connection: &str) -> Result<Self, CacheError> {
        let url = redis_connection_url(connection)?;
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn key(key: &str) -> String {
        format!("{REDIS_KEY_PREFIX}{key}")
    }
}

#[async_trait]
impl CacheDriver for RedisDriver {
    fn stores_objects(&self) -> bool {
        false
    }

    async fn put(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<(), CacheError> {
        let bytes = match value {
            CacheValue::Raw(bytes) => bytes,
            CacheValue::Details(details) => serde_json::to_vec(details.as_ref())?,
        };
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::key(key), bytes, ttl.as_secs())
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        let mut conn = self.conn.clone();
        let bytes: Option<Vec<u8>> = conn.get(Self::key(key)).await?;
        Ok(bytes.map(CacheValue::Raw))
    }

    async fn is_exist(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(Self::key(key)).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(key)).await?;
        Ok(())
    }
}

/// Accepts either a `redis://` URL or the `host:port,pool_size,password,db` form.
pub fn redis_connection_url(raw: &str) -> Result<String, CacheError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CacheError::Connection("empty redis connection string".to_string()));
    }
    if raw.starts_with("redis://") || raw.starts_with("rediss://") || raw.starts_with("unix://") {
        return Ok(raw.to_string());
    }

    let segments: Vec<&str> = raw.split(',').map(str::trim).collect();
    let address = segments[0];
    if address.is_empty() {
        return Err(CacheError::Connection(format!("missing address in '{raw}'")));
    }
    let password = segments.get(2).copied().unwrap_or_default();
    let db = segments
        .get(3)
        .copied()
        .filter(|s| !s.is_empty())
        .unwrap_or("0");
    if db.parse::<u32>().is_err() {
        return Err(CacheError::Connection(format!("invalid database index '{db}'")));
    }

    if password.is_empty() {
        Ok(format!("redis://{address}/{db}"))
    } else {
        Ok(format!(
            "redis://:{}@{address}/{db}",
            urlencoding::encode(password)
        ))
    }
}

pub type DriverFuture =
    Pin<Box<dyn Future<Output = Result<Box<dyn CacheDriver>, CacheError>> + Send>>;

/// Builds a driver from its connection string.
pub type DriverFactory = fn(String) -> DriverFuture;

fn memory_factory(_connection: String) -> DriverFuture {
    Box::pin(async { Ok(Box::new(MemoryDriver::new()) as Box<dyn CacheDriver>) })
}

fn redis_factory(connection: String) -> DriverFuture {
    Box::pin(async move {
        let driver = RedisDriver::connect(&connection).await?;
        Ok(Box::new(driver) as Box<dyn CacheDriver>)
    })
}

/// The drivers selectable through `CHART_CACHE_DRIVER`.
#[must_use]
pub fn default_drivers() -> Registry<DriverFactory> {
    let mut registry: Registry<DriverFactory> = Registry::new("cache driver");
    for (name, factory) in [
        (DRIVER_MEMORY, memory_factory as DriverFactory),
        (DRIVER_REDIS, redis_factory as DriverFactory),
    ] {
        if let Err(e) = registry.register(name, factory) {
            warn!("Failed to register cache driver: {e}");
        }
    }
    registry
}

/// Delay before the next connection attempt: `2^(5 - |attempt - 5|)` seconds.
#[must_use]
pub fn retry_backoff(attempt: u32) -> Duration {
    let exponent = 5 - (i64::from(attempt) - 5).abs();
    Duration::from_secs(1 << exponent.clamp(0, 5))
}

/// Digest-keyed cache of parsed chart details.
///
/// A cache without a working driver is disabled: it misses on every lookup and
/// ignores writes. Driver failures are logged and never returned to callers.
pub struct ChartCache {
    driver: Option<Box<dyn CacheDriver>>,
}

impl ChartCache {
    #[must_use]
    pub fn disabled() -> Self {
        Self { driver: None }
    }

    #[must_use]
    pub fn with_driver(driver: Box<dyn CacheDriver>) -> Self {
        Self {
            driver: Some(driver),
        }
    }

    pub async fn new(config: Option<&CacheConfig>) -> Self {
        Self::with_registry(config, &default_drivers()).await
    }

    pub async fn with_registry(
        config: Option<&CacheConfig>,
        drivers: &Registry<DriverFactory>,
    ) -> Self {
        let Some(config) = config else {
            info!("No chart cache driver configured, cache disabled");
            return Self::disabled();
        };
        let Some(factory) = drivers.get(&config.driver) else {
            warn!(driver = %config.driver, "Unsupported chart cache driver, cache disabled");
            return Self::disabled();
        };

        for attempt in 1..=MAX_CONNECT_ATTEMPTS {
            match factory(config.connection.clone()).await {
                Ok(driver) => {
                    info!(driver = %config.driver, "Chart cache enabled");
                    return Self::with_driver(driver);
                }
                Err(e) => {
                    error!(
                        driver = %config.driver,
                        attempt,
                        "Failed to initialize chart cache driver: {e}"
                    );
                    if attempt < MAX_CONNECT_ATTEMPTS {
                        tokio::time::sleep(retry_backoff(attempt)).await;
                    }
                }
            }
        }

        error!(driver = %config.driver, "Giving up on chart cache driver, cache disabled");
        Self::disabled()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.driver.is_some()
    }

    /// Stores `details` under its metadata digest. The security report is never stored.
    pub async fn put(&self, details: &ChartVersionDetails) {
        let Some(driver) = &self.driver else {
            return;
        };
        let key = details.metadata.digest.as_str();
        if key.is_empty() {
            warn!(chart = %details.metadata.name, "Chart details have no digest, not caching");
            return;
        }

        let entry = details.without_security();
        let value = if driver.stores_objects() {
            CacheValue::Details(Arc::new(entry))
        } else {
            match serde_json::to_vec(&entry) {
                Ok(bytes) => CacheValue::Raw(bytes),
                Err(e) => {
                    error!(digest = %key, "Failed to encode chart details for cache: {e}");
                    return;
                }
            }
        };

        if let Err(e) = driver.put(key, value, CACHE_TTL).await {
            error!(digest = %key, "Failed to cache chart details: {e}");
        } else {
            debug!(digest = %key, "Cached chart details");
        }
    }

    pub async fn get(&self, digest: &str) -> Option<ChartVersionDetails> {
        let driver = self.driver.as_ref()?;

        let value = match driver.get(digest).await {
            Ok(v) => v?,
            Err(e) => {
                error!(%digest, "Failed to read chart details from cache: {e}");
                return None;
            }
        };

        match value {
            CacheValue::Details(details) => Some(details.as_ref().clone()),
            CacheValue::Raw(bytes) => match serde_json::from_slice(&bytes) {
                Ok(details) => Some(details),
                Err(e) => {
                    error!(%digest, "Failed to decode cached chart details: {e}");
                    None
                }
            },
        }
    }
}
