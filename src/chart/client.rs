use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, Method, StatusCode};
use tracing::debug;
use url::Url;

use crate::config::Credential;
use crate::error::{Error, Result};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_IDLE_CONNS_PER_HOST: usize = 10;

/// HTTP client for the backend chart server.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    credential: Credential,
}

impl BackendClient {
    pub fn new(credential: Credential) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(IDLE_CONN_TIMEOUT)
            .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
            .build()?;
        Ok(Self { client, credential })
    }

    pub async fn get(&self, url: &str) -> Result<Bytes> {
        self.send(Method::GET, url).await
    }

    pub async fn delete(&self, url: &str) -> Result<()> {
        self.send(Method::DELETE, url).await.map(|_| ())
    }

    async fn send(&self, method: Method, url: &str) -> Result<Bytes> {
        let url = parse_url(url)?;
        debug!(%method, %url, "backend request");

        let resp = self
            .client
            .request(method, url)
            .basic_auth(&self.credential.username, Some(&self.credential.password))
            .send()
            .await?;

        let status = resp.status();
        let content = resp.bytes().await?;
        if status.is_success() {
            Ok(content)
        } else {
            Err(extract_error(status, &content))
        }
    }
}

/// Joins `path` onto the backend base URL with exactly one slash between them.
#[must_use]
pub fn backend_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn parse_url(raw: &str) -> Result<Url> {
    if raw.trim().is_empty() {
        return Err(Error::InvalidUrl("empty url".to_string()));
    }
    Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))
}

/// Turns a non-2xx backend answer into an error.
///
/// The body is expected to be a JSON object such as `{"error":"..."}`; a body that
/// is not JSON is a decode failure. When the object carries no `error` string the
/// raw body becomes the message.
pub(crate) fn extract_error(status: StatusCode, content: &[u8]) -> Error {
    let code = status.as_u16();
    if content.is_empty() {
        let reason = status.canonical_reason().unwrap_or("unknown error");
        return Error::upstream(code, reason);
    }

    let value: serde_json::Value = match serde_json::from_slice(content) {
        Ok(v) => v,
        Err(e) => {
            return Error::Decode(format!(
                "backend returned {code} with a non-JSON error body: {e}"
            ));
        }
    };

    match value.get("error").and_then(serde_json::Value::as_str) {
        Some(message) => Error::upstream(code, message),
        None => Error::upstream(code, String::from_utf8_lossy(content)),
    }
}
