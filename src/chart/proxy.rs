use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use super::client::IDLE_CONN_TIMEOUT;
use crate::config::Credential;
use crate::error::{Error, Result};

/// Sent when the caller did not provide a `User-Agent`.
pub const PROXY_USER_AGENT: &str = "chartmux-proxy";

/// Replaces the body of every `401` coming back from the backend.
pub const UNAUTHENTIC_SOURCE_BODY: &str =
    r#"{"error":"operation request from unauthentic source is rejected"}"#;

/// Namespace that receives uploads posted to the root upload endpoint.
pub const DEFAULT_NAMESPACE: &str = "library";

const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

const HEALTH_ENDPOINT: &str = "/api/chartrepo/health";
const ROOT_UPLOAD_ENDPOINT: &str = "/api/chartrepo/charts";
const REPO_PREFIX: &str = "/chartrepo";

static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Reverse proxy in front of the backend chart server.
///
/// Every forwarded request carries the service credential; the caller's own
/// `Authorization` header never reaches the backend.
pub struct ProxyEngine {
    backend: Url,
    client: Client,
    authorization: HeaderValue,
}

impl ProxyEngine {
    pub fn new(backend: Url, credential: &Credential) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_idle_timeout(IDLE_CONN_TIMEOUT)
            .build()?;

        let token = STANDARD.encode(format!("{}:{}", credential.username, credential.password));
        let mut authorization = HeaderValue::from_str(&format!("Basic {token}"))
            .map_err(|e| Error::Config(format!("invalid service credential: {e}")))?;
        authorization.set_sensitive(true);

        Ok(Self {
            backend,
            client,
            authorization,
        })
    }

    /// Forwards `req` to the backend and returns the (possibly rewritten) answer.
    pub async fn serve(&self, req: Request) -> Response {
        let (parts, body) = req.into_parts();

        let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to read request body for proxying: {e}");
                return json_error_response(StatusCode::PAYLOAD_TOO_LARGE, &e.to_string());
            }
        };

        let target = self.direct(&parts.uri);
        let mut headers = forwarded_headers(&parts.headers);
        if !headers.contains_key(header::USER_AGENT) {
            headers.insert(header::USER_AGENT, HeaderValue::from_static(PROXY_USER_AGENT));
        }
        headers.insert(header::AUTHORIZATION, self.authorization.clone());

        debug!(method = %parts.method, %target, "proxying request");

        let result = self
            .client
            .request(parts.method, target.clone())
            .headers(headers)
            .body(body)
            .send()
            .await;

        match result {
            Ok(resp) => modify_response(resp),
            Err(e) => {
                warn!(%target, "Backend request failed: {e}");
                json_error_response(StatusCode::BAD_GATEWAY, &e.to_string())
            }
        }
    }

    /// Maps the incoming URI onto the backend: scheme and host of the backend,
    /// joined paths, merged query strings.
    fn direct(&self, uri: &Uri) -> Url {
        let mut target = self.backend.clone();
        let path = rewrite_url_path(uri.path());
        target.set_path(&single_joining_slash(self.backend.path(), &path));

        let backend_query = self.backend.query().unwrap_or_default();
        let request_query = uri.query().unwrap_or_default();
        let query = match (backend_query.is_empty(), request_query.is_empty()) {
            (true, true) => None,
            (false, true) => Some(backend_query.to_string()),
            (true, false) => Some(request_query.to_string()),
            (false, false) => Some(format!("{backend_query}&{request_query}")),
        };
        target.set_query(query.as_deref());
        target
    }
}

/// Maps the public chart-repository paths onto the backend layout.
pub fn rewrite_url_path(path: &str) -> String {
    if path == HEALTH_ENDPOINT {
        return "/health".to_string();
    }
    if path == ROOT_UPLOAD_ENDPOINT {
        return format!("/api/chartrepo/{DEFAULT_NAMESPACE}/charts");
    }
    if let Some(rest) = path.strip_prefix(REPO_PREFIX) {
        if rest.is_empty() || rest.starts_with('/') {
            return rest.to_string();
        }
    }
    path.to_string()
}

pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

fn forwarded_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut headers = incoming.clone();
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::HOST);
    headers.remove(header::AUTHORIZATION);
    headers.remove(header::CONTENT_LENGTH);
    headers
}

fn modify_response(resp: reqwest::Response) -> Response {
    let status = resp.status();
    let mut headers = resp.headers().clone();
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }

    if status == StatusCode::UNAUTHORIZED {
        info!("Backend rejected the service credential, rewriting 401 response");
        headers.remove(header::WWW_AUTHENTICATE);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from(UNAUTHENTIC_SOURCE_BODY.len()),
        );
        let mut response = Response::new(Body::from(UNAUTHENTIC_SOURCE_BODY));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        *response.headers_mut() = headers;
        return response;
    }

    let mut response = Response::new(Body::from_stream(resp.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[must_use]
pub(crate) fn json_error_response(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({ "error": message });
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(base: &str) -> ProxyEngine {
        let credential = Credential {
            username: "chart_controller".to_string(),
            password: "secret".to_string(),
        };
        ProxyEngine::new(Url::parse(base).unwrap(), &credential).unwrap()
    }

    #[test]
    fn test_single_joining_slash() {
        assert_eq!(single_joining_slash("/", "/health"), "/health");
        assert_eq!(single_joining_slash("/base/", "/repo1"), "/base/repo1");
        assert_eq!(single_joining_slash("/base", "repo1"), "/base/repo1");
        assert_eq!(single_joining_slash("/base", "/repo1"), "/base/repo1");
    }

    #[test]
    fn test_rewrite_url_path() {
        assert_eq!(rewrite_url_path("/api/chartrepo/health"), "/health");
        assert_eq!(
            rewrite_url_path("/api/chartrepo/charts"),
            "/api/chartrepo/library/charts"
        );
        assert_eq!(
            rewrite_url_path("/chartrepo/repo3/charts/harbor-0.8.1.tgz"),
            "/repo3/charts/harbor-0.8.1.tgz"
        );
        assert_eq!(
            rewrite_url_path("/api/chartrepo/repo1/charts/harbor/0.2.0"),
            "/api/chartrepo/repo1/charts/harbor/0.2.0"
        );
        assert_eq!(rewrite_url_path("/chartrepository"), "/chartrepository");
    }

    #[test]
    fn test_direct_merges_path_and_query() {
        let proxy = engine("http://backend:9999/base?token=a");
        let uri: Uri = "/chartrepo/repo1/index.yaml?x=1".parse().unwrap();
        let target = proxy.direct(&uri);
        assert_eq!(
            target.as_str(),
            "http://backend:9999/base/repo1/index.yaml?token=a&x=1"
        );

        let proxy = engine("http://backend:9999");
        let uri: Uri = "/api/chartrepo/health".parse().unwrap();
        assert_eq!(proxy.direct(&uri).as_str(), "http://backend:9999/health");
    }

    #[test]
    fn test_forwarded_headers_strip_credentials() {
        let mut incoming = HeaderMap::new();
        incoming.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer user"));
        incoming.insert(header::HOST, HeaderValue::from_static("registry.local"));
        incoming.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        incoming.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let headers = forwarded_headers(&incoming);
        assert!(headers.get(header::AUTHORIZATION).is_none());
        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert_eq!(headers[header::ACCEPT], "application/json");
    }
}
