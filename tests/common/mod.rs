#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeZone, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use chartmux::chart::{ChartController, ChartEvent, Notifier};
use chartmux::config::{ControllerConfig, DEFAULT_SERVICE_USERNAME};
use chartmux::types::{ChartVersion, IndexFile};

pub const PASSWORD: &str = "s3cret";
pub const EXTERNAL_ENDPOINT: &str = "https://registry.local";

/// Canned content served by [`MockBackend`].
#[derive(Default)]
pub struct Fixtures {
    pub indices: HashMap<String, IndexFile>,
    /// Versions keyed by `(namespace, chart name)`.
    pub versions: BTreeMap<(String, String), Vec<ChartVersion>>,
    /// Raw files keyed by `<namespace>/charts/<file>`.
    pub files: HashMap<String, Vec<u8>>,
    /// `<namespace>/<name>/<version>` entries whose deletion fails with 500.
    pub failing_deletes: HashSet<String>,
    /// When set, requests without the matching service credential get 401.
    pub password: Option<String>,
    pub delete_delay: Duration,
}

impl Fixtures {
    pub fn add_versions(&mut self, namespace: &str, versions: Vec<ChartVersion>) {
        for version in versions {
            self.versions
                .entry((namespace.to_string(), version.name.clone()))
                .or_default()
                .push(version);
        }
    }
}

/// Request metadata captured by the mock backend.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
    pub body_len: usize,
}

struct MockState {
    fixtures: Fixtures,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// In-process chart server speaking the backend API.
pub struct MockBackend {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start(fixtures: Fixtures) -> Self {
        let state = Arc::new(MockState {
            fixtures,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock backend");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().expect("calls lock").clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn count_method(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }

    pub fn max_concurrent_deletes(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };
    let authorization = header_value(header::AUTHORIZATION);
    state.calls.lock().expect("calls lock").push(RecordedCall {
        method: method.to_string(),
        path: uri.path().to_string(),
        authorization: authorization.clone(),
        user_agent: header_value(header::USER_AGENT),
        body_len: body.len(),
    });

    let fixtures = &state.fixtures;
    if let Some(password) = &fixtures.password {
        if authorization.as_deref() != Some(basic_auth(password).as_str()) {
            return error(StatusCode::UNAUTHORIZED, "bad auth");
        }
    }

    let segments: Vec<String> = uri
        .path()
        .trim_start_matches('/')
        .split('/')
        .map(|s| urlencoding::decode(s).expect("utf-8 path").into_owned())
        .collect();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    match (method.as_str(), segments.as_slice()) {
        ("GET", ["health"]) => Json(json!({ "healthy": true })).into_response(),
        ("GET", [ns, "index.yaml"]) => match fixtures.indices.get(*ns) {
            Some(index) => serde_yaml::to_string(index)
                .expect("encode index")
                .into_response(),
            None => error(StatusCode::NOT_FOUND, "no such repository"),
        },
        ("GET", [ns, "charts", file]) => match fixtures.files.get(&format!("{ns}/charts/{file}")) {
            Some(data) => data.clone().into_response(),
            None => error(StatusCode::NOT_FOUND, "file not found"),
        },
        ("GET", ["api", "chartrepo", ns]) => {
            let listing: BTreeMap<&str, &Vec<ChartVersion>> = fixtures
                .versions
                .iter()
                .filter(|((n, _), _)| n.as_str() == *ns)
                .map(|((_, name), versions)| (name.as_str(), versions))
                .collect();
            Json(json!(listing)).into_response()
        }
        ("POST", ["api", "chartrepo", _, "charts"]) => {
            (StatusCode::CREATED, Json(json!({ "saved": true }))).into_response()
        }
        ("DELETE", ["api", "chartrepo", ns, "charts", name, version]) => {
            let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            state.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(fixtures.delete_delay).await;
            state.in_flight.fetch_sub(1, Ordering::SeqCst);

            if fixtures.failing_deletes.contains(&format!("{ns}/{name}/{version}")) {
                error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &format!("failed to delete {name}-{version}"),
                )
            } else {
                Json(json!({ "deleted": true })).into_response()
            }
        }
        ("GET", ["api", "chartrepo", ns, name]) => {
            match fixtures.versions.get(&((*ns).to_string(), (*name).to_string())) {
                Some(versions) => Json(json!(versions)).into_response(),
                None => error(StatusCode::NOT_FOUND, "chart not found"),
            }
        }
        ("GET", ["api", "chartrepo", ns, name, version]) => fixtures
            .versions
            .get(&((*ns).to_string(), (*name).to_string()))
            .and_then(|versions| versions.iter().find(|v| v.version == *version))
            .map_or_else(
                || error(StatusCode::NOT_FOUND, "chart version not found"),
                |v| Json(json!(v)).into_response(),
            ),
        _ => error(StatusCode::NOT_FOUND, "not found"),
    }
}

pub fn basic_auth(password: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{DEFAULT_SERVICE_USERNAME}:{password}"))
    )
}

pub fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn chart_version(name: &str, version: &str) -> ChartVersion {
    ChartVersion {
        name: name.to_string(),
        version: version.to_string(),
        api_version: "v1".to_string(),
        urls: vec![format!("charts/{name}-{version}.tgz")],
        digest: format!("digest-{name}-{version}"),
        created: timestamp(1_535_600_000),
        ..ChartVersion::default()
    }
}

pub fn index_of(charts: &[(&str, &[&str])], public_keys: &[&str], generated: Option<i64>) -> IndexFile {
    let mut index = IndexFile::new();
    for (name, versions) in charts {
        index.entries.insert(
            (*name).to_string(),
            versions.iter().map(|v| chart_version(name, v)).collect(),
        );
    }
    index.public_keys = public_keys.iter().map(ToString::to_string).collect();
    index.generated = generated.map(timestamp);
    index
}

/// Packs `files` (chart-relative paths) plus a `Chart.yaml` into a chart archive.
pub fn chart_archive(name: &str, version: &str, files: &[(&str, String)]) -> Vec<u8> {
    let chart_yaml = format!("apiVersion: v1\nname: {name}\nversion: {version}\n");
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let all = std::iter::once(("Chart.yaml", chart_yaml.as_str()))
        .chain(files.iter().map(|(path, body)| (*path, body.as_str())));
    for (path, body) in all {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{name}/{path}"), body.as_bytes())
            .expect("append archive entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A values document with `groups * keys` leaves.
pub fn values_yaml(groups: usize, keys: usize) -> String {
    let mut out = String::new();
    for g in 0..groups {
        out.push_str(&format!("group{g}:\n"));
        for k in 0..keys {
            out.push_str(&format!("  key{k}: value-{g}-{k}\n"));
        }
    }
    out
}

pub fn config(backend: &MockBackend) -> ControllerConfig {
    ControllerConfig::new(backend.base_url.clone(), EXTERNAL_ENDPOINT)
        .with_password(PASSWORD)
        .with_suppressed_events(true)
}

pub async fn controller(backend: &MockBackend) -> ChartController {
    ChartController::new(config(backend))
        .await
        .expect("build controller")
}

/// Forwards events to a channel.
pub struct ChannelNotifier(pub mpsc::UnboundedSender<ChartEvent>);

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn handle(&self, event: ChartEvent) -> chartmux::error::Result<()> {
        let _ = self.0.send(event);
        Ok(())
    }
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChartEvent>) -> ChartEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event in time")
        .expect("event channel open")
}
