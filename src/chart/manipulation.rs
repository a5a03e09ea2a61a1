use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use bytes::Bytes;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::cache::ChartCache;
use super::client::{BackendClient, backend_url, extract_error};
use super::filename::chart_full_name;
use super::index::IndexAggregator;
use super::notifier::{ChartEvent, EventPublisher};
use super::parser::ChartOperator;
use super::proxy::ProxyEngine;
use super::search::{SearchIndex, SearchResult, sort_by_score};
use crate::error::{Error, Result};
use crate::types::{ChartInfo, ChartVersion, ChartVersionDetails, SecurityReport};

/// Upper bound of concurrent version deletions for one chart.
pub const MAX_DELETE_WORKERS: usize = 10;
/// Search hits scoring at or above this are dropped.
pub const MAX_SEARCH_SCORE: usize = 25;

const PROVENANCE_EXTENSION: &str = ".prov";

/// Operations that combine backend calls, archive parsing, caching and
/// cross-namespace aggregation.
#[derive(Clone)]
pub struct ChartManipulator {
    backend: String,
    external_endpoint: String,
    client: BackendClient,
    proxy: Arc<ProxyEngine>,
    parser: ChartOperator,
    cache: Arc<ChartCache>,
    aggregator: IndexAggregator,
    events: EventPublisher,
}

impl ChartManipulator {
    #[must_use]
    pub fn new(
        backend: impl Into<String>,
        external_endpoint: impl Into<String>,
        client: BackendClient,
        proxy: Arc<ProxyEngine>,
        cache: Arc<ChartCache>,
        events: EventPublisher,
    ) -> Self {
        let backend = backend.into();
        Self {
            aggregator: IndexAggregator::new(backend.clone(), client.clone()),
            backend,
            external_endpoint: external_endpoint.into(),
            client,
            proxy,
            parser: ChartOperator::new(),
            cache,
            events,
        }
    }

    #[must_use]
    pub fn aggregator(&self) -> &IndexAggregator {
        &self.aggregator
    }

    #[must_use]
    pub fn cache(&self) -> &ChartCache {
        &self.cache
    }

    pub async fn list_charts(&self, namespace: &str) -> Result<Vec<ChartInfo>> {
        require("namespace", namespace)?;
        let content = self
            .backend_get(&format!("api/chartrepo/{namespace}"))
            .await?;
        self.parser.get_chart_list(&content)
    }

    pub async fn get_chart(&self, namespace: &str, name: &str) -> Result<Vec<ChartVersion>> {
        require("namespace", namespace)?;
        require("chart name", name)?;
        let content = self
            .backend_get(&format!("api/chartrepo/{namespace}/{name}"))
            .await?;
        self.parser.get_chart_versions(&content)
    }

    pub async fn get_chart_version(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> Result<ChartVersion> {
        require("namespace", namespace)?;
        require("chart name", name)?;
        require("chart version", version)?;
        let content = self
            .backend_get(&format!("api/chartrepo/{namespace}/{name}/{version}"))
            .await?;
        if content.is_empty() {
            return Err(Error::EmptyContent);
        }
        Ok(serde_yaml::from_slice(&content)?)
    }

    /// Details of one chart version. Parsed archive content comes from the cache
    /// when the digest is known; the signature status is looked up every time.
    pub async fn get_chart_version_details(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> Result<ChartVersionDetails> {
        let chart_version = self.get_chart_version(namespace, name, version).await?;
        let Some(url) = chart_version.urls.first().cloned() else {
            return Err(Error::BadInput(format!(
                "chart {} has no download url",
                chart_full_name(namespace, name, version)
            )));
        };

        let cached = self.cache.get(&chart_version.digest).await;
        let mut details = match cached {
            Some(cached) => {
                debug!(digest = %chart_version.digest, "chart details served from cache");
                cached
            }
            None => {
                let content = self.get_chart_version_content(namespace, &url).await?;
                let parsed = self.parser.get_chart_details(&content)?;
                let details = ChartVersionDetails::new(chart_version, parsed);
                self.cache.put(&details).await;
                details
            }
        };

        details.security = Some(self.security_report(namespace, &url).await);
        Ok(details)
    }

    /// Raw bytes behind a chart URL. Relative paths are resolved inside
    /// `namespace`; absolute URLs must point at this registry's `/chartrepo/`.
    pub async fn get_chart_version_content(&self, namespace: &str, sub_path: &str) -> Result<Bytes> {
        let path = if sub_path.starts_with("http") {
            let prefix = format!(
                "{}/chartrepo/",
                self.external_endpoint.trim_end_matches('/')
            );
            sub_path
                .strip_prefix(&prefix)
                .ok_or_else(|| {
                    Error::BadInput(format!("{sub_path} is not served by this registry"))
                })?
                .to_string()
        } else {
            require("namespace", namespace)?;
            format!("{namespace}/{}", sub_path.trim_start_matches('/'))
        };

        self.backend_get(&path).await
    }

    async fn security_report(&self, namespace: &str, chart_url: &str) -> SecurityReport {
        let provenance = format!("{chart_url}{PROVENANCE_EXTENSION}");
        match self.get_chart_version_content(namespace, &provenance).await {
            Ok(content) if !content.is_empty() => SecurityReport::signed(provenance),
            Ok(_) => SecurityReport::unsigned(),
            Err(e) => {
                debug!(%provenance, "No provenance file: {e}");
                SecurityReport::unsigned()
            }
        }
    }

    /// Deletes every version of a chart. All deletions are attempted; the failures
    /// are combined into one error.
    pub async fn delete_chart(&self, namespace: &str, name: &str) -> Result<()> {
        let versions = self.get_chart(namespace, name).await?;
        if versions.is_empty() {
            return Ok(());
        }
        let total = versions.len();

        let semaphore = Arc::new(Semaphore::new(total.min(MAX_DELETE_WORKERS)));
        let (error_tx, mut error_rx) = mpsc::channel::<Error>(1);
        let collector = tokio::spawn(async move {
            let mut errors = Vec::new();
            while let Some(e) = error_rx.recv().await {
                errors.push(e.to_string());
            }
            errors
        });

        let mut workers = JoinSet::new();
        for version in versions {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            let this = self.clone();
            let namespace = namespace.to_string();
            let name = name.to_string();
            let error_tx = error_tx.clone();

            workers.spawn(async move {
                let _permit = permit;
                if let Err(e) = this
                    .delete_chart_version(&namespace, &name, &version.version)
                    .await
                {
                    let _ = error_tx.send(e).await;
                }
            });
        }

        let mut panicked = Vec::new();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                panicked.push(format!("delete worker failed: {e}"));
            }
        }
        drop(error_tx);

        let mut errors = collector
            .await
            .map_err(|e| Error::Internal(format!("delete error collector failed: {e}")))?;
        errors.extend(panicked);

        if errors.is_empty() {
            info!(%namespace, chart = %name, versions = total, "deleted chart");
            return Ok(());
        }
        Err(Error::Aggregate(format!(
            "failed to delete {} of {total} versions of chart {namespace}/{name}: {}",
            errors.len(),
            errors.join("; ")
        )))
    }

    /// Deletes one version through the proxy so the backend sees the same
    /// request a direct API call would produce.
    pub async fn delete_chart_version(&self, namespace: &str, name: &str, version: &str) -> Result<()> {
        require("namespace", namespace)?;
        require("chart name", name)?;
        require("chart version", version)?;

        let uri = format!(
            "/api/chartrepo/{}/charts/{}/{}",
            urlencoding::encode(namespace),
            urlencoding::encode(name),
            urlencoding::encode(version)
        );
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .map_err(|e| Error::Internal(format!("failed to build delete request: {e}")))?;

        let response = self.proxy.serve(request).await;
        let status = response.status();
        if status != StatusCode::OK {
            let content = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .map_err(|e| Error::Internal(format!("failed to read delete response: {e}")))?;
            warn!(
                chart = %chart_full_name(namespace, name, version),
                status = status.as_u16(),
                "Backend refused chart version deletion"
            );
            return Err(extract_error(status, &content));
        }

        info!(chart = %chart_full_name(namespace, name, version), "deleted chart version");
        self.events
            .publish(ChartEvent::deleted(namespace, name, version));
        Ok(())
    }

    /// Regex search over the latest version of every chart in `namespaces`.
    pub async fn search_chart(&self, query: &str, namespaces: &[String]) -> Result<Vec<SearchResult>> {
        if query.is_empty() || namespaces.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.aggregator.get_index(namespaces).await?;
        let mut search = SearchIndex::new();
        search.add_repo("", &index, false);

        let mut results = search.search(query, MAX_SEARCH_SCORE, true)?;
        sort_by_score(&mut results);
        Ok(results)
    }

    async fn backend_get(&self, path: &str) -> Result<Bytes> {
        self.client.get(&backend_url(&self.backend, path)).await
    }
}

fn require(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::BadInput(format!("empty {what}")));
    }
    Ok(())
}
