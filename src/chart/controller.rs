use std::sync::Arc;

use axum::extract::Request;
use axum::response::Response;
use tracing::{debug, info};
use url::Url;

use super::cache::ChartCache;
use super::client::BackendClient;
use super::filename::{chart_full_name, parse_chart_version_from_filename};
use super::manipulation::ChartManipulator;
use super::notifier::{ChartEvent, EventPublisher, LogNotifier, Notifier};
use super::proxy::ProxyEngine;
use super::search::SearchResult;
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::types::{ChartInfo, ChartVersion, ChartVersionDetails, IndexFile};

/// Entry point for the HTTP layer: proxied passthroughs plus the operations
/// that need parsing, caching or aggregation.
pub struct ChartController {
    proxy: Arc<ProxyEngine>,
    manipulator: ChartManipulator,
    events: EventPublisher,
}

impl ChartController {
    pub async fn new(config: ControllerConfig) -> Result<Self> {
        Self::with_notifier(config, Arc::new(LogNotifier)).await
    }

    pub async fn with_notifier(config: ControllerConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let backend = config.backend_url.trim();
        if backend.is_empty() {
            return Err(Error::BadInput("backend url is required".to_string()));
        }
        let backend_url = Url::parse(backend)
            .map_err(|e| Error::InvalidUrl(format!("{backend}: {e}")))?;

        let client = BackendClient::new(config.credential.clone())?;
        let proxy = Arc::new(ProxyEngine::new(backend_url.clone(), &config.credential)?);
        let cache = Arc::new(ChartCache::new(config.cache.as_ref()).await);
        let events = EventPublisher::new(notifier, config.suppress_events);

        let manipulator = ChartManipulator::new(
            backend.trim_end_matches('/'),
            config.external_endpoint,
            client,
            Arc::clone(&proxy),
            cache,
            events.clone(),
        );

        info!(backend = %backend_url, "chart controller initialized");
        Ok(Self {
            proxy,
            manipulator,
            events,
        })
    }

    #[must_use]
    pub fn cache_enabled(&self) -> bool {
        self.manipulator.cache().is_enabled()
    }

    pub async fn list_charts(&self, namespace: &str) -> Result<Vec<ChartInfo>> {
        self.manipulator.list_charts(namespace).await
    }

    pub async fn get_chart(&self, namespace: &str, name: &str) -> Result<Vec<ChartVersion>> {
        self.manipulator.get_chart(namespace, name).await
    }

    pub async fn get_chart_version(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> Result<ChartVersion> {
        self.manipulator
            .get_chart_version(namespace, name, version)
            .await
    }

    pub async fn get_chart_version_details(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> Result<ChartVersionDetails> {
        self.manipulator
            .get_chart_version_details(namespace, name, version)
            .await
    }

    pub async fn delete_chart(&self, namespace: &str, name: &str) -> Result<()> {
        self.manipulator.delete_chart(namespace, name).await
    }

    pub async fn delete_chart_version(&self, namespace: &str, name: &str, version: &str) -> Result<()> {
        self.manipulator
            .delete_chart_version(namespace, name, version)
            .await
    }

    pub async fn search_chart(&self, query: &str, namespaces: &[String]) -> Result<Vec<SearchResult>> {
        self.manipulator.search_chart(query, namespaces).await
    }

    pub async fn get_index_file(&self, namespaces: &[String]) -> Result<IndexFile> {
        self.manipulator.aggregator().get_index(namespaces).await
    }

    pub async fn get_count_of_charts(&self, namespaces: &[String]) -> Result<usize> {
        self.manipulator
            .aggregator()
            .get_count_of_charts(namespaces)
            .await
    }

    pub async fn get_health(&self, req: Request) -> Response {
        self.proxy.serve(req).await
    }

    pub async fn get_index_by_namespace(&self, req: Request) -> Response {
        self.proxy.serve(req).await
    }

    /// Proxies a package download, announcing it first.
    pub async fn download_chart(&self, namespace: &str, filename: &str, req: Request) -> Response {
        let (name, version) = parse_chart_version_from_filename(filename);
        debug!(chart = %chart_full_name(namespace, &name, &version), "chart download");
        self.events
            .publish(ChartEvent::downloaded(namespace, &name, &version));
        self.proxy.serve(req).await
    }

    pub async fn upload_chart(&self, req: Request) -> Response {
        self.proxy.serve(req).await
    }

    pub async fn upload_provenance(&self, req: Request) -> Response {
        self.proxy.serve(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    #[tokio::test]
    async fn test_new_rejects_missing_backend() {
        let result = ChartController::new(ControllerConfig::new("", "")).await;
        assert!(matches!(result, Err(Error::BadInput(_))));

        let result = ChartController::new(ControllerConfig::new("not a url", "")).await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_new_with_memory_cache() {
        let config = ControllerConfig::new("http://127.0.0.1:9", "https://registry.local")
            .with_cache(CacheConfig::new("memory", ""));
        let controller = ChartController::new(config).await.unwrap();
        assert!(controller.cache_enabled());

        let controller = ChartController::new(ControllerConfig::new("http://127.0.0.1:9", ""))
            .await
            .unwrap();
        assert!(!controller.cache_enabled());
    }
}
