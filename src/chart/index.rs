use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::client::{BackendClient, backend_url};
use crate::error::{Error, Result};
use crate::types::IndexFile;

/// Upper bound of concurrent per-namespace index fetches.
pub const MAX_WORKERS: usize = 10;

/// Fetches per-namespace `index.yaml` documents and merges them into one index.
#[derive(Clone)]
pub struct IndexAggregator {
    backend: String,
    client: BackendClient,
}

impl IndexAggregator {
    #[must_use]
    pub fn new(backend: impl Into<String>, client: BackendClient) -> Self {
        Self {
            backend: backend.into(),
            client,
        }
    }

    /// Merged index of `namespaces`: chart keys and names become `<ns>/<chart>`,
    /// relative URLs are prefixed with `<ns>/`.
    ///
    /// Fetches run concurrently. The first failed fetch stops further ones from
    /// being started and is returned once the running ones have finished.
    pub async fn get_index(&self, namespaces: &[String]) -> Result<IndexFile> {
        if namespaces.is_empty() {
            let mut index = IndexFile::new();
            index.generated = Some(Utc::now().trunc_subsecs(0));
            return Ok(index);
        }

        let workers = namespaces.len().min(MAX_WORKERS);
        let semaphore = Arc::new(Semaphore::new(workers));
        let (result_tx, mut result_rx) = mpsc::channel::<(String, IndexFile)>(workers);
        let (error_tx, mut error_rx) = mpsc::channel::<Error>(1);

        let merger = tokio::spawn(async move {
            let mut merged = MergedIndex::default();
            while let Some((namespace, index)) = result_rx.recv().await {
                merged.merge(&namespace, index);
            }
            merged
        });

        let mut first_error = None;
        let mut tasks = JoinSet::new();
        for namespace in namespaces {
            if let Ok(e) = error_rx.try_recv() {
                first_error = Some(e);
                break;
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            let aggregator = self.clone();
            let namespace = namespace.clone();
            let result_tx = result_tx.clone();
            let error_tx = error_tx.clone();

            tasks.spawn(async move {
                let _permit = permit;
                match aggregator.get_index_for_single_namespace(&namespace).await {
                    Ok(index) => {
                        if result_tx.send((namespace, index)).await.is_err() {
                            warn!("Index merger stopped before all results arrived");
                        }
                    }
                    Err(e) => {
                        if let Err(mpsc::error::TrySendError::Full(e)) = error_tx.try_send(e) {
                            warn!(%namespace, "Dropping index fetch error: {e}");
                        }
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Index fetch task failed: {e}");
            }
        }
        drop(result_tx);

        let merged = merger
            .await
            .map_err(|e| Error::Internal(format!("index merger failed: {e}")))?;

        if first_error.is_none() {
            first_error = error_rx.try_recv().ok();
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(merged.finish()),
        }
    }

    pub async fn get_index_for_single_namespace(&self, namespace: &str) -> Result<IndexFile> {
        if namespace.is_empty() {
            return Err(Error::BadInput("empty namespace".to_string()));
        }

        let url = backend_url(&self.backend, &format!("{namespace}/index.yaml"));
        let content = self.client.get(&url).await?;
        let index: IndexFile = serde_yaml::from_slice(&content)?;
        debug!(%namespace, charts = index.entries.len(), "fetched index");
        Ok(index)
    }

    pub async fn get_count_of_charts(&self, namespaces: &[String]) -> Result<usize> {
        if namespaces.is_empty() {
            return Ok(0);
        }
        Ok(self.get_index(namespaces).await?.entries.len())
    }
}

/// Fold state owned by the merger task.
#[derive(Default)]
struct MergedIndex {
    index: IndexFile,
    public_keys: BTreeSet<String>,
    generated: Option<DateTime<Utc>>,
}

impl MergedIndex {
    fn merge(&mut self, namespace: &str, index: IndexFile) {
        for (chart, mut versions) in index.entries {
            let name = format!("{namespace}/{chart}");
            for version in &mut versions {
                version.name.clone_from(&name);
                for url in &mut version.urls {
                    if !url.starts_with("http") {
                        *url = format!("{namespace}/{}", url.trim_start_matches('/'));
                    }
                }
            }
            self.index.entries.insert(name, versions);
        }

        self.public_keys.extend(index.public_keys);
        if let Some(generated) = index.generated {
            self.generated = Some(self.generated.map_or(generated, |g| g.max(generated)));
        }
    }

    fn finish(self) -> IndexFile {
        let mut index = self.index;
        index.api_version = crate::types::INDEX_API_VERSION.to_string();
        index.public_keys = self.public_keys.into_iter().collect();
        index.generated = Some(
            self.generated
                .unwrap_or_else(|| Utc::now().trunc_subsecs(0)),
        );
        index
    }
}
