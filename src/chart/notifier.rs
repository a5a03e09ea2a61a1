use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;

pub const EVENT_CHART_DELETED: &str = "chart.deleted";
pub const EVENT_CHART_DOWNLOADED: &str = "chart.downloaded";

/// A chart lifecycle event published after a repository operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartEvent {
    #[serde(rename = "type")]
    pub kind: String,
    /// `<namespace>/<chart name>`.
    pub repository: String,
    pub versions: Vec<String>,
}

impl ChartEvent {
    #[must_use]
    pub fn deleted(namespace: &str, name: &str, version: &str) -> Self {
        Self::new(EVENT_CHART_DELETED, namespace, name, version)
    }

    #[must_use]
    pub fn downloaded(namespace: &str, name: &str, version: &str) -> Self {
        Self::new(EVENT_CHART_DOWNLOADED, namespace, name, version)
    }

    fn new(kind: &str, namespace: &str, name: &str, version: &str) -> Self {
        Self {
            kind: kind.to_string(),
            repository: format!("{namespace}/{name}"),
            versions: vec![version.to_string()],
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn handle(&self, event: ChartEvent) -> Result<()>;
}

/// Records events in the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn handle(&self, event: ChartEvent) -> Result<()> {
        info!(
            event = %event.kind,
            repository = %event.repository,
            versions = ?event.versions,
            "chart event"
        );
        Ok(())
    }
}

/// Hands events to a [`Notifier`] on a background task.
#[derive(Clone)]
pub struct EventPublisher {
    notifier: Arc<dyn Notifier>,
    suppressed: bool,
}

impl EventPublisher {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, suppressed: bool) -> Self {
        Self {
            notifier,
            suppressed,
        }
    }

    pub fn publish(&self, event: ChartEvent) {
        if self.suppressed {
            debug!(event = %event.kind, "event publishing suppressed");
            return;
        }

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let kind = event.kind.clone();
            if let Err(e) = notifier.handle(event).await {
                warn!(event = %kind, "Failed to publish chart event: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    struct ChannelNotifier(mpsc::UnboundedSender<ChartEvent>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn handle(&self, event: ChartEvent) -> Result<()> {
            let _ = self.0.send(event);
            Ok(())
        }
    }

    #[test]
    fn test_event_wire_format() {
        let event = ChartEvent::deleted("library", "harbor", "0.2.0");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({
                "type": "chart.deleted",
                "repository": "library/harbor",
                "versions": ["0.2.0"]
            })
        );
    }

    #[tokio::test]
    async fn test_publish_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let publisher = EventPublisher::new(Arc::new(ChannelNotifier(tx)), false);

        publisher.publish(ChartEvent::downloaded("repo1", "harbor", "0.1.0"));
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, EVENT_CHART_DOWNLOADED);
    }

    #[tokio::test]
    async fn test_publish_suppressed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let publisher = EventPublisher::new(Arc::new(ChannelNotifier(tx)), true);

        publisher.publish(ChartEvent::deleted("repo1", "harbor", "0.1.0"));
        drop(publisher);
        assert!(rx.recv().await.is_none());
    }
}
