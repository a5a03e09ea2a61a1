//! Chart repository controller: proxying, backend access, archive parsing,
//! caching and cross-namespace aggregation.

pub mod cache;
pub mod client;
mod controller;
pub mod filename;
pub mod index;
pub mod manipulation;
pub mod notifier;
pub mod parser;
pub mod proxy;
pub mod search;

pub use cache::{CacheDriver, ChartCache};
pub use client::BackendClient;
pub use controller::ChartController;
pub use filename::{chart_full_name, parse_chart_version_from_filename};
pub use index::IndexAggregator;
pub use manipulation::ChartManipulator;
pub use notifier::{ChartEvent, EventPublisher, LogNotifier, Notifier};
pub use parser::ChartOperator;
pub use proxy::ProxyEngine;
pub use search::{SearchIndex, SearchResult};
