//! # Chartmux
//!
//! A multi-tenant API layer in front of a single-tenant Helm chart repository
//! server, usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! chartmux = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chartmux::chart::ChartController;
//! use chartmux::config::ControllerConfig;
//! use chartmux::server::{AppState, create_router};
//!
//! let config = ControllerConfig::from_env("http://chartmuseum:9999", "https://registry.local");
//! let controller = ChartController::new(config).await?;
//! let state = Arc::new(AppState::new(Arc::new(controller), vec!["library".into()]));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `chartmux` binary. Disable with `default-features = false`.

pub mod chart;
pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod types;
