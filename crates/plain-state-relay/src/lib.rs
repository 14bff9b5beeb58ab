//! plain-state relay
//!
//! Moves serialized patches between plain-state replicas over WebSocket and
//! serves the static client.
//!
//! ## Routes
//!
//! - `/sync`: WebSocket; every patch frame a peer sends is forwarded to every
//!   other peer, and new peers first receive the retained history
//! - `/health`: peer and history counts as JSON
//! - anything else: files from the static directory
//!
//! ## Environment Variables
//!
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 5000)
//! - `STATIC_DIR`: Static asset directory (default: client)
//! - `RELAY_HISTORY_LIMIT`: Frames retained for late joiners (default: 10000)
//! - `RELAY_CHANNEL_CAPACITY`: Per-peer broadcast buffer (default: 1024)

pub mod config;
pub mod handlers;
pub mod relay;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{services::ServeDir, trace::TraceLayer};

pub use config::Config;
pub use relay::Relay;

/// The relay's router: sync and health routes, static files for the rest.
pub fn app(relay: Arc<Relay>, config: &Config) -> Router {
    Router::new()
        .route("/sync", get(handlers::ws_handler))
        .route("/health", get(handlers::health))
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(relay)
}
