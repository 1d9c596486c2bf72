//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the websocket gateway and the health surface under a single Axum
//! router. The CORS allow-list comes from `CORS_ORIGINS` (comma-separated);
//! when unset, any origin is accepted.

pub mod health;
pub mod ws;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/health", get(health::health))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match std::env::var("CORS_ORIGINS") {
        Ok(raw) if !raw.trim().is_empty() => {
            let origins: Vec<HeaderValue> =
                raw.split(',').filter_map(|o| o.trim().parse().ok()).collect();
            base.allow_origin(AllowOrigin::list(origins))
        }
        _ => base.allow_origin(Any),
    }
}
