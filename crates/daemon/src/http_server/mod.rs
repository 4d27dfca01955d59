//! Control API
//!
//! - `/_status/livez`: liveness probe
//! - `/v1/snapshot`: capture files and list snapshot history

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::ServiceState;

pub mod api;
pub mod health;

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .nest("/_status", health::router(state.clone()))
        .nest("/v1", api::v1::router(state.clone()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
