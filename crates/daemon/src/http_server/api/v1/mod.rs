use axum::Router;

use crate::ServiceState;

pub mod snapshot;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/snapshot", snapshot::router(state.clone()))
        .with_state(state)
}
