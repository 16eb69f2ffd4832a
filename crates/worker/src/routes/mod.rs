pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the worker's HTTP router.
pub fn create_router(state: AppState) -> Router {
    Router::new().merge(health::router()).with_state(state)
}
