// Library interface so integration tests can build the app without
// going through main.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod outbound;
pub mod quota;
pub mod routes;
pub mod state;
pub mod store;
pub mod users;

use axum::Router;

use crate::state::AppState;

/// The full route surface, ready for `.with_state(state)`.
pub fn app_router() -> Router<AppState> {
    Router::new()
        .merge(routes::auth::router())
        .merge(routes::codes::router())
        .merge(routes::messages::router())
        .merge(routes::reviews::router())
        .merge(routes::content::router())
        .merge(routes::events::router())
}
