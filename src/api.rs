pub mod manager;
pub mod public;
pub mod user;

use axum::Router;
use sqlx::SqlitePool;

/// All HTTP endpoints, merged into one router that gets nested under
/// `/api`. Wrong verbs on matched paths answer 405 at the router level.
pub fn api_router() -> Router<SqlitePool> {
    Router::new()
        .merge(public::get_public_scope())
        .merge(user::get_user_scope())
        .merge(manager::get_manager_scope())
}
