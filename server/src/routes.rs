//! Route table.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub const HEALTH: &str = "/health";
pub const METRICS: &str = "/metrics";
pub const ACCOUNTS: &str = "/api/credit/accounts";
pub const ACCOUNT_BY_ID: &str = "/api/credit/accounts/:id";
pub const ACCOUNT_ADJUST: &str = "/api/credit/accounts/:id/adjust";
pub const ACCOUNT_RECONCILE: &str = "/api/credit/accounts/:id/reconcile";
pub const ENTRIES: &str = "/api/credit/entries";
pub const ENTRY_BY_ID: &str = "/api/credit/entries/:id";

/// Credit account routes
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route(
            ACCOUNTS,
            post(handlers::create_account).get(handlers::list_accounts),
        )
        .route(
            ACCOUNT_BY_ID,
            get(handlers::get_account).patch(handlers::update_account),
        )
        .route(ACCOUNT_ADJUST, post(handlers::adjust_balance))
        .route(ACCOUNT_RECONCILE, get(handlers::reconcile_account))
}

/// Credit entry routes
pub fn entry_routes() -> Router<AppState> {
    Router::new()
        .route(ENTRIES, post(handlers::post_entry).get(handlers::list_entries))
        .route(
            ENTRY_BY_ID,
            get(handlers::get_entry)
                .patch(handlers::update_entry)
                .delete(handlers::delete_entry),
        )
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH, get(handlers::health))
        .route(METRICS, get(handlers::metrics))
        .merge(account_routes())
        .merge(entry_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
