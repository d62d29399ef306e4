use crate::state::AppState;
use axum::Router;

mod claims;
mod dto;
pub mod extractors;
pub mod handlers;
mod jwt;
mod password;
pub mod repo;
mod repo_types;
pub mod services;

/// Account routes, mounted under `/users`.
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(handlers::public_routes(state))
        .merge(handlers::protected_routes(state))
}
