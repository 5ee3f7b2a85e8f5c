use crate::state::AppState;
use axum::Router;

mod claims;
mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod reset;
pub mod roles;
pub mod services;
pub mod store;

pub use dto::UserData;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
