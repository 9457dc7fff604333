use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
mod claims;

pub use claims::Claims;
pub use extractors::{require_auth, CurrentUser};
pub use jwt::{JwtKeys, TokenError};
pub use services::{AuthError, AuthService};

/// Public routes: registration and login.
pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}

/// Routes that expect an authenticated caller.
pub fn protected_router() -> Router<AppState> {
    handlers::me_routes()
}
