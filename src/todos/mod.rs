pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use repo::{PgTodoRepo, TodoRepo};
pub use services::OwnedTodos;

/// Todo CRUD; every route expects an authenticated caller.
pub fn router() -> Router<AppState> {
    handlers::todo_routes()
}
