use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query,
    },
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    dto::{CreateTodoRequest, ListTodosParams, TodoListResponse, TodoResponse, UpdateTodoRequest},
    services::{ListQuery, NewTodo, OwnedTodos, TodoPatch},
};
use crate::{error::AppError, state::AppState};

/// Needs `require_auth` in front of it.
pub fn todo_routes() -> Router<AppState> {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route(
            "/todos/:id",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .route("/todos/:id/toggle", patch(toggle_todo))
}

// Unparseable ids can't name an existing todo.
fn todo_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| {
        debug!(id = raw, "malformed todo id");
        AppError::NotFound("todo")
    })
}

#[instrument(skip(todos, payload), fields(user_id = %todos.owner()))]
pub async fn create_todo(
    todos: OwnedTodos,
    payload: Result<Json<CreateTodoRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TodoResponse>), AppError> {
    let Json(payload) = payload?;
    let todo = todos.create(NewTodo::try_from(payload)?).await?;
    Ok((StatusCode::CREATED, Json(todo.into())))
}

#[instrument(skip(todos, params), fields(user_id = %todos.owner()))]
pub async fn list_todos(
    todos: OwnedTodos,
    params: Result<Query<ListTodosParams>, QueryRejection>,
) -> Result<Json<TodoListResponse>, AppError> {
    let Query(params) = params?;
    let page = todos.list(ListQuery::try_from(params)?).await?;
    Ok(Json(TodoListResponse {
        data: page.items.into_iter().map(TodoResponse::from).collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
        total_pages: page.total_pages,
    }))
}

#[instrument(skip(todos), fields(user_id = %todos.owner()))]
pub async fn get_todo(
    todos: OwnedTodos,
    Path(id): Path<String>,
) -> Result<Json<TodoResponse>, AppError> {
    let todo = todos.get(todo_id(&id)?).await?;
    Ok(Json(todo.into()))
}

#[instrument(skip(todos, payload), fields(user_id = %todos.owner()))]
pub async fn update_todo(
    todos: OwnedTodos,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTodoRequest>, JsonRejection>,
) -> Result<Json<TodoResponse>, AppError> {
    let id = todo_id(&id)?;
    let Json(payload) = payload?;
    let todo = todos.update(id, TodoPatch::try_from(payload)?).await?;
    Ok(Json(todo.into()))
}

#[instrument(skip(todos), fields(user_id = %todos.owner()))]
pub async fn toggle_todo(
    todos: OwnedTodos,
    Path(id): Path<String>,
) -> Result<Json<TodoResponse>, AppError> {
    let todo = todos.toggle_status(todo_id(&id)?).await?;
    Ok(Json(todo.into()))
}

#[instrument(skip(todos), fields(user_id = %todos.owner()))]
pub async fn delete_todo(
    todos: OwnedTodos,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    todos.delete(todo_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
