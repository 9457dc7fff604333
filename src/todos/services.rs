use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    dto::{CreateTodoRequest, Field, ListTodosParams, UpdateTodoRequest},
    repo::TodoRepo,
    repo_types::{Priority, Status, Todo, TodoFilter},
};
use crate::{
    auth::CurrentUser,
    db::StoreError,
    error::{AppError, FieldErrors},
    state::AppState,
};

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;
pub const SEARCH_MAX_CHARS: usize = 200;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Validated input for [`OwnedTodos::create`].
#[derive(Debug, Clone)]
pub struct NewTodo {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: Option<OffsetDateTime>,
}

/// Validated partial update; `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub due_date: Option<Option<OffsetDateTime>>,
}

impl TodoPatch {
    fn apply(self, todo: &mut Todo) {
        if let Some(title) = self.title {
            todo.title = title;
        }
        if let Some(description) = self.description {
            todo.description = description;
        }
        if let Some(priority) = self.priority {
            todo.priority = priority;
        }
        if let Some(status) = self.status {
            todo.status = status;
        }
        if let Some(due_date) = self.due_date {
            todo.due_date = due_date;
        }
    }
}

/// Normalized listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: i64,
    pub limit: i64,
    pub filter: TodoFilter,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
            filter: TodoFilter::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TodoPage {
    pub items: Vec<Todo>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

fn check_title(title: &str, fields: &mut FieldErrors) {
    let len = title.chars().count();
    if len == 0 {
        fields.insert("title".into(), "title is required".into());
    } else if len > TITLE_MAX_CHARS {
        fields.insert(
            "title".into(),
            format!("title must be at most {TITLE_MAX_CHARS} characters"),
        );
    }
}

fn check_description(description: &str, fields: &mut FieldErrors) {
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        fields.insert(
            "description".into(),
            format!("description must be at most {DESCRIPTION_MAX_CHARS} characters"),
        );
    }
}

fn parse_into<T: std::str::FromStr<Err = String>>(
    name: &str,
    raw: &str,
    fields: &mut FieldErrors,
) -> Option<T> {
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(msg) => {
            fields.insert(name.into(), msg);
            None
        }
    }
}

fn finish<T>(value: T, fields: FieldErrors) -> Result<T, AppError> {
    if fields.is_empty() {
        Ok(value)
    } else {
        Err(AppError::validation("Validation failed", fields))
    }
}

impl TryFrom<CreateTodoRequest> for NewTodo {
    type Error = AppError;

    fn try_from(req: CreateTodoRequest) -> Result<Self, Self::Error> {
        let mut fields = FieldErrors::new();
        check_title(&req.title, &mut fields);
        let description = req.description.unwrap_or_default();
        check_description(&description, &mut fields);
        let priority = match req.priority.as_deref() {
            None => Priority::default(),
            Some(raw) => parse_into("priority", raw, &mut fields).unwrap_or_default(),
        };
        finish(
            NewTodo {
                title: req.title,
                description,
                priority,
                due_date: req.due_date,
            },
            fields,
        )
    }
}

impl TryFrom<UpdateTodoRequest> for TodoPatch {
    type Error = AppError;

    fn try_from(req: UpdateTodoRequest) -> Result<Self, Self::Error> {
        let mut fields = FieldErrors::new();
        let mut patch = TodoPatch::default();

        match req.title {
            Field::Absent => {}
            Field::Null => {
                fields.insert("title".into(), "title cannot be null".into());
            }
            Field::Value(title) => {
                check_title(&title, &mut fields);
                patch.title = Some(title);
            }
        }
        match req.description {
            Field::Absent => {}
            Field::Null => patch.description = Some(String::new()),
            Field::Value(description) => {
                check_description(&description, &mut fields);
                patch.description = Some(description);
            }
        }
        match req.priority {
            Field::Absent => {}
            Field::Null => {
                fields.insert("priority".into(), "priority cannot be null".into());
            }
            Field::Value(raw) => patch.priority = parse_into("priority", &raw, &mut fields),
        }
        match req.status {
            Field::Absent => {}
            Field::Null => {
                fields.insert("status".into(), "status cannot be null".into());
            }
            Field::Value(raw) => patch.status = parse_into("status", &raw, &mut fields),
        }
        match req.due_date {
            Field::Absent => {}
            Field::Null => patch.due_date = Some(None),
            Field::Value(due) => patch.due_date = Some(Some(due)),
        }

        finish(patch, fields)
    }
}

impl TryFrom<ListTodosParams> for ListQuery {
    type Error = AppError;

    fn try_from(p: ListTodosParams) -> Result<Self, Self::Error> {
        let mut fields = FieldErrors::new();

        let page = p.page.filter(|&n| n >= 1).unwrap_or(1);
        let limit = p
            .limit
            .filter(|n| (1..=MAX_LIMIT).contains(n))
            .unwrap_or(DEFAULT_LIMIT);

        let status = p
            .status
            .filter(|s| !s.is_empty())
            .and_then(|raw| parse_into("status", &raw, &mut fields));
        let priority = p
            .priority
            .filter(|s| !s.is_empty())
            .and_then(|raw| parse_into("priority", &raw, &mut fields));
        let search = p.search.filter(|s| !s.is_empty());
        if search
            .as_deref()
            .is_some_and(|s| s.chars().count() > SEARCH_MAX_CHARS)
        {
            fields.insert(
                "search".into(),
                format!("search must be at most {SEARCH_MAX_CHARS} characters"),
            );
        }

        finish(
            ListQuery {
                page,
                limit,
                filter: TodoFilter {
                    status,
                    priority,
                    search,
                },
            },
            fields,
        )
    }
}

fn internal(e: StoreError) -> AppError {
    AppError::Internal(anyhow::Error::new(e).context("todo store"))
}

fn not_found() -> AppError {
    AppError::NotFound("todo")
}

/// Todo operations bound to a single owner. The only way to reach the todo
/// store from a request, so every read and write is scoped to the caller.
#[derive(Clone)]
pub struct OwnedTodos {
    owner: Uuid,
    repo: Arc<dyn TodoRepo>,
}

#[async_trait]
impl FromRequestParts<AppState> for OwnedTodos {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        Ok(Self::new(user.id, state.todos.clone()))
    }
}

impl OwnedTodos {
    pub fn new(owner: Uuid, repo: Arc<dyn TodoRepo>) -> Self {
        Self { owner, repo }
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub async fn create(&self, new: NewTodo) -> Result<Todo, AppError> {
        let now = OffsetDateTime::now_utc();
        let todo = Todo {
            id: Uuid::new_v4(),
            user_id: self.owner,
            title: new.title,
            description: new.description,
            priority: new.priority,
            status: Status::Pending,
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
        };
        let todo = self.repo.insert(todo).await.map_err(internal)?;
        info!(user_id = %self.owner, todo_id = %todo.id, "todo created");
        Ok(todo)
    }

    pub async fn get(&self, id: Uuid) -> Result<Todo, AppError> {
        self.repo
            .find(self.owner, id)
            .await
            .map_err(internal)?
            .ok_or_else(not_found)
    }

    pub async fn list(&self, query: ListQuery) -> Result<TodoPage, AppError> {
        let offset = (query.page - 1).saturating_mul(query.limit);
        let (items, total) = self
            .repo
            .list(self.owner, &query.filter, query.limit, offset)
            .await
            .map_err(internal)?;
        let total_pages = (total + query.limit - 1) / query.limit;
        debug!(user_id = %self.owner, total, page = query.page, "todos listed");
        Ok(TodoPage {
            items,
            total,
            page: query.page,
            limit: query.limit,
            total_pages,
        })
    }

    pub async fn update(&self, id: Uuid, patch: TodoPatch) -> Result<Todo, AppError> {
        let mut todo = self.get(id).await?;
        patch.apply(&mut todo);
        todo.updated_at = OffsetDateTime::now_utc();
        let todo = self
            .repo
            .update(todo)
            .await
            .map_err(internal)?
            .ok_or_else(not_found)?;
        info!(user_id = %self.owner, todo_id = %todo.id, "todo updated");
        Ok(todo)
    }

    /// Flips pending and completed. Calling it twice restores the original status.
    pub async fn toggle_status(&self, id: Uuid) -> Result<Todo, AppError> {
        let mut todo = self.get(id).await?;
        todo.status = todo.status.toggled();
        todo.updated_at = OffsetDateTime::now_utc();
        let todo = self
            .repo
            .update(todo)
            .await
            .map_err(internal)?
            .ok_or_else(not_found)?;
        info!(user_id = %self.owner, todo_id = %todo.id, status = %todo.status, "todo toggled");
        Ok(todo)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        if !self.repo.soft_delete(self.owner, id).await.map_err(internal)? {
            return Err(not_found());
        }
        info!(user_id = %self.owner, todo_id = %id, "todo deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use time::macros::datetime;

    fn scoped(store: &Arc<MemoryStore>, owner: Uuid) -> OwnedTodos {
        OwnedTodos::new(owner, store.clone())
    }

    fn new_todo(title: &str) -> NewTodo {
        NewTodo {
            title: title.into(),
            description: String::new(),
            priority: Priority::Medium,
            due_date: None,
        }
    }

    fn create_req(json: &str) -> Result<NewTodo, AppError> {
        NewTodo::try_from(serde_json::from_str::<CreateTodoRequest>(json).unwrap())
    }

    fn field_errors(err: AppError) -> FieldErrors {
        match err {
            AppError::Validation { fields, .. } => fields,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn create_validation() {
        let ok = create_req(r#"{"title":"Buy milk","priority":"high"}"#).unwrap();
        assert_eq!(ok.priority, Priority::High);
        assert_eq!(ok.description, "");

        let defaulted = create_req(r#"{"title":"Buy milk"}"#).unwrap();
        assert_eq!(defaulted.priority, Priority::Medium);

        let fields = field_errors(create_req(r#"{"title":""}"#).unwrap_err());
        assert!(fields.contains_key("title"));

        let long_title = "x".repeat(TITLE_MAX_CHARS + 1);
        let fields =
            field_errors(create_req(&format!(r#"{{"title":"{long_title}"}}"#)).unwrap_err());
        assert!(fields.contains_key("title"));

        let exact = "é".repeat(TITLE_MAX_CHARS);
        assert!(create_req(&format!(r#"{{"title":"{exact}"}}"#)).is_ok());

        let long_desc = "d".repeat(DESCRIPTION_MAX_CHARS + 1);
        let fields = field_errors(
            create_req(&format!(r#"{{"title":"t","description":"{long_desc}"}}"#)).unwrap_err(),
        );
        assert!(fields.contains_key("description"));

        let fields =
            field_errors(create_req(r#"{"title":"t","priority":"urgent"}"#).unwrap_err());
        assert!(fields.contains_key("priority"));
    }

    #[test]
    fn update_validation() {
        let patch = |json: &str| {
            TodoPatch::try_from(serde_json::from_str::<UpdateTodoRequest>(json).unwrap())
        };

        let p = patch(r#"{}"#).unwrap();
        assert!(p.title.is_none() && p.description.is_none() && p.due_date.is_none());

        let p = patch(r#"{"description":null,"due_date":null}"#).unwrap();
        assert_eq!(p.description.as_deref(), Some(""));
        assert_eq!(p.due_date, Some(None));

        let fields = field_errors(patch(r#"{"title":null,"status":"done"}"#).unwrap_err());
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("status"));

        let fields = field_errors(patch(r#"{"title":""}"#).unwrap_err());
        assert!(fields.contains_key("title"));
    }

    #[test]
    fn list_query_normalization() {
        let q = |page, limit| {
            ListQuery::try_from(ListTodosParams {
                page,
                limit,
                ..Default::default()
            })
            .unwrap()
        };
        assert_eq!((q(None, None).page, q(None, None).limit), (1, 10));
        assert_eq!(q(Some(0), Some(0)).page, 1);
        assert_eq!(q(Some(-3), Some(0)).limit, 10);
        assert_eq!(q(Some(2), Some(101)).limit, 10);
        assert_eq!(q(Some(2), Some(100)).limit, 100);
        assert_eq!(q(Some(2), Some(1)).limit, 1);

        let err = ListQuery::try_from(ListTodosParams {
            status: Some("archived".into()),
            search: Some("s".repeat(SEARCH_MAX_CHARS + 1)),
            ..Default::default()
        })
        .unwrap_err();
        let fields = field_errors(err);
        assert!(fields.contains_key("status"));
        assert!(fields.contains_key("search"));
    }

    #[tokio::test]
    async fn create_forces_pending_and_get_round_trips() {
        let store = Arc::new(MemoryStore::default());
        let todos = scoped(&store, Uuid::new_v4());
        let due = datetime!(2024-02-01 10:00:00 UTC);

        let created = todos
            .create(NewTodo {
                title: "Buy milk".into(),
                description: "two liters".into(),
                priority: Priority::High,
                due_date: Some(due),
            })
            .await
            .unwrap();
        assert_eq!(created.status, Status::Pending);
        assert_eq!(created.user_id, todos.owner());

        let fetched = todos.get(created.id).await.unwrap();
        assert_eq!(fetched.title, "Buy milk");
        assert_eq!(fetched.description, "two liters");
        assert_eq!(fetched.priority, Priority::High);
        assert_eq!(fetched.due_date, Some(due));
    }

    #[tokio::test]
    async fn other_owner_sees_not_found_everywhere() {
        let store = Arc::new(MemoryStore::default());
        let alice = scoped(&store, Uuid::new_v4());
        let bob = scoped(&store, Uuid::new_v4());
        let todo = alice.create(new_todo("private")).await.unwrap();

        assert!(matches!(bob.get(todo.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            bob.update(todo.id, TodoPatch::default()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(bob.toggle_status(todo.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(bob.delete(todo.id).await, Err(AppError::NotFound(_))));
        assert_eq!(bob.list(ListQuery::default()).await.unwrap().total, 0);

        // Untouched for the real owner.
        let still = alice.get(todo.id).await.unwrap();
        assert_eq!(still.status, Status::Pending);
    }

    #[tokio::test]
    async fn pagination_over_25_items() {
        let store = Arc::new(MemoryStore::default());
        let todos = scoped(&store, Uuid::new_v4());
        for i in 0..25 {
            todos.create(new_todo(&format!("todo {i}"))).await.unwrap();
        }

        let first = todos
            .list(ListQuery {
                page: 1,
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.total, 25);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.items[0].title, "todo 24");

        let third = todos
            .list(ListQuery {
                page: 3,
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(third.items.len(), 5);
        assert_eq!(third.items[4].title, "todo 0");

        let past_end = todos
            .list(ListQuery {
                page: 4,
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 25);
    }

    #[tokio::test]
    async fn filters_are_anded() {
        let store = Arc::new(MemoryStore::default());
        let todos = scoped(&store, Uuid::new_v4());
        let milk = todos
            .create(NewTodo {
                priority: Priority::High,
                ..new_todo("Buy MILK")
            })
            .await
            .unwrap();
        todos
            .create(NewTodo {
                description: "milk the cow".into(),
                priority: Priority::Low,
                ..new_todo("Farm")
            })
            .await
            .unwrap();
        todos.create(new_todo("Walk dog")).await.unwrap();
        todos.toggle_status(milk.id).await.unwrap();

        let search = |search: &str, status, priority| ListQuery {
            filter: TodoFilter {
                status,
                priority,
                search: Some(search.into()),
            },
            ..Default::default()
        };

        assert_eq!(todos.list(search("milk", None, None)).await.unwrap().total, 2);
        assert_eq!(
            todos
                .list(search("milk", None, Some(Priority::High)))
                .await
                .unwrap()
                .total,
            1
        );
        assert_eq!(
            todos
                .list(search("milk", Some(Status::Pending), Some(Priority::High)))
                .await
                .unwrap()
                .total,
            0
        );
        assert_eq!(todos.list(search("%", None, None)).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn partial_update_touches_only_given_fields() {
        let store = Arc::new(MemoryStore::default());
        let todos = scoped(&store, Uuid::new_v4());
        let due = datetime!(2030-01-01 00:00:00 UTC);
        let todo = todos
            .create(NewTodo {
                description: "keep me".into(),
                due_date: Some(due),
                ..new_todo("Original")
            })
            .await
            .unwrap();

        let updated = todos
            .update(
                todo.id,
                TodoPatch {
                    title: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.description, "keep me");
        assert_eq!(updated.priority, Priority::Medium);
        assert_eq!(updated.due_date, Some(due));

        let cleared = todos
            .update(
                todo.id,
                TodoPatch {
                    due_date: Some(None),
                    status: Some(Status::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.due_date, None);
        assert_eq!(cleared.status, Status::Completed);
        assert_eq!(cleared.title, "Renamed");
    }

    #[tokio::test]
    async fn toggle_twice_restores_and_delete_hides() {
        let store = Arc::new(MemoryStore::default());
        let todos = scoped(&store, Uuid::new_v4());
        let todo = todos.create(new_todo("flip")).await.unwrap();

        let once = todos.toggle_status(todo.id).await.unwrap();
        assert_eq!(once.status, Status::Completed);
        let twice = todos.toggle_status(todo.id).await.unwrap();
        assert_eq!(twice.status, Status::Pending);

        todos.delete(todo.id).await.unwrap();
        assert!(matches!(todos.get(todo.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(todos.delete(todo.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(todos.toggle_status(todo.id).await, Err(AppError::NotFound(_))));
        assert_eq!(todos.list(ListQuery::default()).await.unwrap().total, 0);
    }
}
