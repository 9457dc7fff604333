use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::repo_types::{Todo, TodoFilter, TodoRow};
use crate::db::StoreError;

/// Persistence for todos. Every method takes the owner id and only touches
/// that owner's live rows.
#[async_trait]
pub trait TodoRepo: Send + Sync {
    async fn insert(&self, todo: Todo) -> Result<Todo, StoreError>;
    async fn find(&self, owner: Uuid, id: Uuid) -> Result<Option<Todo>, StoreError>;
    /// Newest first. Returns the page and the total matching count.
    async fn list(
        &self,
        owner: Uuid,
        filter: &TodoFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Todo>, i64), StoreError>;
    /// Writes every mutable column of `todo`; `None` when the row is gone.
    async fn update(&self, todo: Todo) -> Result<Option<Todo>, StoreError>;
    /// Returns whether a live row was marked deleted.
    async fn soft_delete(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError>;
}

const COLUMNS: &str =
    "id, user_id, title, description, priority, status, due_date, created_at, updated_at";

#[derive(Clone)]
pub struct PgTodoRepo {
    db: PgPool,
}

impl PgTodoRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn to_todo(row: TodoRow) -> Result<Todo, StoreError> {
    Todo::try_from(row).map_err(|e| StoreError::Database(sqlx::Error::Decode(e.into())))
}

/// Escapes LIKE metacharacters so the search text matches literally.
pub(crate) fn like_pattern(search: &str) -> String {
    let mut out = String::with_capacity(search.len() + 2);
    out.push('%');
    for c in search.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, owner: Uuid, filter: &TodoFilter) {
    qb.push(" WHERE deleted_at IS NULL AND user_id = ");
    qb.push_bind(owner);
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ");
        qb.push_bind(priority.as_str());
    }
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        qb.push(" AND (title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR description ILIKE ");
        qb.push_bind(pattern);
        qb.push(" ESCAPE '\\')");
    }
}

#[async_trait]
impl TodoRepo for PgTodoRepo {
    async fn insert(&self, todo: Todo) -> Result<Todo, StoreError> {
        let row = sqlx::query_as::<_, TodoRow>(&format!(
            r#"
            INSERT INTO todos (id, user_id, title, description, priority, status, due_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(todo.id)
        .bind(todo.user_id)
        .bind(&todo.title)
        .bind(&todo.description)
        .bind(todo.priority.as_str())
        .bind(todo.status.as_str())
        .bind(todo.due_date)
        .bind(todo.created_at)
        .bind(todo.updated_at)
        .fetch_one(&self.db)
        .await?;
        to_todo(row)
    }

    async fn find(&self, owner: Uuid, id: Uuid) -> Result<Option<Todo>, StoreError> {
        let row = sqlx::query_as::<_, TodoRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM todos
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_todo).transpose()
    }

    async fn list(
        &self,
        owner: Uuid,
        filter: &TodoFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Todo>, i64), StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM todos");
        push_filters(&mut count, owner, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.db).await?;

        let mut page = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM todos"));
        push_filters(&mut page, owner, filter);
        page.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        page.push_bind(limit);
        page.push(" OFFSET ");
        page.push_bind(offset);
        let rows = page
            .build_query_as::<TodoRow>()
            .fetch_all(&self.db)
            .await?;

        let todos = rows.into_iter().map(to_todo).collect::<Result<Vec<_>, _>>()?;
        Ok((todos, total))
    }

    async fn update(&self, todo: Todo) -> Result<Option<Todo>, StoreError> {
        let row = sqlx::query_as::<_, TodoRow>(&format!(
            r#"
            UPDATE todos
            SET title = $3, description = $4, priority = $5, status = $6,
                due_date = $7, updated_at = $8
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(todo.id)
        .bind(todo.user_id)
        .bind(&todo.title)
        .bind(&todo.description)
        .bind(todo.priority.as_str())
        .bind(todo.status.as_str())
        .bind(todo.due_date)
        .bind(todo.updated_at)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_todo).transpose()
    }

    async fn soft_delete(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE todos
            SET deleted_at = now()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(owner)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
