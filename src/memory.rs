//! In-process store used by the test suite and `STORE=memory`.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    auth::{
        repo::UserRepo,
        repo_types::{NewUser, User},
    },
    db::StoreError,
    todos::{
        repo::TodoRepo,
        repo_types::{Todo, TodoFilter},
    },
};

struct Stored<T> {
    seq: u64,
    deleted: bool,
    value: T,
}

#[derive(Default)]
struct Tables {
    seq: u64,
    users: HashMap<Uuid, Stored<User>>,
    todos: HashMap<Uuid, Stored<Todo>>,
}

impl Tables {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut t = self.inner.write().await;
        if t
            .users
            .values()
            .any(|u| !u.deleted && u.value.email == new.email)
        {
            return Err(StoreError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            created_at: now,
            updated_at: now,
        };
        let seq = t.next_seq();
        t.users.insert(
            user.id,
            Stored {
                seq,
                deleted: false,
                value: user.clone(),
            },
        );
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.inner.read().await;
        Ok(t
            .users
            .values()
            .find(|u| !u.deleted && u.value.email == email)
            .map(|u| u.value.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let t = self.inner.read().await;
        Ok(t
            .users
            .get(&id)
            .filter(|u| !u.deleted)
            .map(|u| u.value.clone()))
    }
}

#[async_trait]
impl TodoRepo for MemoryStore {
    async fn insert(&self, todo: Todo) -> Result<Todo, StoreError> {
        let mut t = self.inner.write().await;
        if t.todos.contains_key(&todo.id) {
            return Err(StoreError::Conflict);
        }
        let seq = t.next_seq();
        t.todos.insert(
            todo.id,
            Stored {
                seq,
                deleted: false,
                value: todo.clone(),
            },
        );
        Ok(todo)
    }

    async fn find(&self, owner: Uuid, id: Uuid) -> Result<Option<Todo>, StoreError> {
        let t = self.inner.read().await;
        Ok(t
            .todos
            .get(&id)
            .filter(|s| !s.deleted && s.value.user_id == owner)
            .map(|s| s.value.clone()))
    }

    async fn list(
        &self,
        owner: Uuid,
        filter: &TodoFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Todo>, i64), StoreError> {
        let t = self.inner.read().await;
        let mut hits: Vec<&Stored<Todo>> = t
            .todos
            .values()
            .filter(|s| !s.deleted && s.value.user_id == owner && filter.matches(&s.value))
            .collect();
        // Newest first; insertion order breaks timestamp ties.
        hits.sort_by(|a, b| {
            b.value
                .created_at
                .cmp(&a.value.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        let total = hits.len() as i64;
        let page = hits
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|s| s.value.clone())
            .collect();
        Ok((page, total))
    }

    async fn update(&self, todo: Todo) -> Result<Option<Todo>, StoreError> {
        let mut t = self.inner.write().await;
        match t.todos.get_mut(&todo.id) {
            Some(s) if !s.deleted && s.value.user_id == todo.user_id => {
                // Identity and creation time are fixed at insert.
                s.value = Todo {
                    created_at: s.value.created_at,
                    ..todo
                };
                Ok(Some(s.value.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn soft_delete(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.inner.write().await;
        match t.todos.get_mut(&id) {
            Some(s) if !s.deleted && s.value.user_id == owner => {
                s.deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todos::repo_types::{Priority, Status};

    fn todo(owner: Uuid, title: &str, created_at: OffsetDateTime) -> Todo {
        Todo {
            id: Uuid::new_v4(),
            user_id: owner,
            title: title.into(),
            description: String::new(),
            priority: Priority::Medium,
            status: Status::Pending,
            due_date: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn duplicate_live_email_conflicts() {
        let store = MemoryStore::default();
        let new = || NewUser {
            name: "Alice".into(),
            email: "alice@example.com".into(),
            password_hash: "hash".into(),
        };
        store.create(new()).await.unwrap();
        assert!(matches!(store.create(new()).await, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn list_orders_newest_first() {
        let store = MemoryStore::default();
        let owner = Uuid::new_v4();
        let early = OffsetDateTime::now_utc() - time::Duration::hours(1);
        let late = OffsetDateTime::now_utc();
        store.insert(todo(owner, "late", late)).await.unwrap();
        store.insert(todo(owner, "early", early)).await.unwrap();

        let (items, total) = store
            .list(owner, &TodoFilter::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(items[0].title, "late");
        assert_eq!(items[1].title, "early");
    }

    #[tokio::test]
    async fn update_and_delete_respect_owner() {
        let store = MemoryStore::default();
        let owner = Uuid::new_v4();
        let t = store
            .insert(todo(owner, "mine", OffsetDateTime::now_utc()))
            .await
            .unwrap();

        let foreign = Todo {
            user_id: Uuid::new_v4(),
            title: "hijacked".into(),
            ..t.clone()
        };
        assert_eq!(store.update(foreign).await.unwrap(), None);
        assert!(!store.soft_delete(Uuid::new_v4(), t.id).await.unwrap());
        assert_eq!(store.find(owner, t.id).await.unwrap().unwrap().title, "mine");

        assert!(store.soft_delete(owner, t.id).await.unwrap());
        assert_eq!(store.find(owner, t.id).await.unwrap(), None);
        assert!(!store.soft_delete(owner, t.id).await.unwrap());
    }
}
