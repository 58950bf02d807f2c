//! In-memory store, used by the test-suite and when no `DATABASE_URL` is set.
//! Data is lost on restart.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    sorted_counts, GroupField, ObjectId, StoreError, TaskFilter, TaskOrder, TaskStore, UserStore,
};
use crate::models::{GroupCount, Task, TaskDraft, User, UserChanges};
use crate::validation::Enumerated;

/// Both collections behind async locks, kept in insertion order.
pub struct MemoryStore {
    tasks: RwLock<Vec<Task>>,
    users: RwLock<Vec<User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
            users: RwLock::new(Vec::new()),
        }
    }

    fn duplicate_email(email: &str) -> StoreError {
        let mut key_value = BTreeMap::new();
        key_value.insert("email".to_string(), email.to_string());
        StoreError::DuplicateKey {
            errmsg: format!("users index: email_1 dup key: {{ email: \"{}\" }}", email),
            key_value,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn find_all(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.tasks.read().await.clone())
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().find(|task| &task.id == id).cloned())
    }

    async fn find(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<Task> = tasks.iter().filter(|t| filter.matches(t)).cloned().collect();
        match filter.order {
            TaskOrder::Natural => {}
            TaskOrder::DueDateAsc => found.sort_by_key(|t| t.due_date),
            TaskOrder::CreatedDateAsc => found.sort_by_key(|t| t.created_at),
            TaskOrder::CreatedDateDesc => found.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
        Ok(found)
    }

    async fn insert(&self, task: Task) -> Result<Task, StoreError> {
        self.tasks.write().await.push(task.clone());
        Ok(task)
    }

    async fn update(&self, id: &ObjectId, draft: TaskDraft) -> Result<Option<Task>, StoreError> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks.iter_mut().find(|task| &task.id == id).map(|task| {
            task.apply(draft);
            task.clone()
        }))
    }

    async fn delete(&self, id: &ObjectId) -> Result<u64, StoreError> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|task| &task.id != id);
        Ok((before - tasks.len()) as u64)
    }

    async fn count_by(
        &self,
        field: GroupField,
        assigned_user: Option<&str>,
    ) -> Result<Vec<GroupCount>, StoreError> {
        let tasks = self.tasks.read().await;
        let mut counts: HashMap<&'static str, i64> = HashMap::new();
        for task in tasks
            .iter()
            .filter(|t| assigned_user.map_or(true, |email| t.assigned_user == email))
        {
            let key = match field {
                GroupField::Status => task.status.as_str(),
                GroupField::Priority => task.priority.as_str(),
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        Ok(sorted_counts(
            counts
                .into_iter()
                .map(|(id, count)| GroupCount {
                    id: id.to_string(),
                    count,
                })
                .collect(),
        ))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_all(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.users.read().await.clone())
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|user| &user.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|user| user.email == email).cloned())
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.iter().any(|existing| existing.email == user.email) {
            return Err(Self::duplicate_email(&user.email));
        }
        users.push(user.clone());
        Ok(user)
    }

    async fn update(
        &self,
        id: &ObjectId,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        let index = match users.iter().position(|user| &user.id == id) {
            Some(index) => index,
            None => return Ok(None),
        };
        if users
            .iter()
            .any(|other| &other.id != id && other.email == changes.email)
        {
            return Err(Self::duplicate_email(&changes.email));
        }
        let user = &mut users[index];
        user.apply(changes);
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: &ObjectId) -> Result<u64, StoreError> {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|user| &user.id != id);
        Ok((before - users.len()) as u64)
    }
}
