//! Outbox storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use gasflow_core::DomainError;

use super::types::{DeadLetterEntry, OutboxStatus, OutboxTask, OutboxTaskId};

/// Durable queue of side-effect tasks.
pub trait OutboxStore: Send + Sync {
    fn enqueue(&self, task: OutboxTask) -> Result<OutboxTaskId, OutboxStoreError>;

    /// Write a batch of tasks as `Staged`, all or none.
    ///
    /// Staged tasks are never due; they become runnable through `release`.
    fn stage(&self, tasks: Vec<OutboxTask>) -> Result<Vec<OutboxTaskId>, OutboxStoreError>;

    /// Make staged tasks runnable. Ids that are no longer staged are skipped.
    fn release(&self, ids: &[OutboxTaskId]) -> Result<(), OutboxStoreError>;

    /// Drop staged tasks whose owning transition was not committed.
    fn discard(&self, ids: &[OutboxTaskId]) -> Result<(), OutboxStoreError>;

    /// Get a live task by ID. Dead-lettered tasks live in `list_dead_letters`.
    fn get(&self, id: OutboxTaskId) -> Result<Option<OutboxTask>, OutboxStoreError>;

    fn update(&self, task: &OutboxTask) -> Result<(), OutboxStoreError>;

    /// Atomically mark a due task as running and return it.
    ///
    /// Returns `None` when the task is missing, not due yet, or already
    /// claimed by someone else.
    fn claim(&self, id: OutboxTaskId, now: DateTime<Utc>) -> Result<Option<OutboxTask>, OutboxStoreError>;

    /// IDs of tasks due at `now`, oldest first.
    fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OutboxTaskId>, OutboxStoreError>;

    /// Tasks not yet completed, oldest first.
    fn list_pending(&self, limit: usize) -> Result<Vec<OutboxTask>, OutboxStoreError>;

    /// Move a task to the dead-letter queue.
    fn dead_letter(&self, task: OutboxTask, reason: String) -> Result<(), OutboxStoreError>;

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, OutboxStoreError>;

    /// Move a dead-lettered task back to pending with a fresh attempt budget.
    fn retry_dead_letter(&self, id: OutboxTaskId) -> Result<OutboxTask, OutboxStoreError>;

    fn stats(&self) -> Result<OutboxStats, OutboxStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum OutboxStoreError {
    #[error("outbox task not found: {0}")]
    NotFound(OutboxTaskId),
    #[error("outbox task already exists: {0}")]
    AlreadyExists(OutboxTaskId),
    #[error("outbox storage error: {0}")]
    Storage(String),
}

impl From<OutboxStoreError> for DomainError {
    fn from(err: OutboxStoreError) -> Self {
        match err {
            OutboxStoreError::NotFound(id) => DomainError::not_found(format!("outbox task {id}")),
            OutboxStoreError::AlreadyExists(id) => DomainError::conflict(format!("outbox task {id} already exists")),
            OutboxStoreError::Storage(msg) => DomainError::internal(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub staged: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// In-memory outbox for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOutboxStore {
    tasks: RwLock<HashMap<OutboxTaskId, OutboxTask>>,
    dead_letters: RwLock<HashMap<OutboxTaskId, DeadLetterEntry>>,
}

fn poisoned<T>(_: T) -> OutboxStoreError {
    OutboxStoreError::Storage("outbox lock poisoned".into())
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl OutboxStore for InMemoryOutboxStore {
    fn enqueue(&self, task: OutboxTask) -> Result<OutboxTaskId, OutboxStoreError> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        if tasks.contains_key(&task.id) {
            return Err(OutboxStoreError::AlreadyExists(task.id));
        }
        let id = task.id;
        tasks.insert(id, task);
        Ok(id)
    }

    fn stage(&self, batch: Vec<OutboxTask>) -> Result<Vec<OutboxTaskId>, OutboxStoreError> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        if let Some(dup) = batch.iter().find(|t| tasks.contains_key(&t.id)) {
            return Err(OutboxStoreError::AlreadyExists(dup.id));
        }
        let mut ids = Vec::with_capacity(batch.len());
        for mut task in batch {
            task.status = OutboxStatus::Staged;
            ids.push(task.id);
            tasks.insert(task.id, task);
        }
        Ok(ids)
    }

    fn release(&self, ids: &[OutboxTaskId]) -> Result<(), OutboxStoreError> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        let now = Utc::now();
        for id in ids {
            if let Some(task) = tasks.get_mut(id).filter(|t| t.status == OutboxStatus::Staged) {
                task.status = OutboxStatus::Pending;
                task.updated_at = now;
            }
        }
        Ok(())
    }

    fn discard(&self, ids: &[OutboxTaskId]) -> Result<(), OutboxStoreError> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        for id in ids {
            if tasks.get(id).is_some_and(|t| t.status == OutboxStatus::Staged) {
                tasks.remove(id);
            }
        }
        Ok(())
    }

    fn get(&self, id: OutboxTaskId) -> Result<Option<OutboxTask>, OutboxStoreError> {
        let tasks = self.tasks.read().map_err(poisoned)?;
        Ok(tasks.get(&id).cloned())
    }

    fn update(&self, task: &OutboxTask) -> Result<(), OutboxStoreError> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        match tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(OutboxStoreError::NotFound(task.id)),
        }
    }

    fn claim(&self, id: OutboxTaskId, now: DateTime<Utc>) -> Result<Option<OutboxTask>, OutboxStoreError> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        match tasks.get_mut(&id) {
            Some(task) if task.is_due_at(now) => {
                task.mark_running();
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OutboxTaskId>, OutboxStoreError> {
        let tasks = self.tasks.read().map_err(poisoned)?;
        let mut due: Vec<_> = tasks.values().filter(|t| t.is_due_at(now)).collect();
        due.sort_by_key(|t| (t.created_at, t.id));
        Ok(due.into_iter().take(limit).map(|t| t.id).collect())
    }

    fn list_pending(&self, limit: usize) -> Result<Vec<OutboxTask>, OutboxStoreError> {
        let tasks = self.tasks.read().map_err(poisoned)?;
        let mut pending: Vec<_> = tasks
            .values()
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect();
        pending.sort_by_key(|t| (t.created_at, t.id));
        pending.truncate(limit);
        Ok(pending)
    }

    fn dead_letter(&self, mut task: OutboxTask, reason: String) -> Result<(), OutboxStoreError> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        let mut dls = self.dead_letters.write().map_err(poisoned)?;

        task.status = OutboxStatus::DeadLettered {
            error: reason.clone(),
            attempts: task.attempt,
        };
        task.updated_at = Utc::now();

        tasks.remove(&task.id);
        dls.insert(task.id, DeadLetterEntry::new(task, reason));
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, OutboxStoreError> {
        let dls = self.dead_letters.read().map_err(poisoned)?;
        let mut entries: Vec<_> = dls.values().cloned().collect();
        entries.sort_by_key(|e| (e.dead_lettered_at, e.task.id));
        entries.truncate(limit);
        Ok(entries)
    }

    fn retry_dead_letter(&self, id: OutboxTaskId) -> Result<OutboxTask, OutboxStoreError> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        let mut dls = self.dead_letters.write().map_err(poisoned)?;

        let entry = dls.remove(&id).ok_or(OutboxStoreError::NotFound(id))?;
        let mut task = entry.task;
        task.status = OutboxStatus::Pending;
        task.attempt = 0;
        task.scheduled_at = None;
        task.updated_at = Utc::now();

        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn stats(&self) -> Result<OutboxStats, OutboxStoreError> {
        let tasks = self.tasks.read().map_err(poisoned)?;
        let dls = self.dead_letters.read().map_err(poisoned)?;

        let mut stats = OutboxStats::default();
        for task in tasks.values() {
            match &task.status {
                OutboxStatus::Staged => stats.staged += 1,
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Running => stats.running += 1,
                OutboxStatus::Completed => stats.completed += 1,
                OutboxStatus::Failed { .. } => stats.failed += 1,
                OutboxStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }
        stats.dead_lettered += dls.len();
        Ok(stats)
    }
}

impl<O> OutboxStore for Arc<O>
where
    O: OutboxStore + ?Sized,
{
    fn enqueue(&self, task: OutboxTask) -> Result<OutboxTaskId, OutboxStoreError> {
        (**self).enqueue(task)
    }

    fn stage(&self, tasks: Vec<OutboxTask>) -> Result<Vec<OutboxTaskId>, OutboxStoreError> {
        (**self).stage(tasks)
    }

    fn release(&self, ids: &[OutboxTaskId]) -> Result<(), OutboxStoreError> {
        (**self).release(ids)
    }

    fn discard(&self, ids: &[OutboxTaskId]) -> Result<(), OutboxStoreError> {
        (**self).discard(ids)
    }

    fn get(&self, id: OutboxTaskId) -> Result<Option<OutboxTask>, OutboxStoreError> {
        (**self).get(id)
    }

    fn update(&self, task: &OutboxTask) -> Result<(), OutboxStoreError> {
        (**self).update(task)
    }

    fn claim(&self, id: OutboxTaskId, now: DateTime<Utc>) -> Result<Option<OutboxTask>, OutboxStoreError> {
        (**self).claim(id, now)
    }

    fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OutboxTaskId>, OutboxStoreError> {
        (**self).due(now, limit)
    }

    fn list_pending(&self, limit: usize) -> Result<Vec<OutboxTask>, OutboxStoreError> {
        (**self).list_pending(limit)
    }

    fn dead_letter(&self, task: OutboxTask, reason: String) -> Result<(), OutboxStoreError> {
        (**self).dead_letter(task, reason)
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, OutboxStoreError> {
        (**self).list_dead_letters(limit)
    }

    fn retry_dead_letter(&self, id: OutboxTaskId) -> Result<OutboxTask, OutboxStoreError> {
        (**self).retry_dead_letter(id)
    }

    fn stats(&self) -> Result<OutboxStats, OutboxStoreError> {
        (**self).stats()
    }
}
