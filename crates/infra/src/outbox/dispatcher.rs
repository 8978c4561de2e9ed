//! Runs outbox tasks through registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use gasflow_core::{DomainError, DomainResult};

use super::alerts::{AlertSink, OutboxAlert};
use super::store::OutboxStore;
use super::types::{OutboxStatus, OutboxTask, OutboxTaskId, OutboxTaskKind, TaskResult};

pub type TaskHandler = Box<dyn Fn(&OutboxTask) -> TaskResult + Send + Sync>;

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub completed: usize,
    pub retrying: usize,
    pub dead_lettered: usize,
}

impl DrainReport {
    pub fn merge(&mut self, other: DrainReport) {
        self.attempted += other.attempted;
        self.completed += other.completed;
        self.retrying += other.retrying;
        self.dead_lettered += other.dead_lettered;
    }

    pub fn is_clean(&self) -> bool {
        self.attempted == self.completed
    }
}

/// Map a handler error to a task outcome.
///
/// Bad input will not get better on retry; everything else (missing stock,
/// lost races, storage trouble) might.
pub fn classify(err: &DomainError) -> TaskResult {
    match err {
        DomainError::Validation(_) | DomainError::NotFound(_) => TaskResult::Reject(err.to_string()),
        _ => TaskResult::Retry(err.to_string()),
    }
}

pub struct OutboxDispatcher<O> {
    store: O,
    handlers: HashMap<OutboxTaskKind, TaskHandler>,
    alerts: Arc<dyn AlertSink>,
}

impl<O> std::fmt::Debug for OutboxDispatcher<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxDispatcher")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<O: OutboxStore> OutboxDispatcher<O> {
    pub fn new(store: O, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            alerts,
        }
    }

    pub fn register_handler<F>(&mut self, kind: OutboxTaskKind, handler: F)
    where
        F: Fn(&OutboxTask) -> TaskResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    pub fn store(&self) -> &O {
        &self.store
    }

    pub fn enqueue(&self, task: OutboxTask) -> DomainResult<OutboxTaskId> {
        Ok(self.store.enqueue(task)?)
    }

    /// Write tasks ahead of the transition that owns them. See `OutboxStore::stage`.
    pub fn stage(&self, tasks: Vec<OutboxTask>) -> DomainResult<Vec<OutboxTaskId>> {
        Ok(self.store.stage(tasks)?)
    }

    pub fn release(&self, ids: &[OutboxTaskId]) -> DomainResult<()> {
        Ok(self.store.release(ids)?)
    }

    pub fn discard(&self, ids: &[OutboxTaskId]) -> DomainResult<()> {
        Ok(self.store.discard(ids)?)
    }

    /// Raise an alert for each task whose side effect cannot run on its own.
    pub fn alert_stranded(&self, tasks: &[OutboxTask], error: &str) {
        for task in tasks {
            let alert = OutboxAlert::for_task(task, error);
            error!(
                task_id = %task.id,
                kind = task.kind.as_str(),
                gr_id = ?alert.gr_id,
                delivery_id = ?alert.delivery_id,
                cylinder_type = ?alert.cylinder_type,
                quantity = ?alert.quantity,
                error,
                "outbox task stranded"
            );
            self.alerts.raise(alert);
        }
    }

    /// Attempt the given tasks now, skipping any that are not due or are
    /// already being run elsewhere.
    pub fn run_now(&self, ids: &[OutboxTaskId]) -> DomainResult<DrainReport> {
        let mut report = DrainReport::default();
        for &id in ids {
            if let Some(task) = self.store.claim(id, Utc::now())? {
                report.merge(self.execute(task)?);
            }
        }
        Ok(report)
    }

    /// One pass over every task due at `now`.
    pub fn drain_due(&self, now: DateTime<Utc>) -> DomainResult<DrainReport> {
        let ids = self.store.due(now, usize::MAX)?;
        let mut report = DrainReport::default();
        for id in ids {
            if let Some(task) = self.store.claim(id, now)? {
                report.merge(self.execute(task)?);
            }
        }
        Ok(report)
    }

    /// Put a dead-lettered task back in the queue and attempt it once.
    pub fn retry_dead_letter(&self, id: OutboxTaskId) -> DomainResult<DrainReport> {
        let task = self.store.retry_dead_letter(id)?;
        info!(task_id = %task.id, kind = task.kind.as_str(), "dead-lettered task requeued");
        self.run_now(&[task.id])
    }

    fn execute(&self, mut task: OutboxTask) -> DomainResult<DrainReport> {
        let started = Utc::now();
        let mut report = DrainReport {
            attempted: 1,
            ..Default::default()
        };

        let result = match self.handlers.get(&task.kind) {
            Some(handler) => handler(&task),
            None => {
                warn!(task_id = %task.id, kind = task.kind.as_str(), "no handler for outbox task");
                TaskResult::Retry(format!("no handler for outbox task kind {}", task.kind.as_str()))
            }
        };

        let error = match result {
            TaskResult::Success => {
                task.mark_completed(started);
                self.store.update(&task)?;
                debug!(task_id = %task.id, attempt = task.attempt, "outbox task completed");
                report.completed = 1;
                return Ok(report);
            }
            TaskResult::Retry(error) => {
                task.mark_failed(error.clone(), started);
                error
            }
            TaskResult::Reject(error) => {
                task.mark_rejected(error.clone(), started);
                error
            }
        };

        let context = task.movement_payload().ok();
        if let OutboxStatus::DeadLettered { attempts, .. } = task.status {
            error!(
                task_id = %task.id,
                kind = task.kind.as_str(),
                gr_id = ?context.as_ref().map(|p| p.gr_id),
                delivery_id = ?context.as_ref().map(|p| p.delivery_id),
                cylinder_type = ?context.as_ref().map(|p| p.movement.cylinder_type),
                quantity = ?context.as_ref().map(|p| p.movement.quantity),
                attempts,
                error = %error,
                "outbox task dead-lettered"
            );
            self.store.dead_letter(task.clone(), error.clone())?;
            self.alerts.raise(OutboxAlert::for_task(&task, error));
            report.dead_lettered = 1;
        } else {
            warn!(
                task_id = %task.id,
                kind = task.kind.as_str(),
                gr_id = ?context.as_ref().map(|p| p.gr_id),
                delivery_id = ?context.as_ref().map(|p| p.delivery_id),
                cylinder_type = ?context.as_ref().map(|p| p.movement.cylinder_type),
                quantity = ?context.as_ref().map(|p| p.movement.quantity),
                attempt = task.attempt,
                next_attempt_at = ?task.scheduled_at,
                error = %error,
                "outbox task failed, will retry"
            );
            self.store.update(&task)?;
            report.retrying = 1;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::alerts::InMemoryAlertSink;
    use crate::outbox::store::InMemoryOutboxStore;
    use crate::outbox::types::RetryPolicy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn dispatcher() -> (OutboxDispatcher<Arc<InMemoryOutboxStore>>, Arc<InMemoryAlertSink>) {
        let alerts = Arc::new(InMemoryAlertSink::new());
        (OutboxDispatcher::new(InMemoryOutboxStore::arc(), alerts.clone()), alerts)
    }

    fn task(attempts: u32) -> OutboxTask {
        OutboxTask::new(OutboxTaskKind::GrApprovalMovement, serde_json::json!({}))
            .with_retry_policy(RetryPolicy::fixed(attempts, Duration::ZERO))
    }

    #[test]
    fn successful_task_completes() {
        let (mut d, alerts) = dispatcher();
        d.register_handler(OutboxTaskKind::GrApprovalMovement, |_| TaskResult::Success);

        let id = d.enqueue(task(3)).unwrap();
        let report = d.run_now(&[id]).unwrap();

        assert_eq!(report.completed, 1);
        assert!(report.is_clean());
        assert_eq!(d.store().get(id).unwrap().unwrap().status, OutboxStatus::Completed);
        assert!(alerts.alerts().is_empty());
        // Completed tasks are not picked up again.
        assert_eq!(d.run_now(&[id]).unwrap().attempted, 0);
    }

    #[test]
    fn retries_until_dead_letter_then_alerts() {
        let (mut d, alerts) = dispatcher();
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        d.register_handler(OutboxTaskKind::GrApprovalMovement, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            TaskResult::Retry("insufficient quantity".into())
        });

        let id = d.enqueue(task(3)).unwrap();
        assert_eq!(d.run_now(&[id]).unwrap().retrying, 1);
        assert_eq!(d.drain_due(Utc::now()).unwrap().retrying, 1);
        assert_eq!(d.drain_due(Utc::now()).unwrap().dead_lettered, 1);
        assert_eq!(d.drain_due(Utc::now()).unwrap().attempted, 0);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let dls = d.store().list_dead_letters(10).unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].task.attempt, 3);

        let raised = alerts.alerts();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].task_id, id);
        assert_eq!(raised[0].attempts, 3);
    }

    #[test]
    fn rejected_task_dead_letters_immediately() {
        let (mut d, alerts) = dispatcher();
        d.register_handler(OutboxTaskKind::GrApprovalMovement, |_| {
            classify(&DomainError::validation("self transfer"))
        });

        let id = d.enqueue(task(5)).unwrap();
        let report = d.run_now(&[id]).unwrap();
        assert_eq!(report.dead_lettered, 1);
        assert_eq!(alerts.alerts().len(), 1);
    }

    #[test]
    fn retry_dead_letter_runs_again() {
        let (mut d, _alerts) = dispatcher();
        let fail = Arc::new(AtomicU32::new(1));
        let gate = fail.clone();
        d.register_handler(OutboxTaskKind::GrApprovalMovement, move |_| {
            if gate.load(Ordering::SeqCst) == 1 {
                TaskResult::Reject("blocked".into())
            } else {
                TaskResult::Success
            }
        });

        let id = d.enqueue(task(1)).unwrap();
        assert_eq!(d.run_now(&[id]).unwrap().dead_lettered, 1);

        fail.store(0, Ordering::SeqCst);
        let report = d.retry_dead_letter(id).unwrap();
        assert_eq!(report.completed, 1);
        assert!(d.store().list_dead_letters(10).unwrap().is_empty());
    }

    #[test]
    fn missing_handler_is_retried() {
        let (d, _alerts) = dispatcher();
        let id = d.enqueue(task(2)).unwrap();
        assert_eq!(d.run_now(&[id]).unwrap().retrying, 1);
    }

    #[test]
    fn classify_splits_permanent_from_transient() {
        assert!(matches!(classify(&DomainError::validation("x")), TaskResult::Reject(_)));
        assert!(matches!(classify(&DomainError::insufficient(6, 0)), TaskResult::Retry(_)));
        assert!(matches!(classify(&DomainError::internal("x")), TaskResult::Retry(_)));
    }
}
