//! Operator alerts for side effects that ran out of retries.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gasflow_core::{CylinderTypeId, DeliveryId, GoodsReceiptId};

use super::types::{OutboxTask, OutboxTaskId, OutboxTaskKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxAlert {
    pub task_id: OutboxTaskId,
    pub kind: OutboxTaskKind,
    /// Movement context; absent when the payload itself could not be decoded.
    pub gr_id: Option<GoodsReceiptId>,
    pub delivery_id: Option<DeliveryId>,
    pub cylinder_type: Option<CylinderTypeId>,
    pub quantity: Option<i64>,
    pub error: String,
    pub attempts: u32,
    pub raised_at: DateTime<Utc>,
}

impl OutboxAlert {
    pub fn for_task(task: &OutboxTask, error: impl Into<String>) -> Self {
        let payload = task.movement_payload().ok();
        Self {
            task_id: task.id,
            kind: task.kind,
            gr_id: payload.as_ref().map(|p| p.gr_id),
            delivery_id: payload.as_ref().map(|p| p.delivery_id),
            cylinder_type: payload.as_ref().map(|p| p.movement.cylinder_type),
            quantity: payload.as_ref().map(|p| p.movement.quantity),
            error: error.into(),
            attempts: task.attempt,
            raised_at: Utc::now(),
        }
    }
}

pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: OutboxAlert);
}

impl<A> AlertSink for Arc<A>
where
    A: AlertSink + ?Sized,
{
    fn raise(&self, alert: OutboxAlert) {
        (**self).raise(alert)
    }
}

/// Keeps raised alerts in memory for inspection.
#[derive(Debug, Default)]
pub struct InMemoryAlertSink {
    alerts: Mutex<Vec<OutboxAlert>>,
}

impl InMemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<OutboxAlert> {
        match self.alerts.lock() {
            Ok(alerts) => alerts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AlertSink for InMemoryAlertSink {
    fn raise(&self, alert: OutboxAlert) {
        match self.alerts.lock() {
            Ok(mut alerts) => alerts.push(alert),
            Err(poisoned) => poisoned.into_inner().push(alert),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undecodable_payload_still_alerts() {
        let mut task = OutboxTask::new(OutboxTaskKind::GrFinalizeMovement, serde_json::json!("garbage"));
        task.attempt = 3;

        let sink = InMemoryAlertSink::new();
        sink.raise(OutboxAlert::for_task(&task, "boom"));

        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].attempts, 3);
        assert!(alerts[0].gr_id.is_none());
        assert_eq!(alerts[0].error, "boom");
    }
}
