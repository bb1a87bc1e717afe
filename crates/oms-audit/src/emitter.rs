//! §4.10: "Emission path is via the outbox so that audit delivery has
//! the same durability as the business commit. Failure to publish
//! (bus outage) is tolerated; the event remains in outbox until
//! delivered. If even the outbox write fails, the business write MUST
//! be aborted."

use crate::error::{AuditError, Result};
use crate::event::AuditEvent;
use crate::masking::mask_pii;
use oms_outbox::{EventEnvelope, OutboxStore};
use std::sync::Arc;
use tracing::debug;

pub struct AuditEmitter {
    outbox: Arc<dyn OutboxStore>,
}

impl AuditEmitter {
    pub fn new(outbox: Arc<dyn OutboxStore>) -> Self {
        Self { outbox }
    }

    /// Masks PII per `event.compliance.pii_fields`, wraps the result in
    /// a CloudEvents envelope, and enqueues it in the same outbox
    /// mechanism C8 uses. Returns [`AuditError::OutboxWriteFailed`] on
    /// failure — callers MUST treat that as fatal to the business
    /// write it accompanies, never as a soft warning.
    pub async fn emit(&self, mut event: AuditEvent) -> Result<()> {
        event.changes.old = mask_pii(&event.changes.old, &event.compliance.pii_fields);
        event.changes.new = mask_pii(&event.changes.new, &event.compliance.pii_fields);

        let payload = serde_json::to_value(&event).map_err(|e| AuditError::HashFailure(e.to_string()))?;
        let mut envelope = EventEnvelope::new(crate::event::AUDIT_EVENT_TYPE, "oms", "1.0.0", event.correlation_id.clone(), payload);
        envelope.source = crate::event::AUDIT_SOURCE.to_string();

        let stream = format!("oms.audit.{}", event.action);
        self.outbox
            .enqueue(&event.target.resource_id, &stream, envelope)
            .await
            .map_err(|e| AuditError::OutboxWriteFailed(e.to_string()))?;

        debug!(audit_id = %event.id, action = %event.action, success = event.success, "audit event enqueued");
        Ok(())
    }
}
