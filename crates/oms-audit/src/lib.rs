//! Audit Emitter (C10) — §4.10: every Policy-Gate-authorized mutation
//! emits one `AuditEvent` regardless of business outcome, via the same
//! outbox mechanism C8 uses for business events so delivery has the
//! same durability as the commit it describes.

pub mod emitter;
pub mod error;
pub mod event;
pub mod masking;

pub use emitter::AuditEmitter;
pub use error::{AuditError, Result};
pub use event::{Actor, AuditEvent, Changes, Compliance, Target};
pub use masking::mask_pii;
