//! Conflict/validation severity, shared by the merge engine and its
//! semantic validator registry.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Block,
}

impl Severity {
    /// `true` once severity is at least ERROR, per §4.6's `max_severity`
    /// gating rule for auto-resolution.
    pub fn blocks_auto_resolution(self) -> bool {
        self >= Severity::Error
    }
}
