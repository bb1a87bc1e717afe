//! §3 `MergeConflict` and its typed taxonomy (§4.6's classification
//! table).

use oms_types::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    PropertyTypeChanged,
    RequirednessChanged,
    AddRemove,
    Reorder,
    Semantic,
    PropertyConflict,
    DeletionConflict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConflict {
    pub kind: ConflictKind,
    pub severity: Severity,
    pub entity_id: String,
    pub property: Option<String>,
    pub base_value: Option<serde_json::Value>,
    pub source_value: Option<serde_json::Value>,
    pub target_value: Option<serde_json::Value>,
    pub auto_resolvable: bool,
    pub description: String,
    /// Supplemented feature (`merge_validators.py`'s
    /// `ValidationError.context`): structured context beyond the plain
    /// message, carried through from semantic validator findings.
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl MergeConflict {
    pub fn max_severity(conflicts: &[MergeConflict]) -> Option<Severity> {
        conflicts.iter().map(|c| c.severity).max()
    }
}
