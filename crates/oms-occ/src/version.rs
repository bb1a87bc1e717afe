//! §3 `ResourceVersion` — the OCC ledger row that is the actual
//! source of truth for parent-commit validation (§4.5: "Reads current
//! HEAD commit... from the version ledger, not from the graph store").

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceVersion {
    pub resource_type: String,
    pub resource_id: String,
    pub version: i64,
    pub parent_commit: Option<String>,
    pub current_commit: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

fn key(resource_type: &str, resource_id: &str) -> String {
    format!("{resource_type}\u{0}{resource_id}")
}

/// Persistence port for the version ledger. `head` returns the most
/// recent row, if any; `append` is append-only and must enforce the
/// monotone `(type, id, version)` uniqueness invariant from §3 — the
/// in-memory reference implementation does so by construction since
/// it only ever appends `max(version)+1`.
#[async_trait]
pub trait VersionStore: Send + Sync + 'static {
    async fn head(&self, resource_type: &str, resource_id: &str) -> Option<ResourceVersion>;

    async fn append(&self, row: ResourceVersion);

    async fn history(&self, resource_type: &str, resource_id: &str) -> Vec<ResourceVersion>;
}

#[derive(Clone, Default)]
pub struct InMemoryVersionStore {
    rows: Arc<DashMap<String, Vec<ResourceVersion>>>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn head(&self, resource_type: &str, resource_id: &str) -> Option<ResourceVersion> {
        self.rows
            .get(&key(resource_type, resource_id))
            .and_then(|rows| rows.last().cloned())
    }

    async fn append(&self, row: ResourceVersion) {
        self.rows
            .entry(key(&row.resource_type, &row.resource_id))
            .or_default()
            .push(row);
    }

    async fn history(&self, resource_type: &str, resource_id: &str) -> Vec<ResourceVersion> {
        self.rows
            .get(&key(resource_type, resource_id))
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }
}
