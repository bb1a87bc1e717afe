//! OCC Engine (C5) — §4.5's `update` contract: parent-commit
//! validation against the version ledger (the source of truth, not
//! the graph store), mutate, append, retry on conflict.

use crate::error::{OccError, Result};
use crate::version::{ResourceVersion, VersionStore};
use oms_ledger::{CommitLedger, DocsDelta};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a successful [`OccEngine::update`] returns (§4.5's contract
/// tuple `{new_commit, parent_commit, result}`).
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub new_commit: String,
    pub parent_commit: Option<String>,
    pub result: Value,
    pub version: i64,
    pub retries: u32,
}

pub struct OccEngine<L: CommitLedger, V: VersionStore> {
    ledger: Arc<L>,
    versions: Arc<V>,
}

impl<L: CommitLedger, V: VersionStore> OccEngine<L, V> {
    pub fn new(ledger: Arc<L>, versions: Arc<V>) -> Self {
        Self { ledger, versions }
    }

    /// §4.5's `update(resource_type, id, parent_commit, mutator,
    /// user_ctx, max_retries=3)`. `mutator` is a pure, synchronous
    /// transform over the current document — the CPU section §5
    /// requires to be bounded and non-suspending. Pass `idempotent =
    /// false` and `max_retries = 0` for a mutator whose output depends
    /// on more than its input document (§4.5: "if mutator is marked
    /// non-idempotent, callers MUST pass max_retries=0").
    #[allow(clippy::too_many_arguments)]
    pub async fn update<F>(
        &self,
        branch: &str,
        resource_type: &str,
        resource_id: &str,
        parent_commit: Option<&str>,
        mut mutator: F,
        author: &str,
        message: &str,
        max_retries: u32,
        idempotent: bool,
    ) -> Result<UpdateOutcome>
    where
        F: FnMut(&Value) -> std::result::Result<Value, String>,
    {
        if !idempotent && max_retries > 0 {
            return Err(OccError::UnsafeRetryPolicy);
        }

        let mut expected_parent = parent_commit.map(str::to_string);
        let mut attempt = 0u32;

        loop {
            let head = self.versions.head(resource_type, resource_id).await;
            let actual_parent = head.as_ref().map(|h| h.current_commit.clone());

            if expected_parent != actual_parent {
                if attempt >= max_retries {
                    return Err(OccError::Conflict {
                        resource_type: resource_type.to_string(),
                        resource_id: resource_id.to_string(),
                        expected: expected_parent,
                        actual: actual_parent,
                    });
                }
                warn!(resource_type, resource_id, attempt, "occ conflict, retrying with fresh HEAD");
                attempt += 1;
                expected_parent = actual_parent;
                continue;
            }

            let current_doc = match &expected_parent {
                None => Value::Null,
                Some(commit) => self
                    .ledger
                    .read(branch, Some(commit), resource_id)
                    .await
                    .unwrap_or(Value::Null),
            };

            let new_doc = mutator(&current_doc).map_err(OccError::MutatorFailed)?;

            let mut delta: DocsDelta = BTreeMap::new();
            delta.insert(resource_id.to_string(), new_doc.clone());

            match self
                .ledger
                .append(branch, expected_parent.as_deref(), author, message, delta)
                .await
            {
                Ok(commit) => {
                    let version = head.as_ref().map(|h| h.version).unwrap_or(0) + 1;
                    self.versions
                        .append(ResourceVersion {
                            resource_type: resource_type.to_string(),
                            resource_id: resource_id.to_string(),
                            version,
                            parent_commit: expected_parent.clone(),
                            current_commit: commit.id.clone(),
                            created_at: commit.time,
                            created_by: author.to_string(),
                        })
                        .await;
                    debug!(resource_type, resource_id, commit = %commit.id, version, "occ write committed");
                    return Ok(UpdateOutcome {
                        new_commit: commit.id,
                        parent_commit: expected_parent,
                        result: new_doc,
                        version,
                        retries: attempt,
                    });
                }
                Err(oms_ledger::LedgerError::ParentMismatch { actual, .. }) => {
                    if attempt >= max_retries {
                        return Err(OccError::RetriesExhausted(
                            max_retries,
                            resource_type.to_string(),
                            resource_id.to_string(),
                        ));
                    }
                    attempt += 1;
                    expected_parent = actual;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn history(&self, resource_type: &str, resource_id: &str) -> Vec<ResourceVersion> {
        self.versions.history(resource_type, resource_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::InMemoryVersionStore;
    use oms_ledger::InMemoryCommitLedger;
    use serde_json::json;

    fn engine() -> OccEngine<InMemoryCommitLedger, InMemoryVersionStore> {
        OccEngine::new(
            Arc::new(InMemoryCommitLedger::new()),
            Arc::new(InMemoryVersionStore::new()),
        )
    }

    #[tokio::test]
    async fn first_write_with_no_parent_succeeds() {
        let engine = engine();
        let outcome = engine
            .update(
                "main",
                "object_type",
                "Product",
                None,
                |_| Ok(json!({"description": "v1"})),
                "alice (u-1) [verified]",
                "create Product",
                0,
                true,
            )
            .await
            .unwrap();
        assert_eq!(outcome.version, 1);
        assert!(outcome.parent_commit.is_none());
    }

    #[tokio::test]
    async fn stale_parent_without_retries_conflicts() {
        let engine = engine();
        engine
            .update(
                "main",
                "object_type",
                "Product",
                None,
                |_| Ok(json!({"description": "v1"})),
                "alice (u-1) [verified]",
                "create",
                0,
                true,
            )
            .await
            .unwrap();

        let err = engine
            .update(
                "main",
                "object_type",
                "Product",
                None,
                |_| Ok(json!({"description": "v2"})),
                "bob (u-2) [verified]",
                "edit",
                0,
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OccError::Conflict { .. }));
    }

    #[tokio::test]
    async fn s1_retry_composes_over_the_winners_result() {
        // §8 S1: A writes "v2" first; B's mutator (composed over
        // whatever the current doc is) lands on retry against A's
        // result instead of failing outright.
        let engine = engine();
        let c1 = engine
            .update(
                "main",
                "object_type",
                "Product",
                None,
                |_| Ok(json!({"description": "v1"})),
                "alice (u-1) [verified]",
                "create",
                0,
                true,
            )
            .await
            .unwrap();

        let a = engine
            .update(
                "main",
                "object_type",
                "Product",
                Some(&c1.new_commit),
                |_| Ok(json!({"description": "v2"})),
                "alice (u-1) [verified]",
                "A's edit",
                0,
                true,
            )
            .await
            .unwrap();

        // B read the same parent as A but retries automatically.
        let b = engine
            .update(
                "main",
                "object_type",
                "Product",
                Some(&c1.new_commit),
                |current| {
                    let base = current.get("description").and_then(|v| v.as_str()).unwrap_or("");
                    Ok(json!({"description": format!("{base}+b")}))
                },
                "bob (u-2) [verified]",
                "B's edit",
                3,
                true,
            )
            .await
            .unwrap();

        assert_eq!(b.retries, 1);
        assert_eq!(b.parent_commit.as_deref(), Some(a.new_commit.as_str()));
        assert_eq!(b.result["description"], json!("v2+b"));

        let history = engine.history("object_type", "Product").await;
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().version, 3);
    }

    #[tokio::test]
    async fn non_idempotent_mutator_requires_zero_retries() {
        let engine = engine();
        let err = engine
            .update(
                "main",
                "object_type",
                "Product",
                None,
                |_| Ok(json!({})),
                "alice (u-1) [verified]",
                "create",
                3,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OccError::UnsafeRetryPolicy));
    }

    #[tokio::test]
    async fn mutator_rejection_surfaces_as_mutator_failed() {
        let engine = engine();
        let err = engine
            .update(
                "main",
                "object_type",
                "Product",
                None,
                |_| Err("price must be positive".to_string()),
                "alice (u-1) [verified]",
                "create",
                0,
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OccError::MutatorFailed(_)));
    }
}
