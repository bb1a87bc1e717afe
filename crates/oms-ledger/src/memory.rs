use crate::{Commit, CommitLedger, Document, DocsDelta, LedgerError, LedgerHealth, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct BranchData {
    commits: Vec<Commit>,
    snapshots: BTreeMap<String, BTreeMap<String, Document>>,
}

impl BranchData {
    fn head(&self) -> Option<&Commit> {
        self.commits.last()
    }
}

/// Reference [`CommitLedger`] implementation backed by in-process
/// maps. Every branch is its own entry so concurrent appends to
/// different branches never contend; appends to the same branch are
/// serialized by that branch's mutex, matching the "acquire is
/// serialized per branch" rule the lock manager (C4) applies one layer
/// up.
#[derive(Clone, Default)]
pub struct InMemoryCommitLedger {
    branches: Arc<DashMap<String, Mutex<BranchData>>>,
    health: Arc<Mutex<LedgerHealth>>,
}

impl InMemoryCommitLedger {
    pub fn new() -> Self {
        Self {
            branches: Arc::new(DashMap::new()),
            health: Arc::new(Mutex::new(LedgerHealth::Ok)),
        }
    }

    /// Test/demo hook: force [`CommitLedger::health`] to report
    /// degraded until cleared with [`Self::clear_degraded`].
    pub fn force_degraded(&self, reason: impl Into<String>) {
        *self.health.lock() = LedgerHealth::Degraded(reason.into());
    }

    pub fn clear_degraded(&self) {
        *self.health.lock() = LedgerHealth::Ok;
    }

    fn apply_delta(
        base: &BTreeMap<String, Document>,
        delta: &DocsDelta,
    ) -> BTreeMap<String, Document> {
        let mut next = base.clone();
        for (doc_id, value) in delta {
            if value.is_null() {
                next.remove(doc_id);
            } else {
                next.insert(doc_id.clone(), value.clone());
            }
        }
        next
    }
}

#[async_trait]
impl CommitLedger for InMemoryCommitLedger {
    async fn read(&self, branch: &str, commit: Option<&str>, doc_id: &str) -> Result<Document> {
        let entry = self
            .branches
            .get(branch)
            .ok_or_else(|| LedgerError::BranchNotFound {
                branch: branch.to_string(),
            })?;
        let data = entry.lock();

        let commit_id = match commit {
            Some(c) => c.to_string(),
            None => data
                .head()
                .ok_or_else(|| LedgerError::BranchNotFound {
                    branch: branch.to_string(),
                })?
                .id
                .clone(),
        };

        let snapshot =
            data.snapshots
                .get(&commit_id)
                .ok_or_else(|| LedgerError::CommitNotFound {
                    branch: branch.to_string(),
                    commit: commit_id.clone(),
                })?;

        snapshot
            .get(doc_id)
            .cloned()
            .ok_or_else(|| LedgerError::DocNotFound {
                branch: branch.to_string(),
                commit: commit_id,
                doc_id: doc_id.to_string(),
            })
    }

    async fn append(
        &self,
        branch: &str,
        parent: Option<&str>,
        author: &str,
        message: &str,
        docs_delta: DocsDelta,
    ) -> Result<Commit> {
        let entry = self
            .branches
            .entry(branch.to_string())
            .or_insert_with(|| Mutex::new(BranchData::default()));
        let mut data = entry.lock();

        let actual_head = data.head().map(|c| c.id.clone());
        if parent.map(|p| p.to_string()) != actual_head {
            return Err(LedgerError::ParentMismatch {
                branch: branch.to_string(),
                expected: parent.map(str::to_string),
                actual: actual_head,
            });
        }

        let base_snapshot = match &actual_head {
            Some(head) => data
                .snapshots
                .get(head)
                .cloned()
                .unwrap_or_default(),
            None => BTreeMap::new(),
        };
        let new_snapshot = Self::apply_delta(&base_snapshot, &docs_delta);

        let commit = oms_core::Commit::new(
            actual_head.clone(),
            author,
            message,
            branch,
            &docs_delta,
        )
        .map_err(|e| LedgerError::HashFailure(e.to_string()))?;
        let commit: Commit = commit.into();

        data.snapshots.insert(commit.id.clone(), new_snapshot);
        data.commits.push(commit.clone());

        Ok(commit)
    }

    async fn log(&self, branch: &str, limit: usize, before: Option<&str>) -> Result<Vec<Commit>> {
        let entry = self
            .branches
            .get(branch)
            .ok_or_else(|| LedgerError::BranchNotFound {
                branch: branch.to_string(),
            })?;
        let data = entry.lock();

        let end = match before {
            Some(before_id) => data
                .commits
                .iter()
                .position(|c| c.id == before_id)
                .ok_or_else(|| LedgerError::CommitNotFound {
                    branch: branch.to_string(),
                    commit: before_id.to_string(),
                })?,
            None => data.commits.len(),
        };

        let start = end.saturating_sub(limit);
        let mut page: Vec<Commit> = data.commits[start..end].to_vec();
        page.reverse();
        Ok(page)
    }

    async fn reset(
        &self,
        branch: &str,
        target_commit: &str,
        author: &str,
        reason: &str,
    ) -> Result<Commit> {
        let entry = self
            .branches
            .get(branch)
            .ok_or_else(|| LedgerError::BranchNotFound {
                branch: branch.to_string(),
            })?;
        let mut data = entry.lock();

        let target_snapshot = data
            .snapshots
            .get(target_commit)
            .cloned()
            .ok_or_else(|| LedgerError::CommitNotFound {
                branch: branch.to_string(),
                commit: target_commit.to_string(),
            })?;

        let actual_head = data.head().map(|c| c.id.clone());
        let commit = oms_core::Commit::new(actual_head, author, reason, branch, &target_snapshot)
            .map_err(|e| LedgerError::HashFailure(e.to_string()))?;
        let commit: Commit = commit.into();

        data.snapshots.insert(commit.id.clone(), target_snapshot);
        data.commits.push(commit.clone());

        Ok(commit)
    }

    async fn health(&self) -> LedgerHealth {
        self.health.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delta(doc_id: &str, value: serde_json::Value) -> DocsDelta {
        let mut map = BTreeMap::new();
        map.insert(doc_id.to_string(), value);
        map
    }

    #[tokio::test]
    async fn append_then_read_round_trips() {
        let ledger = InMemoryCommitLedger::new();
        let commit = ledger
            .append("main", None, "alice (u-1) [verified]", "create widget", delta("widget-1", json!({"name": "Widget"})))
            .await
            .unwrap();
        assert!(commit.parent.is_none());

        let doc = ledger.read("main", None, "widget-1").await.unwrap();
        assert_eq!(doc, json!({"name": "Widget"}));
    }

    #[tokio::test]
    async fn append_rejects_stale_parent() {
        let ledger = InMemoryCommitLedger::new();
        ledger
            .append("main", None, "alice (u-1) [verified]", "create", delta("w1", json!({"v": 1})))
            .await
            .unwrap();

        let err = ledger
            .append("main", None, "alice (u-1) [verified]", "create again", delta("w1", json!({"v": 2})))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ParentMismatch { .. }));
    }

    #[tokio::test]
    async fn log_pages_newest_first() {
        let ledger = InMemoryCommitLedger::new();
        let c1 = ledger
            .append("main", None, "alice (u-1) [verified]", "c1", delta("w1", json!({"v": 1})))
            .await
            .unwrap();
        let c2 = ledger
            .append("main", Some(&c1.id), "alice (u-1) [verified]", "c2", delta("w1", json!({"v": 2})))
            .await
            .unwrap();

        let log = ledger.log("main", 10, None).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, c2.id);
        assert_eq!(log[1].id, c1.id);
    }

    #[tokio::test]
    async fn reset_restores_an_earlier_tree_as_a_new_forward_commit() {
        let ledger = InMemoryCommitLedger::new();
        let c1 = ledger
            .append("main", None, "alice (u-1) [verified]", "c1", delta("w1", json!({"v": 1})))
            .await
            .unwrap();
        ledger
            .append("main", Some(&c1.id), "alice (u-1) [verified]", "c2", delta("w1", json!({"v": 2})))
            .await
            .unwrap();

        let reset_commit = ledger
            .reset("main", &c1.id, "admin (u-9) [verified]", "rollback bad migration")
            .await
            .unwrap();

        let doc = ledger.read("main", Some(&reset_commit.id), "w1").await.unwrap();
        assert_eq!(doc, json!({"v": 1}));

        let log = ledger.log("main", 10, None).await.unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].id, reset_commit.id);
    }

    #[tokio::test]
    async fn deleting_a_doc_removes_it_from_the_next_snapshot() {
        let ledger = InMemoryCommitLedger::new();
        let c1 = ledger
            .append("main", None, "alice (u-1) [verified]", "create", delta("w1", json!({"v": 1})))
            .await
            .unwrap();
        ledger
            .append("main", Some(&c1.id), "alice (u-1) [verified]", "delete", delta("w1", serde_json::Value::Null))
            .await
            .unwrap();

        let err = ledger.read("main", None, "w1").await.unwrap_err();
        assert!(matches!(err, LedgerError::DocNotFound { .. }));
    }

    #[tokio::test]
    async fn health_reports_forced_degradation() {
        let ledger = InMemoryCommitLedger::new();
        assert_eq!(ledger.health().await, LedgerHealth::Ok);
        ledger.force_degraded("store disk at 95%");
        assert!(matches!(ledger.health().await, LedgerHealth::Degraded(_)));
    }
}
