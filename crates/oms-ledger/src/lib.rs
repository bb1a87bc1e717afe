//! Commit Ledger Port (C1): the abstract interface to the
//! content-addressed graph store that backs every branch's document
//! history. This crate defines the port and a reference in-memory
//! implementation; a real deployment backs [`CommitLedger`] with a
//! client for whatever graph store it runs — that backend is out of
//! scope here.
//!
//! Modeled on the async-trait "backend" port pattern: a
//! `Send + Sync + 'static` trait object with one reference
//! implementation here, real implementations supplied by the embedder.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use memory::InMemoryCommitLedger;

/// A document as stored in the graph: an arbitrary JSON value keyed by
/// `doc_id` within a branch's snapshot at a given commit.
pub type Document = serde_json::Value;

/// A set of document changes to apply in one commit. A `Document` of
/// `Value::Null` deletes that `doc_id` from the branch's snapshot.
pub type DocsDelta = BTreeMap<String, Document>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub parent: Option<String>,
    pub author: String,
    pub message: String,
    pub time: DateTime<Utc>,
    pub branch: String,
}

impl From<oms_core::Commit> for Commit {
    fn from(c: oms_core::Commit) -> Self {
        Self {
            id: c.id,
            parent: c.parent,
            author: c.author,
            message: c.message,
            time: c.time,
            branch: c.branch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerHealth {
    Ok,
    Degraded(String),
}

#[derive(Debug, Error, Clone)]
pub enum LedgerError {
    #[error("no commit for branch {branch}")]
    BranchNotFound { branch: String },

    #[error("document {doc_id} not found in branch {branch} at commit {commit}")]
    DocNotFound {
        branch: String,
        commit: String,
        doc_id: String,
    },

    #[error("commit {commit} not found on branch {branch}")]
    CommitNotFound { branch: String, commit: String },

    #[error("append to {branch} expected parent {expected:?}, branch HEAD is {actual:?}")]
    ParentMismatch {
        branch: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("failed to hash commit payload: {0}")]
    HashFailure(String),
}

impl From<LedgerError> for oms_types::OmsError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::BranchNotFound { branch } => oms_types::OmsError::NotFound(format!("branch {branch}")),
            LedgerError::DocNotFound { branch, commit, doc_id } => oms_types::OmsError::NotFound(format!("doc {doc_id} in {branch}@{commit}")),
            LedgerError::CommitNotFound { branch, commit } => oms_types::OmsError::NotFound(format!("commit {commit} on {branch}")),
            LedgerError::ParentMismatch { branch, expected, actual } => oms_types::OmsError::Conflict {
                resource_type: "branch".to_string(),
                resource_id: branch,
                expected: expected.unwrap_or_default(),
                actual: actual.unwrap_or_default(),
            },
            LedgerError::StoreUnavailable(msg) => oms_types::OmsError::StoreUnavailable(msg),
            LedgerError::HashFailure(msg) => oms_types::OmsError::IntegrityError(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// The commit ledger port (C1). Pure I/O boundary: reads materialize a
/// document at a branch/commit, `append` commits a batch of document
/// changes atomically, `log` walks history, `reset` rewrites HEAD to
/// an earlier commit's tree (only ever called by the lock manager
/// under a BRANCH-scope lock — this trait does not itself enforce
/// that; callers must).
#[async_trait]
pub trait CommitLedger: Send + Sync + 'static {
    /// Read `doc_id` as of `commit` (or branch HEAD if `None`).
    async fn read(
        &self,
        branch: &str,
        commit: Option<&str>,
        doc_id: &str,
    ) -> Result<Document>;

    /// Append one commit touching every doc in `docs_delta`. Atomic:
    /// callers never observe a commit whose delta rows only partially
    /// landed. Fails with [`LedgerError::ParentMismatch`] if `parent`
    /// does not match the branch's current HEAD.
    async fn append(
        &self,
        branch: &str,
        parent: Option<&str>,
        author: &str,
        message: &str,
        docs_delta: DocsDelta,
    ) -> Result<Commit>;

    /// Most recent commits on `branch`, optionally continuing strictly
    /// before `before`, newest first, capped at `limit`.
    async fn log(&self, branch: &str, limit: usize, before: Option<&str>) -> Result<Vec<Commit>>;

    /// Append a new commit whose tree equals `target_commit`'s tree,
    /// effectively rewinding the branch forward-in-time. `reason`
    /// becomes the commit message.
    async fn reset(
        &self,
        branch: &str,
        target_commit: &str,
        author: &str,
        reason: &str,
    ) -> Result<Commit>;

    async fn health(&self) -> LedgerHealth;
}
