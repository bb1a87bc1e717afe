//! The commit record itself (§3 `Commit`): the unit the ledger (C1)
//! appends, the OCC engine (C5) validates parents against, and the
//! merge engine (C6) diffs three of at once.

use crate::canonical::commit_hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single commit on a branch. `id` is derived from `doc` alone via
/// [`commit_hash`] and is therefore a content hash, not a counter —
/// two commits against different parents that happen to produce the
/// same document collide on `id`, which is intentional and matches
/// `_calculate_commit_hash` in the original: the hash identifies the
/// resulting content, not the edit that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub parent: Option<String>,
    pub author: String,
    pub message: String,
    pub time: DateTime<Utc>,
    pub branch: String,
}

impl Commit {
    /// Build a commit whose `id` is the canonical-JSON hash of `doc`
    /// alone, per §4.5 (`new_commit = sha256(canonical_json(new_doc))[0:12]`).
    pub fn new(
        parent: Option<String>,
        author: impl Into<String>,
        message: impl Into<String>,
        branch: impl Into<String>,
        doc: &impl Serialize,
    ) -> serde_json::Result<Self> {
        let id = commit_hash(doc)?;
        Ok(Self {
            id,
            parent,
            author: author.into(),
            message: message.into(),
            time: Utc::now(),
            branch: branch.into(),
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_commit_has_no_parent() {
        let commit = Commit::new(None, "alice (u-1) [verified]", "initial import", "main", &json!({"name": "Widget"}))
            .unwrap();
        assert!(commit.is_root());
    }

    #[test]
    fn identical_writes_against_the_same_parent_produce_the_same_id() {
        let doc = json!({"name": "Widget", "price": 10});
        let a = Commit::new(Some("abc123456789".into()), "alice (u-1) [verified]", "edit", "main", &doc).unwrap();
        let b = Commit::new(Some("abc123456789".into()), "alice (u-1) [verified]", "edit (retry)", "main", &doc).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn id_depends_only_on_the_document_not_parent_or_branch() {
        // §4.5: `new_commit = sha256(canonical_json(new_doc))[0:12]` — the
        // hash identifies the resulting content, not the edit that
        // produced it, so parent/branch never enter the hash.
        let doc = json!({"name": "Widget"});
        let a = Commit::new(Some("parent-a12345".into()), "alice (u-1) [verified]", "edit", "main", &doc).unwrap();
        let b = Commit::new(Some("parent-b67890".into()), "alice (u-1) [verified]", "edit", "feature", &doc).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn different_documents_produce_different_ids() {
        let a = Commit::new(Some("p".into()), "alice (u-1) [verified]", "edit", "main", &json!({"name": "Widget"})).unwrap();
        let b = Commit::new(Some("p".into()), "alice (u-1) [verified]", "edit", "main", &json!({"name": "Gadget"})).unwrap();
        assert_ne!(a.id, b.id);
    }
}
