//! Issue-tracking enforcement (§4.7): mutating routes on schema-bearing
//! resources require a recognized issue reference.

use async_trait::async_trait;
use std::collections::HashSet;

/// External collaborator interface (§1 non-goals: "the external...
/// issue tracker" is out of scope — only the interface is defined
/// here). A production implementation would call out to Jira/Linear/etc;
/// this crate only needs to know whether a given reference is valid.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn is_valid(&self, issue_id: &str) -> bool;
}

/// Format-gated tracker: accepts any `PREFIX-number` reference, plus an
/// explicit allow/deny list for tests and for pinning specific issues
/// as known-good without a live tracker dependency.
pub struct StaticIssueTracker {
    known: HashSet<String>,
    accept_by_format: bool,
}

impl StaticIssueTracker {
    pub fn new() -> Self {
        Self {
            known: HashSet::new(),
            accept_by_format: true,
        }
    }

    /// Strict mode: only `known` ids validate, regardless of format.
    pub fn strict() -> Self {
        Self {
            known: HashSet::new(),
            accept_by_format: false,
        }
    }

    pub fn with_known(mut self, issue_id: impl Into<String>) -> Self {
        self.known.insert(issue_id.into());
        self
    }

    fn matches_format(issue_id: &str) -> bool {
        let Some((prefix, number)) = issue_id.split_once('-') else {
            return false;
        };
        !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_uppercase()) && !number.is_empty() && number.chars().all(|c| c.is_ascii_digit())
    }
}

impl Default for StaticIssueTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IssueTracker for StaticIssueTracker {
    async fn is_valid(&self, issue_id: &str) -> bool {
        self.known.contains(issue_id) || (self.accept_by_format && Self::matches_format(issue_id))
    }
}
