//! Static route table: `(method, route_pattern) -> (ResourceCategory, Action)`.
//!
//! Patterns use `{param}` path segments, matched positionally rather
//! than through a regex engine — every segment is either a literal
//! that must match exactly or a `{...}` placeholder that matches any
//! single segment.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Approve,
    Merge,
    Execute,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Create => "CREATE",
            Action::Read => "READ",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
            Action::Approve => "APPROVE",
            Action::Merge => "MERGE",
            Action::Execute => "EXECUTE",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceCategory {
    Schema,
    ObjectType,
    LinkType,
    ActionType,
    Branch,
    Proposal,
    Webhook,
    Audit,
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceCategory::Schema => "SCHEMA",
            ResourceCategory::ObjectType => "OBJECT_TYPE",
            ResourceCategory::LinkType => "LINK_TYPE",
            ResourceCategory::ActionType => "ACTION_TYPE",
            ResourceCategory::Branch => "BRANCH",
            ResourceCategory::Proposal => "PROPOSAL",
            ResourceCategory::Webhook => "WEBHOOK",
            ResourceCategory::Audit => "AUDIT",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RouteEntry {
    pub method: &'static str,
    pub pattern: &'static str,
    pub resource: ResourceCategory,
    pub action: Action,
    /// Mutating routes on schema-bearing resources that always require
    /// an issue reference even for non-delete/merge actions.
    pub requires_issue: bool,
}

pub struct RouteTable {
    entries: Vec<RouteEntry>,
    public_paths: Vec<&'static str>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            public_paths: Vec::new(),
        }
    }

    /// Default table covering the schema CRUD surface, branch lifecycle,
    /// merge proposals, webhooks, and audit read access.
    pub fn with_defaults() -> Self {
        use Action::*;
        use ResourceCategory::*;
        let mut table = Self::new();
        table
            .public("GET", "/healthz")
            .public("GET", "/metrics")
            .public("GET", "/docs")
            .register("GET", "/api/v1/schemas/{branch}/object-types", ObjectType, Read, false)
            .register("POST", "/api/v1/schemas/{branch}/object-types", ObjectType, Create, true)
            .register("GET", "/api/v1/schemas/{branch}/object-types/{id}", ObjectType, Read, false)
            .register("PUT", "/api/v1/schemas/{branch}/object-types/{id}", ObjectType, Update, true)
            .register("DELETE", "/api/v1/schemas/{branch}/object-types/{id}", ObjectType, Delete, true)
            .register("GET", "/api/v1/schemas/{branch}/link-types/{id}", LinkType, Read, false)
            .register("PUT", "/api/v1/schemas/{branch}/link-types/{id}", LinkType, Update, true)
            .register("DELETE", "/api/v1/schemas/{branch}/link-types/{id}", LinkType, Delete, true)
            .register("GET", "/api/v1/schemas/{branch}/action-types/{id}", ActionType, Read, false)
            .register("PUT", "/api/v1/schemas/{branch}/action-types/{id}", ActionType, Update, true)
            .register("GET", "/api/v1/schemas/{branch}", Schema, Read, false)
            .register("PUT", "/api/v1/schemas/{branch}", Schema, Update, true)
            .register("POST", "/api/v1/branches", Branch, Create, false)
            .register("DELETE", "/api/v1/branches/{branch}", Branch, Delete, true)
            .register("POST", "/api/v1/branches/{branch}/merge", Branch, Merge, true)
            .register("POST", "/api/v1/proposals", Proposal, Create, false)
            .register("POST", "/api/v1/proposals/{id}/approve", Proposal, Approve, false)
            .register("POST", "/api/v1/webhooks/{id}/invoke", Webhook, Execute, false)
            .register("GET", "/api/v1/audit", Audit, Read, false)
            .register("POST", "/api/v1/audit", Audit, Create, false);
        table
    }

    pub fn public(&mut self, method: &'static str, pattern: &'static str) -> &mut Self {
        let _ = method;
        self.public_paths.push(pattern);
        self
    }

    pub fn register(&mut self, method: &'static str, pattern: &'static str, resource: ResourceCategory, action: Action, requires_issue: bool) -> &mut Self {
        self.entries.push(RouteEntry {
            method,
            pattern,
            resource,
            action,
            requires_issue,
        });
        self
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| segments_match(p, path))
    }

    /// Resolve `(method, path)` to its registered entry. `None` means
    /// the route must be denied as `route_not_registered`.
    pub fn resolve(&self, method: &str, path: &str) -> Option<&RouteEntry> {
        self.entries
            .iter()
            .find(|e| e.method.eq_ignore_ascii_case(method) && segments_match(e.pattern, path))
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn segments_match(pattern: &str, path: &str) -> bool {
    let pattern_segs: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if pattern_segs.len() != path_segs.len() {
        return false;
    }
    pattern_segs
        .iter()
        .zip(path_segs.iter())
        .all(|(p, s)| (p.starts_with('{') && p.ends_with('}')) || p == s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_parameterized_route() {
        let table = RouteTable::with_defaults();
        let entry = table.resolve("DELETE", "/api/v1/schemas/main/object-types/Person").unwrap();
        assert_eq!(entry.resource, ResourceCategory::ObjectType);
        assert_eq!(entry.action, Action::Delete);
        assert!(entry.requires_issue);
    }

    #[test]
    fn unregistered_route_resolves_to_none() {
        let table = RouteTable::with_defaults();
        assert!(table.resolve("PATCH", "/api/v1/not-a-real-route").is_none());
    }

    #[test]
    fn health_is_public() {
        let table = RouteTable::with_defaults();
        assert!(table.is_public("/healthz"));
        assert!(!table.is_public("/api/v1/schemas/main"));
    }
}
