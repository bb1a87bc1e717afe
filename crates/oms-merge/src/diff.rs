//! Two-way / three-way diff primitives (§4.6 "Diff"): "two-way when no
//! base given... three-way when base given: compute
//! `source_changes = diff(base, source)` and
//! `target_changes = diff(base, target)`".

use crate::model::{ObjectTypeDoc, Property, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
}

#[derive(Debug, Clone)]
pub struct PropertyChange {
    pub name: String,
    pub kind: ChangeKind,
    pub before: Option<Property>,
    pub after: Option<Property>,
}

#[derive(Debug, Clone)]
pub struct ObjectChange {
    pub id: String,
    pub kind: ChangeKind,
    pub before: Option<ObjectTypeDoc>,
    pub after: Option<ObjectTypeDoc>,
    pub property_changes: Vec<PropertyChange>,
    pub status_change: Option<(Option<String>, Option<String>)>,
}

/// Property-level diff, ignoring position — ordering is handled
/// separately by [`crate::lcs::merge_key_order`].
pub fn diff_properties(before: &[Property], after: &[Property]) -> Vec<PropertyChange> {
    let mut changes = Vec::new();

    for b in before {
        match after.iter().find(|p| p.name == b.name) {
            None => changes.push(PropertyChange {
                name: b.name.clone(),
                kind: ChangeKind::Deleted,
                before: Some(b.clone()),
                after: None,
            }),
            Some(a) if a != b => changes.push(PropertyChange {
                name: b.name.clone(),
                kind: ChangeKind::Modified,
                before: Some(b.clone()),
                after: Some(a.clone()),
            }),
            Some(_) => {}
        }
    }
    for a in after {
        if !before.iter().any(|p| p.name == a.name) {
            changes.push(PropertyChange {
                name: a.name.clone(),
                kind: ChangeKind::Added,
                before: None,
                after: Some(a.clone()),
            });
        }
    }
    changes
}

/// Object-level diff between two snapshots. Used both directly
/// (two-way mode) and against a common ancestor twice (three-way
/// mode, once per side).
pub fn diff_objects(before: &Snapshot, after: &Snapshot) -> Vec<ObjectChange> {
    let mut out = Vec::new();

    for b in &before.objects {
        match after.object(&b.id) {
            None => out.push(ObjectChange {
                id: b.id.clone(),
                kind: ChangeKind::Deleted,
                before: Some(b.clone()),
                after: None,
                property_changes: Vec::new(),
                status_change: None,
            }),
            Some(a) => {
                let property_changes = diff_properties(&b.properties, &a.properties);
                let status_change = if b.status != a.status {
                    Some((b.status.clone(), a.status.clone()))
                } else {
                    None
                };
                if !property_changes.is_empty() || status_change.is_some() || b.extra != a.extra {
                    out.push(ObjectChange {
                        id: b.id.clone(),
                        kind: ChangeKind::Modified,
                        before: Some(b.clone()),
                        after: Some(a.clone()),
                        property_changes,
                        status_change,
                    });
                }
            }
        }
    }
    for a in &after.objects {
        if before.object(&a.id).is_none() {
            out.push(ObjectChange {
                id: a.id.clone(),
                kind: ChangeKind::Added,
                before: None,
                after: Some(a.clone()),
                property_changes: Vec::new(),
                status_change: None,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn prop(name: &str, type_: &str, required: bool) -> Property {
        Property {
            name: name.to_string(),
            type_: type_.to_string(),
            required,
            unique: false,
            extra: BTreeMap::new(),
        }
    }

    fn snapshot(objects: Vec<ObjectTypeDoc>) -> Snapshot {
        Snapshot {
            branch_id: "b".into(),
            commit_id: "c".into(),
            parent: None,
            objects,
        }
    }

    fn obj(id: &str, props: Vec<Property>) -> ObjectTypeDoc {
        ObjectTypeDoc {
            id: id.to_string(),
            type_: "Thing".into(),
            properties: props,
            status: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn detects_added_and_deleted_properties() {
        let before = vec![prop("a", "string", true)];
        let after = vec![prop("b", "string", true)];
        let changes = diff_properties(&before, &after);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().any(|c| c.kind == ChangeKind::Deleted && c.name == "a"));
        assert!(changes.iter().any(|c| c.kind == ChangeKind::Added && c.name == "b"));
    }

    #[test]
    fn detects_modified_object() {
        let before = snapshot(vec![obj("o1", vec![prop("a", "string", true)])]);
        let after = snapshot(vec![obj("o1", vec![prop("a", "integer", true)])]);
        let changes = diff_objects(&before, &after);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Modified);
        assert_eq!(changes[0].property_changes.len(), 1);
    }

    #[test]
    fn unchanged_objects_produce_no_diff() {
        let snap = snapshot(vec![obj("o1", vec![prop("a", "string", true)])]);
        assert!(diff_objects(&snap, &snap).is_empty());
    }
}
