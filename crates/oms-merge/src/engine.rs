//! §4.6 merge contract: `MergeEngine::merge(source, target, base?,
//! auto_resolve, dry_run)`.

use crate::conflict::{ConflictKind, MergeConflict};
use crate::error::{MergeError, Result};
use crate::lcs::merge_key_order;
use crate::model::{ObjectTypeDoc, Property, Snapshot};
use crate::validators::{ValidationError, ValidatorRegistry};
use oms_types::Severity;
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of a single merge computation. `merge()` never panics on a
/// blocking conflict; callers decide whether to persist via
/// [`MergeOutcome::max_severity`] / [`MergeOutcome::is_clean`], or let
/// `merge()` itself raise when `dry_run` is `false`.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merged: Snapshot,
    /// Conflicts still requiring a human decision.
    pub conflicts: Vec<MergeConflict>,
    /// Conflicts the engine resolved itself (only populated when
    /// `auto_resolve` was set).
    pub auto_resolved: Vec<MergeConflict>,
    pub validation_errors: Vec<ValidationError>,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.validation_errors.is_empty()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        MergeConflict::max_severity(&self.conflicts)
    }
}

pub struct MergeEngine {
    validators: ValidatorRegistry,
}

impl MergeEngine {
    pub fn new(validators: ValidatorRegistry) -> Self {
        Self { validators }
    }

    pub fn with_default_validators() -> Self {
        Self::new(ValidatorRegistry::with_defaults())
    }

    /// Runs the merge. With `dry_run`, blocking conflicts and failed
    /// validations are returned inside `Ok` for inspection rather than
    /// raised, so a caller can preview a merge without ever writing a
    /// commit.
    pub fn merge(
        &self,
        source: &Snapshot,
        target: &Snapshot,
        base: Option<&Snapshot>,
        auto_resolve: bool,
        dry_run: bool,
    ) -> Result<MergeOutcome> {
        let mut outcome = match base {
            Some(base) => self.three_way(base, source, target, auto_resolve),
            None => self.two_way(source, target),
        };

        let validation_errors = self.validators.run_all(base, &outcome.merged);
        for error in &validation_errors {
            outcome.conflicts.push(MergeConflict {
                kind: ConflictKind::Semantic,
                severity: Severity::Error,
                entity_id: error.entity_id.clone(),
                property: None,
                base_value: None,
                source_value: None,
                target_value: None,
                auto_resolvable: false,
                description: format!("[{}] {}", error.rule, error.message),
                context: error.context.clone(),
            });
        }
        outcome.validation_errors = validation_errors;

        if !dry_run {
            if !outcome.validation_errors.is_empty() {
                return Err(MergeError::SemanticViolation(outcome.validation_errors.len()));
            }
            if !outcome.conflicts.is_empty() {
                return Err(MergeError::Conflicts(outcome.conflicts.len()));
            }
        }
        Ok(outcome)
    }

    fn three_way(&self, base: &Snapshot, source: &Snapshot, target: &Snapshot, auto_resolve: bool) -> MergeOutcome {
        let mut ids: BTreeSet<&str> = BTreeSet::new();
        ids.extend(base.objects.iter().map(|o| o.id.as_str()));
        ids.extend(source.objects.iter().map(|o| o.id.as_str()));
        ids.extend(target.objects.iter().map(|o| o.id.as_str()));

        let mut merged_objects = Vec::new();
        let mut conflicts = Vec::new();
        let mut auto_resolved = Vec::new();

        for id in ids {
            let (object, mut object_conflicts, mut object_auto_resolved) =
                merge_object(id, base.object(id), source.object(id), target.object(id), auto_resolve);
            if let Some(object) = object {
                merged_objects.push(object);
            }
            conflicts.append(&mut object_conflicts);
            auto_resolved.append(&mut object_auto_resolved);
        }

        MergeOutcome {
            merged: Snapshot {
                branch_id: target.branch_id.clone(),
                commit_id: String::new(),
                parent: Some(target.commit_id.clone()),
                objects: merged_objects,
            },
            conflicts,
            auto_resolved,
            validation_errors: Vec::new(),
        }
    }

    /// No common ancestor: every difference is reported as a conflict
    /// against a tentative merge that defaults to `target`'s content,
    /// since there is no base to tell us whose change is the delta.
    fn two_way(&self, source: &Snapshot, target: &Snapshot) -> MergeOutcome {
        let mut conflicts = Vec::new();
        let mut merged_objects = target.objects.clone();

        for source_object in &source.objects {
            match target.object(&source_object.id) {
                None => merged_objects.push(source_object.clone()),
                Some(target_object) if target_object != source_object => {
                    conflicts.push(MergeConflict {
                        kind: ConflictKind::PropertyConflict,
                        severity: Severity::Error,
                        entity_id: source_object.id.clone(),
                        property: None,
                        base_value: None,
                        source_value: serde_json::to_value(source_object).ok(),
                        target_value: serde_json::to_value(target_object).ok(),
                        auto_resolvable: false,
                        description: format!(
                            "object '{}' differs between source and target with no common ancestor to resolve from",
                            source_object.id
                        ),
                        context: BTreeMap::new(),
                    });
                }
                Some(_) => {}
            }
        }

        MergeOutcome {
            merged: Snapshot {
                branch_id: target.branch_id.clone(),
                commit_id: String::new(),
                parent: Some(target.commit_id.clone()),
                objects: merged_objects,
            },
            conflicts,
            auto_resolved: Vec::new(),
            validation_errors: Vec::new(),
        }
    }
}

type ObjectMergeResult = (Option<ObjectTypeDoc>, Vec<MergeConflict>, Vec<MergeConflict>);

fn merge_object(
    id: &str,
    base: Option<&ObjectTypeDoc>,
    source: Option<&ObjectTypeDoc>,
    target: Option<&ObjectTypeDoc>,
    auto_resolve: bool,
) -> ObjectMergeResult {
    match (base, source, target) {
        (None, None, None) => (None, Vec::new(), Vec::new()),
        (None, Some(s), None) => (Some(s.clone()), Vec::new(), Vec::new()),
        (None, None, Some(t)) => (Some(t.clone()), Vec::new(), Vec::new()),
        (None, Some(s), Some(t)) => {
            if s == t {
                (Some(s.clone()), Vec::new(), Vec::new())
            } else {
                let conflict = MergeConflict {
                    kind: ConflictKind::PropertyConflict,
                    severity: Severity::Error,
                    entity_id: id.to_string(),
                    property: None,
                    base_value: None,
                    source_value: serde_json::to_value(s).ok(),
                    target_value: serde_json::to_value(t).ok(),
                    auto_resolvable: false,
                    description: format!("'{id}' was created independently on both sides with different definitions"),
                    context: BTreeMap::new(),
                };
                (Some(s.clone()), vec![conflict], Vec::new())
            }
        }
        (Some(_), None, None) => (None, Vec::new(), Vec::new()),
        (Some(b), None, Some(t)) => {
            if t == b {
                (None, Vec::new(), Vec::new())
            } else {
                let conflict = MergeConflict {
                    kind: ConflictKind::DeletionConflict,
                    severity: Severity::Error,
                    entity_id: id.to_string(),
                    property: None,
                    base_value: serde_json::to_value(b).ok(),
                    source_value: None,
                    target_value: serde_json::to_value(t).ok(),
                    auto_resolvable: false,
                    description: format!("'{id}' was deleted in source but modified in target"),
                    context: BTreeMap::new(),
                };
                (Some(t.clone()), vec![conflict], Vec::new())
            }
        }
        (Some(b), Some(s), None) => {
            if s == b {
                (None, Vec::new(), Vec::new())
            } else {
                let conflict = MergeConflict {
                    kind: ConflictKind::DeletionConflict,
                    severity: Severity::Error,
                    entity_id: id.to_string(),
                    property: None,
                    base_value: serde_json::to_value(b).ok(),
                    source_value: serde_json::to_value(s).ok(),
                    target_value: None,
                    auto_resolvable: false,
                    description: format!("'{id}' was deleted in target but modified in source"),
                    context: BTreeMap::new(),
                };
                (Some(s.clone()), vec![conflict], Vec::new())
            }
        }
        (Some(b), Some(s), Some(t)) => {
            let (properties, mut conflicts, mut auto_resolved) =
                merge_properties(&b.properties, &s.properties, &t.properties, id, auto_resolve);

            let base_order: Vec<String> = b.properties.iter().map(|p| p.name.clone()).collect();
            let source_order: Vec<String> = s.properties.iter().map(|p| p.name.clone()).collect();
            let target_order: Vec<String> = t.properties.iter().map(|p| p.name.clone()).collect();
            let (order, reorder_conflicts) = merge_key_order(&base_order, &source_order, &target_order);
            for name in reorder_conflicts {
                conflicts.push(MergeConflict {
                    kind: ConflictKind::Reorder,
                    severity: Severity::Warning,
                    entity_id: id.to_string(),
                    property: Some(name),
                    base_value: None,
                    source_value: None,
                    target_value: None,
                    auto_resolvable: true,
                    description: "property reordered differently on both sides; source's placement was kept".to_string(),
                    context: BTreeMap::new(),
                });
            }
            let by_name: BTreeMap<&str, &Property> = properties.iter().map(|p| (p.name.as_str(), p)).collect();
            let ordered_properties: Vec<Property> = order
                .iter()
                .filter_map(|name| by_name.get(name.as_str()).map(|p| (*p).clone()))
                .collect();

            let status = merge_status(id, b.status.as_deref(), s.status.as_deref(), t.status.as_deref(), &mut conflicts);

            let merged = ObjectTypeDoc {
                id: id.to_string(),
                type_: s.type_.clone(),
                properties: ordered_properties,
                status,
                extra: if s.extra == t.extra { s.extra.clone() } else { t.extra.clone() },
            };
            (Some(merged), conflicts, auto_resolved)
        }
    }
}

fn merge_status(
    entity_id: &str,
    base: Option<&str>,
    source: Option<&str>,
    target: Option<&str>,
    conflicts: &mut Vec<MergeConflict>,
) -> Option<String> {
    let source_changed = source != base;
    let target_changed = target != base;
    match (source_changed, target_changed) {
        (false, false) | (false, true) => target.map(str::to_string),
        (true, false) => source.map(str::to_string),
        (true, true) if source == target => source.map(str::to_string),
        (true, true) => {
            conflicts.push(MergeConflict {
                kind: ConflictKind::PropertyConflict,
                severity: Severity::Error,
                entity_id: entity_id.to_string(),
                property: Some("status".to_string()),
                base_value: base.map(|s| serde_json::json!(s)),
                source_value: source.map(|s| serde_json::json!(s)),
                target_value: target.map(|s| serde_json::json!(s)),
                auto_resolvable: false,
                description: "status changed differently on both sides".to_string(),
                context: BTreeMap::new(),
            });
            target.map(str::to_string)
        }
    }
}

fn merge_properties(
    base: &[Property],
    source: &[Property],
    target: &[Property],
    entity_id: &str,
    auto_resolve: bool,
) -> (Vec<Property>, Vec<MergeConflict>, Vec<MergeConflict>) {
    let base_map: BTreeMap<&str, &Property> = base.iter().map(|p| (p.name.as_str(), p)).collect();
    let source_map: BTreeMap<&str, &Property> = source.iter().map(|p| (p.name.as_str(), p)).collect();
    let target_map: BTreeMap<&str, &Property> = target.iter().map(|p| (p.name.as_str(), p)).collect();

    let mut names: BTreeSet<&str> = BTreeSet::new();
    names.extend(base_map.keys());
    names.extend(source_map.keys());
    names.extend(target_map.keys());

    let mut merged = Vec::new();
    let mut conflicts = Vec::new();
    let mut auto_resolved = Vec::new();

    for name in names {
        let b = base_map.get(name).copied();
        let s = source_map.get(name).copied();
        let t = target_map.get(name).copied();

        match (b, s, t) {
            (None, None, None) => {}
            (None, Some(sp), None) => merged.push(sp.clone()),
            (None, None, Some(tp)) => merged.push(tp.clone()),
            (None, Some(sp), Some(tp)) => {
                if sp == tp {
                    merged.push(sp.clone());
                } else {
                    conflicts.push(property_conflict(
                        ConflictKind::PropertyConflict,
                        entity_id,
                        name,
                        None,
                        Some(sp),
                        Some(tp),
                        "added independently on both sides with different definitions",
                    ));
                    merged.push(sp.clone());
                }
            }
            (Some(_), None, None) => {}
            (Some(bp), None, Some(tp)) => {
                if tp == bp {
                    // deleted in source, untouched in target: delete wins
                } else {
                    conflicts.push(property_conflict(
                        ConflictKind::DeletionConflict,
                        entity_id,
                        name,
                        Some(bp),
                        None,
                        Some(tp),
                        "deleted in source but modified in target",
                    ));
                    merged.push(tp.clone());
                }
            }
            (Some(bp), Some(sp), None) => {
                if sp == bp {
                    // deleted in target, untouched in source: delete wins
                } else {
                    conflicts.push(property_conflict(
                        ConflictKind::DeletionConflict,
                        entity_id,
                        name,
                        Some(bp),
                        Some(sp),
                        None,
                        "deleted in target but modified in source",
                    ));
                    merged.push(sp.clone());
                }
            }
            (Some(bp), Some(sp), Some(tp)) => {
                let source_changed = sp != bp;
                let target_changed = tp != bp;
                match (source_changed, target_changed) {
                    (false, false) => merged.push(bp.clone()),
                    (true, false) => merged.push(sp.clone()),
                    (false, true) => merged.push(tp.clone()),
                    (true, true) if sp == tp => merged.push(sp.clone()),
                    (true, true) if sp.type_ != tp.type_ => {
                        conflicts.push(property_conflict(
                            ConflictKind::PropertyTypeChanged,
                            entity_id,
                            name,
                            Some(bp),
                            Some(sp),
                            Some(tp),
                            "property type changed differently on both sides",
                        ));
                        merged.push(sp.clone());
                    }
                    (true, true) if sp.required != tp.required && sp.name == tp.name && sp.unique == tp.unique && sp.extra == tp.extra => {
                        let conflict = property_conflict_resolvable(
                            ConflictKind::RequirednessChanged,
                            Severity::Warning,
                            entity_id,
                            name,
                            Some(bp),
                            Some(sp),
                            Some(tp),
                            "requiredness changed differently on both sides",
                            true,
                        );
                        if auto_resolve {
                            let mut resolved = sp.clone();
                            resolved.required = sp.required || tp.required;
                            merged.push(resolved);
                            auto_resolved.push(conflict);
                        } else {
                            merged.push(sp.clone());
                            conflicts.push(conflict);
                        }
                    }
                    (true, true) => {
                        conflicts.push(property_conflict(
                            ConflictKind::PropertyConflict,
                            entity_id,
                            name,
                            Some(bp),
                            Some(sp),
                            Some(tp),
                            "changed differently on both sides",
                        ));
                        merged.push(sp.clone());
                    }
                }
            }
        }
    }

    (merged, conflicts, auto_resolved)
}

#[allow(clippy::too_many_arguments)]
fn property_conflict(
    kind: ConflictKind,
    entity_id: &str,
    name: &str,
    base: Option<&Property>,
    source: Option<&Property>,
    target: Option<&Property>,
    description: &str,
) -> MergeConflict {
    property_conflict_resolvable(kind, Severity::Error, entity_id, name, base, source, target, description, false)
}

#[allow(clippy::too_many_arguments)]
fn property_conflict_resolvable(
    kind: ConflictKind,
    severity: Severity,
    entity_id: &str,
    name: &str,
    base: Option<&Property>,
    source: Option<&Property>,
    target: Option<&Property>,
    description: &str,
    auto_resolvable: bool,
) -> MergeConflict {
    MergeConflict {
        kind,
        severity,
        entity_id: entity_id.to_string(),
        property: Some(name.to_string()),
        base_value: base.and_then(|p| serde_json::to_value(p).ok()),
        source_value: source.and_then(|p| serde_json::to_value(p).ok()),
        target_value: target.and_then(|p| serde_json::to_value(p).ok()),
        auto_resolvable,
        description: format!("property '{name}' {description}"),
        context: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(name: &str, type_: &str, required: bool) -> Property {
        Property {
            name: name.to_string(),
            type_: type_.to_string(),
            required,
            unique: false,
            extra: BTreeMap::new(),
        }
    }

    fn object(id: &str, props: Vec<Property>) -> ObjectTypeDoc {
        ObjectTypeDoc {
            id: id.to_string(),
            type_: "Thing".into(),
            properties: props,
            status: None,
            extra: BTreeMap::new(),
        }
    }

    fn snapshot(branch: &str, commit: &str, objects: Vec<ObjectTypeDoc>) -> Snapshot {
        Snapshot {
            branch_id: branch.into(),
            commit_id: commit.into(),
            parent: None,
            objects,
        }
    }

    /// §8: one property's requiredness changes on both sides (auto
    /// resolved), another's type changes on both sides differently
    /// (blocking). `max_severity` is ERROR and a `dry_run` merge
    /// returns both without raising.
    #[test]
    fn s3_typed_conflicts_with_mixed_auto_resolution() {
        let base = snapshot(
            "b1",
            "base",
            vec![object("o1", vec![prop("name", "string", false), prop("price", "integer", true)])],
        );
        let source = snapshot(
            "b1",
            "src",
            vec![object("o1", vec![prop("name", "string", true), prop("price", "string", true)])],
        );
        let target = snapshot(
            "b1",
            "tgt",
            vec![object("o1", vec![prop("name", "string", false), prop("price", "number", true)])],
        );

        let engine = MergeEngine::with_default_validators();
        let outcome = engine
            .merge(&source, &target, Some(&base), true, true)
            .expect("dry_run never raises");

        assert_eq!(outcome.max_severity(), Some(Severity::Error));
        assert!(outcome.conflicts.iter().any(|c| c.kind == ConflictKind::PropertyTypeChanged));
        assert!(outcome.auto_resolved.iter().any(|c| c.kind == ConflictKind::RequirednessChanged));
        assert!(!outcome.is_clean());
    }

    #[test]
    fn non_conflicting_three_way_merge_is_clean() {
        let base = snapshot("b1", "base", vec![object("o1", vec![prop("name", "string", false)])]);
        let source = snapshot("b1", "src", vec![object("o1", vec![prop("name", "string", true)])]);
        let target = snapshot("b1", "tgt", vec![object("o1", vec![prop("name", "string", true)])]);

        let engine = MergeEngine::with_default_validators();
        let outcome = engine.merge(&source, &target, Some(&base), true, false).expect("clean merge");
        assert!(outcome.is_clean());
        assert_eq!(outcome.merged.object("o1").unwrap().property("name").unwrap().required, true);
    }

    #[test]
    fn non_dry_run_raises_on_blocking_conflicts() {
        let base = snapshot("b1", "base", vec![object("o1", vec![prop("price", "integer", true)])]);
        let source = snapshot("b1", "src", vec![object("o1", vec![prop("price", "string", true)])]);
        let target = snapshot("b1", "tgt", vec![object("o1", vec![prop("price", "number", true)])]);

        let engine = MergeEngine::with_default_validators();
        let result = engine.merge(&source, &target, Some(&base), true, false);
        assert!(matches!(result, Err(MergeError::Conflicts(_))));
    }

    #[test]
    fn deleting_in_source_while_untouched_in_target_wins() {
        let base = snapshot("b1", "base", vec![object("o1", vec![])]);
        let source = snapshot("b1", "src", vec![]);
        let target = snapshot("b1", "tgt", vec![object("o1", vec![])]);

        let engine = MergeEngine::with_default_validators();
        let outcome = engine.merge(&source, &target, Some(&base), true, false).expect("clean merge");
        assert!(outcome.merged.object("o1").is_none());
        assert!(outcome.is_clean());
    }
}
