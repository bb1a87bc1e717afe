//! Pluggable semantic validators (§4.6 "Semantic validators").
//!
//! Supplemented feature: validators report structured `context`
//! alongside the message, grounded on `merge_validators.py`'s
//! `ValidationError.context` field (recovered from `original_source/`).

use crate::model::Snapshot;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub rule: &'static str,
    pub entity_id: String,
    pub message: String,
    pub context: BTreeMap<String, serde_json::Value>,
}

/// A pluggable business rule run against the merged snapshot before a
/// merge is allowed to finalize. Validators see the pre-merge `base`
/// (when a three-way merge supplied one) so they can judge transitions,
/// not just end states.
pub trait SemanticValidator: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, base: Option<&Snapshot>, merged: &Snapshot) -> Vec<ValidationError>;
}

#[derive(Default)]
pub struct ValidatorRegistry {
    validators: Vec<Box<dyn SemanticValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, validator: Box<dyn SemanticValidator>) -> &mut Self {
        self.validators.push(validator);
        self
    }

    /// Registry pre-populated with the three rules §4.6 requires.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(Box::new(TaxRuleValidator))
            .register(Box::new(ProductTypeRuleValidator))
            .register(Box::new(StateTransitionRuleValidator::with_default_schema()));
        registry
    }

    pub fn run_all(&self, base: Option<&Snapshot>, merged: &Snapshot) -> Vec<ValidationError> {
        self.validators.iter().flat_map(|v| v.validate(base, merged)).collect()
    }
}

/// Tax rule (spec.md §4.6): a non-taxable object's `taxRate` must be
/// zero; a non-taxable object should carry a `taxExemptionReason`; a
/// taxable object should not carry one. The first is an error, the
/// other two are warnings, mirroring `TaxMergeValidator` in
/// `merge_validators.py`.
pub struct TaxRuleValidator;

impl SemanticValidator for TaxRuleValidator {
    fn name(&self) -> &'static str {
        "tax_rule"
    }

    fn validate(&self, _base: Option<&Snapshot>, merged: &Snapshot) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for object in &merged.objects {
            let is_taxable = object.extra.get("isTaxable").and_then(|v| v.as_bool()).unwrap_or(false);
            let tax_rate = object.extra.get("taxRate").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let exemption_reason = object.extra.get("taxExemptionReason").and_then(|v| v.as_str());

            if !is_taxable && tax_rate > 0.0 {
                errors.push(ValidationError {
                    rule: self.name(),
                    entity_id: object.id.clone(),
                    message: format!("non-taxable items cannot have tax rate > 0 (current: {tax_rate})"),
                    context: BTreeMap::from([
                        ("isTaxable".to_string(), serde_json::json!(is_taxable)),
                        ("taxRate".to_string(), serde_json::json!(tax_rate)),
                    ]),
                });
            }

            if !is_taxable && exemption_reason.is_none() {
                errors.push(ValidationError {
                    rule: self.name(),
                    entity_id: object.id.clone(),
                    message: "tax-exempt items must have an exemption reason".to_string(),
                    context: BTreeMap::from([("isTaxable".to_string(), serde_json::json!(is_taxable))]),
                });
            }

            if is_taxable {
                if let Some(reason) = exemption_reason {
                    errors.push(ValidationError {
                        rule: self.name(),
                        entity_id: object.id.clone(),
                        message: "taxable items should not have an exemption reason".to_string(),
                        context: BTreeMap::from([
                            ("isTaxable".to_string(), serde_json::json!(is_taxable)),
                            ("taxExemptionReason".to_string(), serde_json::json!(reason)),
                        ]),
                    });
                }
            }
        }
        errors
    }
}

/// Product-type rule (spec.md §4.6): `digital_product` objects must
/// carry no `weight`/`dimensions` and must carry a `digital_url`;
/// `physical_product` objects must carry no `fileSize`. Mirrors
/// `ProductTypeMergeValidator` in `merge_validators.py`.
pub struct ProductTypeRuleValidator;

impl SemanticValidator for ProductTypeRuleValidator {
    fn name(&self) -> &'static str {
        "product_type_rule"
    }

    fn validate(&self, _base: Option<&Snapshot>, merged: &Snapshot) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for object in &merged.objects {
            let product_type = object.type_.as_str();
            let weight = object.extra.get("weight");
            let dimensions = object.extra.get("dimensions");
            let digital_url = object.extra.get("digital_url").and_then(|v| v.as_str());
            let file_size = object.extra.get("fileSize");

            match product_type {
                "digital_product" => {
                    if weight.is_some_and(|v| !v.is_null()) {
                        errors.push(ValidationError {
                            rule: self.name(),
                            entity_id: object.id.clone(),
                            message: "digital products cannot have weight".to_string(),
                            context: BTreeMap::from([
                                ("type".to_string(), serde_json::json!(product_type)),
                                ("weight".to_string(), weight.cloned().unwrap_or(serde_json::Value::Null)),
                            ]),
                        });
                    }
                    if dimensions.is_some_and(|v| !v.is_null()) {
                        errors.push(ValidationError {
                            rule: self.name(),
                            entity_id: object.id.clone(),
                            message: "digital products cannot have physical dimensions".to_string(),
                            context: BTreeMap::from([
                                ("type".to_string(), serde_json::json!(product_type)),
                                ("dimensions".to_string(), dimensions.cloned().unwrap_or(serde_json::Value::Null)),
                            ]),
                        });
                    }
                    if digital_url.map(str::is_empty).unwrap_or(true) {
                        errors.push(ValidationError {
                            rule: self.name(),
                            entity_id: object.id.clone(),
                            message: "digital products must have a download URL".to_string(),
                            context: BTreeMap::from([("type".to_string(), serde_json::json!(product_type))]),
                        });
                    }
                }
                "physical_product" => {
                    if file_size.is_some_and(|v| !v.is_null()) {
                        errors.push(ValidationError {
                            rule: self.name(),
                            entity_id: object.id.clone(),
                            message: "physical products should not have file size".to_string(),
                            context: BTreeMap::from([
                                ("type".to_string(), serde_json::json!(product_type)),
                                ("fileSize".to_string(), file_size.cloned().unwrap_or(serde_json::Value::Null)),
                            ]),
                        });
                    }
                }
                _ => {}
            }
        }
        errors
    }
}

/// State-transition rule (spec.md §4.6): for any `status` change, the
/// transition must appear in the schema's declared transition table for
/// the object's type, and the target status's required fields must be
/// populated. Mirrors `StateTransitionValidator` in
/// `merge_validators.py`, generalized from its hardcoded two-state
/// example to a per-entity-type table supplied by the caller.
pub struct StateTransitionRuleValidator {
    /// `object type -> (target status -> rule)`.
    schema: BTreeMap<String, BTreeMap<String, TransitionRule>>,
}

#[derive(Debug, Clone)]
pub struct TransitionRule {
    pub allowed_from: Vec<String>,
    pub required_fields: Vec<String>,
}

impl StateTransitionRuleValidator {
    pub fn new(schema: BTreeMap<String, BTreeMap<String, TransitionRule>>) -> Self {
        Self { schema }
    }

    /// A reasonable default lifecycle table (`published`/`archived`
    /// requiring their originals' attribution fields) applied to every
    /// object type that doesn't declare its own, matching the
    /// hardcoded fallback `_extract_transition_rules` returns in the
    /// original when no schema is supplied.
    pub fn with_default_schema() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(
            "published".to_string(),
            TransitionRule {
                allowed_from: vec!["review".to_string(), "draft".to_string()],
                required_fields: vec!["reviewed_by".to_string(), "published_at".to_string()],
            },
        );
        rules.insert(
            "archived".to_string(),
            TransitionRule {
                allowed_from: vec!["published".to_string()],
                required_fields: vec!["archived_by".to_string(), "archived_at".to_string(), "archive_reason".to_string()],
            },
        );
        let mut schema = BTreeMap::new();
        schema.insert("*".to_string(), rules);
        Self { schema }
    }

    fn rules_for<'a>(&'a self, object_type: &str) -> Option<&'a BTreeMap<String, TransitionRule>> {
        self.schema.get(object_type).or_else(|| self.schema.get("*"))
    }
}

impl SemanticValidator for StateTransitionRuleValidator {
    fn name(&self) -> &'static str {
        "state_transition_rule"
    }

    fn validate(&self, base: Option<&Snapshot>, merged: &Snapshot) -> Vec<ValidationError> {
        let Some(base) = base else {
            return Vec::new();
        };
        let mut errors = Vec::new();
        for object in &merged.objects {
            let Some(to) = object.status.as_deref() else {
                continue;
            };
            let Some(from) = base.object(&object.id).and_then(|o| o.status.as_deref()) else {
                continue;
            };
            if from == to {
                continue;
            }
            let Some(rules) = self.rules_for(&object.type_) else {
                continue;
            };
            let Some(rule) = rules.get(to) else {
                continue;
            };

            if !rule.allowed_from.iter().any(|s| s == from) {
                errors.push(ValidationError {
                    rule: self.name(),
                    entity_id: object.id.clone(),
                    message: format!(
                        "invalid state transition: {from} -> {to}. allowed from: {:?}",
                        rule.allowed_from
                    ),
                    context: BTreeMap::from([
                        ("from".to_string(), serde_json::json!(from)),
                        ("to".to_string(), serde_json::json!(to)),
                    ]),
                });
            }

            for field in &rule.required_fields {
                let populated = object
                    .extra
                    .get(field)
                    .map(|v| !v.is_null() && v.as_str() != Some(""))
                    .unwrap_or(false);
                if !populated {
                    errors.push(ValidationError {
                        rule: self.name(),
                        entity_id: object.id.clone(),
                        message: format!("field '{field}' is required for status '{to}'"),
                        context: BTreeMap::from([("status".to_string(), serde_json::json!(to))]),
                    });
                }
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectTypeDoc;

    fn object(extra: BTreeMap<String, serde_json::Value>) -> ObjectTypeDoc {
        ObjectTypeDoc {
            id: "o1".into(),
            type_: "Thing".into(),
            properties: Vec::new(),
            status: None,
            extra,
        }
    }

    fn typed_object(type_: &str, extra: BTreeMap<String, serde_json::Value>) -> ObjectTypeDoc {
        ObjectTypeDoc {
            type_: type_.to_string(),
            ..object(extra)
        }
    }

    fn snap(objects: Vec<ObjectTypeDoc>) -> Snapshot {
        Snapshot {
            branch_id: "b".into(),
            commit_id: "c".into(),
            parent: None,
            objects,
        }
    }

    #[test]
    fn tax_rule_rejects_positive_rate_on_non_taxable_item() {
        let validator = TaxRuleValidator;
        let extra = BTreeMap::from([
            ("isTaxable".to_string(), serde_json::json!(false)),
            ("taxRate".to_string(), serde_json::json!(0.2)),
            ("taxExemptionReason".to_string(), serde_json::json!("resale")),
        ]);
        let errors = validator.validate(None, &snap(vec![object(extra)]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "non-taxable items cannot have tax rate > 0 (current: 0.2)");
    }

    #[test]
    fn tax_rule_warns_on_missing_or_unexpected_exemption_reason() {
        let validator = TaxRuleValidator;

        let missing_reason = BTreeMap::from([
            ("isTaxable".to_string(), serde_json::json!(false)),
            ("taxRate".to_string(), serde_json::json!(0.0)),
        ]);
        let errors = validator.validate(None, &snap(vec![object(missing_reason)]));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("exemption reason"));

        let unexpected_reason = BTreeMap::from([
            ("isTaxable".to_string(), serde_json::json!(true)),
            ("taxRate".to_string(), serde_json::json!(0.1)),
            ("taxExemptionReason".to_string(), serde_json::json!("resale")),
        ]);
        let errors = validator.validate(None, &snap(vec![object(unexpected_reason)]));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("should not have an exemption reason"));
    }

    #[test]
    fn tax_rule_passes_consistent_taxable_item() {
        let validator = TaxRuleValidator;
        let extra = BTreeMap::from([
            ("isTaxable".to_string(), serde_json::json!(true)),
            ("taxRate".to_string(), serde_json::json!(0.08)),
        ]);
        assert!(validator.validate(None, &snap(vec![object(extra)])).is_empty());
    }

    #[test]
    fn product_rule_rejects_digital_product_with_weight_and_no_url() {
        let validator = ProductTypeRuleValidator;
        let extra = BTreeMap::from([("weight".to_string(), serde_json::json!(1.5))]);
        let errors = validator.validate(None, &snap(vec![typed_object("digital_product", extra)]));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn product_rule_passes_well_formed_digital_product() {
        let validator = ProductTypeRuleValidator;
        let extra = BTreeMap::from([(
            "digital_url".to_string(),
            serde_json::json!("https://example.com/file"),
        )]);
        assert!(validator.validate(None, &snap(vec![typed_object("digital_product", extra)])).is_empty());
    }

    #[test]
    fn product_rule_rejects_physical_product_with_file_size() {
        let validator = ProductTypeRuleValidator;
        let extra = BTreeMap::from([("fileSize".to_string(), serde_json::json!(1024))]);
        let errors = validator.validate(None, &snap(vec![typed_object("physical_product", extra)]));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("file size"));
    }

    #[test]
    fn state_transition_rule_rejects_disallowed_source_state() {
        let mut draft = object(BTreeMap::new());
        draft.status = Some("draft".into());
        let base = snap(vec![draft.clone()]);
        draft.status = Some("archived".into());
        let merged = snap(vec![draft]);

        let validator = StateTransitionRuleValidator::with_default_schema();
        let errors = validator.validate(Some(&base), &merged);
        // "archived" only allows "from: published" — draft -> archived is
        // invalid, and none of archived's required fields are populated.
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.message.contains("invalid state transition")));
    }

    #[test]
    fn state_transition_rule_requires_populated_fields_on_valid_transition() {
        let mut reviewed = object(BTreeMap::new());
        reviewed.status = Some("review".into());
        let base = snap(vec![reviewed.clone()]);
        reviewed.status = Some("published".into());
        let merged = snap(vec![reviewed]);

        let validator = StateTransitionRuleValidator::with_default_schema();
        let errors = validator.validate(Some(&base), &merged);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.message.contains("is required for status")));
    }

    #[test]
    fn state_transition_rule_passes_valid_transition_with_fields_populated() {
        let mut reviewed = object(BTreeMap::new());
        reviewed.status = Some("review".into());
        let base = snap(vec![reviewed.clone()]);
        reviewed.status = Some("published".into());
        reviewed.extra.insert("reviewed_by".to_string(), serde_json::json!("alice"));
        reviewed.extra.insert("published_at".to_string(), serde_json::json!("2026-07-29T00:00:00Z"));
        let merged = snap(vec![reviewed]);

        let validator = StateTransitionRuleValidator::with_default_schema();
        assert!(validator.validate(Some(&base), &merged).is_empty());
    }
}
