//! §6: "PII fields listed in `data.compliance.pii_fields` are masked
//! to `***MASKED***` before emission."

use serde_json::Value;

pub const MASK: &str = "***MASKED***";

/// Recursively masks any object key listed in `pii_fields`, at any
/// nesting depth, leaving the shape of `value` otherwise intact.
pub fn mask_pii(value: &Value, pii_fields: &[String]) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if pii_fields.iter().any(|f| f == k) {
                    out.insert(k.clone(), Value::String(MASK.to_string()));
                } else {
                    out.insert(k.clone(), mask_pii(v, pii_fields));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| mask_pii(v, pii_fields)).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_listed_fields_at_any_depth() {
        let doc = json!({
            "name": "Customer",
            "contact": {"email": "alice@example.com"},
            "email": "alice@example.com",
        });
        let masked = mask_pii(&doc, &["email".to_string()]);
        assert_eq!(masked["email"], json!(MASK));
        assert_eq!(masked["contact"]["email"], json!(MASK));
        assert_eq!(masked["name"], json!("Customer"));
    }

    #[test]
    fn leaves_non_pii_fields_untouched() {
        let doc = json!({"description": "v2"});
        let masked = mask_pii(&doc, &["email".to_string()]);
        assert_eq!(masked, doc);
    }
}
