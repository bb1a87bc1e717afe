//! §4.6 snapshot shapes: `{branch_id, commit_id, parent?, objects:
//! [ObjectTypeDoc]}`, each object carrying `{id, type, properties:
//! [{name, type, required, unique?, ...}]}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    /// Catch-all for property-level fields (e.g. a custom constraint)
    /// that don't warrant a dedicated struct field.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectTypeDoc {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub properties: Vec<Property>,
    /// Object-level status, used by the state-transition validator.
    #[serde(default)]
    pub status: Option<String>,
    /// Catch-all for domain-specific object fields the semantic
    /// validators inspect (`isTaxable`, `taxRate`, `taxExemptionReason`,
    /// `weight`, `dimensions`, `digital_url`, `fileSize`, ...) that
    /// don't warrant a dedicated struct field. The product-type rule
    /// keys off `type_` above, not this map.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ObjectTypeDoc {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub branch_id: String,
    pub commit_id: String,
    pub parent: Option<String>,
    pub objects: Vec<ObjectTypeDoc>,
}

impl Snapshot {
    pub fn object(&self, id: &str) -> Option<&ObjectTypeDoc> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.id.clone()).collect()
    }
}
