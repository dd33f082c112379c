//! Graph entities (`{id, schema, properties}`) as exchanged in JSON lines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ADDRESS_SCHEMA: &str = "Address";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub schema: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<String>>,
}

impl Entity {
    pub fn new(id: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            schema: schema.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn is_address(&self) -> bool {
        self.schema == ADDRESS_SCHEMA
    }

    pub fn get(&self, prop: &str) -> &[String] {
        self.properties.get(prop).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, prop: &str) -> Option<&str> {
        self.get(prop).first().map(String::as_str)
    }

    /// Append a value unless it is empty or already present
    pub fn add(&mut self, prop: &str, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        let values = self.properties.entry(prop.to_string()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    /// Flat `id`, `schema` and `;`-joined property fields
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("id".to_string(), self.id.clone()),
            ("schema".to_string(), self.schema.clone()),
        ];
        fields.extend(
            self.properties
                .iter()
                .map(|(k, v)| (k.clone(), v.join(";"))),
        );
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_access() {
        let entity: Entity = serde_json::from_str(
            r#"{"id": "ent", "schema": "LegalEntity", "properties": {"address": ["Cowley Road"]}}"#,
        )
        .unwrap();
        assert!(!entity.is_address());
        assert_eq!(entity.first("address"), Some("Cowley Road"));
        assert!(entity.get("country").is_empty());
    }

    #[test]
    fn test_add_dedupes() {
        let mut entity = Entity::new("addr", ADDRESS_SCHEMA);
        entity.add("full", "a");
        entity.add("full", "a");
        entity.add("full", "  ");
        entity.add("full", "b");
        assert_eq!(entity.get("full"), ["a".to_string(), "b".to_string()]);
        assert_eq!(
            entity.fields(),
            vec![
                ("id".to_string(), "addr".to_string()),
                ("schema".to_string(), ADDRESS_SCHEMA.to_string()),
                ("full".to_string(), "a;b".to_string()),
            ]
        );
    }
}
