//! Custom fields arrive keyed by opaque hashes. A [`CustomFieldTable`] maps
//! each known hash to a display name and a decoder, and is applied to every
//! decoded record.
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::{CustomFields, Deal, DealRef, Organization};

pub const DEAL_KUNDE_TO_GO: &str = "66dd77c15a4867a95be45bc3ecc162fdf74a4c76";
pub const DEAL_AKTION: &str = "7de67a2875cf1fee9aa92dd0f8c65f5b24226b34";
pub const DEAL_LEAD_SOURCE: &str = "1ed188d19ec50c6563dbdad533126dc58882b429";
pub const ORG_EMAIL: &str = "460a5e9346f7b7bf008904a285414900bd70ecbc";

/// Returns `None` when the raw value cannot be mapped.
pub type Decoder = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

#[derive(Clone)]
pub struct CustomField {
    pub key: String,
    pub name: String,
    decode: Decoder,
}

impl fmt::Debug for CustomField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomField")
            .field("key", &self.key)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl CustomField {
    pub fn new(key: impl Into<String>, name: impl Into<String>, decode: Decoder) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            decode,
        }
    }

    /// Free text; `null` becomes the empty string.
    pub fn text(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(
            key,
            name,
            Arc::new(|v: &Value| match v {
                Value::Null => Some(Value::String(String::new())),
                Value::String(s) => Some(Value::String(s.clone())),
                _ => None,
            }),
        )
    }

    /// Single-option enum stored as the option id; `null` becomes the empty string.
    pub fn options(
        key: impl Into<String>,
        name: impl Into<String>,
        labels: &[(&str, &str)],
    ) -> Self {
        let labels: Vec<(String, String)> = labels
            .iter()
            .map(|(id, label)| (id.to_string(), label.to_string()))
            .collect();
        Self::new(
            key,
            name,
            Arc::new(move |v: &Value| {
                let id = match v {
                    Value::Null => return Some(Value::String(String::new())),
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                labels
                    .iter()
                    .find(|(option, _)| *option == id)
                    .map(|(_, label)| Value::String(label.clone()))
            }),
        )
    }

    pub fn decode(&self, raw: &Value) -> Result<Value> {
        (self.decode)(raw).ok_or_else(|| Error::CustomField {
            key: self.key.clone(),
            name: self.name.clone(),
            value: raw.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CustomFieldTable {
    fields: Vec<CustomField>,
}

impl CustomFieldTable {
    pub fn new(fields: Vec<CustomField>) -> Self {
        Self { fields }
    }

    pub fn deal_defaults() -> Self {
        Self::new(vec![
            CustomField::options(
                DEAL_KUNDE_TO_GO,
                "Kunde to Go",
                &[("758", "Ja"), ("759", "Nein")],
            ),
            CustomField::text(DEAL_AKTION, "Aktion"),
            CustomField::text(DEAL_LEAD_SOURCE, "Lead - Quelle / Medium"),
        ])
    }

    pub fn organization_defaults() -> Self {
        Self::new(vec![CustomField::text(ORG_EMAIL, "E-Mail")])
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn name_for(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.name.as_str())
    }

    /// Decode every known key present in `raw`. Keys absent from the record
    /// are skipped.
    pub fn apply(&self, raw: &Map<String, Value>) -> Result<CustomFields> {
        let mut out = CustomFields::new();
        for field in &self.fields {
            if let Some(value) = raw.get(&field.key) {
                out.insert(field.name.clone(), field.decode(value)?);
            }
        }
        Ok(out)
    }
}

/// Records that carry decoded custom fields.
pub trait WithCustomFields {
    fn custom_fields_mut(&mut self) -> &mut CustomFields;
}

impl WithCustomFields for Deal {
    fn custom_fields_mut(&mut self) -> &mut CustomFields {
        &mut self.custom_fields
    }
}

impl WithCustomFields for DealRef {
    fn custom_fields_mut(&mut self) -> &mut CustomFields {
        &mut self.custom_fields
    }
}

impl WithCustomFields for Organization {
    fn custom_fields_mut(&mut self) -> &mut CustomFields {
        &mut self.custom_fields
    }
}

/// Toggle `tag` in a comma-separated set. A missing or non-string value is
/// treated as the empty set. The result is sorted.
pub fn toggle_csv_tag(current: Option<&Value>, tag: &str) -> BTreeSet<String> {
    let mut tags: BTreeSet<String> = current
        .and_then(Value::as_str)
        .map(|csv| {
            csv.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if !tags.remove(tag) {
        tags.insert(tag.to_string());
    }
    tags
}

pub fn join_csv(tags: &BTreeSet<String>) -> String {
    tags.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn deal_table_maps_known_keys() {
        let table = CustomFieldTable::deal_defaults();
        let fields = table
            .apply(&raw(json!({
                DEAL_KUNDE_TO_GO: "758",
                DEAL_AKTION: "839,840",
                DEAL_LEAD_SOURCE: null,
                "unrelated": 1,
            })))
            .unwrap();
        assert_eq!(fields["Kunde to Go"], json!("Ja"));
        assert_eq!(fields["Aktion"], json!("839,840"));
        assert_eq!(fields["Lead - Quelle / Medium"], json!(""));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn absent_keys_are_skipped() {
        let table = CustomFieldTable::organization_defaults();
        let fields = table.apply(&raw(json!({"name": "ACME"}))).unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn unmappable_value_is_an_error() {
        let table = CustomFieldTable::deal_defaults();
        let err = table
            .apply(&raw(json!({DEAL_KUNDE_TO_GO: "999"})))
            .unwrap_err();
        match err {
            Error::CustomField { name, value, .. } => {
                assert_eq!(name, "Kunde to Go");
                assert_eq!(value, json!("999"));
            }
            other => panic!("wrong error: {other:?}"),
        }

        let err = table.apply(&raw(json!({DEAL_AKTION: 5}))).unwrap_err();
        assert!(matches!(err, Error::CustomField { .. }));
    }

    #[test]
    fn name_lookup_by_key() {
        let table = CustomFieldTable::deal_defaults();
        assert_eq!(table.name_for(DEAL_AKTION), Some("Aktion"));
        assert_eq!(table.name_for(DEAL_LEAD_SOURCE), Some("Lead - Quelle / Medium"));
        assert_eq!(table.name_for(ORG_EMAIL), None);
    }

    #[test]
    fn toggle_adds_missing_tag() {
        let tags = toggle_csv_tag(None, "839");
        assert_eq!(join_csv(&tags), "839");
        let tags = toggle_csv_tag(Some(&json!("")), "839");
        assert_eq!(join_csv(&tags), "839");
        let tags = toggle_csv_tag(Some(&json!("840,12")), "839");
        assert_eq!(join_csv(&tags), "12,839,840");
    }

    #[test]
    fn toggle_removes_present_tag() {
        let tags = toggle_csv_tag(Some(&json!("840,839")), "839");
        assert_eq!(join_csv(&tags), "840");
        let tags = toggle_csv_tag(Some(&json!("839")), "839");
        assert_eq!(join_csv(&tags), "");
    }
}
