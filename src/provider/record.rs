//! Product records returned by provider queries.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ProviderKind;

/// Label used when a record has neither a title nor an identifier.
const UNNAMED_RECORD: &str = "<unnamed product>";

/// Attribute keys tried, in order, for a human-readable record label.
const LABEL_KEYS: [&str; 2] = ["title", "display_id"];

/// One catalog entry returned by a provider query.
///
/// Records produced by a [`ProviderClient`](super::ProviderClient) carry an
/// explicit provider tag. Records read from outside the process (for example a
/// JSON records file) may be untagged; routing then falls back to the
/// provider discriminator fields present in the attributes.
///
/// Serialized as a flat JSON object with an optional `provider` key:
///
/// ```json
/// {"provider": "copernicus", "uuid": "8df46c9e-...", "title": "S2A_MSIL1C_..."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<ProviderKind>,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

impl ProductRecord {
    /// Creates a record tagged with the provider that produced it.
    #[must_use]
    pub fn new(provider: ProviderKind, attributes: Map<String, Value>) -> Self {
        Self {
            provider: Some(provider),
            attributes,
        }
    }

    /// Creates a record with no provider tag.
    #[must_use]
    pub fn untagged(attributes: Map<String, Value>) -> Self {
        Self {
            provider: None,
            attributes,
        }
    }

    /// Provider tag set by the query that produced this record, if any.
    #[must_use]
    pub fn provider(&self) -> Option<ProviderKind> {
        self.provider
    }

    /// All attributes of the record.
    #[must_use]
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Returns true if the record has an attribute named `name`.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Iterates over attribute names.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Raw attribute value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Attribute value as a non-empty string.
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Remote identifier of the product.
    ///
    /// For a tagged record this is the value of its provider's discriminator
    /// field; for an untagged record the first known discriminator present.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match self.provider {
            Some(kind) => kind
                .discriminator_keys()
                .iter()
                .find_map(|key| self.field_str(key)),
            None => ProviderKind::ALL
                .iter()
                .flat_map(|kind| kind.discriminator_keys())
                .find_map(|key| self.field_str(key)),
        }
    }

    /// Human-readable label for logs and reports.
    #[must_use]
    pub fn label(&self) -> &str {
        LABEL_KEYS
            .iter()
            .find_map(|key| self.field_str(key))
            .or_else(|| self.identifier())
            .unwrap_or(UNNAMED_RECORD)
    }
}

impl fmt::Display for ProductRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_tagged_record_identifier_uses_own_discriminator() {
        let record = ProductRecord::new(
            ProviderKind::Copernicus,
            attrs(json!({"uuid": "abc-123", "title": "S2A_MSIL1C"})),
        );
        assert_eq!(record.provider(), Some(ProviderKind::Copernicus));
        assert_eq!(record.identifier(), Some("abc-123"));
        assert_eq!(record.label(), "S2A_MSIL1C");
    }

    #[test]
    fn test_label_falls_back_to_display_id_then_identifier() {
        let record = ProductRecord::new(
            ProviderKind::EarthExplorer,
            attrs(json!({"entity_id": "LC81830332021012", "display_id": "LC08_L1TP"})),
        );
        assert_eq!(record.label(), "LC08_L1TP");

        let bare = ProductRecord::untagged(attrs(json!({"entity_id": "LC81830332021012"})));
        assert_eq!(bare.label(), "LC81830332021012");
    }

    #[test]
    fn test_label_for_empty_record() {
        let record = ProductRecord::untagged(Map::new());
        assert_eq!(record.label(), UNNAMED_RECORD);
        assert_eq!(record.identifier(), None);
    }

    #[test]
    fn test_field_str_ignores_empty_and_non_strings() {
        let record = ProductRecord::untagged(attrs(json!({"title": "", "cloud_cover": 12.5})));
        assert_eq!(record.field_str("title"), None);
        assert_eq!(record.field_str("cloud_cover"), None);
        assert!(record.has_field("cloud_cover"));
    }

    #[test]
    fn test_serializes_flat_with_provider_tag() {
        let record = ProductRecord::new(
            ProviderKind::EarthExplorer,
            attrs(json!({"entity_id": "LC8"})),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({"provider": "earth_explorer", "entity_id": "LC8"}));
    }

    #[test]
    fn test_deserializes_untagged_record() {
        let record: ProductRecord =
            serde_json::from_value(json!({"uuid": "u-1", "title": "S2B"})).unwrap();
        assert_eq!(record.provider(), None);
        assert_eq!(record.identifier(), Some("u-1"));
        assert!(!record.has_field("provider"));
    }

    #[test]
    fn test_deserialize_then_serialize_keeps_tag() {
        let input = json!({"provider": "copernicus", "uuid": "u-2"});
        let record: ProductRecord = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(record.provider(), Some(ProviderKind::Copernicus));
        assert_eq!(serde_json::to_value(&record).unwrap(), input);
    }
}
