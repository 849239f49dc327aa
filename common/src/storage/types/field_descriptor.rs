use serde::{Deserialize, Serialize};

/// A custom form field as described by the ticketing platform's schema.
///
/// Registry invariant: once [`crate::storage::types::field_descriptor`]s are
/// loaded for a process, the field-id to descriptor mapping never changes;
/// ids absent from the loaded schema resolve to [`FieldDescriptor::unknown`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub field_id: String,
    pub title: String,
    pub type_tag: String,
    pub key: Option<String>,
    pub description: Option<String>,
}

impl FieldDescriptor {
    /// Synthetic descriptor for a field-id the registry has never seen.
    #[must_use]
    pub fn unknown(field_id: &str) -> Self {
        Self {
            field_id: field_id.to_string(),
            title: format!("Field_{field_id}"),
            type_tag: "unknown".to_string(),
            key: None,
            description: None,
        }
    }
}
