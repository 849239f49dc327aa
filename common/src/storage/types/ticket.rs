use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Untyped value of a custom field as carried at the transport layer, before
/// the [`crate::storage::types::field_descriptor::FieldDescriptor`] registry
/// attaches a declared type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl FieldValue {
    /// A field-value is "present" for custom-field projection purposes when
    /// it is neither null nor the empty string.
    #[must_use]
    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Null => false,
            FieldValue::String(s) => !s.is_empty(),
            FieldValue::Number(_) | FieldValue::Boolean(_) => true,
        }
    }

    #[must_use]
    pub fn display(&self) -> String {
        match self {
            FieldValue::String(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Null => String::new(),
        }
    }
}

/// A raw ticket record as returned by `GET /search.json`.
///
/// Invariant: `id` is unique within the source system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: String,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub requester_id: String,
    pub assignee_id: Option<String>,
    pub custom_fields: HashMap<String, FieldValue>,
}
