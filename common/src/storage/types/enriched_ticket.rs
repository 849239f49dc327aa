use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ticket::{FieldValue, Ticket};

/// Author role assigned during enrichment by comparing comment author-id
/// against the ticket's requester-id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommentRole {
    Customer,
    Agent,
}

/// One entry in an enriched ticket's conversation, preserving server order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationEntry {
    pub role: CommentRole,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub public: bool,
}

/// A custom field after projection through the
/// [`crate::storage::types::field_descriptor::FieldDescriptor`] registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectedField {
    pub value: FieldValue,
    pub type_tag: String,
    pub key: Option<String>,
    pub description: Option<String>,
}

/// A ticket after enrichment: conversation classified by role, resolution
/// extracted, and custom fields projected into a name-addressed map.
///
/// Invariant: if no public Agent message with non-whitespace body exists in
/// `conversation`, `resolution` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedTicket {
    pub ticket_id: String,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub conversation: Vec<ConversationEntry>,
    pub resolution: Option<String>,
    pub custom_fields: HashMap<String, ProjectedField>,
}

impl EnrichedTicket {
    /// Builds the enriched shell from a raw ticket and its already-classified
    /// conversation, deriving `resolution` per the public-Agent-comment rule.
    #[must_use]
    pub fn new(
        ticket: &Ticket,
        conversation: Vec<ConversationEntry>,
        custom_fields: HashMap<String, ProjectedField>,
    ) -> Self {
        let resolution = Self::resolution_from(&conversation);
        Self {
            ticket_id: ticket.id.clone(),
            subject: ticket.subject.clone(),
            description: ticket.description.clone(),
            status: ticket.status.clone(),
            priority: ticket.priority.clone(),
            tags: ticket.tags.clone(),
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
            conversation,
            resolution,
            custom_fields,
        }
    }

    /// The last public Agent entry with a non-whitespace body, or `None`.
    ///
    /// Resolution scope is restricted to *public* Agent comments: a
    /// privacy-sensitive deployment must not let internal escalation notes
    /// leak into a customer-facing knowledge surface.
    #[must_use]
    pub fn resolution_from(conversation: &[ConversationEntry]) -> Option<String> {
        conversation
            .iter()
            .rev()
            .find(|entry| {
                entry.role == CommentRole::Agent
                    && entry.public
                    && !entry.message.trim().is_empty()
            })
            .map(|entry| entry.message.clone())
    }
}
