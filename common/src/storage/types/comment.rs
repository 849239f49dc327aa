use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single comment on a ticket, as returned by the ticketing API.
///
/// Server-returned order is preserved by callers; this type carries no
/// ordering of its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub public: bool,
}
