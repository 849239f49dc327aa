use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::error::AppError;
use common::storage::types::comment::Comment;
use common::storage::types::enriched_ticket::{CommentRole, ConversationEntry, EnrichedTicket, ProjectedField};
use common::storage::types::ticket::Ticket;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::warn;

use crate::field_registry::FieldRegistry;
use crate::http_client::HttpClient;

const INTER_BATCH_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct CommentsPage {
    comments: Vec<ApiComment>,
}

#[derive(Debug, Deserialize)]
struct ApiComment {
    author_id: serde_json::Value,
    body: String,
    created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default = "default_public")]
    public: bool,
}

fn default_public() -> bool {
    true
}

fn value_to_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<ApiComment> for Comment {
    fn from(raw: ApiComment) -> Self {
        Comment {
            author_id: value_to_id(&raw.author_id),
            body: raw.body,
            created_at: raw.created_at,
            public: raw.public,
        }
    }
}

fn classify(comment: Comment, requester_id: &str) -> ConversationEntry {
    let role = if comment.author_id == requester_id { CommentRole::Customer } else { CommentRole::Agent };
    ConversationEntry { role, message: comment.body, timestamp: comment.created_at, public: comment.public }
}

/// Turns a raw [`Ticket`] into an [`EnrichedTicket`] by fetching its comment
/// thread, classifying each comment's role against `requester_id`, and
/// projecting custom fields through the [`FieldRegistry`].
///
/// Fans out over a ticket batch with bounded concurrency via
/// `buffer_unordered`, with order restored afterward since the chunker and
/// vector-id scheme assume stable per-run ticket ordering.
pub struct TicketEnricher {
    http: Arc<HttpClient>,
    fields: Arc<FieldRegistry>,
}

impl TicketEnricher {
    #[must_use]
    pub fn new(http: Arc<HttpClient>, fields: Arc<FieldRegistry>) -> Self {
        Self { http, fields }
    }

    pub async fn enrich_one(&self, ticket: &Ticket) -> Result<EnrichedTicket, AppError> {
        let path = format!("/tickets/{}/comments.json", ticket.id);
        let page: CommentsPage = self.http.get(&path, &[]).await?;

        let conversation = page
            .comments
            .into_iter()
            .map(Comment::from)
            .map(|comment| classify(comment, &ticket.requester_id))
            .collect();

        let mut custom_fields = HashMap::new();
        for (field_id, value) in &ticket.custom_fields {
            if !value.is_present() {
                continue;
            }
            let descriptor = self.fields.resolve(field_id).await?;
            custom_fields.insert(
                descriptor.title.clone(),
                ProjectedField { value: value.clone(), type_tag: descriptor.type_tag, key: descriptor.key, description: descriptor.description },
            );
        }

        Ok(EnrichedTicket::new(ticket, conversation, custom_fields))
    }

    /// Enriches `tickets` in batches of `concurrency`, preserving fetcher
    /// order across each batch's out-of-order completion. A per-ticket
    /// failure is logged and the ticket is dropped from the result rather
    /// than aborting the run.
    pub async fn enrich_batch(&self, tickets: &[Ticket], concurrency: usize) -> Vec<EnrichedTicket> {
        let concurrency = concurrency.max(1);
        let mut out = Vec::with_capacity(tickets.len());

        let batches: Vec<&[Ticket]> = tickets.chunks(concurrency).collect();
        let last_batch = batches.len().saturating_sub(1);

        for (batch_index, batch) in batches.into_iter().enumerate() {
            let mut tagged: Vec<(usize, Result<EnrichedTicket, AppError>)> = stream::iter(batch.iter().enumerate())
                .map(|(index, ticket)| async move { (index, self.enrich_one(ticket).await) })
                .buffer_unordered(concurrency)
                .collect()
                .await;
            tagged.sort_by_key(|(index, _)| *index);

            for (index, result) in tagged {
                match result {
                    Ok(enriched) => out.push(enriched),
                    Err(err) => {
                        warn!(ticket_id = %batch[index].id, error = %err, "skipping ticket after enrichment failure");
                    }
                }
            }

            if batch_index < last_batch {
                sleep(INTER_BATCH_PAUSE).await;
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::storage::types::ticket::FieldValue;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_ticket(id: &str, requester_id: &str) -> Ticket {
        let mut custom_fields = HashMap::new();
        custom_fields.insert("1".to_string(), FieldValue::String("gold".into()));
        custom_fields.insert("2".to_string(), FieldValue::Null);
        Ticket {
            id: id.to_string(),
            subject: "Subject".to_string(),
            description: "Description".to_string(),
            status: "open".to_string(),
            priority: "normal".to_string(),
            tags: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            requester_id: requester_id.to_string(),
            assignee_id: None,
            custom_fields,
        }
    }

    async fn setup() -> (MockServer, Arc<HttpClient>, Arc<FieldRegistry>) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/ticket_fields.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ticket_fields": [{"id": 1, "title": "Plan", "type": "text", "key": "plan", "description": null}],
                "next_page": null
            })))
            .mount(&server)
            .await;

        let http = Arc::new(HttpClient::new(&server.uri(), "user", "token"));
        let fields = Arc::new(FieldRegistry::new(Arc::clone(&http)));
        (server, http, fields)
    }

    #[tokio::test]
    async fn classifies_comment_roles_by_requester_id() {
        let (server, http, fields) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/tickets/1/comments.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "comments": [
                    {"author_id": "requester-1", "body": "Help!", "created_at": Utc::now().to_rfc3339(), "public": true},
                    {"author_id": "agent-9", "body": "Sure, here's how.", "created_at": Utc::now().to_rfc3339(), "public": true}
                ]
            })))
            .mount(&server)
            .await;

        let enricher = TicketEnricher::new(http, fields);
        let ticket = sample_ticket("1", "requester-1");
        let enriched = enricher.enrich_one(&ticket).await.expect("enrich succeeds");

        assert_eq!(enriched.conversation.len(), 2);
        assert_eq!(enriched.conversation[0].role, CommentRole::Customer);
        assert_eq!(enriched.conversation[1].role, CommentRole::Agent);
        assert_eq!(enriched.resolution.as_deref(), Some("Sure, here's how."));
    }

    #[tokio::test]
    async fn null_custom_field_is_skipped_during_projection() {
        let (server, http, fields) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/tickets/1/comments.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"comments": []})))
            .mount(&server)
            .await;

        let enricher = TicketEnricher::new(http, fields);
        let ticket = sample_ticket("1", "requester-1");
        let enriched = enricher.enrich_one(&ticket).await.expect("enrich succeeds");

        assert_eq!(enriched.custom_fields.len(), 1);
        assert!(enriched.custom_fields.contains_key("Plan"));
    }

    #[tokio::test]
    async fn enrich_batch_preserves_order_and_skips_failures() {
        let (server, http, fields) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/tickets/1/comments.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"comments": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/tickets/2/comments.json"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/tickets/3/comments.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"comments": []})))
            .mount(&server)
            .await;

        let enricher = TicketEnricher::new(http, fields);
        let tickets = vec![sample_ticket("1", "r"), sample_ticket("2", "r"), sample_ticket("3", "r")];
        let enriched = enricher.enrich_batch(&tickets, 2).await;

        assert_eq!(enriched.len(), 2);
        assert_eq!(enriched[0].ticket_id, "1");
        assert_eq!(enriched[1].ticket_id, "3");
    }
}
