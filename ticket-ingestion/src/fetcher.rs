use std::collections::HashMap;

use chrono::NaiveDate;
use common::error::AppError;
use common::storage::types::ticket::{FieldValue, Ticket};
use serde::Deserialize;
use tracing::{info, warn};

use crate::http_client::HttpClient;

/// Wire shape of a ticket as returned by `GET /search.json`: a
/// `{results: [Ticket], next_page}` envelope. Custom fields arrive as a list
/// of `{id, value}` pairs; [`Ticket::custom_fields`] is keyed by field-id for
/// the Enricher's convenience, so this type converts on the way in.
#[derive(Debug, Deserialize)]
struct SearchPage {
    results: Vec<ApiTicket>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiTicket {
    id: serde_json::Value,
    subject: String,
    description: String,
    status: String,
    priority: String,
    #[serde(default)]
    tags: Vec<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    requester_id: serde_json::Value,
    assignee_id: Option<serde_json::Value>,
    #[serde(default)]
    fields: Vec<ApiCustomFieldEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiCustomFieldEntry {
    id: serde_json::Value,
    value: FieldValue,
}

fn value_to_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<ApiTicket> for Ticket {
    fn from(raw: ApiTicket) -> Self {
        let mut custom_fields = HashMap::new();
        for entry in raw.fields {
            custom_fields.insert(value_to_id(&entry.id), entry.value);
        }
        Ticket {
            id: value_to_id(&raw.id),
            subject: raw.subject,
            description: raw.description,
            status: raw.status,
            priority: raw.priority,
            tags: raw.tags,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            requester_id: value_to_id(&raw.requester_id),
            assignee_id: raw.assignee_id.as_ref().map(value_to_id),
            custom_fields,
        }
    }
}

/// Streams tickets matching a date predicate via cursored search.
///
/// Builds a `type:ticket created>=START created<=END` query sorted by
/// creation time descending, and walks the `next_page` cursor to
/// exhaustion. A page failure truncates the stream at that point (partial
/// progress retained) rather than failing the run.
pub struct TicketFetcher {
    http: std::sync::Arc<HttpClient>,
}

impl TicketFetcher {
    #[must_use]
    pub fn new(http: std::sync::Arc<HttpClient>) -> Self {
        Self { http }
    }

    pub async fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Vec<Ticket> {
        let query = format!(
            "type:ticket created>={} created<={}",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );

        let mut tickets = Vec::new();
        let mut page = match self
            .http
            .get::<SearchPage>(
                "/search.json",
                &[("query", query.as_str()), ("sort_by", "created_at"), ("sort_order", "desc")],
            )
            .await
        {
            Ok(page) => page,
            Err(err) => {
                warn!(error = %err, "ticket search page failed; returning zero tickets");
                return tickets;
            }
        };

        loop {
            tickets.extend(page.results.into_iter().map(Ticket::from));

            let Some(next_page) = page.next_page else {
                break;
            };

            tokio::time::sleep(crate::http_client::inter_page_pause()).await;

            match self.http.get_absolute::<SearchPage>(&next_page, &[]).await {
                Ok(next) => page = next,
                Err(err) => {
                    warn!(error = %err, tickets_so_far = tickets.len(), "ticket search page failed; truncating stream");
                    break;
                }
            }
        }

        info!(count = tickets.len(), "fetched tickets in range");
        tickets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_ticket(id: u64) -> serde_json::Value {
        json!({
            "id": id,
            "subject": format!("Ticket {id}"),
            "description": "desc",
            "status": "open",
            "priority": "normal",
            "tags": ["billing"],
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
            "requester_id": 111,
            "assignee_id": 222,
            "fields": [{"id": 1, "value": "gold"}]
        })
    }

    #[tokio::test]
    async fn walks_cursor_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/search.json"))
            .and(query_param("sort_order", "desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [sample_ticket(1)],
                "next_page": format!("{}/api/v2/search.json?page=2", server.uri())
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/search.json"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [sample_ticket(2)],
                "next_page": null
            })))
            .mount(&server)
            .await;

        let http = std::sync::Arc::new(HttpClient::new(&server.uri(), "user", "token"));
        let fetcher = TicketFetcher::new(http);
        let tickets = fetcher
            .fetch(
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            )
            .await;

        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].id, "1");
        assert_eq!(tickets[0].custom_fields.get("1").unwrap().display(), "gold");
        assert_eq!(tickets[1].id, "2");
    }

    #[tokio::test]
    async fn search_failure_yields_empty_stream_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/search.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let http = std::sync::Arc::new(HttpClient::new(&server.uri(), "user", "token"));
        let fetcher = TicketFetcher::new(http);
        let tickets = fetcher
            .fetch(
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            )
            .await;

        assert!(tickets.is_empty());
    }
}
