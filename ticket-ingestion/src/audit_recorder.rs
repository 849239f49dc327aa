use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::error::AppError;
use common::storage::types::audit_record::AuditRecord;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::http_client::HttpClient;

const SUCCESS_OBJECT_KEY: &str = "ingestion_audit_success";
const FAILURE_OBJECT_KEY: &str = "ingestion_audit_failure";

#[derive(Debug, Deserialize)]
struct RecordEnvelope {
    custom_object_record: RecordId,
}

#[derive(Debug, Deserialize)]
struct RecordId {
    id: String,
}

/// Writes one [`AuditRecord`] per orchestrator run to the ticketing
/// platform's custom-object store.
///
/// Every write is best-effort: the pipeline's success or failure never
/// depends on whether the audit record lands, so every fallible step here
/// logs and returns `Ok(None)` rather than propagating.
pub struct AuditRecorder {
    http: Arc<HttpClient>,
}

impl AuditRecorder {
    #[must_use]
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Idempotently creates the success/failure custom-object types and
    /// their fields. Existence is a 404-tolerant GET; field-creation 422s
    /// ("already exists") are treated as success by
    /// [`HttpClient::post_tolerating_conflict`].
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        self.ensure_object(
            SUCCESS_OBJECT_KEY,
            "Ingestion Audit Success",
            &[
                ("import_date", "date"),
                ("start_date", "date"),
                ("end_date", "date"),
                ("ticket_count", "integer"),
                ("source", "text"),
            ],
        )
        .await?;

        self.ensure_object(
            FAILURE_OBJECT_KEY,
            "Ingestion Audit Failure",
            &[
                ("error_date", "date"),
                ("start_date", "date"),
                ("end_date", "date"),
                ("error_message", "text"),
                ("error_details", "text"),
                ("source", "text"),
            ],
        )
        .await?;

        Ok(())
    }

    async fn ensure_object(&self, key: &str, title: &str, fields: &[(&str, &str)]) -> Result<(), AppError> {
        let path = format!("/custom_objects/{key}");
        if !self.http.exists(&path).await? {
            let body = json!({"custom_object": {"key": key, "title": title}});
            let _created: serde_json::Value = self.http.post("/custom_objects", &body).await?;
            debug!(key, "created custom object schema");
        }

        for (field_key, field_type) in fields {
            let body = json!({"custom_object_field": {"key": field_key, "type": field_type, "title": field_key}});
            let created = self.http.post_tolerating_conflict(&format!("/custom_objects/{key}/fields"), &body).await?;
            debug!(key, field = field_key, created, "ensured custom object field");
        }

        Ok(())
    }

    /// Writes `record` via the two-step create-then-patch protocol. Never
    /// fails the caller: any error along the way is logged and `None` is
    /// returned.
    pub async fn write(&self, record: &AuditRecord) -> Option<String> {
        match self.write_inner(record).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, "audit write failed; continuing without an audit record");
                None
            }
        }
    }

    async fn write_inner(&self, record: &AuditRecord) -> Result<String, AppError> {
        let (key, name, fields) = match record {
            AuditRecord::Success { start_date, end_date, ticket_count, source, timestamp } => (
                SUCCESS_OBJECT_KEY,
                format!("Ingestion success {}", timestamp.to_rfc3339()),
                json!({
                    "import_date": date_only(*timestamp),
                    "start_date": date_only(*start_date),
                    "end_date": date_only(*end_date),
                    "ticket_count": ticket_count,
                    "source": source,
                }),
            ),
            AuditRecord::Failure { start_date, end_date, error_message, error_details, source, timestamp } => (
                FAILURE_OBJECT_KEY,
                format!("Ingestion failure {}", timestamp.to_rfc3339()),
                json!({
                    "error_date": date_only(*timestamp),
                    "start_date": date_only(*start_date),
                    "end_date": date_only(*end_date),
                    "error_message": error_message,
                    "error_details": error_details,
                    "source": source,
                }),
            ),
        };

        let create_body = json!({"custom_object_record": {"name": name}});
        let created: RecordEnvelope = self.http.post(&format!("/custom_objects/{key}/records"), &create_body).await?;

        let patch_body = json!({"custom_object_record": {"custom_object_fields": fields}});
        let _patched: RecordEnvelope = self.http.patch(&format!("/custom_objects/{key}/records/{}", created.custom_object_record.id), &patch_body).await?;

        Ok(created.custom_object_record.id)
    }
}

fn date_only(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn ensure_schema_creates_missing_objects_and_tolerates_existing_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/api/v2/custom_objects/ingestion_audit_success")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        Mock::given(method("GET")).and(path("/api/v2/custom_objects/ingestion_audit_failure")).respond_with(ResponseTemplate::new(200).set_body_json(json!({"custom_object": {}}))).mount(&server).await;
        Mock::given(method("POST")).and(path("/api/v2/custom_objects")).respond_with(ResponseTemplate::new(201).set_body_json(json!({"custom_object": {"key": "ingestion_audit_success"}}))).mount(&server).await;
        Mock::given(method("POST")).and(path("/api/v2/custom_objects/ingestion_audit_success/fields")).respond_with(ResponseTemplate::new(422)).mount(&server).await;
        Mock::given(method("POST")).and(path("/api/v2/custom_objects/ingestion_audit_failure/fields")).respond_with(ResponseTemplate::new(201).set_body_json(json!({"custom_object_field": {}}))).mount(&server).await;

        let http = Arc::new(HttpClient::new(&server.uri(), "user", "token"));
        let recorder = AuditRecorder::new(http);
        recorder.ensure_schema().await.expect("schema ensured despite 422s");
    }

    #[tokio::test]
    async fn write_success_record_uses_create_then_patch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/custom_objects/ingestion_audit_success/records"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"custom_object_record": {"id": "rec-1"}})))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/v2/custom_objects/ingestion_audit_success/records/rec-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"custom_object_record": {"id": "rec-1"}})))
            .mount(&server)
            .await;

        let http = Arc::new(HttpClient::new(&server.uri(), "user", "token"));
        let recorder = AuditRecorder::new(http);
        let record = AuditRecord::success(Utc::now(), Utc::now(), 42, "zendesk".to_string());
        let id = recorder.write(&record).await;
        assert_eq!(id.as_deref(), Some("rec-1"));
    }

    #[tokio::test]
    async fn write_failure_is_absorbed_and_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/custom_objects/ingestion_audit_failure/records"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let http = Arc::new(HttpClient::new(&server.uri(), "user", "token"));
        let recorder = AuditRecorder::new(http);
        let record = AuditRecord::failure(Utc::now(), Utc::now(), "boom".into(), "details".into(), "zendesk".to_string());
        let id = recorder.write(&record).await;
        assert!(id.is_none());
    }
}
