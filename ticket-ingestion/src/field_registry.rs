use std::collections::HashMap;
use std::sync::Arc;

use common::error::AppError;
use common::storage::types::field_descriptor::FieldDescriptor;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::http_client::HttpClient;

#[derive(Debug, Deserialize)]
struct FieldsPage {
    ticket_fields: Vec<RawFieldDescriptor>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFieldDescriptor {
    id: serde_json::Value,
    title: String,
    #[serde(rename = "type")]
    type_tag: String,
    key: Option<String>,
    description: Option<String>,
}

impl From<RawFieldDescriptor> for FieldDescriptor {
    fn from(raw: RawFieldDescriptor) -> Self {
        FieldDescriptor {
            field_id: raw.id.to_string().trim_matches('"').to_string(),
            title: raw.title,
            type_tag: raw.type_tag,
            key: raw.key,
            description: raw.description,
        }
    }
}

/// Process-lifetime cache of the ticketing platform's custom field schema.
///
/// `get_fields` is single-flight: the first caller triggers the paginated
/// load, every concurrent caller observes the same in-flight future, and the
/// mapping is immutable once loaded.
pub struct FieldRegistry {
    http: Arc<HttpClient>,
    fields: OnceCell<HashMap<String, FieldDescriptor>>,
}

impl FieldRegistry {
    #[must_use]
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            fields: OnceCell::new(),
        }
    }

    pub async fn get_fields(&self) -> Result<&HashMap<String, FieldDescriptor>, AppError> {
        self.fields
            .get_or_try_init(|| async { self.load_all_pages().await })
            .await
    }

    /// Resolves a single field-id, falling back to
    /// [`FieldDescriptor::unknown`] for ids the registry never saw.
    pub async fn resolve(&self, field_id: &str) -> Result<FieldDescriptor, AppError> {
        let fields = self.get_fields().await?;
        Ok(fields
            .get(field_id)
            .cloned()
            .unwrap_or_else(|| FieldDescriptor::unknown(field_id)))
    }

    async fn load_all_pages(&self) -> Result<HashMap<String, FieldDescriptor>, AppError> {
        let mut fields = HashMap::new();
        let mut page: FieldsPage = self.http.get("/ticket_fields.json", &[]).await?;

        loop {
            for raw in page.ticket_fields {
                let descriptor = FieldDescriptor::from(raw);
                fields.insert(descriptor.field_id.clone(), descriptor);
            }

            let Some(next_page) = page.next_page else {
                break;
            };
            tokio::time::sleep(crate::http_client::inter_page_pause()).await;
            page = self.http.get_absolute(&next_page, &[]).await?;
        }

        Ok(fields)
    }
}
