use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audit record written to the ticketing platform's custom-object store
/// per orchestrator run. Created once at a terminal state; never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AuditRecord {
    Success {
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        ticket_count: u64,
        source: String,
        timestamp: DateTime<Utc>,
    },
    Failure {
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        error_message: String,
        error_details: String,
        source: String,
        timestamp: DateTime<Utc>,
    },
}

impl AuditRecord {
    #[must_use]
    pub fn success(
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        ticket_count: u64,
        source: String,
    ) -> Self {
        Self::Success {
            start_date,
            end_date,
            ticket_count,
            source,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn failure(
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        error_message: String,
        error_details: String,
        source: String,
    ) -> Self {
        Self::Failure {
            start_date,
            end_date,
            error_message,
            error_details,
            source,
            timestamp: Utc::now(),
        }
    }
}
