use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::types::Pagination;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Default, Serialize)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    pub version: String,
}

/// Standard response envelope: every Manager HTTP endpoint returns this
/// shape whether it succeeds or fails.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
    pub meta: Option<Meta>,
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Envelope {
            success: true,
            data: Some(data),
            error: None,
            meta: None,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
        }
    }

    pub fn ok_with_pagination(data: T, pagination: Pagination) -> Self {
        Envelope {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta {
                    pagination: Some(pagination),
                    version: env!("CARGO_PKG_VERSION").to_string(),
            }),
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
        }
    }

    pub fn err(kind: ErrorKind, message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Envelope {
            success: false,
            data: None,
            error: Some(ErrorBody {
                    code: kind.code().to_string(),
                    message: message.into(),
                    details,
            }),
            meta: None,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
        }
    }
}
