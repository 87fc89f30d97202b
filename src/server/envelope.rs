use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::errors::RelayError;
use crate::parser::token_inspector::DecodedToken;

/// Body of every relay endpoint. Absent fields serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub data: Option<Value>,
    pub request_uri: Option<String>,
    pub token: Option<String>,
    /// Populated only on failure.
    pub ex: Option<String>,
    pub jwt: Option<DecodedToken>,
}

impl Envelope {
    pub fn failure(title: &str, error: &RelayError) -> Self {
        Self {
            ex: Some(format!("{}: {}", title, error)),
            ..Self::default()
        }
    }
}

/// Envelope plus the status it goes out with.
pub struct Reply {
    pub status: StatusCode,
    pub envelope: Envelope,
}

impl Reply {
    pub fn ok(envelope: Envelope) -> Self {
        Self {
            status: StatusCode::OK,
            envelope,
        }
    }

    pub fn failed(title: &str, error: &RelayError) -> Self {
        let status = match error {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            envelope: Envelope::failure(title, error),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}
