//! Authenticated identity extraction.
//!
//! The core never authenticates. The edge (gateway or JWT middleware)
//! verifies the caller and forwards the opaque external user ID in a
//! trusted header; this extractor only reads it back out.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::CoreError;
use crate::server::state::ServerState;

/// Header carrying the edge-verified external user ID.
pub const EXTERNAL_USER_ID_HEADER: &str = "x-external-user-id";

/// Maximum accepted identity length, matching the profile column.
const MAX_USER_ID_LEN: usize = 255;

/// The authenticated external user ID attached to a request.
#[derive(Debug, Clone)]
pub struct Identity(pub String);

impl FromRequestParts<ServerState> for Identity {
    type Rejection = CoreError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(EXTERNAL_USER_ID_HEADER) else {
            return Err(CoreError::Unauthorized);
        };
        let user_id = raw
            .to_str()
            .map_err(|_| CoreError::Validation("external user id is not valid UTF-8".into()))?;
        if user_id.is_empty() {
            return Err(CoreError::Unauthorized);
        }
        if user_id.len() > MAX_USER_ID_LEN {
            return Err(CoreError::Validation(format!(
                "external user id exceeds {MAX_USER_ID_LEN} characters"
            )));
        }
        Ok(Identity(user_id.to_string()))
    }
}
