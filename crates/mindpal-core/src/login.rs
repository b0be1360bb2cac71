//! The authentication backend's login reply.
//!
//! The backend answers `POST /login` with an envelope of the form
//! `{"success": true, "data": {"token": "...", "user": {...}}}` or
//! `{"success": false, "error": "..."}`. Nothing here verifies the token;
//! this only unpacks the user object and token handed to `commit_login`.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Result, SessionError};

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<LoginData>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<Map<String, Value>>,
}

impl LoginResponse {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| SessionError::MalformedResponse(e.to_string()))
    }

    /// Split a successful reply into the user fields and optional token.
    pub fn into_credentials(self) -> Result<(Map<String, Value>, Option<String>)> {
        if !self.success {
            let reason = self.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(SessionError::LoginRejected(reason));
        }

        let data = self
            .data
            .ok_or_else(|| SessionError::MalformedResponse("missing data".to_string()))?;
        let user = data
            .user
            .ok_or_else(|| SessionError::MalformedResponse("missing user".to_string()))?;

        Ok((user, data.token.filter(|t| !t.is_empty())))
    }
}
