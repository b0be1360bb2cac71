//! Session store configuration.
//!
//! Key names and host-facing strings default to the values the MindPal web
//! client has always used, so data written by one front end is readable by
//! another. Every field can be overridden from a host config file.

use serde::{Deserialize, Serialize};

/// Default session lifetime for expiry checks: one week.
pub const DEFAULT_MAX_AGE_HOURS: f64 = 24.0 * 7.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Durable key holding the serialized user record
    pub user_key: String,
    /// Durable key holding the backend-issued credential
    pub token_key: String,
    /// Durable key a login view uses for its remember-me flag
    pub remember_key: String,
    /// Transient key holding the pending return destination
    pub return_url_key: String,
    /// Where unauthenticated visitors are sent
    pub entry_location: String,
    /// Notice shown when the access gate denies entry
    pub login_notice: String,
    /// Prefix of the credential synthesized from the user's phone
    pub token_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_key: "mindpal_user".to_string(),
            token_key: "mindpal_token".to_string(),
            remember_key: "mindpal_remember".to_string(),
            return_url_key: "mindpal_return_url".to_string(),
            entry_location: "index.html".to_string(),
            login_notice: "Please log in first".to_string(),
            token_prefix: "temp_".to_string(),
        }
    }
}
