use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PHONE_FIELD: &str = "phone";
pub const IS_LOGGED_IN_FIELD: &str = "isLoggedIn";
pub const LOGIN_TIME_FIELD: &str = "loginTime";

/// Identity data supplied by the authentication backend plus the two fields
/// owned by the session store (`isLoggedIn`, `loginTime`).
///
/// The backend's fields are kept as an open JSON object; only `phone` is
/// interpreted, as the fallback identifier for credential synthesis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRecord {
    fields: Map<String, Value>,
}

impl UserRecord {
    /// Merge backend data with a fresh login stamp. Store-owned fields win
    /// over backend fields of the same name.
    pub(crate) fn committed(user_data: Map<String, Value>, now: DateTime<Utc>) -> Self {
        let mut fields = user_data;
        fields.insert(IS_LOGGED_IN_FIELD.to_string(), Value::Bool(true));
        fields.insert(
            LOGIN_TIME_FIELD.to_string(),
            Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        Self { fields }
    }

    pub(crate) fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The phone identifier, if usable. Backends have been seen sending it as
    /// either a string or a number; empty strings count as missing.
    pub fn phone(&self) -> Option<String> {
        match self.fields.get(PHONE_FIELD)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// True only when `isLoggedIn` is exactly the boolean `true`.
    pub fn is_logged_in(&self) -> bool {
        matches!(self.fields.get(IS_LOGGED_IN_FIELD), Some(Value::Bool(true)))
    }

    pub fn login_time_raw(&self) -> Option<&str> {
        self.fields.get(LOGIN_TIME_FIELD).and_then(Value::as_str)
    }

    /// Parsed `loginTime`, or `None` when missing or not RFC 3339.
    pub fn login_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.login_time_raw()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.login_time().map(|login| now - login)
    }

    pub fn age(&self) -> Option<Duration> {
        self.age_at(Utc::now())
    }

    /// Human-readable time since login, e.g. "5m ago".
    pub fn age_display(&self) -> String {
        let Some(age) = self.age() else {
            return "unknown".to_string();
        };

        let minutes = age.num_minutes();
        if minutes < 1 {
            // Covers clock skew too
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}
