use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Category {
    pub full_name: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub game_mask_id: String,
}

impl Category {
    /// Entrada sintética que siempre se agrega al final de una búsqueda.
    pub fn other() -> Self {
        Self {
            full_name: "Other".to_string(),
            game_mask_id: String::new(),
        }
    }
}

/// Transmisión en curso: vive desde `start` hasta `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSession {
    pub id: String,
    pub rtmp_url: String,
    pub stream_key: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub username: String,
    pub application_status: String,
    pub can_be_live: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InfoResponse {
    #[serde(default)]
    pub categories: Vec<Category>,
    pub user: Option<UserInfo>,
    pub application_status: Option<ApplicationStatus>,
    #[serde(default)]
    pub can_be_live: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UserInfo {
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApplicationStatus {
    pub status: Option<String>,
}

impl From<InfoResponse> for AccountInfo {
    fn from(info: InfoResponse) -> Self {
        Self {
            username: info
                .user
                .and_then(|u| u.username)
                .unwrap_or_else(|| "Unknown".to_string()),
            application_status: info
                .application_status
                .and_then(|s| s.status)
                .unwrap_or_else(|| "Unknown".to_string()),
            can_be_live: info.can_be_live,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StartResponse {
    pub id: Option<serde_json::Value>,
    pub rtmp: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EndResponse {
    #[serde(default)]
    pub success: bool,
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}
