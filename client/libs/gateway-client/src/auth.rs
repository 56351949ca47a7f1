//! Session and user types returned by the auth API

use crate::query::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form metadata supplied at sign-up (username, full_name)
    #[serde(default)]
    pub user_metadata: Row,
}

impl AuthUser {
    pub fn username(&self) -> Option<&str> {
        self.user_metadata.get("username").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

/// Result of a sign-up call. `session` is absent when the service requires
/// email confirmation first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignUpResponse {
    pub user: Option<AuthUser>,
    pub session: Option<Session>,
}

/// Attributes accepted by the update-user endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Row>,
}
