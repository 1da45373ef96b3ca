//! Authentik core API types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Paginated list response; only `results` is used
#[derive(Debug, Clone, Deserialize)]
pub struct Paginated<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// A user as returned by `/core/users/`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct User {
    pub pk: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

/// A group as returned by `/core/groups/`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Group {
    /// Authentik uses UUIDs for groups; older instances used integers
    #[serde(deserialize_with = "string_or_number")]
    pub pk: String,
    #[serde(default)]
    pub name: String,
}

/// Body for `POST /core/users/`
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub is_active: bool,
}

/// Body for `PATCH /core/users/<pk>/`
#[derive(Debug, Clone, Serialize)]
pub struct UserPatch {
    pub is_active: bool,
}

/// Body for `POST /core/groups/<pk>/add_user/`
#[derive(Debug, Clone, Serialize)]
pub struct GroupMember {
    pub pk: i64,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for pk, got {}",
            other
        ))),
    }
}
