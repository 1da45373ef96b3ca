//! Audit trail of every identity-API interaction.
//!
//! Entries are masked before they reach an [`AuditLog`] implementation, so
//! implementations can store or print them as they are.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use tracing::info;

/// Module name recorded on every entry
pub const MODULE_NAME: &str = "authentik";

/// Replacement for masked values
pub const MASK: &str = "********";

/// Keys whose values never leave the process unmasked
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "api_token",
    "token",
    "authorization",
    "configoption2",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuditEntry {
    pub module: &'static str,
    pub action: String,
    pub request: Value,
    pub response: Value,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>, request: Value, response: Value) -> Self {
        Self {
            module: MODULE_NAME,
            action: action.into(),
            request: mask_secrets(request),
            response: mask_secrets(response),
            at: Utc::now(),
        }
    }
}

/// Sink for audit entries
pub trait AuditLog: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Emits audit entries as `tracing` events under the `authentik::audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, entry: AuditEntry) {
        info!(
            target: "authentik::audit",
            module = entry.module,
            action = %entry.action,
            request = %entry.request,
            response = %entry.response,
            "identity API call"
        );
    }
}

/// Keeps entries in memory, for hosts that flush them into their own log table
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn actions(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.action).collect()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, entry: AuditEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Replace the values of sensitive keys anywhere in a JSON document.
///
/// String bodies that themselves hold JSON (raw response text) are parsed,
/// masked and re-serialized.
pub fn mask_secrets(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    if is_sensitive(&key) {
                        (key, Value::String(MASK.to_string()))
                    } else {
                        (key, mask_secrets(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(mask_secrets).collect()),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(inner @ (Value::Object(_) | Value::Array(_))) => {
                Value::String(mask_secrets(inner).to_string())
            }
            _ => Value::String(text),
        },
        other => other,
    }
}

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS
        .iter()
        .any(|sensitive| key.eq_ignore_ascii_case(sensitive))
}
