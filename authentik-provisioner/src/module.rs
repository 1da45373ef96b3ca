//! Billing-host module contract.
//!
//! The host calls one function per lifecycle event with its flat parameter
//! map and shows the returned string to the operator. `"success"` means done;
//! anything else is an error message.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::audit::{AuditEntry, AuditLog};
use crate::config::{DEFAULT_GROUP, DEFAULT_TIMEOUT, ServerConfig};
use crate::error::{Error, SyncFailure};
use crate::notify::Notifier;
use crate::state::ServiceStore;
use crate::sync::{ProvisioningRequest, Synchronizer};

pub const SUCCESS: &str = "success";

/// Customer fields the host passes as `clientsdetails`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientDetails {
    #[serde(default, deserialize_with = "optional_id")]
    pub userid: Option<u64>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
}

/// The subset of the host's parameter map this module reads
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleParams {
    /// Authentik URL
    #[serde(default)]
    pub configoption1: String,
    /// API token
    #[serde(default)]
    pub configoption2: String,
    /// Group name
    #[serde(default)]
    pub configoption3: String,
    #[serde(deserialize_with = "required_id")]
    pub serviceid: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub clientsdetails: ClientDetails,
}

impl ModuleParams {
    pub fn from_value(params: &Value) -> Result<Self, Error> {
        Self::deserialize(params)
            .map_err(|e| Error::Config(format!("invalid module parameters: {}", e)))
    }

    pub fn to_request(&self, timeout: Duration) -> Result<ProvisioningRequest, Error> {
        let config = ServerConfig::new(&self.configoption1, &self.configoption2)?
            .with_group(&self.configoption3)
            .with_timeout(timeout);

        Ok(ProvisioningRequest {
            config,
            service_id: self.serviceid,
            client_id: self.clientsdetails.userid,
            email: self.clientsdetails.email.clone(),
            first_name: self.clientsdetails.firstname.clone(),
            last_name: self.clientsdetails.lastname.clone(),
            stored_username: self.username.clone().filter(|u| !u.trim().is_empty()),
        })
    }
}

/// Host-side collaborators for one callback
pub struct ModuleContext<'a> {
    pub store: &'a dyn ServiceStore,
    pub notifier: &'a dyn Notifier,
    pub audit: Arc<dyn AuditLog>,
    pub timeout: Duration,
}

impl<'a> ModuleContext<'a> {
    pub fn new(
        store: &'a dyn ServiceStore,
        notifier: &'a dyn Notifier,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            store,
            notifier,
            audit,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn synchronizer(&self) -> Synchronizer<'a> {
        Synchronizer::new(self.store, self.notifier, self.audit.clone())
    }
}

/// Service activated
pub fn create_account(params: &Value, ctx: &ModuleContext) -> String {
    dispatch("CreateAccount", params, ctx, |sync, request| {
        sync.activate(request).map(|_| ())
    })
}

/// Service suspended
pub fn suspend_account(params: &Value, ctx: &ModuleContext) -> String {
    dispatch("SuspendAccount", params, ctx, |sync, request| {
        sync.suspend(request)
    })
}

/// Service unsuspended
pub fn unsuspend_account(params: &Value, ctx: &ModuleContext) -> String {
    dispatch("UnsuspendAccount", params, ctx, |sync, request| {
        sync.unsuspend(request)
    })
}

/// Service terminated
pub fn terminate_account(params: &Value, ctx: &ModuleContext) -> String {
    dispatch("TerminateAccount", params, ctx, |sync, request| {
        sync.terminate(request)
    })
}

fn dispatch<F>(action: &str, params: &Value, ctx: &ModuleContext, operation: F) -> String
where
    F: FnOnce(&Synchronizer, &ProvisioningRequest) -> Result<(), SyncFailure>,
{
    let request = match ModuleParams::from_value(params).and_then(|p| p.to_request(ctx.timeout)) {
        Ok(request) => request,
        Err(e) => {
            error!("{} rejected: {}", action, e);
            ctx.audit.record(AuditEntry::new(
                format!("{}_Error", action),
                params.clone(),
                json!({ "error": e.to_string() }),
            ));
            return format!("Error: {}", e);
        }
    };

    match operation(&ctx.synchronizer(), &request) {
        Ok(()) => SUCCESS.to_string(),
        Err(failure) => failure.to_string(),
    }
}

/// One entry of the module's settings form
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfigOption {
    #[serde(skip)]
    pub key: &'static str,
    #[serde(rename = "FriendlyName")]
    pub friendly_name: &'static str,
    #[serde(rename = "Type")]
    pub kind: &'static str,
    #[serde(rename = "Size")]
    pub size: &'static str,
    #[serde(rename = "Default", skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
    #[serde(rename = "Description")]
    pub description: &'static str,
}

/// Settings shown on the product's module tab, in `configoption` order
pub fn config_options() -> Vec<ConfigOption> {
    vec![
        ConfigOption {
            key: "authentik_url",
            friendly_name: "Authentik URL",
            kind: "text",
            size: "255",
            default: None,
            description: "Enter your Authentik instance URL (e.g., https://authentik.example.com)",
        },
        ConfigOption {
            key: "api_token",
            friendly_name: "API Token",
            kind: "password",
            size: "255",
            default: None,
            description: "Enter your Authentik API token",
        },
        ConfigOption {
            key: "group_name",
            friendly_name: "Group Name",
            kind: "text",
            size: "50",
            default: Some(DEFAULT_GROUP),
            description: "Enter the Authentik group name to add users to",
        },
    ]
}

fn id_from_value<E: serde::de::Error>(value: Value) -> Result<Option<u64>, E> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| E::custom(format!("invalid id {}", n))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| E::custom(format!("invalid id '{}'", s))),
        other => Err(E::custom(format!("invalid id {}", other))),
    }
}

fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    id_from_value(Value::deserialize(deserializer)?)
}

fn required_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    id_from_value(Value::deserialize(deserializer)?)?
        .ok_or_else(|| serde::de::Error::custom("service id is empty"))
}
