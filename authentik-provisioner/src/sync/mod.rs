//! Lifecycle synchronizer: one billing event in, a sequence of Authentik calls out.
//!
//! Operations stop at the first failing step and never undo earlier steps.
//! An account created by a failed activation stays in Authentik, and its
//! username stays on record so that a later terminate can still remove it.

#[cfg(test)]
mod tests;

use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditLog};
use crate::client::{IdentityClient, NewUser, User};
use crate::config::ServerConfig;
use crate::error::{Error, FailWith, FailureKind, SyncFailure};
use crate::notify::{ACCOUNT_CREATED_TEMPLATE, CredentialNotice, Notifier};
use crate::state::ServiceStore;
use crate::{password, username};

pub type SyncResult<T = ()> = std::result::Result<T, SyncFailure>;

/// Everything one lifecycle callback knows about the service and its customer
#[derive(Debug, Clone)]
pub struct ProvisioningRequest {
    pub config: ServerConfig,
    pub service_id: u64,
    pub client_id: Option<u64>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Username the host already holds for this service, if any
    pub stored_username: Option<String>,
}

impl ProvisioningRequest {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// Result of a successful activation
#[derive(Debug, Clone, PartialEq)]
pub struct Activated {
    pub username: String,
    pub user_pk: i64,
    pub group_pk: String,
}

pub struct Synchronizer<'a> {
    store: &'a dyn ServiceStore,
    notifier: &'a dyn Notifier,
    audit: Arc<dyn AuditLog>,
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        store: &'a dyn ServiceStore,
        notifier: &'a dyn Notifier,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            store,
            notifier,
            audit,
        }
    }

    /// Create the account, add it to the configured group and send the credentials
    pub fn activate(&self, request: &ProvisioningRequest) -> SyncResult<Activated> {
        let outcome = self.try_activate(request);
        self.record_outcome("CreateAccount", request, &outcome);
        outcome
    }

    /// Deactivate the account without deleting it
    pub fn suspend(&self, request: &ProvisioningRequest) -> SyncResult {
        let outcome = self.set_active(request, false);
        self.record_outcome("SuspendAccount", request, &outcome);
        outcome
    }

    /// Reactivate a suspended account
    pub fn unsuspend(&self, request: &ProvisioningRequest) -> SyncResult {
        let outcome = self.set_active(request, true);
        self.record_outcome("UnsuspendAccount", request, &outcome);
        outcome
    }

    /// Delete the account
    pub fn terminate(&self, request: &ProvisioningRequest) -> SyncResult {
        let outcome = self.try_terminate(request);
        self.record_outcome("TerminateAccount", request, &outcome);
        outcome
    }

    fn try_activate(&self, request: &ProvisioningRequest) -> SyncResult<Activated> {
        let client = self.client(&request.config)?;

        let username =
            username::allocate_unique(&client).fail_with(FailureKind::AllocationFailed)?;
        let password = password::generate();
        info!(
            "Creating Authentik user {} for service {}",
            username, request.service_id
        );

        let created = client
            .create_user(&NewUser {
                username: username.clone(),
                email: request.email.clone(),
                name: request.display_name(),
                password: password.clone(),
                is_active: true,
            })
            .fail_with(FailureKind::CreateFailed)?;

        self.store
            .set_username(request.service_id, &username)
            .map_err(Error::Store)
            .fail_with(FailureKind::PersistFailed)?;

        let group = client
            .find_group(&request.config.group_name)
            .map_err(|e| {
                lookup_failure(e, FailureKind::GroupNotFound, FailureKind::GroupLookupFailed)
            })?;

        client
            .add_user_to_group(&group.pk, created.pk)
            .fail_with(FailureKind::LinkFailed)?;

        let notice = CredentialNotice {
            template: ACCOUNT_CREATED_TEMPLATE,
            client_id: request.client_id,
            client_name: request.display_name(),
            username: username.clone(),
            password,
            authentik_url: request.config.public_url(),
        };
        if let Err(e) = self.notifier.send_credentials(&notice) {
            warn!(
                "Account {} is ready but the credential notice failed: {:#}",
                username, e
            );
        }

        Ok(Activated {
            username,
            user_pk: created.pk,
            group_pk: group.pk,
        })
    }

    fn set_active(&self, request: &ProvisioningRequest, is_active: bool) -> SyncResult {
        let username = self.stored_username(request)?;
        let client = self.client(&request.config)?;
        let user = self.resolve_account(&client, &username)?;

        client
            .set_active(user.pk, is_active)
            .fail_with(FailureKind::UpdateFailed)
    }

    fn try_terminate(&self, request: &ProvisioningRequest) -> SyncResult {
        let username = self.stored_username(request)?;
        let client = self.client(&request.config)?;
        let user = self.resolve_account(&client, &username)?;

        client
            .delete_user(user.pk)
            .fail_with(FailureKind::DeleteFailed)
    }

    fn client(&self, config: &ServerConfig) -> SyncResult<IdentityClient> {
        IdentityClient::new(config.clone(), self.audit.clone())
            .fail_with(FailureKind::InvalidConfig)
    }

    /// Username on record for the service; the store wins over the host's copy
    fn stored_username(&self, request: &ProvisioningRequest) -> SyncResult<String> {
        let stored = self
            .store
            .username(request.service_id)
            .map_err(Error::Store)
            .fail_with(FailureKind::StoreFailed)?;

        stored
            .or_else(|| request.stored_username.clone())
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                SyncFailure::new(
                    FailureKind::UsernameMissing,
                    Error::MissingLocalState {
                        service_id: request.service_id,
                    },
                )
            })
    }

    fn resolve_account(&self, client: &IdentityClient, username: &str) -> SyncResult<User> {
        client.find_user(username).map_err(|e| {
            lookup_failure(
                e,
                FailureKind::AccountNotFound,
                FailureKind::AccountLookupFailed,
            )
        })
    }

    fn record_outcome<T>(
        &self,
        action: &str,
        request: &ProvisioningRequest,
        outcome: &SyncResult<T>,
    ) {
        match outcome {
            Ok(_) => info!("{} succeeded for service {}", action, request.service_id),
            Err(failure) => {
                warn!(
                    "{} failed for service {}: {}",
                    action, request.service_id, failure
                );
                self.audit.record(AuditEntry::new(
                    format!("{}_Error", action),
                    json!({
                        "serviceid": request.service_id,
                        "server": request.config.public_url(),
                    }),
                    json!({
                        "kind": format!("{:?}", failure.kind()),
                        "error": failure.to_string(),
                        "httpCode": failure.cause().status().map(|s| s.as_u16()),
                    }),
                ));
            }
        }
    }
}

fn lookup_failure(err: Error, not_found: FailureKind, failed: FailureKind) -> SyncFailure {
    match err {
        Error::NotFound(..) => SyncFailure::new(not_found, err),
        other => SyncFailure::new(failed, other),
    }
}
