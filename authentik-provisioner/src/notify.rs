use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use tracing::info;

/// E-mail template the billing host sends new credentials with
pub const ACCOUNT_CREATED_TEMPLATE: &str = "Authentik Account Created";

/// Template variables for the account-created message
#[derive(Clone, Serialize, PartialEq)]
pub struct CredentialNotice {
    #[serde(skip)]
    pub template: &'static str,
    #[serde(skip)]
    pub client_id: Option<u64>,
    pub client_name: String,
    pub username: String,
    pub password: String,
    pub authentik_url: String,
}

impl fmt::Debug for CredentialNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialNotice")
            .field("template", &self.template)
            .field("client_id", &self.client_id)
            .field("client_name", &self.client_name)
            .field("username", &self.username)
            .field("password", &"***")
            .field("authentik_url", &self.authentik_url)
            .finish()
    }
}

/// Delivers new-account credentials to the customer
pub trait Notifier {
    fn send_credentials(&self, notice: &CredentialNotice) -> Result<()>;
}

/// Logs that a notice was due, without the password
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_credentials(&self, notice: &CredentialNotice) -> Result<()> {
        info!(
            template = notice.template,
            client_id = ?notice.client_id,
            username = %notice.username,
            "credential notice queued"
        );
        Ok(())
    }
}

/// Collects notices, for hosts that dispatch them after the callback returns
#[derive(Debug, Default)]
pub struct OutboxNotifier {
    sent: Mutex<Vec<CredentialNotice>>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<CredentialNotice> {
        match self.sent.lock() {
            Ok(mut sent) => std::mem::take(&mut *sent),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Notifier for OutboxNotifier {
    fn send_credentials(&self, notice: &CredentialNotice) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("outbox lock poisoned"))?
            .push(notice.clone());
        Ok(())
    }
}
