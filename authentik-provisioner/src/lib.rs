//! Keeps Authentik user accounts in step with billing service lifecycle
//! events: activation, suspension, unsuspension and termination.

pub mod audit;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod module;
pub mod notify;
pub mod password;
pub mod state;
pub mod sync;
pub mod username;

pub use error::{Error, FailureKind, Result, SyncFailure};
pub use module::{
    ModuleContext, config_options, create_account, suspend_account, terminate_account,
    unsuspend_account,
};
pub use sync::{ProvisioningRequest, Synchronizer};

/// The main entry point for the admin CLI
pub fn run() -> anyhow::Result<()> {
    commands::execute()
}
