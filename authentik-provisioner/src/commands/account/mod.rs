use anyhow::{Context, Result};
use clap::Subcommand;
use dialoguer::Confirm;
use std::sync::Arc;

use crate::audit::TracingAuditLog;
use crate::commands::Cli;
use crate::notify::{CredentialNotice, LogNotifier, Notifier};
use crate::state::{FileStore, ServiceStore};
use crate::sync::{ProvisioningRequest, Synchronizer};

#[derive(Subcommand, Debug)]
pub enum AccountCommands {
    /// Create an Authentik account for a service
    Create {
        /// Billing service id the account belongs to
        #[arg(long)]
        service_id: u64,

        /// Customer email address
        #[arg(long)]
        email: String,

        /// Customer first name
        #[arg(long, default_value = "")]
        first_name: String,

        /// Customer last name
        #[arg(long, default_value = "")]
        last_name: String,

        /// Billing client id, passed on to the credential notice
        #[arg(long)]
        client_id: Option<u64>,

        /// Log that credentials were issued instead of printing the password
        #[arg(long)]
        no_print: bool,
    },

    /// Deactivate the account of a service
    Suspend {
        /// Billing service id
        service_id: u64,
    },

    /// Reactivate the account of a service
    Unsuspend {
        /// Billing service id
        service_id: u64,
    },

    /// Delete the account of a service
    Terminate {
        /// Billing service id
        service_id: u64,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the username stored for a service
    Show {
        /// Billing service id
        service_id: u64,
    },
}

/// Prints new credentials once, the way an operator hands them over
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn send_credentials(&self, notice: &CredentialNotice) -> Result<()> {
        println!();
        println!("Account created successfully!");
        println!("-----------------------------");
        println!("URL      : {}", notice.authentik_url);
        println!("Username : {}", notice.username);
        println!("Password : {}", notice.password);
        println!("-----------------------------");
        println!("Save this password, it will not be displayed again.");
        println!();
        Ok(())
    }
}

pub fn execute(cli: &Cli, command: &AccountCommands) -> Result<()> {
    let store = FileStore::new(cli.state_file());

    match command {
        AccountCommands::Create {
            service_id,
            email,
            first_name,
            last_name,
            client_id,
            no_print,
        } => {
            let mut request = base_request(cli, *service_id)?;
            request.email = email.clone();
            request.first_name = first_name.clone();
            request.last_name = last_name.clone();
            request.client_id = *client_id;
            let notifier: &dyn Notifier = if *no_print {
                &LogNotifier
            } else {
                &ConsoleNotifier
            };
            create_account(&store, notifier, &request)
        }
        AccountCommands::Suspend { service_id } => {
            let request = base_request(cli, *service_id)?;
            synchronizer(&store, &ConsoleNotifier).suspend(&request)?;
            println!("Service {} suspended", service_id);
            Ok(())
        }
        AccountCommands::Unsuspend { service_id } => {
            let request = base_request(cli, *service_id)?;
            synchronizer(&store, &ConsoleNotifier).unsuspend(&request)?;
            println!("Service {} unsuspended", service_id);
            Ok(())
        }
        AccountCommands::Terminate { service_id, yes } => {
            terminate_account(cli, &store, *service_id, *yes)
        }
        AccountCommands::Show { service_id } => {
            match store.username(*service_id)? {
                Some(username) => println!("{}", username),
                None => println!(
                    "No username stored for service {} in {}",
                    service_id,
                    store.path().display()
                ),
            }
            Ok(())
        }
    }
}

fn synchronizer<'a>(store: &'a FileStore, notifier: &'a dyn Notifier) -> Synchronizer<'a> {
    Synchronizer::new(store, notifier, Arc::new(TracingAuditLog))
}

fn base_request(cli: &Cli, service_id: u64) -> Result<ProvisioningRequest> {
    Ok(ProvisioningRequest {
        config: cli.server_config()?,
        service_id,
        client_id: None,
        email: String::new(),
        first_name: String::new(),
        last_name: String::new(),
        stored_username: None,
    })
}

fn create_account(
    store: &FileStore,
    notifier: &dyn Notifier,
    request: &ProvisioningRequest,
) -> Result<()> {
    if request.email.trim().is_empty() {
        return Err(anyhow::anyhow!("Email is required"));
    }

    if let Some(existing) = store.username(request.service_id)? {
        return Err(anyhow::anyhow!(
            "Service {} already has account {}; terminate it first",
            request.service_id,
            existing
        ));
    }

    let activated = synchronizer(store, notifier)
        .activate(request)
        .context(format!("Failed to provision service {}", request.service_id))?;
    println!(
        "Service {} -> {} (pk {})",
        request.service_id, activated.username, activated.user_pk
    );
    Ok(())
}

fn terminate_account(cli: &Cli, store: &FileStore, service_id: u64, yes: bool) -> Result<()> {
    let request = base_request(cli, service_id)?;

    if !yes {
        println!("This action is permanent.");
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Are you sure you'd like to delete the account of service {}?",
                service_id
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            return Ok(());
        }
    }

    synchronizer(store, &ConsoleNotifier).terminate(&request)?;
    println!("Service {} terminated", service_id);
    Ok(())
}
