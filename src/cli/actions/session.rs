use crate::session::{
    AuthScheme, FileTokenStore, HttpExchange, Identity, RegisterPolicy, SessionContext,
    SessionReconciler, TokenStore, TracingNavigator,
};
use anyhow::{Context, Result};
use std::{path::PathBuf, time::Duration};
use tracing::{debug, warn};

pub use crate::cli::commands::session::Operation;

#[derive(Debug)]
pub struct Args {
    pub backend_url: String,
    pub token_file: Option<PathBuf>,
    pub auth_scheme: AuthScheme,
    pub register_policy: RegisterPolicy,
    pub timeout: Duration,
    pub operation: Operation,
}

/// Execute a session operation against the configured exchange.
/// # Errors
/// Returns an error if the client cannot be built or the operation fails;
/// login and register failures carry the user-facing message.
pub async fn execute(args: Args) -> Result<()> {
    let exchange = HttpExchange::new(&args.backend_url, args.auth_scheme, args.timeout)
        .context("Failed to build credential exchange client")?;
    let store = FileTokenStore::new(args.token_file.unwrap_or_else(FileTokenStore::default_path));
    debug!("Token file: {}", store.path().display());

    let reconciler = SessionReconciler::new(exchange, store, TracingNavigator)
        .with_register_policy(args.register_policy);

    match args.operation {
        Operation::Status => {
            let mut context = SessionContext::start(reconciler);
            context.ready().await;
            print_identity(&context.identity())?;
        }
        Operation::Login {
            credentials,
            redirect,
        } => {
            reconciler.login_with_redirect(credentials, redirect).await?;
            print_identity(&reconciler.identity())?;
        }
        Operation::Register(registration) => {
            reconciler.register(registration).await?;
            println!("Registered.");
            if reconciler.identity().is_authenticated() {
                print_identity(&reconciler.identity())?;
            }
        }
        Operation::Logout => {
            reconciler.logout();
            if reconciler.store().load().is_some() {
                warn!(
                    "Token file could not be removed: {}",
                    reconciler.store().path().display()
                );
            }
            println!("Logged out.");
        }
    }

    Ok(())
}

fn print_identity(identity: &Identity) -> Result<()> {
    match identity.profile() {
        Some(profile) => {
            let json = serde_json::to_string_pretty(profile.as_value())?;
            println!("{json}");
        }
        None => println!("Not logged in."),
    }
    Ok(())
}
