//! CLI tool for admin MFA and invitations
//!
//! Talks to the identity service directly for MFA and to a sentinel-auth
//! server's `POST /invite` endpoint for invites.
//!
//! # Usage
//!
//! ```bash
//! export SENTINEL_ACCESS_TOKEN=...
//!
//! # Show MFA status
//! sentinel-admin --config sentinel.toml status
//!
//! # Enroll a TOTP factor (prompts for the first code)
//! sentinel-admin --config sentinel.toml enroll --name laptop
//!
//! # Disable MFA
//! sentinel-admin --config sentinel.toml disable --code 123456
//!
//! # Invite another admin
//! sentinel-admin --config sentinel.toml invite --email new@example.com --code 123456
//! ```

use clap::{Parser, Subcommand};
use sentinel_auth::config::Config;
use sentinel_auth::error::AuthError;
use sentinel_auth::identity::{AccessToken, HttpIdentityProvider, IdentityProvider};
use sentinel_auth::invite::{HttpInviteDispatcher, InvitationGate};
use sentinel_auth::mfa::MfaController;
use sentinel_auth::session::AdminSession;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Code prompts per enrollment before giving up
const MAX_ENROLL_ATTEMPTS: usize = 3;

#[derive(Parser)]
#[command(name = "sentinel-admin")]
#[command(about = "Manage admin MFA and send admin invitations", long_about = None)]
struct Cli {
    /// Configuration file (provider and invite endpoint settings)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Session token of the acting admin
    #[arg(short, long, env = "SENTINEL_ACCESS_TOKEN", hide_env_values = true)]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show MFA status
    Status,
    /// Enroll a TOTP factor
    Enroll {
        /// Label shown in authenticator app factor lists
        #[arg(long)]
        name: Option<String>,
    },
    /// Disable MFA
    Disable {
        /// Factor id (defaults to the active factor)
        #[arg(long)]
        factor: Option<String>,
        /// Current TOTP code
        #[arg(long)]
        code: String,
    },
    /// Invite another admin
    Invite {
        /// Email address to invite
        #[arg(long)]
        email: String,
        /// Current TOTP code
        #[arg(long)]
        code: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    sentinel_auth::logging::init(&config.logging);

    let provider: Arc<dyn IdentityProvider> =
        Arc::new(HttpIdentityProvider::from_config(&config.provider)?);
    let session = AdminSession::load(provider.as_ref(), AccessToken::new(cli.token)).await?;
    let mut controller = MfaController::load(provider.clone(), &session).await?;

    match cli.command {
        Commands::Status => {
            let status = controller.status();
            println!("Admin:       {}", session.user().email);
            println!("MFA enabled: {}", status.is_enabled);
            if let Some(factor) = status.active_factor {
                println!("Factor:      {}", factor.id);
            }
        }
        Commands::Enroll { name } => {
            let enrollment = controller.start_named_enrollment(&session, name).await?;
            println!("Add this account to your authenticator app:");
            println!("  Secret: {}", enrollment.secret);
            println!("  URI:    {}", enrollment.uri);

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut attempts = 0;
            loop {
                attempts += 1;
                let mut stdout = tokio::io::stdout();
                stdout.write_all(b"Enter the 6-digit code: ").await?;
                stdout.flush().await?;

                let code = match lines.next_line().await? {
                    Some(line) => line.trim().to_string(),
                    None => {
                        controller.cancel_enrollment();
                        anyhow::bail!("Enrollment abandoned");
                    }
                };

                match controller
                    .confirm_enrollment(&session, &enrollment.factor_id, &code)
                    .await
                {
                    Ok(factor) => {
                        println!("✅ MFA enabled (factor {})", factor.id);
                        break;
                    }
                    Err(AuthError::InvalidCode(reason)) if attempts < MAX_ENROLL_ATTEMPTS => {
                        eprintln!("Code rejected: {}. Try again.", reason);
                    }
                    Err(e) => {
                        controller.cancel_enrollment();
                        return Err(e.into());
                    }
                }
            }
        }
        Commands::Disable { factor, code } => {
            let factor_id = match factor {
                Some(id) => id,
                None => controller
                    .active_factor()
                    .map(|f| f.id.clone())
                    .ok_or(AuthError::MfaNotEnabled)?,
            };
            controller.disable(&session, &factor_id, &code).await?;
            println!("✅ MFA disabled");
        }
        Commands::Invite { email, code } => {
            let dispatcher = Arc::new(HttpInviteDispatcher::new(config.invite.endpoint_url.clone()));
            let gate = InvitationGate::new(provider.clone(), dispatcher);
            let invitation = gate.send_invite(&controller, &session, &email, &code).await?;
            println!("✅ Invitation sent");
            println!("   Email: {}", invitation.email);
            println!("   User:  {}", invitation.user_id);
        }
    }

    Ok(())
}
