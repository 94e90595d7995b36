use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use authdash_client::protocol::RegisterRequest;
use authdash_client::{
    Access, AuthState, Config, FileStorage, LogNavigator, Role, Route, SessionManager, User,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "authdash", version, about = "Session client for the authdash API")]
struct Cli {
    /// Backend base URL (overrides API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session store file (overrides SESSION_STORE_PATH)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and persist the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTHDASH_PASSWORD", hide_env_values = true)]
        password: String,
        /// Expect an admin account and land on the admin dashboard
        #[arg(long)]
        admin: bool,
    },
    /// Create an account and persist the session
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTHDASH_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// Show the restored session
    Whoami,
    /// Show the admin dashboard (admins only)
    Dashboard,
    /// Create another admin account (admins only)
    RegisterAdmin {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTHDASH_NEW_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// Forget the stored session
    Logout,
}

#[derive(Serialize)]
struct WhoamiResponse {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_expired: Option<bool>,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Admin-only commands go through the same guard a view layer would use
fn require(manager: &SessionManager, route: Route) -> anyhow::Result<()> {
    match manager.authorize(route) {
        Access::Granted => Ok(()),
        Access::Forbidden => bail!("{} requires an admin account", route),
        Access::Redirect(_) | Access::Pending => bail!("not logged in; run `authdash login` first"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (stderr, so stdout stays machine-readable)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authdash=info,authdash_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration from environment, then apply flags
    let mut config = Config::from_env();
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }
    if let Some(path) = cli.store {
        config.storage.path = path;
    }
    debug!(
        "Loaded configuration: api={}, store={:?}, idle_timeout={:?}",
        config.api.base_url, config.storage.path, config.session.idle_timeout
    );

    let storage = FileStorage::open(&config.storage.path)
        .with_context(|| format!("failed to open session store {:?}", config.storage.path))?;
    let manager = SessionManager::new(&config, Arc::new(storage), Arc::new(LogNavigator))?;
    let state = manager.initialize().await;
    debug!("Initial session state: {:?}", state);

    match cli.command {
        Command::Login {
            email,
            password,
            admin,
        } => {
            let hint = admin.then_some(Role::Admin);
            let user = manager.login(&email, &password, hint).await?;
            print_json(&user)?;
        }
        Command::Register {
            email,
            password,
            first_name,
            last_name,
        } => {
            let user = manager
                .register(&email, &password, &first_name, &last_name)
                .await?;
            print_json(&user)?;
        }
        Command::Whoami => {
            let user = match state {
                AuthState::Authenticated(user) => Some(user),
                _ => None,
            };
            let claims = manager.token_claims();
            let now = Utc::now();
            print_json(&WhoamiResponse {
                authenticated: user.is_some(),
                name: user.as_ref().map(User::display_name),
                user,
                token_expires_at: claims
                    .as_ref()
                    .and_then(|claims| claims.expires_at())
                    .map(|at| at.to_rfc3339()),
                token_expired: claims.map(|claims| claims.is_expired_at(now)),
            })?;
        }
        Command::Dashboard => {
            require(&manager, Route::Admin)?;
            let dashboard = manager.gateway().admin_dashboard().await?;
            print_json(&dashboard)?;
        }
        Command::RegisterAdmin {
            email,
            password,
            first_name,
            last_name,
        } => {
            require(&manager, Route::AdminRegister)?;
            let created = manager
                .gateway()
                .register_admin(&RegisterRequest {
                    email,
                    password,
                    first_name,
                    last_name,
                })
                .await?;
            info!("Registered admin {}", created.email);
            print_json(&created)?;
        }
        Command::Logout => {
            manager.logout();
            info!("Session cleared");
        }
    }

    Ok(())
}
