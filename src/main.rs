//! LearnHub CLI - Session management for the LearnHub learning platform
//!
//! Authenticates against the LearnHub API, keeps the session fresh via
//! silent token refresh, and exposes the session state for inspection.

use std::sync::Arc;

use console::style;
use dialoguer::{Input, Password};

use learnhub_cli::api::{ApiEnvelope, LoginPayload, LoginRequest};
use learnhub_cli::cli::{Cli, Commands};
use learnhub_cli::interceptor::ApiRequest;
use learnhub_cli::session::{ConsoleNav, SessionController};
use learnhub_cli::storage::{FileStore, SessionStore};
use learnhub_cli::token::inspect;
use learnhub_cli::{AuthError, Config, Result};

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    std::process::exit(exit_code);
}

/// Main application entry point
async fn run() -> i32 {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    match execute(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {err}");
            err.exit_code()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "learnhub_cli=debug" } else { "learnhub_cli=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Execute the requested command
async fn execute(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    if let Some(profile) = cli.profile {
        config.profile = profile;
    }
    config.validate()?;

    let store = Arc::new(FileStore::for_profile(&config.profile)?);
    let controller = SessionController::new(&config, store.clone(), Arc::new(ConsoleNav));

    match cli.command {
        Commands::Login { email, instructor } => {
            handle_login(&controller, email, instructor).await
        }
        Commands::Logout => handle_logout(&controller),
        Commands::Status => handle_status(&controller, store.as_ref()).await,
        Commands::Refresh => handle_refresh(&controller).await,
        Commands::Version => handle_version(),
    }
}

/// Handle login command
async fn handle_login(
    controller: &SessionController,
    email: Option<String>,
    instructor: bool,
) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => Input::<String>::new()
            .with_prompt("Email")
            .interact_text()
            .map_err(|e| AuthError::InvalidArgument(format!("could not read email: {e}")))?,
    };
    if email.is_empty() {
        return Err(AuthError::InvalidArgument("email cannot be empty".to_string()));
    }

    let password = Password::new()
        .with_prompt("Password")
        .interact()
        .map_err(|e| AuthError::InvalidArgument(format!("could not read password: {e}")))?;

    let path = if instructor {
        "/auth/instructor-login"
    } else {
        "/auth/login"
    };

    let request = ApiRequest::post_json(path, &LoginRequest { email, password })?;
    let response = controller.interceptor().execute(request).await?;
    let status = response.status().as_u16();

    let envelope: ApiEnvelope<LoginPayload> = response
        .json()
        .await
        .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
    let (identity, tokens) = envelope.into_data(status)?.into_parts();

    let tokenless = tokens.is_none();
    let name = identity.name.clone();
    let role = identity.role;
    controller.login(identity, tokens)?;

    println!("{} Logged in as {} ({:?})", style("✓").green(), style(name).bold(), role);
    if tokenless {
        println!("  (Temporary-password session: no tokens issued)");
    }
    Ok(())
}

/// Handle logout command
fn handle_logout(controller: &SessionController) -> Result<()> {
    controller.logout();
    println!("{} Logged out", style("✓").green());
    Ok(())
}

/// Handle status command
async fn handle_status(controller: &SessionController, store: &FileStore) -> Result<()> {
    println!("{}", style("=== LearnHub Session ===\n").bold().cyan());

    // Same validation path the application runs on load
    controller.startup_check("/dashboard").await?;

    let session = controller.session();
    if !session.authenticated {
        println!("Not logged in. Run 'learnhub login' to sign in.");
        return Ok(());
    }

    if let Some(user) = &session.current_user {
        println!("{} {}", style("Name:").bold(), user.name);
        println!("{} {:?}", style("Role:").bold(), user.role);
        if let Some(instructor) = &user.assigned_instructor {
            println!("{} {}", style("Instructor:").bold(), instructor);
        }
    }

    if session.tokenless {
        println!("{} tokenless (temporary-password session)", style("Tokens:").bold());
        return Ok(());
    }

    let tokens = store.read_tokens();
    if let Some(access) = tokens.access_token.as_deref() {
        let remaining = inspect::remaining_seconds(access);
        let due = if inspect::is_refresh_due(access) {
            " (refresh due)"
        } else {
            ""
        };
        println!("{} valid for {remaining}s{due}", style("Access token:").bold());
    }
    if let Some(refresh) = tokens.refresh_token.as_deref() {
        println!(
            "{} valid for {}s",
            style("Refresh token:").bold(),
            inspect::remaining_seconds(refresh)
        );
    }

    Ok(())
}

/// Handle refresh command
async fn handle_refresh(controller: &SessionController) -> Result<()> {
    let pair = controller.coordinator().refresh().await?;
    let remaining = inspect::remaining_seconds(&pair.access_token);
    println!(
        "{} Tokens refreshed (access token valid for {remaining}s)",
        style("✓").green()
    );
    Ok(())
}

/// Handle version command
fn handle_version() -> Result<()> {
    println!("LearnHub CLI v{}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
