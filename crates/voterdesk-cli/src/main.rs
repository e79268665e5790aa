//! voterdesk - terminal client for the voter-record management backend.
//!
//! Every command runs against the same session layer: the stored session is
//! restored at startup, the route guard decides whether the requested screen
//! is reachable, and an unauthorized response ends the session.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use voterdesk_core::api::{ApiClient, UserService, VoterService};
use voterdesk_core::auth::{
    open_store, redirect_for, HistoryNavigator, Route, RouteGuard, SessionManager,
    STORE_PASSPHRASE_ENV,
};
use voterdesk_core::config::Config;
use voterdesk_core::models::VoterRecord;
use voterdesk_core::SessionStatus;

/// Environment variable read instead of prompting for the login password
const PASSWORD_ENV: &str = "VOTERDESK_PASSWORD";

const LOG_FILE_PREFIX: &str = "voterdesk.log";

const USAGE: &str = "\
Usage: voterdesk <command> [args]

Commands:
  login [email]        Sign in and store the session
  logout               Sign out and clear the stored session
  whoami               Show the signed-in user
  users                List staff accounts (admin only)
  search <epic>...     Search voter records by EPIC number
  voter <epic>         Show the full record for one EPIC number
  passwd               Change your password";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and, when a cache directory is available, to a daily
/// rolling file. The returned guard must be held until exit so buffered
/// lines are flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

enum Command {
    Login(Option<String>),
    Logout,
    WhoAmI,
    Users,
    Search(Vec<String>),
    Voter(String),
    Passwd,
}

impl Command {
    fn parse(args: &[String]) -> Result<Command> {
        let Some(name) = args.first() else {
            bail!("{}", USAGE);
        };
        let rest = &args[1..];
        let command = match name.as_str() {
            "login" => Command::Login(rest.first().cloned()),
            "logout" => Command::Logout,
            "whoami" => Command::WhoAmI,
            "users" => Command::Users,
            "search" => {
                if rest.is_empty() {
                    bail!("search needs at least one EPIC number\n\n{}", USAGE);
                }
                Command::Search(rest.to_vec())
            }
            "voter" => match rest.first() {
                Some(epic) => Command::Voter(epic.clone()),
                None => bail!("voter needs an EPIC number\n\n{}", USAGE),
            },
            "passwd" => Command::Passwd,
            "-h" | "--help" | "help" => bail!("{}", USAGE),
            other => bail!("Unknown command: {}\n\n{}", other, USAGE),
        };
        Ok(command)
    }

    /// Screen the command corresponds to; the route guard gates it.
    fn route(&self) -> Route {
        match self {
            Command::Login(_) => Route::Login,
            Command::Logout => Route::LANDING,
            Command::WhoAmI => Route::Profile,
            Command::Users => Route::UserManage,
            Command::Search(_) => Route::Search,
            Command::Voter(_) => Route::VoterList,
            Command::Passwd => Route::ChangePassword,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let mut config = Config::load()?;
    let log_dir = config.cache_dir().ok().filter(|dir| std::fs::create_dir_all(dir).is_ok());
    let _log_guard = init_tracing(log_dir.as_deref());
    info!("voterdesk starting");

    let passphrase = std::env::var(STORE_PASSPHRASE_ENV).ok();
    let store = open_store(&config, passphrase.as_deref())?;

    let navigator = Arc::new(HistoryNavigator::new(command.route()));
    let session = Arc::new(
        SessionManager::new(&config, store)?.with_navigator(navigator.clone()),
    );
    let api = ApiClient::new(&config, session.clone())?;
    let (stop_guard, guard_stopped) = tokio::sync::oneshot::channel::<()>();
    let guard = RouteGuard::new(session.clone(), navigator.clone()).spawn_until(async {
        let _ = guard_stopped.await;
    });

    session.initialize().await;
    let started_authenticated = session.is_authenticated();

    let result = run(&command, &mut config, &session, api).await;

    let expired = started_authenticated
        && session.status() == SessionStatus::Unauthenticated
        && !matches!(command, Command::Logout);
    if expired {
        eprintln!("Your session has expired. Run `voterdesk login` to sign in again.");
    }

    let _ = stop_guard.send(());
    let _ = guard.await;
    info!("voterdesk shutting down");
    result
}

async fn run(
    command: &Command,
    config: &mut Config,
    session: &Arc<SessionManager>,
    api: ApiClient,
) -> Result<()> {
    if let Command::Login(email) = command {
        return login(config, session, email.clone()).await;
    }
    if let Command::Logout = command {
        session.logout().await;
        println!("Signed out.");
        return Ok(());
    }

    if redirect_for(session.status(), &command.route()) == Some(Route::Login) {
        bail!("Not signed in. Run `voterdesk login` first.");
    }

    match command {
        Command::WhoAmI => {
            let user = session.user().context("No user in session")?;
            println!("{} <{}>", user.name, user.email);
            println!("Role: {}", user.role.as_str());
            println!("Id:   {}", user.id);
        }
        Command::Users => {
            let current = session.user();
            if !current.as_ref().is_some_and(|u| u.is_admin()) {
                bail!("Listing users requires an admin account");
            }
            let users = UserService::new(api).list_users().await?;
            for user in users {
                let status = user
                    .status
                    .map(|s| format!("{:?}", s).to_lowercase())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<26} {:<24} {:<32} {:<8} {}",
                    user.id,
                    user.name,
                    user.email,
                    user.role.as_str(),
                    status
                );
            }
        }
        Command::Search(epics) => {
            let records = VoterService::new(api).search(&epics.join(",")).await?;
            if records.is_empty() {
                println!("No voter records found.");
            }
            for record in &records {
                print_summary(record);
            }
        }
        Command::Voter(epic) => {
            let record = VoterService::new(api).voter_details(epic).await?;
            print_details(&record);
        }
        Command::Passwd => {
            let current = rpassword::prompt_password("Current password: ")?;
            let new = rpassword::prompt_password("New password: ")?;
            let confirm = rpassword::prompt_password("Confirm new password: ")?;
            if new != confirm {
                bail!("Passwords do not match");
            }
            UserService::new(api).change_password(&current, &new).await?;
            println!("Password changed.");
        }
        Command::Login(_) | Command::Logout => {}
    }
    Ok(())
}

async fn login(config: &mut Config, session: &SessionManager, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password(format!("Password for {}: ", email))?,
    };

    if !session.login(&email, &password).await {
        let message = session
            .last_error()
            .unwrap_or_else(|| "Login failed".to_string());
        bail!(message);
    }

    if config.last_email.as_deref() != Some(email.as_str()) {
        config.last_email = Some(email);
        if let Err(e) = config.save() {
            warn!("Failed to save config: {}", e);
        }
    }

    if let Some(user) = session.user() {
        println!("Signed in as {} ({})", user.name, user.role.as_str());
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_summary(record: &VoterRecord) {
    println!(
        "{:<12} {:<28} {:>3} {:<2} {}",
        record.epic_no,
        record.name,
        record.age.as_deref().unwrap_or("-"),
        record.gender.as_deref().unwrap_or("-"),
        record.location_display()
    );
}

fn print_details(record: &VoterRecord) {
    let field = |label: &str, value: Option<&str>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            println!("{:<24} {}", label, value);
        }
    };

    field("EPIC", Some(record.epic_no.as_str()));
    field("Name", Some(record.name.as_str()));
    field("Name (regional)", record.name_in_regional_lang.as_deref());
    field("Age", record.age.as_deref());
    field("Gender", record.gender.as_deref());
    field("Relation", record.relation_display().as_deref());
    field("Address", record.address.as_deref());
    field("Location", Some(record.location_display().as_str()));
    field("Assembly constituency", record.assembly_constituency.as_deref());
    field("Parliamentary", record.parliamentary_constituency.as_deref());
    field("Part", record.part_number.as_deref());
    field("Part name", record.part_name.as_deref());
    field("Polling station", record.polling_station.as_deref());
    field("Status", record.status.as_deref());
}
