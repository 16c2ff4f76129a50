//! rxdesk CLI - command-line client for the pharmacy admin API
//!
//! Signs in, keeps the session on disk between runs and issues authenticated
//! requests that refresh the access token when the backend rejects it.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rxdesk_core::{
    default_config_path, init_logging, log_operation_error, log_operation_start,
    log_operation_success, RxdeskConfig,
};
use rxdesk_session::{
    build_store, seconds_until_expiry, ApiClient, ApiRequest, Credentials, ReqwestTransport,
    SessionManager,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const PASSWORD_ENV: &str = "RXDESK_PASSWORD";

#[derive(Parser)]
#[command(name = "rxdesk")]
#[command(about = "Command-line client for the rxdesk pharmacy admin API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: String,

        /// Password; read from RXDESK_PASSWORD or stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show the stored session
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Exchange the refresh token for a new access token
    Refresh,

    /// GET a path with the stored session and print the response body
    Get {
        /// Path relative to the API base URL
        path: String,

        /// Query parameter in key=value format, repeatable
        #[arg(short, long = "query")]
        query: Vec<String>,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref())?;
    config.apply_env_overrides();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    init_logging(&config.logging).context("Failed to initialize logging")?;
    info!("Starting rxdesk CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Config {
            show,
            init,
            validate,
        } => handle_config(show, init, validate, &config),
        Commands::Login { username, password } => {
            let session = build_session(&config)?;
            handle_login(&session, username, password).await
        }
        Commands::Logout => {
            let session = build_session(&config)?;
            session.logout();
            println!("Signed out");
            Ok(())
        }
        Commands::Status { json } => {
            let session = build_session(&config)?;
            handle_status(&session, json)
        }
        Commands::Refresh => {
            let session = build_session(&config)?;
            handle_refresh(&session).await
        }
        Commands::Get { path, query } => {
            let session = build_session(&config)?;
            handle_get(session, path, query).await
        }
    }
}

fn load_config(config_path: Option<&PathBuf>) -> anyhow::Result<RxdeskConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from {:?}", path);
        return Ok(RxdeskConfig::from_file(path)?);
    }

    let default_paths = [
        default_config_path(),
        dirs::home_dir().map(|d| d.join(".rxdesk").join("config.toml")),
        Some(PathBuf::from("rxdesk.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            info!("Loading configuration from {:?}", path);
            return Ok(RxdeskConfig::from_file(path)?);
        }
    }

    Ok(RxdeskConfig::default())
}

fn build_session(config: &RxdeskConfig) -> anyhow::Result<Arc<SessionManager>> {
    config.validate().map_err(|e| {
        e.log();
        e
    })?;

    let store = build_store(&config.storage)?;
    let transport = Arc::new(ReqwestTransport::new(&config.api)?);
    let navigator = |route: &str| {
        eprintln!("Session ended ({route}); run `rxdesk login` to sign in again");
    };

    let session = Arc::new(
        SessionManager::new(config.auth.clone(), store, transport)
            .with_navigator(Arc::new(navigator)),
    );
    session.init();
    Ok(session)
}

async fn handle_login(
    session: &SessionManager,
    username: String,
    password: Option<String>,
) -> anyhow::Result<()> {
    log_operation_start!("login", username = %username);

    let password = match password.or_else(|| std::env::var(PASSWORD_ENV).ok()) {
        Some(password) => password,
        None => read_password()?,
    };

    let login = session
        .login(&Credentials::new(username, password))
        .await
        .map_err(|e| {
            log_operation_error!("login", e);
            e
        })?;

    log_operation_success!("login", role = login.user.role);
    println!(
        "Signed in as {} (role {})",
        login.user.role_name, login.user.role
    );
    if !login.user.is_active {
        println!("Warning: this account is deactivated");
    }
    Ok(())
}

fn read_password() -> anyhow::Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("No password given");
    }
    Ok(password)
}

fn handle_status(session: &SessionManager, json: bool) -> anyhow::Result<()> {
    let snapshot = session.snapshot();
    let expires_in = session
        .access_token()
        .as_deref()
        .and_then(seconds_until_expiry);

    if json {
        let mut value = serde_json::to_value(&snapshot)?;
        value["status"] = serde_json::to_value(session.status())?;
        value["access_expires_in"] = serde_json::json!(expires_in);
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Status:        {}", session.status());
    if !snapshot.is_authenticated {
        return Ok(());
    }

    match (&snapshot.role_name, snapshot.role_id) {
        (Some(name), Some(id)) => println!("Role:          {} ({})", name, id),
        _ => println!("Role:          unknown"),
    }
    match snapshot.is_active {
        Some(active) => println!("Active:        {}", active),
        None => println!("Active:        unknown"),
    }
    match expires_in {
        Some(secs) if secs > 0 => println!("Access token:  expires in {}s", secs),
        Some(_) => println!("Access token:  expired"),
        None => println!("Access token:  unreadable"),
    }
    Ok(())
}

async fn handle_refresh(session: &Arc<SessionManager>) -> anyhow::Result<()> {
    log_operation_start!("refresh");

    session.refresh_access_token().await.map_err(|e| {
        log_operation_error!("refresh", e);
        e
    })?;

    log_operation_success!("refresh");
    println!("Access token refreshed");
    Ok(())
}

async fn handle_get(
    session: Arc<SessionManager>,
    path: String,
    query: Vec<String>,
) -> anyhow::Result<()> {
    let mut request = ApiRequest::get(&path);
    for pair in &query {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid query parameter '{}'. Use key=value format", pair);
        };
        request = request.query(key, value);
    }

    log_operation_start!("get", path = %path);
    let client = ApiClient::new(session);
    let response = client.execute(request).await.map_err(|e| {
        log_operation_error!("get", e, path = %path);
        e
    })?;
    log_operation_success!("get", path = %path, status = response.status);

    match response.json::<serde_json::Value>() {
        Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        Err(_) => println!("{}", response.text()),
    }
    Ok(())
}

fn handle_config(show: bool, init: bool, validate: bool, config: &RxdeskConfig) -> anyhow::Result<()> {
    if init {
        let Some(config_path) = default_config_path() else {
            bail!("Could not determine a configuration directory");
        };
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        RxdeskConfig::default().save_to_file(&config_path)?;
        println!("Configuration initialized at: {:?}", config_path);
    }

    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    if validate {
        match config.validate() {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => {
                e.log();
                println!("Configuration validation failed: {}", e);
                return Err(e.into());
            }
        }
    }

    if !(show || init || validate) {
        println!("Nothing to do; pass --show, --init or --validate");
    }
    Ok(())
}
