//! Dashboard Session - Entry Point
//!
//! Commands:
//! - status: bootstrap from stored credentials and print the session
//! - login: authenticate with DASHBOARD_EMAIL / DASHBOARD_PASSWORD
//! - logout: end the stored session
//! - check <path>: print the access decision for a dashboard route
//! - watch: keep the session alive (refresh + heartbeat) until Ctrl-C

use anyhow::Context;
use dashboard_session::{
    evaluate_path, Config, FileCredentialStore, HttpTransport, LogNotifier, RouteTable,
    SessionConfig, SessionManager, SessionSnapshot,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn print_help() {
    println!("Dashboard Session v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: dashboard-session [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  status           Restore the stored session and print it");
    println!("  login [EMAIL]    Sign in (password from DASHBOARD_PASSWORD)");
    println!("  logout           Sign out and clear stored credentials");
    println!("  check <PATH>     Print the access decision for a route");
    println!("  watch            Keep the session alive until Ctrl-C");
    println!();
    println!("Options:");
    println!("  --json, -j       Log as JSON to stderr");
    println!("  --help, -h       Show this help");
    println!();
    println!("Environment variables:");
    println!("  DASHBOARD_API_URL                  Backend URL (default: http://localhost:8080)");
    println!("  DASHBOARD_SESSION_FILE             Credential file path");
    println!("  DASHBOARD_REQUEST_TIMEOUT_SECS     Remote call timeout (default: 5)");
    println!("  DASHBOARD_REFRESH_INTERVAL_SECS    Proactive refresh period (default: 600)");
    println!("  DASHBOARD_HEARTBEAT_INTERVAL_SECS  Heartbeat period (default: 120)");
    println!("  DASHBOARD_KEEP_CREDENTIALS_OFFLINE Keep credentials when backend is down");
    println!("  DASHBOARD_EMAIL                    Login email");
    println!("  DASHBOARD_PASSWORD                 Login password");
}

fn snapshot_json(snapshot: &SessionSnapshot) -> serde_json::Value {
    json!({
        "status": snapshot.status.as_str(),
        "loading": snapshot.loading,
        "user": snapshot.status.identity(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().skip(1).collect();
    let json_logs = args.iter().any(|a| a == "--json" || a == "-j");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let positional: Vec<&str> = args
        .iter()
        .filter(|a| !a.starts_with('-'))
        .map(String::as_str)
        .collect();

    if help_mode || positional.is_empty() {
        print_help();
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config = Config::from_env()?;
    let store = FileCredentialStore::open(&config.session_file)
        .with_context(|| format!("Failed to open {}", config.session_file.display()))?;
    let transport = HttpTransport::from_config(&config)?;

    if !transport.check_connection().await {
        warn!("Backend at {} is not reachable", transport.base_url());
    }

    let session = SessionManager::new(
        Arc::new(transport),
        Arc::new(store),
        Arc::new(LogNotifier),
        SessionConfig::from_config(&config),
    );

    match positional[0] {
        "status" => {
            session.bootstrap().await;
            println!("{}", serde_json::to_string_pretty(&snapshot_json(&session.snapshot()))?);
        }
        "login" => {
            let email = positional
                .get(1)
                .map(|s| s.to_string())
                .or_else(|| config.email.clone())
                .context("No email given (argument or DASHBOARD_EMAIL)")?;
            let password = config
                .password
                .clone()
                .context("DASHBOARD_PASSWORD is not set")?;

            let identity = session.login(&email, &password).await?;
            println!("{}", serde_json::to_string_pretty(&identity)?);
        }
        "logout" => {
            session.bootstrap().await;
            session.logout(true).await;
        }
        "check" => {
            let path = positional.get(1).context("check needs a route path")?;
            session.bootstrap().await;

            let decision = evaluate_path(&RouteTable::dashboard(), &session.snapshot(), path);
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        "watch" => {
            session.bootstrap().await;

            if !session.is_authenticated() {
                if let (Some(email), Some(password)) = (&config.email, &config.password) {
                    session.login(email, password).await?;
                }
            }

            let mut changes = session.subscribe();
            info!(status = session.status().as_str(), "Watching session, Ctrl-C to stop");

            loop {
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = changes.borrow_and_update().clone();
                        info!(session = %snapshot_json(&snapshot), "Session changed");
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutting down");
                        break;
                    }
                }
            }

            session.shutdown();
        }
        other => {
            print_help();
            anyhow::bail!("Unknown command: {}", other);
        }
    }

    Ok(())
}
