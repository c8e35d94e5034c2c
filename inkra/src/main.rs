//! Inkra server: PDF upload, IP-gated countersigning and audit.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use inkra::api::{self, AppState};
use inkra::config::ServerArgs;
use inkra_core::auth::{self, Hs256Verifier};
use inkra_core::blob::LocalBlobStore;
use inkra_core::store::DocumentStore;
use inkra_core::DocumentService;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "inkra")]
#[command(about = "Document signing service with IP-restricted countersigning")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    server: ServerArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Create the admin account and exit
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store = Arc::new(DocumentStore::open(&cli.server.data_dir)?);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Init => {
            if store.is_initialized()? {
                info!("Application already initialized");
            } else {
                provision_admin(&store, &cli.server)?;
            }
        }
        Commands::Serve => {
            if !store.is_initialized()? {
                warn!("Application is not initialized");
                provision_admin(&store, &cli.server)?;
            }
            serve(store, &cli.server).await?;
        }
    }
    Ok(())
}

/// Create the admin account from configuration, prompting for anything missing.
fn provision_admin(store: &DocumentStore, args: &ServerArgs) -> Result<()> {
    let (email, password) = match (&args.admin_username, &args.admin_password) {
        (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
            (user.clone(), pass.clone())
        }
        _ => (prompt("Admin Username: ")?, prompt("Admin password: ")?),
    };
    if email.is_empty() || password.is_empty() {
        bail!("admin username and password are required");
    }
    auth::ensure_admin(store, &email, &password)?;
    info!("Initialization completed");
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    let mut stdout = io::stdout();
    stdout.write_all(label.as_bytes())?;
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn serve(store: Arc<DocumentStore>, args: &ServerArgs) -> Result<()> {
    let tokens = Arc::new(Hs256Verifier::new(args.jwt_secret()?));

    let blobs = LocalBlobStore::new(&args.docs_dir);
    blobs.prepare().await?;

    let service = Arc::new(DocumentService::new(
        store.clone(),
        Arc::new(blobs),
        args.lifecycle(),
    ));
    let config = args.server();
    if config.trust_proxy_headers {
        info!("Client addresses are taken from X-Forwarded-For / X-Real-IP");
    }
    let state = AppState {
        service,
        store,
        tokens,
        trust_proxy_headers: config.trust_proxy_headers,
    };
    let app = api::router(state, &config)?;

    let addr = args.addr();
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
