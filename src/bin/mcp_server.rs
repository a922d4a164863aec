//! NotebookLM takeout MCP Server
//!
//! This binary attaches to (or launches) Chrome showing a NotebookLM notebook
//! and exposes the export tools to MCP clients.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use notebook_takeout::browser::{ConnectionOptions, LaunchOptions};
use notebook_takeout::config::TakeoutConfig;
use notebook_takeout::mcp::TakeoutServer;
use notebook_takeout::session::TakeoutSession;
use notebook_takeout::store::LocalStore;
use rmcp::transport::streamable_http_server::{StreamableHttpService, session::local::LocalSessionManager};
use rmcp::{ServiceExt, transport::stdio};
use std::path::PathBuf;
use std::sync::Arc;

const NOTEBOOK_HOME: &str = "https://notebooklm.google.com/";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Transport {
    /// Standard input/output transport (default)
    Stdio,
    /// HTTP streamable transport
    Http,
}

#[derive(Parser)]
#[command(name = "takeout-mcp")]
#[command(version)]
#[command(about = "NotebookLM export MCP server", long_about = None)]
struct Cli {
    /// Launch browser in headed mode (default: headless)
    #[arg(long, short = 'H')]
    headed: bool,

    /// Path to custom browser executable
    #[arg(long, value_name = "PATH")]
    executable_path: Option<PathBuf>,

    /// WebSocket endpoint URL of a running browser to attach to
    #[arg(long, value_name = "URL")]
    ws_endpoint: Option<String>,

    /// Persistent browser profile directory (keeps the Google sign-in)
    #[arg(long, value_name = "DIR")]
    user_data_dir: Option<PathBuf>,

    /// Where exported files are written (overrides the config file)
    #[arg(long, value_name = "DIR")]
    download_dir: Option<PathBuf>,

    /// Notebook to open after launching
    #[arg(long, value_name = "URL", default_value = NOTEBOOK_HOME)]
    url: String,

    /// JSON file with timing and output settings
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// File holding settings and the capture tally (default: local data dir)
    #[arg(long, value_name = "FILE")]
    state_file: Option<PathBuf>,

    /// Transport type to use
    #[arg(long, short = 't', value_enum, default_value = "stdio")]
    transport: Transport,

    /// Port for HTTP transport (default: 3000)
    #[arg(long, short = 'p', default_value = "3000")]
    port: u16,

    /// HTTP streamable endpoint path (default: /mcp)
    #[arg(long, default_value = "/mcp")]
    http_path: String,
}

fn open_session(cli: &Cli) -> anyhow::Result<TakeoutSession> {
    let mut config = match &cli.config {
        Some(path) => TakeoutConfig::from_file(path).with_context(|| format!("reading {}", path.display()))?,
        None => TakeoutConfig::default(),
    };
    if let Some(dir) = &cli.download_dir {
        config = config.with_download_dir(dir);
    }
    eprintln!("Download directory: {}", config.download_dir.display());

    let session = match &cli.ws_endpoint {
        Some(endpoint) => {
            eprintln!("WebSocket endpoint: {}", endpoint);
            TakeoutSession::connect(ConnectionOptions::new(endpoint.clone()), config)?
        }
        None => {
            let mut options = LaunchOptions::new().headless(!cli.headed).start_url(cli.url.clone());
            if let Some(path) = &cli.executable_path {
                eprintln!("Browser executable: {}", path.display());
                options = options.chrome_path(path.clone());
            }
            if let Some(dir) = &cli.user_data_dir {
                eprintln!("User data directory: {}", dir.display());
                options = options.user_data_dir(dir.clone());
            }
            eprintln!("Browser mode: {}", if cli.headed { "headed" } else { "headless" });
            TakeoutSession::launch(options, config)?
        }
    };

    let state_file = cli.state_file.clone().or_else(LocalStore::default_path);
    let session = match state_file {
        Some(path) => {
            eprintln!("State file: {}", path.display());
            session.with_store(LocalStore::open(&path).with_context(|| format!("loading {}", path.display()))?)
        }
        None => session,
    };
    Ok(session)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    eprintln!("NotebookLM takeout MCP Server v{}", env!("CARGO_PKG_VERSION"));
    let server = TakeoutServer::with_shared(Arc::new(open_session(&cli)?));

    // Route to appropriate transport
    match cli.transport {
        Transport::Stdio => {
            eprintln!("Transport: stdio");
            eprintln!("Ready to accept MCP connections via stdio");
            let service = server.serve(stdio()).await?;
            let quit_reason = service.waiting().await?;
            eprintln!("Server quit with reason: {:?}", quit_reason);
        }
        Transport::Http => {
            eprintln!("Transport: HTTP streamable");
            eprintln!("Port: {}", cli.port);
            eprintln!("HTTP path: {}", cli.http_path);

            let bind_addr = format!("127.0.0.1:{}", cli.port);

            // Every MCP session talks to the same browser tab
            let service_factory = move || Ok::<_, std::io::Error>(server.clone());

            let http_service = StreamableHttpService::new(
                service_factory,
                LocalSessionManager::default().into(),
                Default::default(),
            );

            let router = axum::Router::new().nest_service(&cli.http_path, http_service);

            eprintln!("Ready to accept MCP connections at http://{}{}", bind_addr, cli.http_path);

            let listener = tokio::net::TcpListener::bind(bind_addr).await?;
            axum::serve(listener, router).await?;
        }
    }

    Ok(())
}
