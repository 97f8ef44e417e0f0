// database-intelligence/crates/database-intelligence/src/main.rs

#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use database_intelligence::{config::Config, run_server};

#[cfg(feature = "cli")]
#[derive(Debug, Parser)]
#[command(name = "database-intelligence", about = "Natural language to SQL service", version)]
struct Cli {
    /// Bind host, overrides API_HOST
    #[arg(long, env = "API_HOST")]
    host: Option<String>,

    /// Bind port, overrides API_PORT
    #[arg(long, env = "API_PORT")]
    port: Option<u16>,

    /// Schema index file, overrides INDEX_DB_PATH
    #[arg(long, env = "INDEX_DB_PATH")]
    index_db: Option<std::path::PathBuf>,
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut cfg = Config::from_env()?;
    if let Some(host) = cli.host {
        cfg.api_host = host;
    }
    if let Some(port) = cli.port {
        cfg.api_port = port;
    }
    if let Some(path) = cli.index_db {
        cfg.index_db_path = path;
    }

    run_server(cfg).await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
