//! relational CLI - inspect and check configured connections
//!
//! Connections are read from `TMD_DATABASE_<NAME>_*` environment keys.
//!
//! Usage:
//!   relational config <NAME>           Show the resolved settings
//!   relational dsn <NAME>              Print the DSN with the password masked
//!   relational dsn <NAME> --reveal     Print the DSN as used
//!   relational ping <NAME>             Connect and run a health check
//!   relational --log-level debug ...   Change log verbosity

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use relational::{Connection, ConnectionConfig};

#[derive(Parser)]
#[command(name = "relational")]
#[command(about = "Check relational database connections", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the settings resolved for a connection
    Config {
        /// Connection name, e.g. MAIN for TMD_DATABASE_MAIN_*
        name: String,
    },
    /// Print the DSN of a connection
    Dsn {
        /// Connection name
        name: String,

        /// Print the password instead of masking it
        #[arg(long)]
        reveal: bool,
    },
    /// Open a connection and run a health check
    Ping {
        /// Connection name
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Config { name } => run_config(&name)?,
        Commands::Dsn { name, reveal } => run_dsn(&name, reveal)?,
        Commands::Ping { name } => {
            let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
            rt.block_on(run_ping(&name))?;
        }
    }

    Ok(())
}

fn load(name: &str) -> Result<ConnectionConfig> {
    let config = ConnectionConfig::from_env(name)
        .with_context(|| format!("Failed to load connection {}", name))?;
    debug!(
        connection = %config.name,
        host = %config.host,
        port = config.port,
        database = %config.database,
        "Resolved connection settings"
    );
    Ok(config)
}

fn run_config(name: &str) -> Result<()> {
    let config = load(name)?;

    println!("connection:      {}", config.name);
    println!("type:            {}", config.database_type);
    println!("host:            {}", config.host);
    println!("port:            {}", config.port);
    println!("database:        {}", config.database);
    println!("user:            {}", config.user);
    println!("ssl mode:        {}", config.ssl_mode);
    println!(
        "pool:            {}..{} connections, {}s connect timeout, {} retries",
        config.pool.min_connections,
        config.pool.max_connections,
        config.pool.connect_timeout,
        config.pool.retry.max_retries
    );

    Ok(())
}

fn run_dsn(name: &str, reveal: bool) -> Result<()> {
    let config = load(name)?;
    if reveal {
        println!("{}", config.dsn());
    } else {
        println!("{}", config.redacted_dsn());
    }
    Ok(())
}

async fn run_ping(name: &str) -> Result<()> {
    let config = load(name)?;
    info!(connection = %config.name, dsn = %config.redacted_dsn(), "Connecting");
    let connection = Connection::open(&config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.redacted_dsn()))?;

    connection.ping().await.context("Health check failed")?;
    info!(connection = %config.name, "Health check passed");
    connection.close().await?;

    println!("{}: ok ({})", name, config.redacted_dsn());
    Ok(())
}

fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}
