use bar_tab_service::config::Config;
use clap::{Parser, Subcommand};

pub mod app;

#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the gRPC API.
    Rpc {
        /// Keep state in process memory instead of Postgres.
        #[arg(long)]
        in_memory: bool,
    },
    /// Relay the outbox to Kafka.
    Producer,
    /// Replicate the menu catalog from Kafka.
    Consumer,
}

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    match &cli.command {
        Commands::Rpc { in_memory } => app::rpc::main(&config, *in_memory).await,
        Commands::Producer => app::producer::main(&config),
        Commands::Consumer => app::consumer::main(&config),
    }
}
