use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "mintbridge")]
#[command(about = "Migrate CW721 collections from Sei to Solana compressed NFTs", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $MINTBRIDGE_CONFIG or config/mintbridge.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export, map, validate and mint every token of the given contracts
    Migrate(MigrateArgs),
    /// Continue a cancelled or interrupted job
    Resume(ResumeArgs),
    /// Revert the completed items of a job and cancel it
    Rollback(RollbackArgs),
    /// Probe the source and target endpoint pools
    Health,
    /// Run the HTTP server
    Server(ServerArgs),
}

#[derive(clap::Args, Debug)]
pub struct MigrateArgs {
    /// Source CW721 contract address (repeatable)
    #[arg(long = "contract", required = true)]
    pub contracts: Vec<String>,

    /// Job name
    #[arg(long)]
    pub name: String,

    #[command(flatten)]
    pub rollback: RollbackFlags,
}

#[derive(clap::Args, Debug)]
pub struct ResumeArgs {
    #[arg(long)]
    pub job: Uuid,

    #[command(flatten)]
    pub rollback: RollbackFlags,
}

#[derive(clap::Args, Debug)]
pub struct RollbackFlags {
    /// Roll back completed items when interrupted with Ctrl+C
    #[arg(long)]
    pub rollback_on_cancel: bool,

    /// Roll back when the failure rate exceeds validation.max_failure_rate
    #[arg(long)]
    pub rollback_on_failure_rate: bool,
}

#[derive(clap::Args, Debug)]
pub struct RollbackArgs {
    #[arg(long)]
    pub job: Uuid,

    #[arg(long)]
    pub reason: String,
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}
