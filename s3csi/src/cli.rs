use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "s3csi", version, about = "S3 CSI node plugin")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the node plugin with config file
    Start {
        #[arg(short, long)]
        config: PathBuf,
        /// Override the listen address from the config file
        #[arg(long)]
        listen: Option<SocketAddr>,
        /// Override the node id from the config file
        #[arg(long)]
        node_id: Option<String>,
    },
}
