mod errors;
mod handlers;
mod utils;

use clap::{Args, Parser, Subcommand};
use seglift_lib::{DEFAULT_CHUNK_SIZE, DEFAULT_SEGMENT_MAX_CHUNKS};
use std::{path::PathBuf, process::exit};

#[derive(Parser)]
#[command(name = "seglift", version, about, long_about = None)]
struct SegliftCLI {
    #[command(subcommand)]
    command: SegliftCommand,
}

/// Geometry of chunks and segments, must match the storage network's.
#[derive(Args, Clone, Copy)]
pub struct LayoutArgs {
    /// Size of a chunk, in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// Maximum number of chunks in a segment
    #[arg(long, default_value_t = DEFAULT_SEGMENT_MAX_CHUNKS)]
    segment_chunks: usize,
}

#[derive(Subcommand)]
enum SegliftCommand {
    /// Builds Merkle tree of a file, printing its root and the shape of its submission
    Root {
        /// Path of source file
        #[arg(short)]
        file_path: PathBuf,
        /// Optional path to write bincode encoded submission to
        #[arg(short)]
        opt_submission_path: Option<PathBuf>,
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Prints how segments of an already committed file would be spread over storage nodes
    Plan {
        /// Path of source file
        #[arg(short)]
        file_path: PathBuf,
        /// JSON-RPC endpoint of a storage node, can be repeated
        #[arg(long = "node", required = true)]
        node_urls: Vec<String>,
        /// Number of segments per upload task
        #[arg(long)]
        task_size: Option<usize>,
        /// Minimum number of replicas, storage nodes must hold together
        #[arg(long)]
        replica: Option<usize>,
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Uploads segments of an already committed file to storage nodes
    Upload {
        /// Path of source file
        #[arg(short)]
        file_path: PathBuf,
        /// JSON-RPC endpoint of a storage node, can be repeated
        #[arg(long = "node", required = true)]
        node_urls: Vec<String>,
        /// Optional JSON file holding upload options
        #[arg(long = "config")]
        opt_config_path: Option<PathBuf>,
        /// Number of segments per upload task
        #[arg(long)]
        task_size: Option<usize>,
        /// Minimum number of replicas, storage nodes must hold together
        #[arg(long)]
        replica: Option<usize>,
        /// Don't wait for storage nodes to finalize the file
        #[arg(long)]
        no_finality: bool,
        /// Maximum number of upload tasks in flight
        #[arg(long)]
        routines: Option<usize>,
        #[command(flatten)]
        layout: LayoutArgs,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = SegliftCLI::parse();
    let result = match cli.command {
        SegliftCommand::Root {
            file_path,
            opt_submission_path,
            layout,
        } => handlers::handle_root_command(&file_path, &opt_submission_path, layout),
        SegliftCommand::Plan {
            file_path,
            node_urls,
            task_size,
            replica,
            layout,
        } => handlers::handle_plan_command(&file_path, &node_urls, task_size, replica, layout).await,
        SegliftCommand::Upload {
            file_path,
            node_urls,
            opt_config_path,
            task_size,
            replica,
            no_finality,
            routines,
            layout,
        } => {
            let overrides = handlers::UploadOverrides {
                task_size,
                replica,
                no_finality,
                routines,
            };
            handlers::handle_upload_command(&file_path, &node_urls, &opt_config_path, overrides, layout).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        exit(1);
    }
}
