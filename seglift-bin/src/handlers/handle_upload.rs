use crate::{
    LayoutArgs,
    errors::SegliftCliError,
    utils::{connect_nodes, open_file, read_upload_option},
};
use seglift_lib::Uploader;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Command line flags, taking precedence over the config file.
pub struct UploadOverrides {
    pub task_size: Option<usize>,
    pub replica: Option<usize>,
    pub no_finality: bool,
    pub routines: Option<usize>,
}

pub async fn handle_upload_command(
    file_path: &PathBuf,
    node_urls: &[String],
    opt_config_path: &Option<PathBuf>,
    overrides: UploadOverrides,
    layout: LayoutArgs,
) -> Result<(), SegliftCliError> {
    let mut option = read_upload_option(opt_config_path)?;
    if let Some(task_size) = overrides.task_size {
        option.task_size = task_size;
    }
    if let Some(replica) = overrides.replica {
        option.expected_replica = replica;
    }
    if let Some(routines) = overrides.routines {
        option.routines = routines;
    }
    if overrides.no_finality {
        option.finality_required = false;
    }

    let file = open_file(file_path, layout)?;
    let uploader = Uploader::new(connect_nodes(node_urls)?, None)?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, stopping once in-flight uploads settle");
            on_ctrl_c.cancel();
        }
    });

    let summary = uploader.upload(&file, &option, &cancel).await?;

    println!("Merkle root: {}", summary.root);
    println!("Transaction sequence number: {}", summary.tx_seq);
    println!("Upload tasks: {}", summary.num_tasks);
    println!(
        "Phases: {}",
        summary.phases.iter().map(|phase| phase.to_string()).collect::<Vec<String>>().join(" -> ")
    );

    Ok(())
}
