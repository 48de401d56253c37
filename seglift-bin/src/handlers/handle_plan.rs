use crate::{
    LayoutArgs,
    errors::SegliftCliError,
    utils::{connect_nodes, open_file},
};
use seglift_lib::{NodeTarget, SegliftError, UploadFile, UploadOption, Uploader, plan_tasks};
use std::path::PathBuf;

pub async fn handle_plan_command(
    file_path: &PathBuf,
    node_urls: &[String],
    task_size: Option<usize>,
    replica: Option<usize>,
    layout: LayoutArgs,
) -> Result<(), SegliftCliError> {
    let file = open_file(file_path, layout)?;
    let tree = file.merkle_tree()?;
    println!("Merkle root: {}", tree.get_root());

    let uploader = Uploader::new(connect_nodes(node_urls)?, None)?;
    let entry = uploader
        .find_existing_file_info(tree.get_root())
        .await
        .ok_or_else(|| SegliftCliError::FileNotCommitted(tree.get_root().to_string()))?;
    println!("Committed with tx_seq {}, starting at chunk {}", entry.tx_seq, entry.start_entry_index);

    let mut targets = Vec::with_capacity(node_urls.len());
    for node in uploader.get_nodes() {
        let shard = node.get_shard_config().await.map_err(|source| SegliftError::Node {
            url: node.url().to_string(),
            source,
        })?;
        let already_finalized = match node.get_file_info(tree.get_root(), true).await {
            Ok(node_entry) => node_entry.is_some_and(|node_entry| node_entry.finalized),
            Err(e) => {
                log::warn!("failed to query file info from {}: {}", node.url(), e);
                false
            }
        };

        println!(
            "{}: shard {}/{}{}",
            node.url(),
            shard.shard_id,
            shard.num_shard,
            if already_finalized { ", already finalized" } else { "" }
        );
        targets.push(NodeTarget { shard, already_finalized });
    }

    let defaults = UploadOption::default();
    let tasks = plan_tasks(
        &targets,
        &entry,
        &file.layout(),
        task_size.unwrap_or(defaults.task_size),
        replica.unwrap_or(defaults.expected_replica),
    )?;

    println!("Number of tasks: {}", tasks.len());
    for task in &tasks {
        let segments = task.segment_indices().map(|index| index.to_string()).collect::<Vec<String>>();
        println!("  {} <- segments [{}]", uploader.get_nodes()[task.node_index].url(), segments.join(", "));
    }

    Ok(())
}
