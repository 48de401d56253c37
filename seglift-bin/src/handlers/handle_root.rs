use crate::{
    LayoutArgs,
    errors::SegliftCliError,
    utils::open_file,
};
use seglift_lib::{Submission, UploadFile, format_bytes};
use std::path::PathBuf;

pub fn handle_root_command(file_path: &PathBuf, opt_submission_path: &Option<PathBuf>, layout: LayoutArgs) -> Result<(), SegliftCliError> {
    let file = open_file(file_path, layout)?;
    let tree = file.merkle_tree()?;
    let submission = Submission::new(&file, &tree, &[])?;

    println!("Chunk size: {}", format_bytes(file.layout().get_chunk_size()));
    println!("Segment size: {}", format_bytes(file.layout().get_segment_size()));
    println!("Number of chunks: {}", file.num_chunks());
    println!("Number of segments: {}", file.num_segments());
    println!("Merkle root: {}", tree.get_root());
    println!("Sectors: {}", submission.sectors());

    for node in submission.get_nodes() {
        println!("  subtree of height {}: {}", node.height, node.root);
    }

    if let Some(submission_path) = opt_submission_path {
        let bytes = submission.to_bytes()?;
        std::fs::write(submission_path, &bytes).map_err(|e| SegliftCliError::FailedToWriteFile(submission_path.clone(), e.to_string()))?;

        println!("Submission ({}) written to {:?}", format_bytes(bytes.len()), submission_path);
    }

    Ok(())
}
