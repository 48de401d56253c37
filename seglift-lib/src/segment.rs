use crate::{
    errors::SegliftError,
    file::{FileTree, UploadFile},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// One segment of a file, ready to be uploaded to a storage node.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct SegmentWithProof {
    /// Root hash of the file, this segment belongs to.
    pub root: blake3::Hash,
    /// Base64 encoded segment bytes.
    pub data: String,
    /// Segment index, relative to the start of the file.
    pub index: usize,
    /// Inclusion proof of this segment, against `root`.
    pub proof: Vec<blake3::Hash>,
    /// Size of the whole file, in bytes.
    pub file_size: usize,
}

impl SegmentWithProof {
    pub fn decode_data(&self) -> Result<Vec<u8>, SegliftError> {
        STANDARD.decode(&self.data).map_err(|err| SegliftError::SegmentReadFailed {
            segment_index: self.index,
            reason: err.to_string(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct ReadSegment {
    pub segment: SegmentWithProof,
    /// Set when this is the last segment of the file.
    pub all_data_uploaded: bool,
}

/// Reads segment at `segment_index` of `file`, attaching its inclusion proof from `tree`.
///
/// Returns `Ok(None)` when the segment starts beyond the chunk-aligned end of the file.
pub fn read_segment<F: UploadFile + ?Sized>(file: &F, tree: &FileTree, segment_index: usize) -> Result<Option<ReadSegment>, SegliftError> {
    let layout = file.layout();
    let segment_size = layout.get_segment_size();
    let padded_file_size = file.num_chunks() * layout.get_chunk_size();

    let offset = segment_index * segment_size;
    if offset >= padded_file_size {
        return Ok(None);
    }

    let read_failed = |reason: String| SegliftError::SegmentReadFailed { segment_index, reason };

    let mut data = match file.iterate_from(offset, segment_size).next() {
        Some(window) => window.map_err(|err| read_failed(err.to_string()))?,
        None => Vec::new(),
    };

    let expected_len = segment_size.min(file.size().saturating_sub(offset));
    if data.len() < expected_len {
        return Err(read_failed(format!("short read of {}B, expected {}B", data.len(), expected_len)));
    }

    let all_data_uploaded = offset + segment_size >= padded_file_size;
    if all_data_uploaded {
        data.truncate(file.size() - offset);
    }

    let proof = tree.proof(segment_index).map_err(|err| read_failed(err.to_string()))?;

    Ok(Some(ReadSegment {
        segment: SegmentWithProof {
            root: tree.get_root(),
            data: STANDARD.encode(&data),
            index: segment_index,
            proof,
            file_size: file.size(),
        },
        all_data_uploaded,
    }))
}

#[cfg(test)]
mod tests {
    use crate::{
        errors::SegliftError,
        file::{InMemoryFile, UploadFile},
        layout::SegmentLayout,
        segment::read_segment,
    };
    use rand::Rng;

    #[test]
    fn test_read_every_segment_of_file() {
        let layout = SegmentLayout::new(16, 4).expect("Must be able to create layout");
        let data = (0..16 * 4 * 3 + 5).map(|_| rand::rng().random()).collect::<Vec<u8>>();

        let file = InMemoryFile::new(data.clone(), layout).expect("Must be able to create in-memory file");
        let tree = file.merkle_tree().expect("Must be able to build file tree");

        let mut reassembled = Vec::new();
        for segment_index in 0..file.num_segments() {
            let read = read_segment(&file, &tree, segment_index)
                .expect("Must be able to read segment")
                .expect("Segment must exist");

            assert_eq!(read.all_data_uploaded, segment_index + 1 == file.num_segments());
            assert_eq!(read.segment.index, segment_index);
            assert_eq!(read.segment.root, tree.get_root());
            assert_eq!(read.segment.file_size, data.len());
            assert_eq!(read.segment.proof, tree.proof(segment_index).expect("Must be able to generate proof"));

            reassembled.extend(read.segment.decode_data().expect("Must be able to decode segment data"));
        }

        // Final segment is truncated to the exact remaining length.
        assert_eq!(reassembled, data);
        assert!(read_segment(&file, &tree, file.num_segments()).expect("Reading past the end is not an error").is_none());
    }

    #[test]
    fn test_exactly_segment_aligned_file() {
        let layout = SegmentLayout::new(16, 4).expect("Must be able to create layout");
        let file = InMemoryFile::new(vec![7u8; 16 * 4 * 2], layout).expect("Must be able to create in-memory file");
        let tree = file.merkle_tree().expect("Must be able to build file tree");

        let first = read_segment(&file, &tree, 0).expect("Must be able to read segment").expect("Segment must exist");
        let last = read_segment(&file, &tree, 1).expect("Must be able to read segment").expect("Segment must exist");

        assert!(!first.all_data_uploaded);
        assert!(last.all_data_uploaded);
        assert_eq!(last.segment.decode_data().expect("Must be able to decode segment data").len(), 16 * 4);
    }

    struct FailingFile(InMemoryFile);

    impl UploadFile for FailingFile {
        fn size(&self) -> usize {
            self.0.size()
        }

        fn layout(&self) -> SegmentLayout {
            self.0.layout()
        }

        fn read_at(&self, _: usize, _: &mut [u8]) -> Result<usize, SegliftError> {
            Err(SegliftError::FileReadFailed("disk on fire".to_string()))
        }
    }

    #[test]
    fn test_read_error_surfaces_as_segment_read_failure() {
        let layout = SegmentLayout::new(16, 4).expect("Must be able to create layout");
        let healthy = InMemoryFile::new(vec![1u8; 100], layout).expect("Must be able to create in-memory file");
        let tree = healthy.merkle_tree().expect("Must be able to build file tree");

        let failing = FailingFile(healthy);
        assert!(matches!(
            read_segment(&failing, &tree, 0),
            Err(SegliftError::SegmentReadFailed { segment_index: 0, .. })
        ));
    }
}
