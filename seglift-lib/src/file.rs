use crate::{
    consts::SEGLIFT_BINCODE_CONFIG,
    errors::SegliftError,
    layout::SegmentLayout,
    merkle_tree::MerkleTree,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{Read, Seek, SeekFrom},
    ops::Range,
    path::Path,
    sync::Mutex,
};

/// A byte source which can be committed to and uploaded into the storage network.
///
/// Implementors only need to tell their size and geometry, and serve positional reads.
/// Everything else, including the Merkle commitment, is derived from those.
pub trait UploadFile: Sync {
    /// Size of the file, in bytes.
    fn size(&self) -> usize;

    fn layout(&self) -> SegmentLayout;

    /// Reads bytes starting at `offset` into `buf`, returning how many were read.
    /// Fewer than `buf.len()` bytes are returned only when end of file is reached.
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, SegliftError>;

    fn num_chunks(&self) -> usize {
        self.layout().num_chunks(self.size())
    }

    fn num_segments(&self) -> usize {
        self.layout().num_segments(self.size())
    }

    /// Lazily iterates over the file in windows of `window_size` bytes, starting at byte `offset`.
    /// Last window may be shorter.
    fn iterate_from(&self, offset: usize, window_size: usize) -> WindowIter<'_, Self> {
        WindowIter {
            file: self,
            offset,
            window_size,
            done: window_size == 0,
        }
    }

    /// Builds the Merkle tree over all segments of the file.
    fn merkle_tree(&self) -> Result<FileTree, SegliftError> {
        FileTree::new(self)
    }

    /// Prepares the commitment to be submitted to the ledger, describing the shape of this file.
    fn create_submission(&self, tags: &[u8]) -> Result<Submission, SegliftError> {
        Submission::new(self, &self.merkle_tree()?, tags)
    }
}

pub struct WindowIter<'a, F: UploadFile + ?Sized> {
    file: &'a F,
    offset: usize,
    window_size: usize,
    done: bool,
}

impl<F: UploadFile + ?Sized> Iterator for WindowIter<'_, F> {
    type Item = Result<Vec<u8>, SegliftError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.file.size() {
            return None;
        }

        let mut window = vec![0u8; self.window_size.min(self.file.size() - self.offset)];
        match self.file.read_at(self.offset, &mut window) {
            Ok(n) => {
                window.truncate(n);
                self.offset += n;
                self.done = n == 0;

                if n == 0 { None } else { Some(Ok(window)) }
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Computes BLAKE3 digests of chunks in `chunk_range`. The final chunk of the file is zero padded.
fn chunk_digests<F: UploadFile + ?Sized>(file: &F, chunk_range: Range<usize>) -> Result<Vec<blake3::Hash>, SegliftError> {
    let layout = file.layout();
    let chunk_size = layout.get_chunk_size();
    let window_size = layout.get_segment_size();

    let mut digests = Vec::with_capacity(chunk_range.len());
    for window in file.iterate_from(chunk_range.start * chunk_size, window_size) {
        let window = window?;

        for chunk in window.chunks(chunk_size) {
            let digest = if chunk.len() == chunk_size {
                blake3::hash(chunk)
            } else {
                let mut padded = chunk.to_vec();
                padded.resize(chunk_size, 0);
                blake3::hash(&padded)
            };
            digests.push(digest);

            if digests.len() == chunk_range.len() {
                return Ok(digests);
            }
        }
    }

    if digests.len() != chunk_range.len() {
        return Err(SegliftError::FileReadFailed(format!(
            "expected {} chunks starting at chunk {}, found {}",
            chunk_range.len(),
            chunk_range.start,
            digests.len()
        )));
    }

    Ok(digests)
}

/// Merkle commitment to a file: its leaves are segment roots, each of which is the root of a tree over the chunks of that segment.
#[derive(Clone, Debug)]
pub struct FileTree {
    file_size: usize,
    segment_tree: MerkleTree,
}

impl FileTree {
    /// Hashes every segment of `file` in parallel, then builds the tree over their roots.
    ///
    /// # Arguments
    ///
    /// * `file` - Any `UploadFile`.
    ///
    /// # Returns
    ///
    /// * `Result<Self, SegliftError>` - The tree, or `SegliftError::EmptyFile` for an empty file. File read errors are propagated.
    pub fn new<F: UploadFile + ?Sized>(file: &F) -> Result<Self, SegliftError> {
        if file.size() == 0 {
            return Err(SegliftError::EmptyFile);
        }

        let max_chunks = file.layout().get_max_chunks_per_segment();
        let num_chunks = file.num_chunks();

        let segment_roots = (0..file.num_segments())
            .into_par_iter()
            .map(|segment_index| {
                let from = segment_index * max_chunks;
                let till = (from + max_chunks).min(num_chunks);

                MerkleTree::new(chunk_digests(file, from..till)?).map(|tree| tree.get_root_commitment())
            })
            .collect::<Result<Vec<blake3::Hash>, SegliftError>>()?;

        Ok(FileTree {
            file_size: file.size(),
            segment_tree: MerkleTree::new(segment_roots)?,
        })
    }

    /// Content address of the file.
    pub fn get_root(&self) -> blake3::Hash {
        self.segment_tree.get_root_commitment()
    }

    pub fn get_file_size(&self) -> usize {
        self.file_size
    }

    pub fn get_num_segments(&self) -> usize {
        self.segment_tree.get_num_leaves()
    }

    /// Root of the tree over chunks of segment `segment_index`, if the file has such a segment.
    pub fn get_segment_root(&self, segment_index: usize) -> Option<blake3::Hash> {
        self.segment_tree.get_leaf(segment_index)
    }

    /// Inclusion proof of segment root at `segment_index`, against the file root.
    pub fn proof(&self, segment_index: usize) -> Result<Vec<blake3::Hash>, SegliftError> {
        self.segment_tree.generate_proof(segment_index)
    }

    /// Checks that `segment_root` sits at `segment_index` of this file, using `proof`.
    pub fn verify_segment(&self, segment_index: usize, segment_root: blake3::Hash, proof: &[blake3::Hash]) -> bool {
        MerkleTree::verify_proof(segment_index, segment_root, proof, self.get_root())
    }
}

/// A perfect binary subtree of chunks, `2^height` chunks wide.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct SubmissionNode {
    pub root: blake3::Hash,
    pub height: u32,
}

/// Commitment to the shape of a file, submitted to the ledger before segments are uploaded.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Submission {
    length: usize,
    root: blake3::Hash,
    tags: Vec<u8>,
    nodes: Vec<SubmissionNode>,
}

impl Submission {
    /// Splits the chunks of the file into perfect binary subtrees, largest first, following the binary representation of the chunk count.
    ///
    /// When segments hold a power of two chunks, subtrees spanning whole segments are rebuilt from segment roots of `tree`,
    /// so only chunks of the final segment are read again.
    ///
    /// # Arguments
    ///
    /// * `file` - The file being committed.
    /// * `tree` - Merkle tree of that same file, as returned by `UploadFile::merkle_tree`.
    /// * `tags` - Opaque metadata, committed along with the file.
    ///
    /// # Returns
    ///
    /// * `Result<Self, SegliftError>` - The submission, or `SegliftError::TreeConstructionFailed` if `tree` describes a file of
    ///   another size. File read errors are propagated.
    pub fn new<F: UploadFile + ?Sized>(file: &F, tree: &FileTree, tags: &[u8]) -> Result<Self, SegliftError> {
        if tree.get_file_size() != file.size() {
            return Err(SegliftError::TreeConstructionFailed(format!(
                "tree covers {}B, file has {}B",
                tree.get_file_size(),
                file.size()
            )));
        }

        let num_chunks = file.num_chunks();
        let max_chunks = file.layout().get_max_chunks_per_segment();
        let segment_height = max_chunks.is_power_of_two().then(|| max_chunks.ilog2());

        let mut nodes = Vec::with_capacity(num_chunks.count_ones() as usize);
        let mut offset = 0;

        for height in (0..usize::BITS).rev().filter(|&height| num_chunks & (1usize << height) != 0) {
            let width = 1usize << height;

            // Largest first keeps `offset` a multiple of `width`, so such a subtree is made of whole segments.
            let leaves = match segment_height {
                Some(segment_height) if height >= segment_height => {
                    let first = offset >> segment_height;
                    (first..first + (width >> segment_height))
                        .map(|segment_index| {
                            tree.get_segment_root(segment_index)
                                .ok_or(SegliftError::LeafOutOfRange(segment_index, tree.get_num_segments()))
                        })
                        .collect::<Result<Vec<blake3::Hash>, SegliftError>>()?
                }
                _ => chunk_digests(file, offset..offset + width)?,
            };

            nodes.push(SubmissionNode {
                root: MerkleTree::new(leaves)?.get_root_commitment(),
                height,
            });
            offset += width;
        }

        Ok(Submission {
            length: file.size(),
            root: tree.get_root(),
            tags: tags.to_vec(),
            nodes,
        })
    }

    pub fn get_length(&self) -> usize {
        self.length
    }

    pub fn get_root(&self) -> blake3::Hash {
        self.root
    }

    pub fn get_tags(&self) -> &[u8] {
        &self.tags
    }

    pub fn get_nodes(&self) -> &[SubmissionNode] {
        &self.nodes
    }

    /// Number of sectors (chunks) this submission occupies in the flow. Storage fee is charged per sector.
    pub fn sectors(&self) -> u128 {
        self.nodes.iter().map(|node| 1u128 << node.height).sum()
    }

    /// Serializes the submission with `bincode`.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<u8>, SegliftError>` - Serialized bytes, or `SegliftError::SubmissionSerializationFailed`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SegliftError> {
        bincode::serde::encode_to_vec(self, SEGLIFT_BINCODE_CONFIG).map_err(|err| SegliftError::SubmissionSerializationFailed(err.to_string()))
    }

    /// Deserializes a submission, serialized with `to_bytes`.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Serialized submission, possibly followed by other bytes.
    ///
    /// # Returns
    ///
    /// * `Result<(Self, usize), SegliftError>` - The submission and number of bytes it occupied, or
    ///   `SegliftError::SubmissionDeserializationFailed`.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), SegliftError> {
        bincode::serde::decode_from_slice::<Submission, bincode::config::Configuration>(bytes, SEGLIFT_BINCODE_CONFIG)
            .map_err(|err| SegliftError::SubmissionDeserializationFailed(err.to_string()))
    }
}

/// File held entirely in memory.
pub struct InMemoryFile {
    data: Vec<u8>,
    layout: SegmentLayout,
}

impl InMemoryFile {
    pub fn new(data: Vec<u8>, layout: SegmentLayout) -> Result<Self, SegliftError> {
        if data.is_empty() {
            return Err(SegliftError::EmptyFile);
        }

        Ok(InMemoryFile { data, layout })
    }
}

impl UploadFile for InMemoryFile {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn layout(&self) -> SegmentLayout {
        self.layout
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, SegliftError> {
        let from = offset.min(self.data.len());
        let till = (from + buf.len()).min(self.data.len());

        buf[..till - from].copy_from_slice(&self.data[from..till]);
        Ok(till - from)
    }
}

/// File on disk. Positional reads are serialized over a single handle.
pub struct DiskFile {
    handle: Mutex<fs::File>,
    size: usize,
    layout: SegmentLayout,
}

impl DiskFile {
    /// Opens the file at `path` for reading, with the given geometry.
    ///
    /// # Returns
    ///
    /// * `Result<Self, SegliftError>` - The file, or `SegliftError::FileReadFailed` if it can't be opened or its size doesn't fit
    ///   in `usize`. Empty files fail with `SegliftError::EmptyFile`.
    pub fn open(path: impl AsRef<Path>, layout: SegmentLayout) -> Result<Self, SegliftError> {
        let handle = fs::File::open(path.as_ref()).map_err(|err| SegliftError::FileReadFailed(format!("{:?}: {}", path.as_ref(), err)))?;
        let byte_len = handle.metadata().map_err(|err| SegliftError::FileReadFailed(err.to_string()))?.len();
        let size = usize::try_from(byte_len).map_err(|_| SegliftError::FileReadFailed(format!("{:?}: {}B doesn't fit in memory address space", path.as_ref(), byte_len)))?;

        if size == 0 {
            return Err(SegliftError::EmptyFile);
        }

        Ok(DiskFile {
            handle: Mutex::new(handle),
            size,
            layout,
        })
    }
}

impl UploadFile for DiskFile {
    fn size(&self) -> usize {
        self.size
    }

    fn layout(&self) -> SegmentLayout {
        self.layout
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, SegliftError> {
        let mut handle = self.handle.lock().map_err(|_| SegliftError::FileReadFailed("file handle poisoned".to_string()))?;
        handle.seek(SeekFrom::Start(offset as u64)).map_err(|err| SegliftError::FileReadFailed(err.to_string()))?;

        let mut filled = 0;
        while filled < buf.len() {
            match handle.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(SegliftError::FileReadFailed(err.to_string())),
            }
        }

        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        errors::SegliftError,
        file::{DiskFile, InMemoryFile, Submission, UploadFile},
        layout::SegmentLayout,
        merkle_tree::MerkleTree,
    };
    use rand::Rng;

    fn random_file<R: Rng + ?Sized>(byte_len: usize, layout: SegmentLayout, rng: &mut R) -> InMemoryFile {
        let data = (0..byte_len).map(|_| rng.random()).collect::<Vec<u8>>();
        InMemoryFile::new(data, layout).expect("Must be able to create in-memory file")
    }

    #[test]
    fn test_empty_file_is_rejected() {
        assert!(matches!(InMemoryFile::new(Vec::new(), SegmentLayout::default()), Err(SegliftError::EmptyFile)));
    }

    #[test]
    fn test_iterate_from_yields_windows_till_end_of_file() {
        let file = InMemoryFile::new((0..=255u8).collect(), SegmentLayout::default()).expect("Must be able to create in-memory file");

        let windows = file.iterate_from(100, 64).collect::<Result<Vec<Vec<u8>>, SegliftError>>().expect("Must be able to read windows");

        assert_eq!(windows.iter().map(|window| window.len()).collect::<Vec<usize>>(), vec![64, 64, 28]);
        assert_eq!(windows[0][0], 100);
        assert_eq!(windows[2][27], 255);
        assert_eq!(file.iterate_from(256, 64).count(), 0);
    }

    #[test]
    fn prop_test_segment_proofs_verify_against_file_root() {
        const NUM_TEST_ITERATIONS: usize = 10;

        let layout = SegmentLayout::new(64, 16).expect("Must be able to create layout");
        let mut rng = rand::rng();

        (0..NUM_TEST_ITERATIONS).for_each(|_| {
            let file = random_file(rng.random_range(1..=64 * 16 * 20), layout, &mut rng);
            let tree = file.merkle_tree().expect("Must be able to build file tree");

            assert_eq!(tree.get_num_segments(), file.num_segments());

            (0..tree.get_num_segments()).for_each(|segment_index| {
                let segment_root = tree.get_segment_root(segment_index).expect("Segment root must exist");
                let proof = tree.proof(segment_index).expect("Must be able to generate segment proof");

                assert!(tree.verify_segment(segment_index, segment_root, &proof));
            });
        });
    }

    #[test]
    fn test_same_content_same_root() {
        let layout = SegmentLayout::default();
        let data = (0..layout.get_segment_size() * 3 + 17).map(|i| (i % 251) as u8).collect::<Vec<u8>>();

        let a = InMemoryFile::new(data.clone(), layout).expect("Must be able to create in-memory file");
        let mut b_data = data;
        b_data[layout.get_segment_size() + 1] ^= 1;
        let b = InMemoryFile::new(b_data, layout).expect("Must be able to create in-memory file");

        let root_a = a.merkle_tree().expect("Must be able to build file tree").get_root();
        let root_a_again = a.merkle_tree().expect("Must be able to build file tree").get_root();
        let root_b = b.merkle_tree().expect("Must be able to build file tree").get_root();

        assert_eq!(root_a, root_a_again);
        assert_ne!(root_a, root_b);
    }

    #[test]
    fn test_submission_nodes_decompose_chunk_count() {
        let layout = SegmentLayout::new(32, 8).expect("Must be able to create layout");
        // 13 chunks = 8 + 4 + 1, last chunk partially filled
        let file = random_file(12 * 32 + 5, layout, &mut rand::rng());

        let submission = file.create_submission(b"tag").expect("Must be able to create submission");

        assert_eq!(submission.get_nodes().iter().map(|node| node.height).collect::<Vec<u32>>(), vec![3, 2, 0]);
        assert_eq!(submission.sectors(), 13);
        assert_eq!(submission.get_length(), 12 * 32 + 5);
        assert_eq!(submission.get_tags(), b"tag");
        assert_eq!(submission.get_root(), file.merkle_tree().expect("Must be able to build file tree").get_root());

        let bytes = submission.to_bytes().expect("Must be able to serialize submission");
        let (decoded, n) = Submission::from_bytes(&bytes).expect("Must be able to deserialize submission");

        assert_eq!(n, bytes.len());
        assert_eq!(decoded, submission);
    }

    /// Root of the perfect tree over chunks `from..from + width`, hashing every chunk again.
    fn subtree_root_over_chunks(data: &[u8], layout: SegmentLayout, from: usize, width: usize) -> blake3::Hash {
        let chunk_size = layout.get_chunk_size();
        let leaves = (from..from + width)
            .map(|chunk_index| {
                let mut chunk = data.iter().skip(chunk_index * chunk_size).take(chunk_size).copied().collect::<Vec<u8>>();
                chunk.resize(chunk_size, 0);
                blake3::hash(&chunk)
            })
            .collect::<Vec<blake3::Hash>>();

        MerkleTree::new(leaves).expect("Must be able to build Merkle tree").get_root_commitment()
    }

    #[test]
    fn prop_test_submission_nodes_built_from_segment_roots_match_chunk_subtrees() {
        const NUM_TEST_ITERATIONS: usize = 20;

        let mut rng = rand::rng();

        (0..NUM_TEST_ITERATIONS).for_each(|_| {
            // Power of two and non power of two chunks per segment.
            let layout = SegmentLayout::new(32, rng.random_range(1..=8)).expect("Must be able to create layout");
            let data = (0..rng.random_range(1..=32 * 8 * 40)).map(|_| rng.random()).collect::<Vec<u8>>();
            let file = InMemoryFile::new(data.clone(), layout).expect("Must be able to create in-memory file");

            let submission = file.create_submission(&[]).expect("Must be able to create submission");
            assert_eq!(submission.sectors(), file.num_chunks() as u128);

            let mut offset = 0;
            for node in submission.get_nodes() {
                let width = 1usize << node.height;
                assert_eq!(node.root, subtree_root_over_chunks(&data, layout, offset, width));
                offset += width;
            }
        });
    }

    #[test]
    fn test_submission_rejects_tree_of_another_file() {
        let layout = SegmentLayout::new(32, 4).expect("Must be able to create layout");
        let small = random_file(100, layout, &mut rand::rng());
        let large = random_file(1000, layout, &mut rand::rng());

        let tree = small.merkle_tree().expect("Must be able to build file tree");

        assert!(matches!(Submission::new(&large, &tree, &[]), Err(SegliftError::TreeConstructionFailed(_))));
    }

    #[test]
    fn test_disk_file_matches_in_memory_file() {
        let layout = SegmentLayout::new(64, 4).expect("Must be able to create layout");
        let data = (0..64 * 4 * 3 + 10).map(|_| rand::rng().random()).collect::<Vec<u8>>();

        let path = std::env::temp_dir().join(format!("seglift-disk-file-{}", const_hex::encode(rand::rng().random::<[u8; 8]>())));
        std::fs::write(&path, &data).expect("Must be able to write temporary file");

        let on_disk = DiskFile::open(&path, layout).expect("Must be able to open file on disk");
        let in_memory = InMemoryFile::new(data, layout).expect("Must be able to create in-memory file");

        assert_eq!(on_disk.size(), in_memory.size());
        assert_eq!(
            on_disk.merkle_tree().expect("Must be able to build file tree").get_root(),
            in_memory.merkle_tree().expect("Must be able to build file tree").get_root()
        );

        let _ = std::fs::remove_file(&path);
    }
}
