use crate::{
    consts::{DEFAULT_CHUNK_SIZE, DEFAULT_SEGMENT_MAX_CHUNKS},
    errors::SegliftError,
};

/// Number of `unit`-sized pieces needed to cover `total` items. Zero items need zero pieces.
///
/// # Arguments
///
/// * `total` - Number of items to cover.
/// * `unit` - Capacity of one piece. Must be non-zero, which `SegmentLayout` guarantees for its own geometry.
///
/// # Returns
///
/// * `usize` - `ceil(total / unit)`.
pub fn split_count(total: usize, unit: usize) -> usize {
    if total == 0 { 0 } else { (total - 1) / unit + 1 }
}

/// Smallest segment index `>= from_index`, owned by shard `shard_id` out of `num_shard` shards.
///
/// Segments are assigned to shards round-robin i.e. shard `s` owns every segment index `i` such that `i % num_shard == s`.
/// With less than two shards, every segment belongs to the only shard, so `from_index` is returned as is.
///
/// # Arguments
///
/// * `shard_id` - Shard to find a segment of. Expected to be below `num_shard`.
/// * `num_shard` - Total number of shards.
/// * `from_index` - Segment index to start looking from.
///
/// # Returns
///
/// * `usize` - The segment index, at most `num_shard - 1` past `from_index`.
pub fn next_shard_segment_index(shard_id: usize, num_shard: usize, from_index: usize) -> usize {
    if num_shard < 2 {
        return from_index;
    }

    (from_index + num_shard - 1 - shard_id) / num_shard * num_shard + shard_id
}

/// Fixed geometry of a file, as seen by the storage network: a file is split into chunks,
/// and consecutive chunks are packed into segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentLayout {
    chunk_size: usize,
    max_chunks_per_segment: usize,
}

impl SegmentLayout {
    /// Creates a new layout, given chunk size in bytes and maximum number of chunks per segment. Both must be non-zero.
    pub fn new(chunk_size: usize, max_chunks_per_segment: usize) -> Result<Self, SegliftError> {
        if chunk_size == 0 || max_chunks_per_segment == 0 {
            return Err(SegliftError::InvalidSegmentLayout(chunk_size, max_chunks_per_segment));
        }

        Ok(SegmentLayout {
            chunk_size,
            max_chunks_per_segment,
        })
    }

    /// Size of a chunk, in bytes.
    pub fn get_chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn get_max_chunks_per_segment(&self) -> usize {
        self.max_chunks_per_segment
    }

    /// Size of a full segment, in bytes.
    pub fn get_segment_size(&self) -> usize {
        self.chunk_size * self.max_chunks_per_segment
    }

    /// Number of chunks required to hold `file_size` bytes.
    pub fn num_chunks(&self, file_size: usize) -> usize {
        split_count(file_size, self.chunk_size)
    }

    /// Number of segments required to hold `file_size` bytes.
    pub fn num_segments(&self, file_size: usize) -> usize {
        split_count(self.num_chunks(file_size), self.max_chunks_per_segment)
    }

    /// Inclusive range of flow-wide segment indices, touched by a file of `file_size` bytes,
    /// which starts at chunk index `start_chunk_index` of the flow.
    ///
    /// An empty file touches only the segment holding `start_chunk_index`.
    ///
    /// # Arguments
    ///
    /// * `start_chunk_index` - Flow-wide index of the first chunk of the file.
    /// * `file_size` - Size of the file, in bytes.
    ///
    /// # Returns
    ///
    /// * `(usize, usize)` - First and last segment index, both inclusive.
    pub fn segment_range(&self, start_chunk_index: usize, file_size: usize) -> (usize, usize) {
        let total_chunks = self.num_chunks(file_size).max(1);

        let start_segment_index = start_chunk_index / self.max_chunks_per_segment;
        let end_segment_index = (start_chunk_index + total_chunks - 1) / self.max_chunks_per_segment;

        (start_segment_index, end_segment_index)
    }
}

impl Default for SegmentLayout {
    fn default() -> Self {
        SegmentLayout {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks_per_segment: DEFAULT_SEGMENT_MAX_CHUNKS,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::layout::{SegmentLayout, next_shard_segment_index, split_count};
    use rand::Rng;

    #[test]
    fn prop_test_split_count_covers_total() {
        (1..=10_000usize).for_each(|total| {
            (1..=1000usize).for_each(|unit| {
                let pieces = split_count(total, unit);

                assert!(pieces * unit >= total);
                assert!((pieces - 1) * unit < total);
            });
        });
    }

    #[test]
    fn test_split_count_edge_cases() {
        assert_eq!(split_count(0, 256), 0);
        assert_eq!(split_count(1, 256), 1);
        assert_eq!(split_count(256, 256), 1);
        assert_eq!(split_count(257, 256), 2);
        assert_eq!(split_count(10_000, 1), 10_000);
    }

    #[test]
    fn prop_test_segment_range_shifts_with_start_chunk_index() {
        const NUM_TEST_ITERATIONS: usize = 1000;

        let layout = SegmentLayout::default();
        let mut rng = rand::rng();

        (0..NUM_TEST_ITERATIONS).for_each(|_| {
            let start_chunk_index = rng.random_range(0..1usize << 30);
            let file_size = rng.random_range(1..1usize << 32);

            let (start, end) = layout.segment_range(start_chunk_index, file_size);
            let (shifted_start, shifted_end) = layout.segment_range(start_chunk_index + layout.get_max_chunks_per_segment(), file_size);

            assert!(start <= end);
            assert_eq!(shifted_start, start + 1);
            assert_eq!(shifted_end, end + 1);
        });
    }

    #[test]
    fn test_segment_range() {
        let layout = SegmentLayout::default();

        // 1 byte at flow start.
        assert_eq!(layout.segment_range(0, 1), (0, 0));
        // Exactly one full segment.
        assert_eq!(layout.segment_range(0, layout.get_segment_size()), (0, 0));
        // One byte more than a full segment.
        assert_eq!(layout.segment_range(0, layout.get_segment_size() + 1), (0, 1));
        // Starts at the last chunk of segment 2, spills into segment 3.
        assert_eq!(layout.segment_range(3 * 1024 - 1, 2 * 256), (2, 3));
    }

    #[test]
    fn prop_test_next_shard_segment_index() {
        const NUM_TEST_ITERATIONS: usize = 10_000;
        let mut rng = rand::rng();

        (0..NUM_TEST_ITERATIONS).for_each(|_| {
            let num_shard = rng.random_range(2..=256usize);
            let shard_id = rng.random_range(0..num_shard);
            let from_index = rng.random_range(0..1usize << 40);

            let next = next_shard_segment_index(shard_id, num_shard, from_index);

            assert_eq!(next % num_shard, shard_id);
            assert!(next >= from_index);
            assert!(next - from_index < num_shard);
        });
    }

    #[test]
    fn test_next_shard_segment_index_single_shard_is_identity() {
        assert_eq!(next_shard_segment_index(0, 1, 0), 0);
        assert_eq!(next_shard_segment_index(0, 1, 42), 42);
        assert_eq!(next_shard_segment_index(0, 0, 7), 7);
    }

    #[test]
    fn test_invalid_layout() {
        assert!(SegmentLayout::new(0, 1024).is_err());
        assert!(SegmentLayout::new(256, 0).is_err());
        assert_eq!(SegmentLayout::new(256, 1024), Ok(SegmentLayout::default()));
    }
}
