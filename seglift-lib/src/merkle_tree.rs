use crate::errors::SegliftError;

const ZERO_DIGEST: blake3::Hash = blake3::Hash::from_bytes([0u8; blake3::OUT_LEN]);

fn hash_pair(left: &blake3::Hash, right: &blake3::Hash) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hasher.finalize()
}

/// Digests of all-zero subtrees of height 0, 1, 2, ...
fn zero_subtrees() -> impl Iterator<Item = blake3::Hash> {
    std::iter::successors(Some(ZERO_DIGEST), |digest| Some(hash_pair(digest, digest)))
}

/// Binary BLAKE3 Merkle tree, every level kept in memory.
///
/// A level of odd width gets an implicit right-most node: the digest of an all-zero subtree of that level's height.
/// Proofs list sibling digests from the leaf up.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<blake3::Hash>>,
}

impl MerkleTree {
    /// Builds the tree bottom up, from digests of its leaves.
    ///
    /// # Arguments
    ///
    /// * `leaves` - Leaf digests, in order.
    ///
    /// # Returns
    ///
    /// * `Result<Self, SegliftError>` - The tree, or `SegliftError::EmptyMerkleTree` if `leaves` is empty.
    pub fn new(leaves: Vec<blake3::Hash>) -> Result<Self, SegliftError> {
        if leaves.is_empty() {
            return Err(SegliftError::EmptyMerkleTree);
        }

        let mut levels = vec![leaves];
        for padding in zero_subtrees() {
            let Some(level) = levels.last().filter(|level| level.len() > 1) else {
                break;
            };

            let parents = level
                .chunks(2)
                .map(|siblings| hash_pair(&siblings[0], siblings.get(1).unwrap_or(&padding)))
                .collect::<Vec<blake3::Hash>>();

            levels.push(parents);
        }

        Ok(MerkleTree { levels })
    }

    /// Returns the root digest, committing to every leaf.
    pub fn get_root_commitment(&self) -> blake3::Hash {
        self.levels.last().and_then(|level| level.first()).copied().unwrap_or(ZERO_DIGEST)
    }

    pub fn get_num_leaves(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Returns digest of the leaf at `index`, if there is one.
    pub fn get_leaf(&self, index: usize) -> Option<blake3::Hash> {
        self.levels.first().and_then(|leaves| leaves.get(index)).copied()
    }

    /// Number of levels above the leaves; zero for a single leaf.
    pub fn get_height(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Generates an inclusion proof of the leaf at `index`.
    ///
    /// # Arguments
    ///
    /// * `index` - Index of the leaf to prove.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<blake3::Hash>, SegliftError>` - One sibling digest per level, from the leaf up, so that it is `get_height()` long.
    ///   Fails with `SegliftError::LeafOutOfRange` if `index` isn't a leaf.
    pub fn generate_proof(&self, index: usize) -> Result<Vec<blake3::Hash>, SegliftError> {
        let num_leaves = self.get_num_leaves();
        if index >= num_leaves {
            return Err(SegliftError::LeafOutOfRange(index, num_leaves));
        }

        let below_root = &self.levels[..self.get_height()];
        Ok(below_root
            .iter()
            .zip(zero_subtrees())
            .enumerate()
            .map(|(height, (level, padding))| level.get((index >> height) ^ 1).copied().unwrap_or(padding))
            .collect())
    }

    /// Recomputes the root from `leaf` and its `proof`, and compares it with `root`.
    ///
    /// # Arguments
    ///
    /// * `index` - Index of the leaf, deciding on which side each sibling is hashed.
    /// * `leaf` - Digest of the leaf.
    /// * `proof` - Sibling digests, as returned by `generate_proof`.
    /// * `root` - Expected root digest.
    ///
    /// # Returns
    ///
    /// * `bool` - `true` only if `leaf` sits at `index` of a tree with root `root`.
    pub fn verify_proof(index: usize, leaf: blake3::Hash, proof: &[blake3::Hash], root: blake3::Hash) -> bool {
        let computed = proof.iter().enumerate().fold(leaf, |node, (height, sibling)| {
            if (index >> height) & 1 == 0 {
                hash_pair(&node, sibling)
            } else {
                hash_pair(sibling, &node)
            }
        });

        computed == root
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        errors::SegliftError,
        merkle_tree::{MerkleTree, ZERO_DIGEST, hash_pair},
    };
    use rand::Rng;

    fn random_leaves<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<blake3::Hash> {
        (0..count).map(|_| blake3::Hash::from_bytes(rng.random())).collect()
    }

    #[test]
    fn prop_test_proofs_verify_and_detect_tampering() {
        const NUM_TEST_ITERATIONS: usize = 10;
        const MAX_NUM_LEAVES: usize = 5_000;

        let mut rng = rand::rng();

        (0..NUM_TEST_ITERATIONS).for_each(|_| {
            let leaves = random_leaves(rng.random_range(1..=MAX_NUM_LEAVES), &mut rng);
            let tree = MerkleTree::new(leaves.clone()).expect("Must be able to build Merkle tree");
            let root = tree.get_root_commitment();

            assert_eq!(tree.get_height(), leaves.len().next_power_of_two().ilog2() as usize);

            for (index, &leaf) in leaves.iter().enumerate() {
                let mut proof = tree.generate_proof(index).expect("Must be able to generate proof");
                assert_eq!(proof.len(), tree.get_height());
                assert!(MerkleTree::verify_proof(index, leaf, &proof, root));

                if proof.is_empty() {
                    continue;
                }

                let at = rng.random_range(0..proof.len());
                let mut bytes = *proof[at].as_bytes();
                bytes[rng.random_range(0..blake3::OUT_LEN)] ^= 1 << rng.random_range(0..u8::BITS);
                proof[at] = blake3::Hash::from_bytes(bytes);

                assert!(!MerkleTree::verify_proof(index, leaf, &proof, root));
            }
        });
    }

    #[test]
    fn test_empty_tree_is_rejected() {
        assert!(matches!(MerkleTree::new(Vec::new()), Err(SegliftError::EmptyMerkleTree)));
    }

    #[test]
    fn test_single_leaf_is_its_own_root() {
        let leaf = blake3::hash(b"segment");
        let tree = MerkleTree::new(vec![leaf]).expect("Must be able to build Merkle tree");

        assert_eq!(tree.get_root_commitment(), leaf);
        assert_eq!(tree.get_height(), 0);
        assert_eq!(tree.generate_proof(0), Ok(Vec::new()));
    }

    #[test]
    fn test_odd_level_is_padded_with_zero_subtree() {
        let leaves = vec![blake3::hash(b"a"), blake3::hash(b"b"), blake3::hash(b"c")];
        let tree = MerkleTree::new(leaves.clone()).expect("Must be able to build Merkle tree");

        let left = hash_pair(&leaves[0], &leaves[1]);
        let right = hash_pair(&leaves[2], &ZERO_DIGEST);

        assert_eq!(tree.get_root_commitment(), hash_pair(&left, &right));
        assert_eq!(tree.generate_proof(2), Ok(vec![ZERO_DIGEST, left]));
    }

    #[test]
    fn test_padding_grows_with_height() {
        // Five leaves: the third level has a lone node, padded with the digest of a zero subtree of height 1.
        let leaves = random_leaves(5, &mut rand::rng());
        let tree = MerkleTree::new(leaves.clone()).expect("Must be able to build Merkle tree");

        let zero_pair = hash_pair(&ZERO_DIGEST, &ZERO_DIGEST);
        let proof = tree.generate_proof(4).expect("Must be able to generate proof");

        assert_eq!(proof[0], ZERO_DIGEST);
        assert_eq!(proof[1], zero_pair);
        assert!(MerkleTree::verify_proof(4, leaves[4], &proof, tree.get_root_commitment()));
    }

    #[test]
    fn test_proof_of_missing_leaf_fails() {
        let tree = MerkleTree::new(random_leaves(5, &mut rand::rng())).expect("Must be able to build Merkle tree");

        assert_eq!(tree.generate_proof(5), Err(SegliftError::LeafOutOfRange(5, 5)));
        assert_eq!(tree.get_leaf(5), None);
    }
}
