//! Aligning the nodes of two call trees for comparison views.
//!
//! The two trees come from different profiles, so func indices mean nothing
//! across them. Nodes are instead identified by a rolling hash over their
//! path of textual identities (function name plus origin), which is stable
//! across profiles that symbolicate the same code.

use std::hash::{BuildHasher, Hasher};

use ahash::{AHashMap, RandomState};

use crate::calltree::CallTree;
use crate::profile::CallNodeIndex;

// Fixed seeds so the same pair of trees always aligns the same way.
const HASH_SEEDS: (u64, u64, u64, u64) = (
    0x9e37_79b9_7f4a_7c15,
    0xf39c_c060_5ced_c834,
    0x1082_276b_f3a2_7251,
    0x7109_87c8_825e_2fed,
);

/// Maps call nodes of `selected` to the corresponding call nodes of
/// `compare`. Nodes with no counterpart are absent.
///
/// Correspondence is heuristic: two nodes correspond when their paths hash
/// equal. On a genuine hash collision the last-hashed compare node wins
/// silently; with a 64-bit hash space and tree sizes in the millions at
/// worst, that approximation is accepted rather than detected.
pub fn compute_call_node_correspondence(
    selected: &CallTree,
    compare: &CallTree,
) -> AHashMap<CallNodeIndex, CallNodeIndex> {
    let compare_hashes = hash_nodes(compare);
    let mut by_hash: AHashMap<u64, CallNodeIndex> =
        AHashMap::with_capacity(compare_hashes.len());
    for (i, &hash) in compare_hashes.iter().enumerate() {
        by_hash.insert(hash, CallNodeIndex(i));
    }

    let selected_hashes = hash_nodes(selected);
    let mut correspondence = AHashMap::new();
    for (i, &hash) in selected_hashes.iter().enumerate() {
        if let Some(&node) = by_hash.get(&hash) {
            correspondence.insert(CallNodeIndex(i), node);
        }
    }
    correspondence
}

// Rolling hash per node: H(parent hash, origin annotation). Parents precede
// children in the table, so one forward pass suffices.
fn hash_nodes(tree: &CallTree) -> Vec<u64> {
    let state = RandomState::with_seeds(HASH_SEEDS.0, HASH_SEEDS.1, HASH_SEEDS.2, HASH_SEEDS.3);
    let mut hashes = Vec::with_capacity(tree.len());
    for i in 0..tree.len() {
        let node = CallNodeIndex(i);
        let mut hasher = state.build_hasher();
        hasher.write_u64(match tree.parent(node) {
            Some(parent) => hashes[parent.0],
            None => 0,
        });
        hasher.write(tree.origin_annotation(node).as_bytes());
        hashes.push(hasher.finish());
    }
    hashes
}
