//! Self/total aggregation over a call-node table.

use crate::profile::{CallNodeIndex, SamplesTable};

use super::CallNodeInfo;

// Absolute root totals below this are rounding noise from summing many
// near-cancelling diff weights; see the snap-to-zero note on
// `compute_call_tree_counts_and_summary`.
const ROOT_TOTAL_EPSILON: f64 = 1e-8;

/// Per-call-node weight summaries, plus the counts the call tree needs to
/// enumerate children and roots.
///
/// Weights are signed `f64`s so that diff profiles (where one side's samples
/// carry negative weights) aggregate through the same code.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallTreeCountsAndSummary {
    /// Weight attributed directly to each node. In an inverted tree this is
    /// the weight attributed to the node as a *root* of inverted paths.
    pub self_weight: Vec<f64>,
    /// Weight observed at each node as the actual sample leaf. Equal to
    /// `self_weight` in a non-inverted tree.
    pub leaf_weight: Vec<f64>,
    /// Inclusive weight: the node's leaf weight plus all its descendants'.
    pub total: Vec<f64>,
    /// How many visible children each node has.
    pub child_count: Vec<u32>,
    /// How many visible roots the tree has.
    pub root_count: usize,
    /// The sum of the absolute totals of all roots; the denominator for
    /// percentage displays.
    pub root_total: f64,
}

/// Aggregates a samples table over the call-node table.
///
/// Every sample with a stack contributes its weight (1 for unweighted
/// tables) at its call node; totals then accumulate children-into-parents in
/// a single reverse pass, which the call-node table's parent-before-child
/// order makes valid.
///
/// In inverted mode the filter pipeline has already reversed every call
/// path, so a sample's node is the *original root* and the root ancestor of
/// that node is the original leaf. The sample's weight lands as `self` on
/// the root ancestor (the answer to "who was the deepest function"), while
/// `leaf_weight` keeps the weight at the actual node so totals still
/// aggregate bottom-up.
///
/// Snap-to-zero: a near-zero total on node 0 of a non-inverted tree is
/// forced to exactly 0. In compare views the two profiles' weights nearly
/// cancel, and the residual float noise would otherwise show up as a
/// confusing tiny nonzero root. This is a deliberate display decision, not a
/// general numeric fix.
pub fn compute_call_tree_counts_and_summary(
    samples: &SamplesTable,
    info: &CallNodeInfo,
    inverted: bool,
) -> CallTreeCountsAndSummary {
    let table = &info.table;
    let len = table.len();
    let mut self_weight = vec![0.0; len];
    let mut leaf_weight = vec![0.0; len];

    // Root ancestor per node, available in one forward pass because parents
    // precede children.
    let mut root_ancestor: Vec<CallNodeIndex> = Vec::with_capacity(len);
    for i in 0..len {
        root_ancestor.push(match table.prefix[i] {
            Some(p) => root_ancestor[p.0],
            None => CallNodeIndex(i),
        });
    }

    for i in 0..samples.len() {
        let stack = match samples.stack[i] {
            Some(stack) => stack,
            None => continue,
        };
        let node = info.stack_to_node[stack.0];
        let weight = samples.weight_at(i);
        leaf_weight[node.0] += weight;
        if inverted {
            self_weight[root_ancestor[node.0].0] += weight;
        } else {
            self_weight[node.0] += weight;
        }
    }

    let mut total = vec![0.0; len];
    let mut child_count = vec![0u32; len];
    let mut root_count = 0;
    let mut root_total = 0.0;
    for i in (0..len).rev() {
        total[i] += leaf_weight[i];
        // Zero-weight childless rows stay addressable by index but are
        // invisible: they count toward neither children nor roots.
        let visible = total[i] != 0.0 || child_count[i] != 0;
        match table.prefix[i] {
            Some(p) => {
                total[p.0] += total[i];
                if visible {
                    child_count[p.0] += 1;
                }
            }
            None => {
                if visible {
                    root_count += 1;
                }
                root_total += total[i].abs();
            }
        }
    }

    if !inverted && !total.is_empty() && total[0].abs() < ROOT_TOTAL_EPSILON {
        total[0] = 0.0;
    }

    CallTreeCountsAndSummary {
        self_weight,
        leaf_weight,
        total,
        child_count,
        root_count,
        root_total,
    }
}
