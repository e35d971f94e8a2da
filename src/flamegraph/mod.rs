//! Flame graph timing: per-depth interval lists giving every call node a
//! horizontal extent proportional to its share of the total.
//!
//! This is the aggregate view: extents come from the call tree's totals, not
//! from when samples happened. For wall-clock boxes see
//! [`stack_timing`](crate::stack_timing).

use crate::calltree::CallTree;
use crate::profile::CallNodeIndex;

/// One call node's horizontal extent at its depth, in `[0, 1]` units of the
/// root total.
#[derive(Clone, Debug, PartialEq)]
pub struct FlameGraphInterval {
    /// Where the node's extent starts.
    pub start: f64,
    /// Where the node's extent ends.
    pub end: f64,
    /// The node's absolute self weight as a fraction of the root total, for
    /// shading the part of the extent not covered by children.
    pub self_relative: f64,
    /// The call node this interval draws.
    pub node: CallNodeIndex,
}

/// Per-depth interval lists; `rows[0]` holds the roots. Intervals within a
/// row are sorted by start.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlameGraphTiming {
    /// One list per depth level.
    pub rows: Vec<Vec<FlameGraphInterval>>,
}

/// Computes the flame graph layout for a call tree.
///
/// Siblings are ordered by function name (ties by node index) so the layout
/// is stable across re-filters that reorder weights; extents are
/// `|total| / root_total`. The traversal is an explicit-stack DFS, which
/// also yields every row already sorted by start.
pub fn compute_flame_graph_timing(tree: &CallTree) -> FlameGraphTiming {
    let mut rows: Vec<Vec<FlameGraphInterval>> =
        vec![Vec::new(); tree.info().table.max_depth()];
    let root_total = tree.summary().root_total;
    if root_total == 0.0 {
        return FlameGraphTiming { rows };
    }

    let mut roots = tree.roots();
    sort_by_name(tree, &mut roots);

    // (node, start), pushed in reverse name order so they pop in name order
    let mut pending: Vec<(CallNodeIndex, f64)> = Vec::new();
    let mut cursor = 0.0;
    for root in roots {
        let width = tree.node_total(root).abs() / root_total;
        pending.push((root, cursor));
        cursor += width;
    }
    pending.reverse();

    while let Some((node, start)) = pending.pop() {
        let width = tree.node_total(node).abs() / root_total;
        rows[tree.depth(node)].push(FlameGraphInterval {
            start,
            end: start + width,
            self_relative: tree.node_self(node).abs() / root_total,
            node,
        });

        let mut children = tree.children(node);
        sort_by_name(tree, &mut children);
        let mut child_start = start;
        let from = pending.len();
        for child in children {
            let child_width = tree.node_total(child).abs() / root_total;
            pending.push((child, child_start));
            child_start += child_width;
        }
        pending[from..].reverse();
    }

    FlameGraphTiming { rows }
}

fn sort_by_name(tree: &CallTree, nodes: &mut [CallNodeIndex]) {
    nodes.sort_by(|&a, &b| {
        tree.func_name(a)
            .cmp(tree.func_name(b))
            .then_with(|| a.0.cmp(&b.0))
    });
}
