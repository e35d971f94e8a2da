//! Collapsing the stack table into a deduplicated call-node table.
//!
//! Multiple stack rows describe the same conceptual tree position whenever
//! they differ only in frame metadata (category, inlining); the call-node
//! table merges them into one row per `(parent call node, function)` pair.
//! Every derived view — the call tree, flame graph timing, diffing — works in
//! terms of call nodes, not raw stacks.

use ahash::AHashMap;

use crate::profile::{
    CallNodeIndex, CategoryIndex, FrameTable, FuncIndex, NativeSymbolIndex, StackTable,
};

/// Per-call-node self/total aggregation.
pub mod summary;

/// A call node's position named structurally: the functions along the path
/// from the root, ending at the node's own function.
///
/// Paths survive call-node table rebuilds, so they are the representation of
/// choice for anything that outlives a filtered thread (selection, expansion
/// state).
pub type CallNodePath = Vec<FuncIndex>;

/// An unordered set of [`CallNodePath`]s, e.g. "which tree nodes are
/// expanded".
pub type PathSet = ahash::AHashSet<CallNodePath>;

/// Whether a call node's frames were inlined into a native symbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InlinedInto {
    /// None of the node's frames were inlined.
    No,
    /// Every merged frame was inlined into this symbol.
    Symbol(NativeSymbolIndex),
    /// The merged frames disagree about their inlining.
    Divergent,
}

/// The deduplicated call tree, in the same parent-before-child order as the
/// stack table it was built from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallNodeTable {
    /// The parent call node, or `None` for a root.
    pub prefix: Vec<Option<CallNodeIndex>>,
    /// The node's function.
    pub func: Vec<FuncIndex>,
    /// The node's category (the default category if merged frames disagreed).
    pub category: Vec<CategoryIndex>,
    /// The node's subcategory (0 if merged frames disagreed).
    pub subcategory: Vec<usize>,
    /// The node's depth; roots are at depth 0.
    pub depth: Vec<usize>,
    /// The node's inlining marker.
    pub inlined_into: Vec<InlinedInto>,
}

impl CallNodeTable {
    /// The number of call nodes.
    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// The deepest node's depth plus one, or 0 for an empty table.
    pub fn max_depth(&self) -> usize {
        self.depth.iter().map(|&d| d + 1).max().unwrap_or(0)
    }

    /// The functions along the path from the root to `node`, inclusive.
    pub fn path_for_node(&self, node: CallNodeIndex) -> CallNodePath {
        let mut path = Vec::with_capacity(self.depth[node.0] + 1);
        let mut cur = Some(node);
        while let Some(n) = cur {
            path.push(self.func[n.0]);
            cur = self.prefix[n.0];
        }
        path.reverse();
        path
    }

    /// The call node at `path`, or `None` if no node matches it.
    pub fn node_for_path(&self, path: &[FuncIndex]) -> Option<CallNodeIndex> {
        let mut cur: Option<CallNodeIndex> = None;
        for &func in path {
            cur = Some(CallNodeIndex(
                (0..self.len())
                    .find(|&i| self.prefix[i] == cur && self.func[i] == func)?,
            ));
        }
        cur
    }
}

/// A [`CallNodeTable`] together with the total mapping from stack rows to
/// the call nodes they collapsed onto.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallNodeInfo {
    /// The deduplicated tree.
    pub table: CallNodeTable,
    /// `stack_to_node[i]` is the call node stack row `i` collapsed onto.
    pub stack_to_node: Vec<CallNodeIndex>,
}

/// Collapses a stack table into a call-node table.
///
/// Stacks are visited in index order, which the `prefix < self` invariant
/// guarantees is parent-before-child, so each row's parent call node is
/// already known when the row is reached. When several stacks merge onto one
/// call node and their frames disagree, the category falls back to
/// `default_category` (the subcategory to 0 when only it disagrees) and the
/// inlining marker becomes [`InlinedInto::Divergent`].
///
/// An empty stack table yields an empty call-node table; that is "no data",
/// not an error.
pub fn compute_call_node_info(
    stacks: &StackTable,
    frames: &FrameTable,
    default_category: CategoryIndex,
) -> CallNodeInfo {
    let mut table = CallNodeTable::default();
    let mut stack_to_node = Vec::with_capacity(stacks.len());
    let mut index: AHashMap<(Option<CallNodeIndex>, FuncIndex), CallNodeIndex> =
        AHashMap::with_capacity(stacks.len());

    for i in 0..stacks.len() {
        let parent = stacks.prefix[i].map(|p| {
            assert!(p.0 < i, "stack table is not in parent-before-child order");
            stack_to_node[p.0]
        });
        let frame = stacks.frame[i];
        let func = frames.func[frame.0];
        let category = frames.category[frame.0];
        let subcategory = frames.subcategory[frame.0];
        let inlined_into = match frames.inline_into[frame.0] {
            Some(symbol) => InlinedInto::Symbol(symbol),
            None => InlinedInto::No,
        };

        let node = match index.get(&(parent, func)) {
            Some(&node) => {
                // Another stack already produced this (parent, func) pair;
                // reconcile the frame metadata.
                if table.category[node.0] != category {
                    table.category[node.0] = default_category;
                    table.subcategory[node.0] = 0;
                } else if table.subcategory[node.0] != subcategory {
                    table.subcategory[node.0] = 0;
                }
                if table.inlined_into[node.0] != inlined_into {
                    table.inlined_into[node.0] = InlinedInto::Divergent;
                }
                node
            }
            None => {
                let node = CallNodeIndex(table.len());
                table.prefix.push(parent);
                table.func.push(func);
                table.category.push(category);
                table.subcategory.push(subcategory);
                table
                    .depth
                    .push(parent.map_or(0, |p| table.depth[p.0] + 1));
                table.inlined_into.push(inlined_into);
                index.insert((parent, func), node);
                node
            }
        };
        stack_to_node.push(node);
    }

    CallNodeInfo {
        table,
        stack_to_node,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::FrameIndex;

    fn frame_table(funcs: &[usize]) -> FrameTable {
        let mut frames = FrameTable::default();
        for &f in funcs {
            frames.push(FuncIndex(f), CategoryIndex(0), 0, None);
        }
        frames
    }

    #[test]
    fn empty_stack_table_yields_empty_call_nodes() {
        let info = compute_call_node_info(
            &StackTable::default(),
            &FrameTable::default(),
            CategoryIndex(0),
        );
        assert!(info.table.is_empty());
        assert!(info.stack_to_node.is_empty());
        assert_eq!(info.table.max_depth(), 0);
    }

    #[test]
    fn merges_stacks_with_same_parent_and_func() {
        // Two frames for func 1 (differing metadata elsewhere), under a
        // shared root.
        let frames = frame_table(&[0, 1, 1]);
        let mut stacks = StackTable::default();
        let root = stacks.push(None, FrameIndex(0));
        stacks.push(Some(root), FrameIndex(1));
        stacks.push(Some(root), FrameIndex(2));

        let info = compute_call_node_info(&stacks, &frames, CategoryIndex(0));
        assert_eq!(info.table.len(), 2);
        assert_eq!(info.stack_to_node[1], info.stack_to_node[2]);
        assert_eq!(info.table.depth, vec![0, 1]);
    }

    #[test]
    fn divergent_inlining_is_marked() {
        let mut frames = FrameTable::default();
        frames.push(FuncIndex(0), CategoryIndex(0), 0, None);
        frames.push(FuncIndex(1), CategoryIndex(0), 0, Some(NativeSymbolIndex(0)));
        frames.push(FuncIndex(1), CategoryIndex(0), 0, None);
        let mut stacks = StackTable::default();
        let root = stacks.push(None, FrameIndex(0));
        stacks.push(Some(root), FrameIndex(1));
        stacks.push(Some(root), FrameIndex(2));

        let info = compute_call_node_info(&stacks, &frames, CategoryIndex(0));
        assert_eq!(info.table.inlined_into[1], InlinedInto::Divergent);
    }

    #[test]
    fn category_disagreement_falls_back_to_default() {
        let mut frames = FrameTable::default();
        frames.push(FuncIndex(0), CategoryIndex(1), 0, None);
        frames.push(FuncIndex(0), CategoryIndex(2), 0, None);
        let mut stacks = StackTable::default();
        stacks.push(None, FrameIndex(0));
        stacks.push(None, FrameIndex(1));

        let info = compute_call_node_info(&stacks, &frames, CategoryIndex(7));
        assert_eq!(info.table.len(), 1);
        assert_eq!(info.table.category[0], CategoryIndex(7));
    }

    #[test]
    fn path_round_trips() {
        let frames = frame_table(&[0, 1, 2]);
        let mut stacks = StackTable::default();
        let a = stacks.push(None, FrameIndex(0));
        let b = stacks.push(Some(a), FrameIndex(1));
        stacks.push(Some(b), FrameIndex(2));

        let info = compute_call_node_info(&stacks, &frames, CategoryIndex(0));
        let leaf = info.stack_to_node[2];
        let path = info.table.path_for_node(leaf);
        assert_eq!(path, vec![FuncIndex(0), FuncIndex(1), FuncIndex(2)]);
        assert_eq!(info.table.node_for_path(&path), Some(leaf));
        assert_eq!(info.table.node_for_path(&[FuncIndex(5)]), None);
    }
}
