//! The read-only query surface over a call-node table and its summary.
//!
//! A [`CallTree`] is created once per (filtered thread, view settings)
//! combination and never mutated; re-filtering builds a new tree. The lazily
//! built children index and per-node display data live in explicit memo
//! tables owned by the tree, populated on first access.

use std::cell::RefCell;
use std::cmp::Ordering;

use ahash::AHashMap;
use num_format::Locale;

use crate::callnode::summary::{compute_call_tree_counts_and_summary, CallTreeCountsAndSummary};
use crate::callnode::{compute_call_node_info, CallNodeInfo, CallNodePath, InlinedInto};
use crate::profile::{
    samples_for_strategy, CallNodeIndex, CategoryIndex, CategoryList, SummaryStrategy, Thread,
    WeightType,
};

/// Everything a row renderer needs to draw one call node, formatted once and
/// memoized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayData {
    /// The function's name.
    pub name: String,
    /// Where the function comes from: its resource name, or its file (and
    /// line) for JS functions.
    pub origin: Option<String>,
    /// An inlining badge, when the node's frames were inlined.
    pub badge: Option<String>,
    /// The node's category name.
    pub category_name: String,
    /// The node's category color.
    pub category_color: String,
    /// The formatted inclusive weight, or `—` when zero.
    pub total: String,
    /// The inclusive weight as a percentage of the root total.
    pub total_percent: String,
    /// The formatted self weight, or `—` when zero.
    pub self_weight: String,
    /// Milliseconds estimate of the inclusive weight (sample-count trees
    /// only).
    pub total_ms: Option<String>,
    /// Milliseconds estimate of the self weight (sample-count trees only).
    pub self_ms: Option<String>,
}

// Roots and per-node child lists, each sorted by the tree ordering. Built on
// first access.
#[derive(Debug)]
struct ChildrenIndex {
    roots: Vec<CallNodeIndex>,
    children: Vec<Vec<CallNodeIndex>>,
}

/// An immutable call tree over one filtered thread.
///
/// All indices handed to the query methods must come from this tree; an
/// out-of-range index is a programming error and panics.
#[derive(Debug)]
pub struct CallTree {
    thread: Thread,
    categories: CategoryList,
    interval: f64,
    inverted: bool,
    weight_type: WeightType,
    info: CallNodeInfo,
    summary: CallTreeCountsAndSummary,
    children_index: RefCell<Option<ChildrenIndex>>,
    display_memo: RefCell<AHashMap<CallNodeIndex, DisplayData>>,
}

/// Builds the call tree for an already-filtered thread.
///
/// Selects the samples table for `strategy` (with the documented fallbacks),
/// collapses the stack table into call nodes, and aggregates the summary.
/// `inverted` must match whether the filter pipeline inverted the thread's
/// call paths.
pub fn compute_call_tree(
    thread: Thread,
    categories: &CategoryList,
    interval: f64,
    default_category: CategoryIndex,
    strategy: SummaryStrategy,
    inverted: bool,
) -> CallTree {
    let info = compute_call_node_info(&thread.stacks, &thread.frames, default_category);
    let (summary, weight_type) = {
        let samples = samples_for_strategy(&thread, strategy);
        (
            compute_call_tree_counts_and_summary(&samples, &info, inverted),
            samples.weight_type,
        )
    };
    CallTree {
        thread,
        categories: categories.clone(),
        interval,
        inverted,
        weight_type,
        info,
        summary,
        children_index: RefCell::new(None),
        display_memo: RefCell::new(AHashMap::new()),
    }
}

impl CallTree {
    /// The number of call nodes, including invisible zero-weight ones.
    pub fn len(&self) -> usize {
        self.info.table.len()
    }

    /// Whether the tree has no call nodes at all.
    pub fn is_empty(&self) -> bool {
        self.info.table.is_empty()
    }

    /// The filtered thread this tree was built over.
    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    /// The call-node table and stack mapping this tree was built from.
    pub fn info(&self) -> &CallNodeInfo {
        &self.info
    }

    /// The per-node weight summary.
    pub fn summary(&self) -> &CallTreeCountsAndSummary {
        &self.summary
    }

    /// Whether this tree is over inverted call paths.
    pub fn inverted(&self) -> bool {
        self.inverted
    }

    /// How this tree's weights are interpreted.
    pub fn weight_type(&self) -> WeightType {
        self.weight_type
    }

    /// The visible roots, heaviest first.
    pub fn roots(&self) -> Vec<CallNodeIndex> {
        self.with_children_index(|index| index.roots.clone())
    }

    /// `node`'s visible children, heaviest first.
    ///
    /// The order is deterministic: descending absolute total, with
    /// non-negative totals before negative ones of equal magnitude, then
    /// ascending node index. Keyboard navigation relies on "first child"
    /// meaning "heaviest child".
    pub fn children(&self, node: CallNodeIndex) -> Vec<CallNodeIndex> {
        self.with_children_index(|index| index.children[node.0].clone())
    }

    /// Whether `node` has any visible children.
    pub fn has_children(&self, node: CallNodeIndex) -> bool {
        self.summary.child_count[node.0] > 0
    }

    /// `node`'s parent, or `None` for a root.
    pub fn parent(&self, node: CallNodeIndex) -> Option<CallNodeIndex> {
        self.info.table.prefix[node.0]
    }

    /// `node`'s depth; roots are at depth 0.
    pub fn depth(&self, node: CallNodeIndex) -> usize {
        self.info.table.depth[node.0]
    }

    /// `node`'s function.
    pub fn func(&self, node: CallNodeIndex) -> crate::profile::FuncIndex {
        self.info.table.func[node.0]
    }

    /// `node`'s function name.
    pub fn func_name(&self, node: CallNodeIndex) -> &str {
        let func = self.info.table.func[node.0];
        self.thread.strings.get(self.thread.funcs.name[func.0])
    }

    /// `node`'s inclusive weight.
    pub fn node_total(&self, node: CallNodeIndex) -> f64 {
        self.summary.total[node.0]
    }

    /// `node`'s self weight.
    pub fn node_self(&self, node: CallNodeIndex) -> f64 {
        self.summary.self_weight[node.0]
    }

    /// Every visible node in `node`'s subtree, excluding `node` itself.
    ///
    /// Iterative rather than recursive: profiles routinely contain recursion
    /// thousands of frames deep.
    pub fn all_descendants(&self, node: CallNodeIndex) -> ahash::AHashSet<CallNodeIndex> {
        let mut descendants = ahash::AHashSet::new();
        let mut pending = vec![node];
        while let Some(next) = pending.pop() {
            for child in self.children(next) {
                descendants.insert(child);
                pending.push(child);
            }
        }
        descendants
    }

    /// The call node at `path`, or `None` if this tree has no such node.
    pub fn node_for_path(&self, path: &CallNodePath) -> Option<CallNodeIndex> {
        self.info.table.node_for_path(path)
    }

    /// The structural path naming `node`.
    pub fn path_for_node(&self, node: CallNodeIndex) -> CallNodePath {
        self.info.table.path_for_node(node)
    }

    /// The formatted display row for `node`, computed once and memoized.
    pub fn display_data(&self, node: CallNodeIndex) -> DisplayData {
        if let Some(data) = self.display_memo.borrow().get(&node) {
            return data.clone();
        }
        let data = self.compute_display_data(node);
        self.display_memo.borrow_mut().insert(node, data.clone());
        data
    }

    /// A stable textual identity for `node` within one tree level: the
    /// function's name plus its origin. Used for cross-profile alignment,
    /// where numeric func indices are meaningless.
    pub(crate) fn origin_annotation(&self, node: CallNodeIndex) -> String {
        match self.origin(node) {
            Some(origin) => format!("{} {}", self.func_name(node), origin),
            None => self.func_name(node).to_string(),
        }
    }

    fn origin(&self, node: CallNodeIndex) -> Option<String> {
        let func = self.info.table.func[node.0];
        if let Some(resource) = self.thread.funcs.resource[func.0] {
            let name = self.thread.resources.name[resource.0];
            return Some(self.thread.strings.get(name).to_string());
        }
        let file = self.thread.funcs.file_name[func.0]?;
        let file = self.thread.strings.get(file);
        Some(match self.thread.funcs.line_number[func.0] {
            Some(line) => format!("{}:{}", file, line),
            None => file.to_string(),
        })
    }

    fn compute_display_data(&self, node: CallNodeIndex) -> DisplayData {
        let category = &self.categories[self.info.table.category[node.0].0];
        let badge = match self.info.table.inlined_into[node.0] {
            InlinedInto::No => None,
            InlinedInto::Symbol(symbol) => {
                let name = self.thread.native_symbols.name[symbol.0];
                Some(format!("inlined into {}", self.thread.strings.get(name)))
            }
            InlinedInto::Divergent => Some("inlined".to_string()),
        };
        let total = self.summary.total[node.0];
        let self_weight = self.summary.self_weight[node.0];
        let (total_text, total_ms) = self.format_weight(total);
        let (self_text, self_ms) = self.format_weight(self_weight);
        DisplayData {
            name: self.func_name(node).to_string(),
            origin: self.origin(node),
            badge,
            category_name: category.name.clone(),
            category_color: category.color.clone(),
            total: total_text,
            total_percent: self.format_percent(total),
            self_weight: self_text,
            total_ms,
            self_ms,
        }
    }

    fn format_percent(&self, weight: f64) -> String {
        if self.summary.root_total == 0.0 {
            return "0.0%".to_string();
        }
        format!("{:.1}%", 100.0 * weight / self.summary.root_total)
    }

    fn format_weight(&self, weight: f64) -> (String, Option<String>) {
        if weight == 0.0 {
            return ("—".to_string(), None);
        }
        let mut count = num_format::Buffer::default();
        match self.weight_type {
            WeightType::Samples => {
                let _ = count.write_formatted(&(weight.round() as i64), &Locale::en);
                (
                    count.as_str().to_string(),
                    Some(format!("{:.1}ms", weight * self.interval)),
                )
            }
            WeightType::TracingMs => (format!("{:.1}ms", weight), None),
            WeightType::Bytes => {
                let _ = count.write_formatted(&(weight.round() as i64), &Locale::en);
                (format!("{}B", count.as_str()), None)
            }
        }
    }

    fn with_children_index<T>(&self, f: impl FnOnce(&ChildrenIndex) -> T) -> T {
        let mut slot = self.children_index.borrow_mut();
        let index = slot.get_or_insert_with(|| self.build_children_index());
        f(index)
    }

    fn build_children_index(&self) -> ChildrenIndex {
        let table = &self.info.table;
        let mut roots = Vec::with_capacity(self.summary.root_count);
        let mut children: Vec<Vec<CallNodeIndex>> = vec![Vec::new(); table.len()];
        for i in 0..table.len() {
            if self.summary.total[i] == 0.0 && self.summary.child_count[i] == 0 {
                continue;
            }
            match table.prefix[i] {
                Some(p) => children[p.0].push(CallNodeIndex(i)),
                None => roots.push(CallNodeIndex(i)),
            }
        }
        let total = &self.summary.total;
        roots.sort_by(|&a, &b| cmp_by_total(total, a, b));
        for list in &mut children {
            list.sort_by(|&a, &b| cmp_by_total(total, a, b));
        }
        ChildrenIndex { roots, children }
    }
}

// Descending |total|; non-negative before negative on equal magnitude; then
// ascending index so the order is total for a fixed input.
fn cmp_by_total(total: &[f64], a: CallNodeIndex, b: CallNodeIndex) -> Ordering {
    let (ta, tb) = (total[a.0], total[b.0]);
    tb.abs()
        .partial_cmp(&ta.abs())
        .unwrap_or(Ordering::Equal)
        .then_with(|| (ta < 0.0).cmp(&(tb < 0.0)))
        .then_with(|| a.0.cmp(&b.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::CallNodeIndex;

    #[test]
    fn ordering_prefers_heavy_then_positive_then_low_index() {
        let total = vec![5.0, -5.0, 2.0, -8.0, 5.0];
        let mut nodes: Vec<CallNodeIndex> = (0..5).map(CallNodeIndex).collect();
        nodes.sort_by(|&a, &b| cmp_by_total(&total, a, b));
        let order: Vec<usize> = nodes.into_iter().map(|n| n.0).collect();
        assert_eq!(order, vec![3, 0, 4, 1, 2]);
    }
}
