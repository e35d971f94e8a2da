//! The transform algebra: stack-ordered focus/merge/drop/collapse operations
//! on a thread's call data.
//!
//! A [`TransformStack`] is append/pop-only; replaying it from empty against
//! the raw thread deterministically reproduces the filtered thread, which is
//! what makes the stack's canonical string form (see [`mod@encode`]) safe to
//! put in a URL.
//!
//! Each transform applies as a pure `(&Thread) → Thread` rewrite of the
//! stack/frame/func tables. All rewrites preserve the stack table's
//! `prefix < self` ordering and remap samples through
//! [`update_thread_stacks`](crate::filter::update_thread_stacks).

use crate::callnode::CallNodePath;
use crate::filter::{filter_stacks_by_frame, update_thread_stacks, ImplementationFilter};
use crate::profile::{
    CategoryIndex, FuncIndex, ResourceIndex, StackBuilder, StackIndex, Thread,
};

mod encode;

pub use encode::TransformParseError;

/// One reshaping operation on a thread's call data.
///
/// Variants carry exactly the data needed to replay them; call-node paths
/// rather than node indices, so a transform recorded against one call-node
/// table stays meaningful after the table is rebuilt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transform {
    /// Keep only the subtree rooted at `path`; the path's leaf becomes a
    /// root.
    FocusSubtree {
        /// The call-node path from the root, in the view the transform was
        /// recorded in.
        path: CallNodePath,
        /// The implementation filter that view had applied; frames it hides
        /// are skipped when matching the path.
        implementation: ImplementationFilter,
        /// Whether the path was recorded in an inverted view. An inverted
        /// path is leaf-first and selects samples whose stack *ends* with
        /// it.
        inverted: bool,
    },
    /// Keep only paths containing `func`, re-rooted at its first occurrence.
    FocusFunction {
        /// The function to focus.
        func: FuncIndex,
    },
    /// Keep only frames of one category, splicing other frames out.
    FocusCategory {
        /// The category to focus.
        category: CategoryIndex,
    },
    /// Splice the single call node at `path` out of the tree, reattaching
    /// its children to its parent.
    MergeCallNode {
        /// The call-node path of the node to merge away.
        path: CallNodePath,
        /// The implementation filter of the recording view.
        implementation: ImplementationFilter,
    },
    /// Splice every occurrence of `func` out of every path.
    MergeFunction {
        /// The function to merge away.
        func: FuncIndex,
    },
    /// Drop every sample whose path contains `func`.
    DropFunction {
        /// The function whose samples are dropped.
        func: FuncIndex,
    },
    /// Rewrite every func belonging to `resource` into one synthetic func,
    /// collapsing the resource's internals to a single tree node.
    CollapseResource {
        /// The resource to collapse.
        resource: ResourceIndex,
        /// The index the synthetic func gets; recorded so that later
        /// transforms can refer to it stably.
        collapsed_func: FuncIndex,
        /// The implementation filter of the recording view; decides whether
        /// the synthetic func counts as JS.
        implementation: ImplementationFilter,
    },
    /// Collapse contiguous self-recursion of `func` (`A→A→A` becomes one
    /// `A`).
    CollapseDirectRecursion {
        /// The recursing function.
        func: FuncIndex,
        /// The implementation filter of the recording view; frames it hides
        /// are swallowed into the run so the run stays contiguous in that
        /// view.
        implementation: ImplementationFilter,
    },
    /// Collapse recursion of `func` through intermediate calls (`A→B→A`
    /// keeps `B` but merges the second `A` into it).
    CollapseIndirectRecursion {
        /// The recursing function.
        func: FuncIndex,
        /// The implementation filter of the recording view.
        implementation: ImplementationFilter,
    },
    /// Collapse everything below `func` into the `func` node itself.
    CollapseFunctionSubtree {
        /// The function whose subtree is collapsed.
        func: FuncIndex,
    },
}

/// An ordered, append/pop-only list of transforms for one thread.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransformStack {
    transforms: Vec<Transform>,
}

impl TransformStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Default::default()
    }

    /// The transforms, oldest first.
    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    /// The number of transforms.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Whether the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Appends a transform. It will operate on the thread *after* all
    /// previously pushed transforms.
    pub fn push(&mut self, transform: Transform) {
        self.transforms.push(transform);
    }

    /// Truncates the stack to `len` transforms, undoing everything pushed
    /// after that point. There is no reordering or random removal.
    pub fn pop_until(&mut self, len: usize) {
        self.transforms.truncate(len);
    }

    /// Applies all transforms to `thread` in list order. An empty stack
    /// returns the thread unchanged.
    pub fn apply(&self, thread: &Thread) -> Thread {
        let mut thread = thread.clone();
        for transform in &self.transforms {
            thread = apply_transform(&thread, transform);
        }
        thread
    }
}

/// Applies one transform to a thread.
///
/// A transform whose embedded func/resource/category index is out of range
/// for this thread (a stale or corrupt URL entry) is skipped with a warning;
/// losing one cosmetic filter is much cheaper than losing the whole view.
pub fn apply_transform(thread: &Thread, transform: &Transform) -> Thread {
    if let Some(func) = transform_func(transform) {
        // collapse-resource appends its synthetic func, so an index one past
        // the end is valid for it
        let limit = match transform {
            Transform::CollapseResource { .. } => thread.funcs.len() + 1,
            _ => thread.funcs.len(),
        };
        if func.0 >= limit {
            warn!(
                "skipping transform {:?}: func index {} is out of range",
                transform, func.0
            );
            return thread.clone();
        }
    }
    match transform {
        Transform::FocusSubtree { path, .. } | Transform::MergeCallNode { path, .. } => {
            if let Some(func) = path.iter().find(|func| func.0 >= thread.funcs.len()) {
                warn!(
                    "skipping transform {:?}: func index {} is out of range",
                    transform, func.0
                );
                return thread.clone();
            }
        }
        Transform::FocusCategory { category } => {
            // the thread has no category list of its own, so "in range" means
            // "some frame carries it"
            if !thread.frames.category.contains(category) {
                warn!(
                    "skipping transform {:?}: category index {} is out of range",
                    transform, category.0
                );
                return thread.clone();
            }
        }
        _ => {}
    }
    match transform {
        Transform::FocusSubtree {
            path,
            implementation,
            inverted: false,
        } => focus_subtree(thread, path, *implementation),
        Transform::FocusSubtree {
            path,
            inverted: true,
            ..
        } => focus_inverted_subtree(thread, path),
        Transform::FocusFunction { func } => focus_function(thread, *func),
        Transform::FocusCategory { category } => focus_category(thread, *category),
        Transform::MergeCallNode {
            path,
            implementation,
        } => merge_call_node(thread, path, *implementation),
        Transform::MergeFunction { func } => merge_function(thread, *func),
        Transform::DropFunction { func } => drop_function(thread, *func),
        Transform::CollapseResource {
            resource,
            collapsed_func,
            implementation,
        } => collapse_resource(thread, *resource, *collapsed_func, *implementation),
        Transform::CollapseDirectRecursion {
            func,
            implementation,
        } => collapse_direct_recursion(thread, *func, *implementation),
        Transform::CollapseIndirectRecursion { func, .. } => {
            collapse_indirect_recursion(thread, *func)
        }
        Transform::CollapseFunctionSubtree { func } => collapse_function_subtree(thread, *func),
    }
}

// The func index a transform refers to, for range validation.
fn transform_func(transform: &Transform) -> Option<FuncIndex> {
    match *transform {
        Transform::FocusFunction { func }
        | Transform::MergeFunction { func }
        | Transform::DropFunction { func }
        | Transform::CollapseDirectRecursion { func, .. }
        | Transform::CollapseIndirectRecursion { func, .. }
        | Transform::CollapseFunctionSubtree { func } => Some(func),
        Transform::CollapseResource { collapsed_func, .. } => Some(collapsed_func),
        _ => None,
    }
}

// Per-stack progress while matching a call-node path from the root.
#[derive(Copy, Clone, PartialEq)]
enum PathMatch {
    // The chain diverged from the path; no descendant can match.
    Dead,
    // The chain has matched this many leading path funcs.
    Matching(usize),
    // The chain has matched the whole path.
    Complete,
}

fn focus_subtree(
    thread: &Thread,
    path: &[FuncIndex],
    implementation: ImplementationFilter,
) -> Thread {
    if path.is_empty() {
        return thread.clone();
    }
    let stacks = &thread.stacks;
    let mut builder = StackBuilder::new();
    let mut old_to_new: Vec<Option<StackIndex>> = Vec::with_capacity(stacks.len());
    let mut state: Vec<PathMatch> = Vec::with_capacity(stacks.len());
    for i in 0..stacks.len() {
        let parent_state = stacks.prefix[i].map_or(PathMatch::Matching(0), |p| state[p.0]);
        let func = thread.frames.func[stacks.frame[i].0];
        let next = match parent_state {
            PathMatch::Dead => PathMatch::Dead,
            PathMatch::Complete => PathMatch::Complete,
            PathMatch::Matching(k) => {
                if !implementation.keeps(&thread.funcs, func) {
                    // hidden in the recording view; does not consume a path
                    // entry
                    PathMatch::Matching(k)
                } else if path.get(k) == Some(&func) {
                    if k + 1 == path.len() {
                        PathMatch::Complete
                    } else {
                        PathMatch::Matching(k + 1)
                    }
                } else {
                    PathMatch::Dead
                }
            }
        };
        state.push(next);
        old_to_new.push(match next {
            PathMatch::Complete => {
                let new_prefix = match parent_state {
                    PathMatch::Complete => stacks.prefix[i].and_then(|p| old_to_new[p.0]),
                    // this stack completes the path; it becomes a root
                    _ => None,
                };
                Some(builder.stack_for(new_prefix, stacks.frame[i]))
            }
            _ => None,
        });
    }
    update_thread_stacks(thread, builder.finish(), &old_to_new)
}

// The inverted variant keeps whole stacks; it only filters which samples
// survive, namely those whose path *ends* with the (leaf-first) focus path.
fn focus_inverted_subtree(thread: &Thread, path: &[FuncIndex]) -> Thread {
    let stacks = &thread.stacks;
    let mut matches = vec![false; stacks.len()];
    for i in 0..stacks.len() {
        let mut k = 0;
        let mut cur = Some(StackIndex(i));
        while k < path.len() {
            match cur {
                Some(s) if thread.frames.func[stacks.frame[s.0].0] == path[k] => {
                    k += 1;
                    cur = stacks.prefix[s.0];
                }
                _ => break,
            }
        }
        matches[i] = k == path.len();
    }
    let mut out = thread.clone();
    for stack in &mut out.samples.stack {
        *stack = stack.filter(|s| matches[s.0]);
    }
    out
}

fn focus_function(thread: &Thread, func: FuncIndex) -> Thread {
    let stacks = &thread.stacks;
    let mut builder = StackBuilder::new();
    let mut old_to_new: Vec<Option<StackIndex>> = Vec::with_capacity(stacks.len());
    let mut matched: Vec<bool> = Vec::with_capacity(stacks.len());
    for i in 0..stacks.len() {
        let parent_matched = stacks.prefix[i].map_or(false, |p| matched[p.0]);
        let here = parent_matched || thread.frames.func[stacks.frame[i].0] == func;
        matched.push(here);
        old_to_new.push(if here {
            let new_prefix = if parent_matched {
                stacks.prefix[i].and_then(|p| old_to_new[p.0])
            } else {
                // first occurrence on this chain becomes a root
                None
            };
            Some(builder.stack_for(new_prefix, stacks.frame[i]))
        } else {
            None
        });
    }
    update_thread_stacks(thread, builder.finish(), &old_to_new)
}

fn focus_category(thread: &Thread, category: CategoryIndex) -> Thread {
    filter_stacks_by_frame(thread, |frame| thread.frames.category[frame.0] == category)
}

fn merge_call_node(
    thread: &Thread,
    path: &[FuncIndex],
    implementation: ImplementationFilter,
) -> Thread {
    if path.is_empty() {
        return thread.clone();
    }
    let stacks = &thread.stacks;
    let mut builder = StackBuilder::new();
    let mut old_to_new: Vec<Option<StackIndex>> = Vec::with_capacity(stacks.len());
    let mut state: Vec<PathMatch> = Vec::with_capacity(stacks.len());
    for i in 0..stacks.len() {
        let parent_state = stacks.prefix[i].map_or(PathMatch::Matching(0), |p| state[p.0]);
        let func = thread.frames.func[stacks.frame[i].0];
        let new_prefix = stacks.prefix[i].and_then(|p| old_to_new[p.0]);
        let (next, mapped) = match parent_state {
            PathMatch::Dead => (PathMatch::Dead, None),
            PathMatch::Complete => (PathMatch::Complete, None),
            PathMatch::Matching(k) => {
                if !implementation.keeps(&thread.funcs, func) {
                    (PathMatch::Matching(k), None)
                } else if path.get(k) == Some(&func) {
                    if k + 1 == path.len() {
                        // this is the node being merged away: relabel its
                        // descendants onto its parent
                        (PathMatch::Complete, Some(new_prefix))
                    } else {
                        (PathMatch::Matching(k + 1), None)
                    }
                } else {
                    (PathMatch::Dead, None)
                }
            }
        };
        state.push(next);
        old_to_new.push(match mapped {
            Some(merged) => merged,
            None => Some(builder.stack_for(new_prefix, stacks.frame[i])),
        });
    }
    update_thread_stacks(thread, builder.finish(), &old_to_new)
}

fn merge_function(thread: &Thread, func: FuncIndex) -> Thread {
    let stacks = &thread.stacks;
    let mut builder = StackBuilder::new();
    let mut old_to_new: Vec<Option<StackIndex>> = Vec::with_capacity(stacks.len());
    for i in 0..stacks.len() {
        let new_prefix = stacks.prefix[i].and_then(|p| old_to_new[p.0]);
        old_to_new.push(if thread.frames.func[stacks.frame[i].0] == func {
            new_prefix
        } else {
            Some(builder.stack_for(new_prefix, stacks.frame[i]))
        });
    }
    update_thread_stacks(thread, builder.finish(), &old_to_new)
}

fn drop_function(thread: &Thread, func: FuncIndex) -> Thread {
    let stacks = &thread.stacks;
    let mut contains = vec![false; stacks.len()];
    for i in 0..stacks.len() {
        let inherited = stacks.prefix[i].map_or(false, |p| contains[p.0]);
        contains[i] = inherited || thread.frames.func[stacks.frame[i].0] == func;
    }
    let mut out = thread.clone();
    for stack in &mut out.samples.stack {
        *stack = stack.filter(|s| !contains[s.0]);
    }
    out
}

fn collapse_resource(
    thread: &Thread,
    resource: ResourceIndex,
    collapsed_func: FuncIndex,
    implementation: ImplementationFilter,
) -> Thread {
    if resource.0 >= thread.resources.len() {
        warn!(
            "skipping collapse-resource: resource index {} is out of range",
            resource.0
        );
        return thread.clone();
    }

    let mut out = thread.clone();
    if collapsed_func.0 >= out.funcs.len() {
        let name = out.resources.name[resource.0];
        let is_js = implementation == ImplementationFilter::Js;
        out.funcs.push(name, Some(resource), is_js, None, None);
    }
    let collapsed_frame = out
        .frames
        .push(collapsed_func, CategoryIndex(0), 0, None);

    let stacks = &thread.stacks;
    let mut builder = StackBuilder::new();
    let mut old_to_new: Vec<Option<StackIndex>> = Vec::with_capacity(stacks.len());
    // whether a stack is a collapsed node for this resource
    let mut collapsed: Vec<bool> = Vec::with_capacity(stacks.len());
    for i in 0..stacks.len() {
        let func = thread.frames.func[stacks.frame[i].0];
        let in_resource = thread.funcs.resource[func.0] == Some(resource);
        let parent_collapsed = stacks.prefix[i].map_or(false, |p| collapsed[p.0]);
        let new_prefix = stacks.prefix[i].and_then(|p| old_to_new[p.0]);
        if in_resource {
            collapsed.push(true);
            old_to_new.push(Some(if parent_collapsed {
                // consecutive resource frames fold into the parent's
                // collapsed node
                new_prefix.expect("collapsed parent must have produced a stack")
            } else {
                builder.stack_for(new_prefix, collapsed_frame)
            }));
        } else {
            collapsed.push(false);
            old_to_new.push(Some(builder.stack_for(new_prefix, stacks.frame[i])));
        }
    }
    update_thread_stacks(&out, builder.finish(), &old_to_new)
}

fn collapse_direct_recursion(
    thread: &Thread,
    func: FuncIndex,
    implementation: ImplementationFilter,
) -> Thread {
    let stacks = &thread.stacks;
    let mut builder = StackBuilder::new();
    let mut old_to_new: Vec<Option<StackIndex>> = Vec::with_capacity(stacks.len());
    // whether a stack sits inside a (possibly still open) run of `func`
    let mut in_run: Vec<bool> = Vec::with_capacity(stacks.len());
    for i in 0..stacks.len() {
        let this_func = thread.frames.func[stacks.frame[i].0];
        let parent_in_run = stacks.prefix[i].map_or(false, |p| in_run[p.0]);
        let new_prefix = stacks.prefix[i].and_then(|p| old_to_new[p.0]);
        if this_func == func {
            old_to_new.push(Some(if parent_in_run {
                new_prefix.expect("recursion run must have produced a stack")
            } else {
                builder.stack_for(new_prefix, stacks.frame[i])
            }));
            in_run.push(true);
        } else if parent_in_run && !implementation.keeps(&thread.funcs, this_func) {
            // a frame the recording view hides: swallow it so the run stays
            // contiguous in that view
            old_to_new.push(new_prefix);
            in_run.push(true);
        } else {
            old_to_new.push(Some(builder.stack_for(new_prefix, stacks.frame[i])));
            in_run.push(false);
        }
    }
    update_thread_stacks(thread, builder.finish(), &old_to_new)
}

fn collapse_indirect_recursion(thread: &Thread, func: FuncIndex) -> Thread {
    let stacks = &thread.stacks;
    let mut builder = StackBuilder::new();
    let mut old_to_new: Vec<Option<StackIndex>> = Vec::with_capacity(stacks.len());
    let mut seen: Vec<bool> = Vec::with_capacity(stacks.len());
    for i in 0..stacks.len() {
        let this_func = thread.frames.func[stacks.frame[i].0];
        let parent_seen = stacks.prefix[i].map_or(false, |p| seen[p.0]);
        let new_prefix = stacks.prefix[i].and_then(|p| old_to_new[p.0]);
        seen.push(parent_seen || this_func == func);
        old_to_new.push(if this_func == func && parent_seen {
            // a recursive occurrence merges into its parent, keeping the
            // functions in between
            new_prefix
        } else {
            Some(builder.stack_for(new_prefix, stacks.frame[i]))
        });
    }
    update_thread_stacks(thread, builder.finish(), &old_to_new)
}

fn collapse_function_subtree(thread: &Thread, func: FuncIndex) -> Thread {
    let stacks = &thread.stacks;
    let mut builder = StackBuilder::new();
    let mut old_to_new: Vec<Option<StackIndex>> = Vec::with_capacity(stacks.len());
    let mut collapsed: Vec<bool> = Vec::with_capacity(stacks.len());
    for i in 0..stacks.len() {
        let parent_collapsed = stacks.prefix[i].map_or(false, |p| collapsed[p.0]);
        let new_prefix = stacks.prefix[i].and_then(|p| old_to_new[p.0]);
        if parent_collapsed {
            // everything below the func lands on the func's own node
            collapsed.push(true);
            old_to_new.push(new_prefix);
        } else {
            collapsed.push(thread.frames.func[stacks.frame[i].0] == func);
            old_to_new.push(Some(builder.stack_for(new_prefix, stacks.frame[i])));
        }
    }
    update_thread_stacks(thread, builder.finish(), &old_to_new)
}

/// Whether any stack calls `func` directly from `func`, looking through
/// frames the implementation filter hides. Callers use this to decide
/// whether offering [`Transform::CollapseDirectRecursion`] makes sense.
pub fn func_has_direct_recursive_call(
    thread: &Thread,
    implementation: ImplementationFilter,
    func: FuncIndex,
) -> bool {
    let stacks = &thread.stacks;
    // nearest ancestor func the implementation filter keeps
    let mut nearest: Vec<Option<FuncIndex>> = Vec::with_capacity(stacks.len());
    for i in 0..stacks.len() {
        let this_func = thread.frames.func[stacks.frame[i].0];
        let parent_nearest = stacks.prefix[i].and_then(|p| nearest[p.0]);
        if this_func == func && parent_nearest == Some(func) {
            return true;
        }
        nearest.push(if implementation.keeps(&thread.funcs, this_func) {
            Some(this_func)
        } else {
            parent_nearest
        });
    }
    false
}

/// Whether any stack contains `func` more than once on one path.
pub fn func_has_recursive_call(thread: &Thread, func: FuncIndex) -> bool {
    let stacks = &thread.stacks;
    let mut seen: Vec<bool> = Vec::with_capacity(stacks.len());
    for i in 0..stacks.len() {
        let this_func = thread.frames.func[stacks.frame[i].0];
        let parent_seen = stacks.prefix[i].map_or(false, |p| seen[p.0]);
        if this_func == func && parent_seen {
            return true;
        }
        seen.push(parent_seen || this_func == func);
    }
    false
}
