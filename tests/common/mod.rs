#![allow(dead_code)]

use smolder::calltree::{compute_call_tree, CallTree};
use smolder::filter::{filtered_thread, ViewOptions};
use smolder::profile::text::profile_from_text_samples;
use smolder::profile::{CallNodeIndex, FuncIndex, Profile, Thread};
use smolder::transform::TransformStack;

/// Builds a profile from a text diagram, panicking on malformed input.
pub fn profile(text: &str) -> Profile {
    profile_from_text_samples(text).unwrap()
}

/// Runs the filter pipeline and builds the call tree for thread 0.
pub fn tree_with(profile: &Profile, transforms: &TransformStack, options: &ViewOptions) -> CallTree {
    let thread = filtered_thread(&profile.threads[0], transforms, options);
    compute_call_tree(
        thread,
        &profile.categories,
        profile.interval,
        profile.default_category(),
        options.strategy,
        options.invert,
    )
}

/// The unfiltered call tree of a text diagram.
pub fn tree(text: &str) -> CallTree {
    let profile = profile(text);
    tree_with(&profile, &TransformStack::new(), &ViewOptions::default())
}

/// Looks a function up by name in a thread's tables.
pub fn func_index(thread: &Thread, name: &str) -> FuncIndex {
    (0..thread.funcs.len())
        .map(FuncIndex)
        .find(|&f| thread.strings.get(thread.funcs.name[f.0]) == name)
        .unwrap_or_else(|| panic!("no func named {:?}", name))
}

/// The function names of `nodes` in order.
pub fn names(tree: &CallTree, nodes: &[CallNodeIndex]) -> Vec<String> {
    nodes
        .iter()
        .map(|&n| tree.func_name(n).to_string())
        .collect()
}

/// Renders the whole visible tree as indented `name:self/total` lines, which
/// makes expected shapes easy to read in assertions.
pub fn render(tree: &CallTree) -> String {
    let mut out = String::new();
    let mut pending = tree.roots();
    pending.reverse();
    while let Some(node) = pending.pop() {
        out.push_str(&"  ".repeat(tree.depth(node)));
        out.push_str(&format!(
            "{}:{}/{}\n",
            tree.func_name(node),
            tree.node_self(node),
            tree.node_total(node)
        ));
        let mut children = tree.children(node);
        children.reverse();
        pending.append(&mut children);
    }
    out
}
