//! Rewriting stored call paths when symbolication changes functions.
//!
//! Symbol information arrives after the fact, as a batch map from old func
//! indices to the funcs that replace them. One func can become several (an
//! address range that turns out to be multiple inlined frames), and the
//! paths the UI holds on to — the selected node, the set of expanded nodes —
//! must be rewritten to stay meaningful against the re-symbolicated tables.

use ahash::AHashMap;

use crate::callnode::{CallNodePath, PathSet};
use crate::profile::FuncIndex;

/// A batch of func substitutions: each old func maps to the ordered funcs
/// that replace it. Funcs absent from the map are unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FuncToFuncsMap {
    map: AHashMap<FuncIndex, Vec<FuncIndex>>,
}

impl FuncToFuncsMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Default::default()
    }

    /// Records that `old` is replaced by `new`, in order.
    ///
    /// Panics if `new` is empty; a func cannot be replaced by nothing.
    pub fn insert(&mut self, old: FuncIndex, new: Vec<FuncIndex>) {
        assert!(!new.is_empty(), "a func must map to at least one func");
        self.map.insert(old, new);
    }

    /// The replacement sequence for `old`, if it has one.
    pub fn get(&self, old: FuncIndex) -> Option<&[FuncIndex]> {
        self.map.get(&old).map(Vec::as_slice)
    }

    /// Whether no substitutions were recorded.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Substitutes funcs along `path`, left to right: mapped funcs are replaced
/// in place by their (possibly longer) replacement sequence, unmapped funcs
/// pass through.
pub fn apply_func_substitution_to_path(map: &FuncToFuncsMap, path: &[FuncIndex]) -> CallNodePath {
    let mut out = Vec::with_capacity(path.len());
    for &func in path {
        match map.get(func) {
            Some(replacement) => out.extend_from_slice(replacement),
            None => out.push(func),
        }
    }
    out
}

/// Substitutes every path in `paths`, and keeps expansion state intact
/// across one-to-many leaf splits.
///
/// When a path's leaf func expands into several frames, the node the path
/// named is now reachable only through newly inserted ancestors. Expansion
/// is stored as an explicit set of paths, not a depth threshold, so those
/// intermediate ancestor paths must be synthesized too; otherwise a
/// previously expanded node would render collapsed after symbolication.
pub fn apply_func_substitution_to_path_set(map: &FuncToFuncsMap, paths: &PathSet) -> PathSet {
    let mut out = PathSet::default();
    for path in paths {
        let substituted = apply_func_substitution_to_path(map, path);
        if let Some((&leaf, prefix)) = path.split_last() {
            if let Some(replacement) = map.get(leaf) {
                if replacement.len() > 1 {
                    // every proper prefix of the expanded leaf becomes an
                    // ancestor path of its own
                    let mut ancestor = apply_func_substitution_to_path(map, prefix);
                    for &func in &replacement[..replacement.len() - 1] {
                        ancestor.push(func);
                        out.insert(ancestor.clone());
                    }
                }
            }
        }
        out.insert(substituted);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(funcs: &[usize]) -> CallNodePath {
        funcs.iter().map(|&f| FuncIndex(f)).collect()
    }

    #[test]
    fn substitutes_in_place_preserving_order() {
        let mut map = FuncToFuncsMap::new();
        map.insert(FuncIndex(7), vec![FuncIndex(7), FuncIndex(9)]);
        assert_eq!(
            apply_func_substitution_to_path(&map, &path(&[1, 7, 3])),
            path(&[1, 7, 9, 3])
        );
        assert_eq!(
            apply_func_substitution_to_path(&map, &path(&[1, 3])),
            path(&[1, 3])
        );
    }

    #[test]
    fn leaf_split_synthesizes_intermediate_ancestors() {
        let mut map = FuncToFuncsMap::new();
        map.insert(FuncIndex(7), vec![FuncIndex(7), FuncIndex(9)]);
        let mut paths = PathSet::default();
        paths.insert(path(&[1, 7]));
        let substituted = apply_func_substitution_to_path_set(&map, &paths);
        let expected: PathSet = [path(&[1, 7, 9]), path(&[1, 7])].into_iter().collect();
        assert_eq!(substituted, expected);
    }

    #[test]
    fn non_leaf_splits_need_no_extra_paths() {
        let mut map = FuncToFuncsMap::new();
        map.insert(FuncIndex(7), vec![FuncIndex(7), FuncIndex(9)]);
        let mut paths = PathSet::default();
        paths.insert(path(&[7, 3]));
        let substituted = apply_func_substitution_to_path_set(&map, &paths);
        // the split func is not the leaf; its expansion sits on the spine of
        // the substituted path already
        let expected: PathSet = [path(&[7, 9, 3])].into_iter().collect();
        assert_eq!(substituted, expected);
    }

    #[test]
    fn three_way_leaf_split() {
        let mut map = FuncToFuncsMap::new();
        map.insert(
            FuncIndex(2),
            vec![FuncIndex(4), FuncIndex(5), FuncIndex(6)],
        );
        let mut paths = PathSet::default();
        paths.insert(path(&[1, 2]));
        let substituted = apply_func_substitution_to_path_set(&map, &paths);
        let expected: PathSet = [path(&[1, 4]), path(&[1, 4, 5]), path(&[1, 4, 5, 6])]
            .into_iter()
            .collect();
        assert_eq!(substituted, expected);
    }
}
