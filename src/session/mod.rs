//! An explicit owner for per-thread derived state.
//!
//! Rather than module-level selector caches, everything derived from a
//! profile hangs off one [`Session`]: the per-thread transform stacks and a
//! small LRU of computed call trees keyed by `(thread, view options)`. The
//! cache has a fixed capacity; the least recently used tree is evicted, and
//! editing a thread's transform stack drops that thread's entries.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::calltree::{compute_call_tree, CallTree};
use crate::filter::{filtered_thread, ViewOptions};
use crate::profile::{Profile, ThreadIndex};
use crate::transform::{Transform, TransformStack};

// Distinct (thread, view options) combinations kept alive at once. A view
// flips between a handful of option sets (invert on/off, a search edit);
// eight covers that without hoarding whole threads.
const CACHE_CAPACITY: usize = 8;

/// One loaded profile plus everything derived from it.
pub struct Session {
    profile: Profile,
    transforms: Vec<TransformStack>,
    cache: IndexMap<(ThreadIndex, ViewOptions), Rc<CallTree>>,
}

impl Session {
    /// Creates a session over `profile`.
    pub fn new(profile: Profile) -> Self {
        let transforms = profile.threads.iter().map(|_| TransformStack::new()).collect();
        Session {
            profile,
            transforms,
            cache: IndexMap::with_capacity(CACHE_CAPACITY),
        }
    }

    /// The profile this session owns.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// The transform stack of `thread`.
    pub fn transform_stack(&self, thread: ThreadIndex) -> &TransformStack {
        &self.transforms[thread.0]
    }

    /// Appends a transform to `thread`'s stack, invalidating its cached
    /// trees.
    pub fn push_transform(&mut self, thread: ThreadIndex, transform: Transform) {
        self.transforms[thread.0].push(transform);
        self.invalidate(thread);
    }

    /// Truncates `thread`'s transform stack to `len` entries, invalidating
    /// its cached trees.
    pub fn pop_transforms_until(&mut self, thread: ThreadIndex, len: usize) {
        self.transforms[thread.0].pop_until(len);
        self.invalidate(thread);
    }

    /// Replaces `thread`'s transform stack with the decoded form of `s`
    /// (unrecognized entries are skipped with a warning).
    pub fn set_transforms_from_str(&mut self, thread: ThreadIndex, s: &str) {
        self.transforms[thread.0] = TransformStack::decode(s);
        self.invalidate(thread);
    }

    /// The canonical string form of `thread`'s transform stack.
    pub fn transforms_encoded(&self, thread: ThreadIndex) -> String {
        self.transforms[thread.0].encode()
    }

    /// The call tree for `thread` under `options`, computed or taken from
    /// the LRU cache.
    pub fn call_tree(&mut self, thread: ThreadIndex, options: &ViewOptions) -> Rc<CallTree> {
        let key = (thread, options.clone());
        if let Some(tree) = self.cache.shift_remove(&key) {
            // re-insert at the back: most recently used
            self.cache.insert(key, Rc::clone(&tree));
            return tree;
        }

        let filtered = filtered_thread(
            &self.profile.threads[thread.0],
            &self.transforms[thread.0],
            options,
        );
        let tree = Rc::new(compute_call_tree(
            filtered,
            &self.profile.categories,
            self.profile.interval,
            self.profile.default_category(),
            options.strategy,
            options.invert,
        ));
        if self.cache.len() == CACHE_CAPACITY {
            self.cache.shift_remove_index(0);
        }
        self.cache.insert(key, Rc::clone(&tree));
        tree
    }

    /// How many derived trees are currently cached.
    pub fn cached_tree_count(&self) -> usize {
        self.cache.len()
    }

    fn invalidate(&mut self, thread: ThreadIndex) {
        self.cache.retain(|(t, _), _| *t != thread);
    }
}
