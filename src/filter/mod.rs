//! The thread filter pipeline: pure table-to-table transforms composed in a
//! fixed order.
//!
//! Every stage takes a [`Thread`] by reference and produces a new one; raw
//! profile tables are never mutated. Each stage preserves the stack table's
//! `prefix < self` ordering invariant, so later stages (and the call-node
//! builder) can keep using single-pass algorithms.

use std::hash::{Hash, Hasher};

use crate::profile::{
    FrameIndex, FuncIndex, FuncTable, NativeAllocationsTable, SamplesTable, StackBuilder,
    StackIndex, StackTable, SummaryStrategy, Thread,
};
use crate::transform::TransformStack;

/// Which implementation's frames to keep.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImplementationFilter {
    /// Keep everything.
    #[default]
    Combined,
    /// Keep only JS frames.
    Js,
    /// Keep only native frames.
    Cpp,
}

impl ImplementationFilter {
    /// Whether this filter keeps frames of `func`.
    pub fn keeps(self, funcs: &FuncTable, func: FuncIndex) -> bool {
        match self {
            ImplementationFilter::Combined => true,
            ImplementationFilter::Js => funcs.is_js[func.0],
            ImplementationFilter::Cpp => !funcs.is_js[func.0],
        }
    }
}

/// The pure configuration a derived call tree depends on. Two equal
/// `ViewOptions` over the same thread describe the same tree, which is what
/// makes them usable as a cache key.
#[derive(Clone, Debug, Default)]
pub struct ViewOptions {
    /// Restrict samples to this `[start, end)` time range, in milliseconds.
    pub range: Option<(f64, f64)>,
    /// The implementation filter.
    pub implementation: ImplementationFilter,
    /// Comma-separated search terms; empty means no search filter.
    pub search: String,
    /// Whether to invert all call stacks.
    pub invert: bool,
    /// Which samples-shaped table the call tree summarizes.
    pub strategy: SummaryStrategy,
}

// Range bounds compare by bit pattern, matching `Hash` below; plain f64
// equality would call `0.0` and `-0.0` equal keys that hash differently.
impl PartialEq for ViewOptions {
    fn eq(&self, other: &Self) -> bool {
        let bits =
            |range: Option<(f64, f64)>| range.map(|(start, end)| (start.to_bits(), end.to_bits()));
        bits(self.range) == bits(other.range)
            && self.implementation == other.implementation
            && self.search == other.search
            && self.invert == other.invert
            && self.strategy == other.strategy
    }
}

impl Eq for ViewOptions {}

impl Hash for ViewOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.range {
            Some((start, end)) => {
                state.write_u8(1);
                state.write_u64(start.to_bits());
                state.write_u64(end.to_bits());
            }
            None => state.write_u8(0),
        }
        self.implementation.hash(state);
        self.search.hash(state);
        self.invert.hash(state);
        self.strategy.hash(state);
    }
}

/// Runs the whole pipeline: range filter, transform stack, implementation
/// filter, search filter, invert filter.
pub fn filtered_thread(
    thread: &Thread,
    transforms: &TransformStack,
    options: &ViewOptions,
) -> Thread {
    let mut thread = match options.range {
        Some((start, end)) => filter_samples_to_range(thread, start, end),
        None => thread.clone(),
    };
    if !transforms.is_empty() {
        thread = transforms.apply(&thread);
    }
    if options.implementation != ImplementationFilter::Combined {
        thread = filter_thread_by_implementation(&thread, options.implementation);
    }
    if !options.search.trim().is_empty() {
        thread = filter_samples_by_search(&thread, &options.search);
    }
    if options.invert {
        thread = invert_thread_stacks(&thread);
    }
    thread
}

/// Replaces a thread's stack table, remapping the stack references of the
/// samples table and both allocation tables through `old_to_new`.
///
/// Every stack rewrite in this crate funnels through here so no table's
/// stack references can be left pointing into a stale table.
pub(crate) fn update_thread_stacks(
    thread: &Thread,
    stacks: StackTable,
    old_to_new: &[Option<StackIndex>],
) -> Thread {
    let remap = |samples: &SamplesTable| -> SamplesTable {
        let mut out = samples.clone();
        for stack in &mut out.stack {
            *stack = stack.and_then(|s| old_to_new[s.0]);
        }
        out
    };
    Thread {
        strings: thread.strings.clone(),
        resources: thread.resources.clone(),
        funcs: thread.funcs.clone(),
        native_symbols: thread.native_symbols.clone(),
        frames: thread.frames.clone(),
        stacks,
        samples: remap(&thread.samples),
        js_allocations: thread.js_allocations.as_ref().map(&remap),
        native_allocations: thread
            .native_allocations
            .as_ref()
            .map(|t| NativeAllocationsTable {
                samples: remap(&t.samples),
                memory_address: t.memory_address.clone(),
            }),
    }
}

/// Slices all sample and allocation rows to the `[start, end)` time range.
///
/// Sample times are sorted ascending, so the cut points are two binary
/// searches per table.
pub fn filter_samples_to_range(thread: &Thread, start: f64, end: f64) -> Thread {
    let slice = |samples: &SamplesTable| -> SamplesTable {
        let from = samples.time.partition_point(|&t| t < start);
        let to = samples.time.partition_point(|&t| t < end);
        samples.sliced(from, to)
    };
    let mut out = thread.clone();
    out.samples = slice(&thread.samples);
    out.js_allocations = thread.js_allocations.as_ref().map(&slice);
    out.native_allocations = thread.native_allocations.as_ref().map(|t| {
        let from = t.samples.time.partition_point(|&x| x < start);
        let to = t.samples.time.partition_point(|&x| x < end);
        NativeAllocationsTable {
            samples: t.samples.sliced(from, to),
            memory_address: t.memory_address.as_ref().map(|a| a[from..to].to_vec()),
        }
    });
    out
}

/// Rebuilds the stack table keeping only frames selected by `keep`; dropped
/// frames splice their children onto the nearest kept ancestor, and
/// surviving `(prefix, frame)` duplicates are merged.
pub(crate) fn filter_stacks_by_frame(
    thread: &Thread,
    mut keep: impl FnMut(FrameIndex) -> bool,
) -> Thread {
    let stacks = &thread.stacks;
    let mut builder = StackBuilder::new();
    let mut old_to_new: Vec<Option<StackIndex>> = Vec::with_capacity(stacks.len());
    for i in 0..stacks.len() {
        let new_prefix = stacks.prefix[i].and_then(|p| old_to_new[p.0]);
        let frame = stacks.frame[i];
        old_to_new.push(if keep(frame) {
            Some(builder.stack_for(new_prefix, frame))
        } else {
            new_prefix
        });
    }
    update_thread_stacks(thread, builder.finish(), &old_to_new)
}

/// Applies the implementation filter: `js` keeps only JS frames, `cpp` only
/// native ones. `combined` is the identity and returns a plain clone.
pub fn filter_thread_by_implementation(
    thread: &Thread,
    implementation: ImplementationFilter,
) -> Thread {
    if implementation == ImplementationFilter::Combined {
        return thread.clone();
    }
    filter_stacks_by_frame(thread, |frame| {
        implementation.keeps(&thread.funcs, thread.frames.func[frame.0])
    })
}

/// Applies a search filter: comma-separated terms, AND-combined.
///
/// A term matches a sample when any frame on the sample's path has a
/// function name, file name, or resource name containing it
/// (case-insensitively). Non-matching samples keep their row but lose their
/// stack; the stack table itself is untouched, so node identities survive.
pub fn filter_samples_by_search(thread: &Thread, search: &str) -> Thread {
    let terms: Vec<String> = search
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    if terms.is_empty() {
        return thread.clone();
    }

    // Searchable text per func; the NUL separators keep a term from matching
    // across field boundaries.
    let func_text: Vec<String> = (0..thread.funcs.len())
        .map(|f| {
            let mut text = thread
                .strings
                .get(thread.funcs.name[f])
                .to_lowercase();
            if let Some(file) = thread.funcs.file_name[f] {
                text.push('\0');
                text.push_str(&thread.strings.get(file).to_lowercase());
            }
            if let Some(resource) = thread.funcs.resource[f] {
                text.push('\0');
                text.push_str(
                    &thread
                        .strings
                        .get(thread.resources.name[resource.0])
                        .to_lowercase(),
                );
            }
            text
        })
        .collect();

    let stacks = &thread.stacks;
    let mut matches_all = vec![true; stacks.len()];
    for term in &terms {
        let mut matched = vec![false; stacks.len()];
        for i in 0..stacks.len() {
            let inherited = stacks.prefix[i].map_or(false, |p| matched[p.0]);
            let func = thread.frames.func[stacks.frame[i].0];
            matched[i] = inherited || func_text[func.0].contains(term.as_str());
        }
        for i in 0..stacks.len() {
            matches_all[i] &= matched[i];
        }
    }

    let mut out = thread.clone();
    for stack in &mut out.samples.stack {
        *stack = stack.filter(|s| matches_all[s.0]);
    }
    out
}

/// Rebuilds the stack table so every sample's call path is reversed: leaves
/// become roots. Paths are re-interned through a `(prefix, frame)` map, so
/// reversed paths sharing a suffix share rows.
pub fn invert_thread_stacks(thread: &Thread) -> Thread {
    let stacks = &thread.stacks;
    let mut builder = StackBuilder::new();
    let mut old_to_new: Vec<Option<StackIndex>> = vec![None; stacks.len()];

    let mut referenced: Vec<StackIndex> = Vec::new();
    let mut collect = |samples: &SamplesTable| referenced.extend(samples.stack.iter().flatten());
    collect(&thread.samples);
    if let Some(js) = &thread.js_allocations {
        collect(js);
    }
    if let Some(native) = &thread.native_allocations {
        collect(&native.samples);
    }

    let mut path = Vec::new();
    for stack in referenced {
        if old_to_new[stack.0].is_some() {
            continue;
        }
        path.clear();
        let mut cur = Some(stack);
        while let Some(s) = cur {
            path.push(stacks.frame[s.0]);
            cur = stacks.prefix[s.0];
        }
        // `path` is now leaf-first, which is exactly the inverted root-first
        // order.
        let mut prefix = None;
        for &frame in &path {
            prefix = Some(builder.stack_for(prefix, frame));
        }
        old_to_new[stack.0] = prefix;
    }

    update_thread_stacks(thread, builder.finish(), &old_to_new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::text::profile_from_text_samples;

    fn thread_of(text: &str) -> Thread {
        profile_from_text_samples(text).unwrap().threads.remove(0)
    }

    #[test]
    fn range_filter_slices_samples() {
        let thread = thread_of("A A A A\nB B C B\n");
        let filtered = filter_samples_to_range(&thread, 1.0, 3.0);
        assert_eq!(filtered.samples.len(), 2);
        assert_eq!(filtered.samples.time, vec![1.0, 2.0]);
        // stack table is untouched by the range filter
        assert_eq!(filtered.stacks, thread.stacks);
    }

    #[test]
    fn search_filter_nulls_non_matching_samples() {
        let thread = thread_of("A  A\nB  C\n");
        let filtered = filter_samples_by_search(&thread, "b");
        assert!(filtered.samples.stack[0].is_some());
        assert!(filtered.samples.stack[1].is_none());
        // terms are AND-combined
        let filtered = filter_samples_by_search(&thread, "a, c");
        assert!(filtered.samples.stack[0].is_none());
        assert!(filtered.samples.stack[1].is_some());
    }

    #[test]
    fn implementation_filter_splices_dropped_frames() {
        let thread = thread_of("A      A\nrun.js run.js\nC      D\n");
        let js = filter_thread_by_implementation(&thread, ImplementationFilter::Js);
        // only run.js remains; both samples collapse onto the same stack
        assert_eq!(js.samples.stack[0], js.samples.stack[1]);
        let stack = js.samples.stack[0].unwrap();
        assert_eq!(js.stacks.prefix[stack.0], None);

        let cpp = filter_thread_by_implementation(&thread, ImplementationFilter::Cpp);
        // A→C and A→D, sharing the A row
        let s0 = cpp.samples.stack[0].unwrap();
        let s1 = cpp.samples.stack[1].unwrap();
        assert_ne!(s0, s1);
        assert_eq!(cpp.stacks.prefix[s0.0], cpp.stacks.prefix[s1.0]);
    }

    #[test]
    fn inverting_reverses_paths() {
        let thread = thread_of("A A\nB B\nC D\n");
        let inverted = invert_thread_stacks(&thread);
        let leaf = inverted.samples.stack[0].unwrap();
        // the inverted path is C→B→A, so the sample's node is the A end
        let mut names = Vec::new();
        let mut cur = Some(leaf);
        while let Some(s) = cur {
            let func = inverted.frames.func[inverted.stacks.frame[s.0].0];
            names.push(inverted.strings.get(inverted.funcs.name[func.0]).to_string());
            cur = inverted.stacks.prefix[s.0];
        }
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn view_options_hash_covers_the_range() {
        use std::collections::hash_map::DefaultHasher;
        let mut a = ViewOptions::default();
        let mut b = ViewOptions::default();
        a.range = Some((0.0, 1.0));
        b.range = Some((0.0, 2.0));
        let hash = |v: &ViewOptions| {
            let mut h = DefaultHasher::new();
            v.hash(&mut h);
            h.finish()
        };
        assert_ne!(hash(&a), hash(&b));
        assert_eq!(hash(&a), hash(&a.clone()));
    }

    #[test]
    fn view_options_equality_matches_the_hash() {
        use std::collections::hash_map::DefaultHasher;
        let hash = |v: &ViewOptions| {
            let mut h = DefaultHasher::new();
            v.hash(&mut h);
            h.finish()
        };
        let positive_zero = ViewOptions {
            range: Some((0.0, 1.0)),
            ..Default::default()
        };
        let negative_zero = ViewOptions {
            range: Some((-0.0, 1.0)),
            ..Default::default()
        };
        // distinct keys both ways, never equal-but-hashing-differently
        assert_ne!(positive_zero, negative_zero);
        assert_ne!(hash(&positive_zero), hash(&negative_zero));
        assert_eq!(positive_zero, positive_zero.clone());
    }
}
