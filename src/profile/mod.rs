//! The columnar tables that make up one recorded profile.
//!
//! A profile is a set of threads, and each thread is a handful of parallel
//! column vectors: an interned [`StringTable`], a [`FuncTable`], a
//! [`FrameTable`], a [`StackTable`] encoding call paths as a prefix tree, and
//! one or more [`SamplesTable`]s recording when each stack was observed.
//!
//! Everything in here is plain data. The engine never mutates a table it did
//! not just construct; filters and transforms produce whole new [`Thread`]
//! values instead.

use std::borrow::Cow;

use ahash::AHashMap;

/// Building [`Profile`]s from small text diagrams, mostly for tests.
pub mod text;

/// Reading folded stack lines (`a;b;c count`) into a [`Profile`].
pub mod folded;

macro_rules! index_type {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub usize);
    };
}

index_type! {
    /// An index into a thread's [`StringTable`].
    StringIndex
}
index_type! {
    /// An index into a thread's [`FuncTable`].
    FuncIndex
}
index_type! {
    /// An index into a thread's [`FrameTable`].
    FrameIndex
}
index_type! {
    /// An index into a thread's [`StackTable`].
    StackIndex
}
index_type! {
    /// An index into a thread's [`ResourceTable`].
    ResourceIndex
}
index_type! {
    /// An index into a profile's category list.
    CategoryIndex
}
index_type! {
    /// An index into a thread's [`NativeSymbolTable`].
    NativeSymbolIndex
}
index_type! {
    /// An index into a derived call-node table.
    CallNodeIndex
}
index_type! {
    /// An index into a profile's thread list.
    ThreadIndex
}

/// An append-only, interned sequence of strings.
///
/// All name-like columns in the other tables hold [`StringIndex`] values into
/// this table. Interning is injective: the same string always yields the same
/// index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StringTable {
    strings: Vec<String>,
    index: AHashMap<String, StringIndex>,
}

impl StringTable {
    /// Creates an empty string table.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the index for `s`, interning it if it has not been seen before.
    pub fn intern(&mut self, s: &str) -> StringIndex {
        match self.index.get(s) {
            Some(&i) => i,
            None => {
                let i = StringIndex(self.strings.len());
                self.strings.push(s.to_string());
                self.index.insert(s.to_string(), i);
                i
            }
        }
    }

    /// Returns the string stored at `i`.
    pub fn get(&self, i: StringIndex) -> &str {
        &self.strings[i.0]
    }

    /// The number of interned strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether no strings have been interned.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// One row per library or script that functions originate from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceTable {
    /// The resource's display name.
    pub name: Vec<StringIndex>,
}

impl ResourceTable {
    /// The number of resources.
    pub fn len(&self) -> usize {
        self.name.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Appends a resource and returns its index.
    pub fn push(&mut self, name: StringIndex) -> ResourceIndex {
        let i = ResourceIndex(self.name.len());
        self.name.push(name);
        i
    }
}

/// One row per native symbol that frames can be inlined into.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NativeSymbolTable {
    /// The symbol's name.
    pub name: Vec<StringIndex>,
}

impl NativeSymbolTable {
    /// The number of native symbols.
    pub fn len(&self) -> usize {
        self.name.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Appends a symbol and returns its index.
    pub fn push(&mut self, name: StringIndex) -> NativeSymbolIndex {
        let i = NativeSymbolIndex(self.name.len());
        self.name.push(name);
        i
    }
}

/// One row per function.
///
/// A new `FuncTable` is produced by any transform that changes functions
/// (e.g. collapsing a resource into one synthetic func); rows are never
/// mutated in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FuncTable {
    /// The function's name.
    pub name: Vec<StringIndex>,
    /// The library or script the function belongs to, if known.
    pub resource: Vec<Option<ResourceIndex>>,
    /// Whether this is a JS function (as opposed to native code).
    pub is_js: Vec<bool>,
    /// The source file the function is defined in, if known.
    pub file_name: Vec<Option<StringIndex>>,
    /// The line the function is defined at, if known.
    pub line_number: Vec<Option<u32>>,
}

impl FuncTable {
    /// The number of functions.
    pub fn len(&self) -> usize {
        self.name.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Appends a function row and returns its index.
    pub fn push(
        &mut self,
        name: StringIndex,
        resource: Option<ResourceIndex>,
        is_js: bool,
        file_name: Option<StringIndex>,
        line_number: Option<u32>,
    ) -> FuncIndex {
        let i = FuncIndex(self.name.len());
        self.name.push(name);
        self.resource.push(resource);
        self.is_js.push(is_js);
        self.file_name.push(file_name);
        self.line_number.push(line_number);
        i
    }
}

/// One row per observed frame occurrence.
///
/// Several frames can reference the same function; they differ in category or
/// inlining information.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameTable {
    /// The function this frame is an occurrence of.
    pub func: Vec<FuncIndex>,
    /// The frame's category.
    pub category: Vec<CategoryIndex>,
    /// The frame's subcategory (an index into the category's subcategory list).
    pub subcategory: Vec<usize>,
    /// The native symbol this frame was inlined into, or `None` if it was not
    /// inlined.
    pub inline_into: Vec<Option<NativeSymbolIndex>>,
}

impl FrameTable {
    /// The number of frames.
    pub fn len(&self) -> usize {
        self.func.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.func.is_empty()
    }

    /// Appends a frame row and returns its index.
    pub fn push(
        &mut self,
        func: FuncIndex,
        category: CategoryIndex,
        subcategory: usize,
        inline_into: Option<NativeSymbolIndex>,
    ) -> FrameIndex {
        let i = FrameIndex(self.func.len());
        self.func.push(func);
        self.category.push(category);
        self.subcategory.push(subcategory);
        self.inline_into.push(inline_into);
        i
    }
}

/// The prefix tree of observed call paths.
///
/// Every row represents one call path: the path's leaf frame plus the row
/// index of the path with that frame removed (`prefix`). Root paths have a
/// `None` prefix.
///
/// Invariant: `prefix < row index` for every non-root row, so a single pass
/// in index order visits parents before children, and a reverse pass visits
/// children before parents. Code in this crate relies on that ordering and
/// panics if it is violated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StackTable {
    /// The parent stack, or `None` for a root.
    pub prefix: Vec<Option<StackIndex>>,
    /// The path's leaf frame.
    pub frame: Vec<FrameIndex>,
}

impl StackTable {
    /// The number of stacks.
    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Appends a stack row and returns its index.
    pub fn push(&mut self, prefix: Option<StackIndex>, frame: FrameIndex) -> StackIndex {
        if let Some(p) = prefix {
            assert!(p.0 < self.prefix.len(), "stack prefix must precede the row");
        }
        let i = StackIndex(self.prefix.len());
        self.prefix.push(prefix);
        self.frame.push(frame);
        i
    }
}

/// Builds a [`StackTable`] while deduplicating `(prefix, frame)` pairs, so
/// rewrites that splice stacks together cannot produce duplicate rows.
#[derive(Default)]
pub(crate) struct StackBuilder {
    table: StackTable,
    index: AHashMap<(Option<StackIndex>, FrameIndex), StackIndex>,
}

impl StackBuilder {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    /// Returns the row for `(prefix, frame)`, appending it if new.
    pub(crate) fn stack_for(
        &mut self,
        prefix: Option<StackIndex>,
        frame: FrameIndex,
    ) -> StackIndex {
        match self.index.get(&(prefix, frame)) {
            Some(&stack) => stack,
            None => {
                let stack = self.table.push(prefix, frame);
                self.index.insert((prefix, frame), stack);
                stack
            }
        }
    }

    pub(crate) fn finish(self) -> StackTable {
        self.table
    }
}

/// How the weight column of a samples table should be interpreted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum WeightType {
    /// Each row is one sampling-interval observation; weights are counts.
    #[default]
    Samples,
    /// Weights are durations in milliseconds.
    TracingMs,
    /// Weights are byte counts (allocation tables).
    Bytes,
}

/// One row per observed event: a stack, a timestamp, and an optional weight.
///
/// This one shape serves timing samples, JS allocations, and (wrapped in
/// [`NativeAllocationsTable`]) native allocations; the call-tree code is
/// written against it generically via [`WeightType`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SamplesTable {
    /// The stack observed for this event, or `None` if it was filtered away.
    pub stack: Vec<Option<StackIndex>>,
    /// The event's timestamp in milliseconds. Must be sorted ascending.
    pub time: Vec<f64>,
    /// Per-event weights; `None` means every event weighs 1.
    pub weight: Option<Vec<f64>>,
    /// CPU usage deltas between consecutive samples, when recorded.
    pub thread_cpu_delta: Option<Vec<f64>>,
    /// How to interpret the weights.
    pub weight_type: WeightType,
}

impl SamplesTable {
    /// The number of events.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// The weight of event `i` (1 if the table is unweighted).
    pub fn weight_at(&self, i: usize) -> f64 {
        match &self.weight {
            Some(w) => w[i],
            None => 1.0,
        }
    }

    /// Slices every column to the row range `[from, to)`.
    pub(crate) fn sliced(&self, from: usize, to: usize) -> SamplesTable {
        SamplesTable {
            stack: self.stack[from..to].to_vec(),
            time: self.time[from..to].to_vec(),
            weight: self.weight.as_ref().map(|w| w[from..to].to_vec()),
            thread_cpu_delta: self.thread_cpu_delta.as_ref().map(|d| d[from..to].to_vec()),
            weight_type: self.weight_type,
        }
    }

    /// Keeps only the rows selected by `keep`, preserving order.
    pub(crate) fn retained(&self, mut keep: impl FnMut(usize) -> bool) -> SamplesTable {
        let mut out = SamplesTable {
            stack: Vec::new(),
            time: Vec::new(),
            weight: self.weight.as_ref().map(|_| Vec::new()),
            thread_cpu_delta: self.thread_cpu_delta.as_ref().map(|_| Vec::new()),
            weight_type: self.weight_type,
        };
        for i in 0..self.len() {
            if !keep(i) {
                continue;
            }
            out.stack.push(self.stack[i]);
            out.time.push(self.time[i]);
            if let (Some(w), Some(ws)) = (&mut out.weight, &self.weight) {
                w.push(ws[i]);
            }
            if let (Some(d), Some(ds)) = (&mut out.thread_cpu_delta, &self.thread_cpu_delta) {
                d.push(ds[i]);
            }
        }
        out
    }
}

/// Native allocation events: samples columns plus the allocated address, which
/// lets deallocations be matched back to the allocation they free.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NativeAllocationsTable {
    /// The samples-shaped columns (weights are signed byte counts: positive
    /// for allocations, negative for deallocations).
    pub samples: SamplesTable,
    /// The allocated memory address per row, when the profiler recorded it.
    pub memory_address: Option<Vec<u64>>,
}

/// One category that frames can belong to.
#[derive(Clone, Debug, PartialEq)]
pub struct Category {
    /// The category's display name.
    pub name: String,
    /// The category's display color (a CSS color keyword).
    pub color: String,
    /// Names of this category's subcategories; index 0 is "Other".
    pub subcategories: Vec<String>,
}

/// The profile's ordered list of categories.
pub type CategoryList = Vec<Category>;

/// One thread's table snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Thread {
    /// Interned strings for all name columns.
    pub strings: StringTable,
    /// Libraries and scripts.
    pub resources: ResourceTable,
    /// Functions.
    pub funcs: FuncTable,
    /// Native symbols frames can be inlined into.
    pub native_symbols: NativeSymbolTable,
    /// Observed frames.
    pub frames: FrameTable,
    /// The call path prefix tree.
    pub stacks: StackTable,
    /// Timing samples.
    pub samples: SamplesTable,
    /// JS allocation events, if recorded.
    pub js_allocations: Option<SamplesTable>,
    /// Native allocation events, if recorded.
    pub native_allocations: Option<NativeAllocationsTable>,
}

/// A loaded profile: the sampling interval, the category list, and the
/// per-thread tables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Profile {
    /// The sampling interval in milliseconds.
    pub interval: f64,
    /// Categories referenced by every thread's frames.
    pub categories: CategoryList,
    /// The recorded threads.
    pub threads: Vec<Thread>,
}

impl Profile {
    /// The category frames fall back to when no better one is known: the grey
    /// category if the list has one, otherwise index 0.
    pub fn default_category(&self) -> CategoryIndex {
        CategoryIndex(
            self.categories
                .iter()
                .position(|c| c.color == "grey")
                .unwrap_or(0),
        )
    }
}

/// Which samples-shaped table a call tree should summarize.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SummaryStrategy {
    /// The thread's timing samples.
    #[default]
    Timing,
    /// JS allocation events.
    JsAllocations,
    /// Native allocation events (positive weights only).
    NativeAllocations,
    /// Native allocations that were never deallocated.
    NativeRetainedAllocations,
    /// Native deallocation events, attributed to the site of the `free`.
    NativeDeallocationSites,
    /// Native deallocation events, attributed to the allocating stack.
    NativeDeallocationMemory,
}

/// Selects the samples table for `strategy` on `thread`.
///
/// Strategies that need a table the thread does not carry fall back to
/// [`SummaryStrategy::Timing`]; address-based strategies additionally fall
/// back to the plain allocations view when no address column was recorded.
/// Both degradations are deterministic, not errors.
pub fn samples_for_strategy(thread: &Thread, strategy: SummaryStrategy) -> Cow<'_, SamplesTable> {
    match strategy {
        SummaryStrategy::Timing => Cow::Borrowed(&thread.samples),
        SummaryStrategy::JsAllocations => match &thread.js_allocations {
            Some(t) => Cow::Borrowed(t),
            None => Cow::Borrowed(&thread.samples),
        },
        SummaryStrategy::NativeAllocations => match &thread.native_allocations {
            Some(t) => Cow::Owned(t.samples.retained(|i| t.samples.weight_at(i) >= 0.0)),
            None => Cow::Borrowed(&thread.samples),
        },
        SummaryStrategy::NativeDeallocationSites => match &thread.native_allocations {
            Some(t) => Cow::Owned(t.samples.retained(|i| t.samples.weight_at(i) < 0.0)),
            None => Cow::Borrowed(&thread.samples),
        },
        SummaryStrategy::NativeRetainedAllocations => match &thread.native_allocations {
            Some(t) => match &t.memory_address {
                Some(addresses) => Cow::Owned(retained_allocations(&t.samples, addresses)),
                None => Cow::Owned(t.samples.retained(|i| t.samples.weight_at(i) >= 0.0)),
            },
            None => Cow::Borrowed(&thread.samples),
        },
        SummaryStrategy::NativeDeallocationMemory => match &thread.native_allocations {
            Some(t) => match &t.memory_address {
                Some(addresses) => Cow::Owned(deallocated_memory(&t.samples, addresses)),
                None => Cow::Owned(t.samples.retained(|i| t.samples.weight_at(i) >= 0.0)),
            },
            None => Cow::Borrowed(&thread.samples),
        },
    }
}

// Keep allocations that no later deallocation of the same address matched.
fn retained_allocations(samples: &SamplesTable, addresses: &[u64]) -> SamplesTable {
    let mut live: AHashMap<u64, usize> = AHashMap::new();
    for i in 0..samples.len() {
        if samples.weight_at(i) >= 0.0 {
            live.insert(addresses[i], i);
        } else {
            live.remove(&addresses[i]);
        }
    }
    samples.retained(|i| live.get(&addresses[i]) == Some(&i))
}

// Keep deallocations, re-attributed to the stack that allocated the address.
fn deallocated_memory(samples: &SamplesTable, addresses: &[u64]) -> SamplesTable {
    let mut allocated_at: AHashMap<u64, Option<StackIndex>> = AHashMap::new();
    let mut stacks = Vec::with_capacity(samples.len());
    for i in 0..samples.len() {
        if samples.weight_at(i) >= 0.0 {
            allocated_at.insert(addresses[i], samples.stack[i]);
            stacks.push(samples.stack[i]);
        } else {
            stacks.push(allocated_at.get(&addresses[i]).copied().flatten());
        }
    }
    let mut out = samples.retained(|i| samples.weight_at(i) < 0.0);
    let kept: Vec<Option<StackIndex>> = (0..samples.len())
        .filter(|&i| samples.weight_at(i) < 0.0)
        .map(|i| stacks[i])
        .collect();
    out.stack = kept;
    out
}
