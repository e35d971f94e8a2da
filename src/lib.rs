//! Smolder is the analysis engine that sits between a recorded execution
//! profile and the views you look at it through. It takes the columnar
//! record a sampling profiler produces — observed call stacks, sample
//! timings, optionally allocation events — and derives the structures that
//! call trees, flame graphs, stack charts, and profile diffs are rendered
//! from.
//!
//! # The shape of the data
//!
//! A profile thread arrives as a handful of parallel tables (see
//! [`profile`]): interned strings, functions, frames, a prefix tree of call
//! stacks, and rows of samples pointing into that tree. The engine never
//! mutates these tables; every operation is a pure function producing new
//! tables or read-only query objects.
//!
//! # From tables to a call tree
//!
//! The [`filter`] pipeline narrows a thread down (time range, transform
//! stack, implementation filter, search, inversion), the [`callnode`]
//! builder collapses the filtered stacks into one node per
//! `(caller, function)` pair, and [`calltree`] wraps the result in a query
//! facade with per-node self/total weights and formatted display data:
//!
//! ```
//! use smolder::profile::text::profile_from_text_samples;
//! use smolder::profile::CategoryIndex;
//! use smolder::calltree::compute_call_tree;
//!
//! let profile = profile_from_text_samples(
//!     "A  A  A\n\
//!      B  B  B\n\
//!      C  C  C\n",
//! )?;
//! let thread = profile.threads[0].clone();
//! let tree = compute_call_tree(
//!     thread,
//!     &profile.categories,
//!     profile.interval,
//!     CategoryIndex(0),
//!     Default::default(),
//!     false,
//! );
//! let root = tree.roots()[0];
//! assert_eq!(tree.func_name(root), "A");
//! assert_eq!(tree.node_total(root), 3.0);
//! # Ok::<(), smolder::profile::text::TextProfileError>(())
//! ```
//!
//! # Reshaping the tree
//!
//! The [`transform`] module defines the focus/merge/drop/collapse algebra.
//! Transforms live on an ordered stack per thread, apply as pure
//! thread-to-thread rewrites, and encode to a short `~`-joined string
//! (`mf-13~df-2`) that is stable enough to put in a URL and replay later.
//!
//! # Derived views
//!
//! [`flamegraph`] buckets the call tree into per-depth intervals sized by
//! total weight; [`stack_timing`] builds wall-clock boxes from consecutive
//! samples; [`diff`] aligns the nodes of two trees by hashed path identity
//! for comparison views; [`symbolicate`] rewrites stored call paths when
//! late-arriving symbol information splits or renames functions. The
//! [`session`] module ties it together with an explicit per-profile cache of
//! derived trees.

#![deny(missing_docs)]

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

#[macro_use]
extern crate log;

/// The columnar profile tables and the strategies for choosing among them.
pub mod profile;

/// The thread filter pipeline: range, implementation, search, and invert
/// filters.
pub mod filter;

/// Collapsing stacks into call nodes, and aggregating weights over them.
pub mod callnode;

/// The call tree query facade.
pub mod calltree;

/// The transform algebra and its canonical string encoding.
pub mod transform;

/// Flame graph interval layout.
pub mod flamegraph;

/// Stack chart wall-clock boxes.
pub mod stack_timing;

/// Call path rewriting driven by symbolication.
pub mod symbolicate;

/// Cross-profile call node correspondence for diff views.
pub mod diff;

/// The per-profile session: transform stacks and the derived-tree cache.
pub mod session;
