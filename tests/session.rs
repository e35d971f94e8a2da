mod common;

use std::rc::Rc;

use pretty_assertions::assert_eq;

use smolder::filter::ViewOptions;
use smolder::profile::{SummaryStrategy, ThreadIndex};
use smolder::session::Session;
use smolder::transform::Transform;

const THREAD: ThreadIndex = ThreadIndex(0);

fn session() -> Session {
    Session::new(common::profile(
        "A  A  A\n\
         B  B  B\n\
         C  C  D\n",
    ))
}

fn ranged(start: f64, end: f64) -> ViewOptions {
    ViewOptions {
        range: Some((start, end)),
        ..Default::default()
    }
}

#[test]
fn repeated_requests_reuse_the_cached_tree() {
    let mut session = session();
    let options = ViewOptions::default();
    let first = session.call_tree(THREAD, &options);
    let second = session.call_tree(THREAD, &options);
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(session.cached_tree_count(), 1);

    // different options are a different entry
    let inverted = session.call_tree(
        THREAD,
        &ViewOptions {
            invert: true,
            ..Default::default()
        },
    );
    assert!(!Rc::ptr_eq(&first, &inverted));
    assert_eq!(session.cached_tree_count(), 2);
}

#[test]
fn the_cache_evicts_the_least_recently_used_tree() {
    let mut session = session();
    let trees: Vec<_> = (0..8)
        .map(|i| session.call_tree(THREAD, &ranged(i as f64, i as f64 + 1.0)))
        .collect();
    assert_eq!(session.cached_tree_count(), 8);

    // touch the oldest entry so entry 1 is now the least recently used
    let touched = session.call_tree(THREAD, &ranged(0.0, 1.0));
    assert!(Rc::ptr_eq(&trees[0], &touched));

    session.call_tree(THREAD, &ranged(100.0, 101.0));
    assert_eq!(session.cached_tree_count(), 8);
    let kept = session.call_tree(THREAD, &ranged(0.0, 1.0));
    assert!(Rc::ptr_eq(&trees[0], &kept));
    let evicted = session.call_tree(THREAD, &ranged(1.0, 2.0));
    assert!(!Rc::ptr_eq(&trees[1], &evicted));
}

#[test]
fn editing_a_transform_stack_invalidates_only_that_thread() {
    let mut profile = common::profile(
        "A  A\n\
         B  C\n",
    );
    let other_thread = profile.threads[0].clone();
    profile.threads.push(other_thread);
    let mut session = Session::new(profile);

    let options = ViewOptions::default();
    let t0 = session.call_tree(ThreadIndex(0), &options);
    let t1 = session.call_tree(ThreadIndex(1), &options);
    assert_eq!(session.cached_tree_count(), 2);

    session.push_transform(ThreadIndex(0), Transform::DropFunction { func: smolder::profile::FuncIndex(1) });
    assert_eq!(session.cached_tree_count(), 1);
    assert!(!Rc::ptr_eq(&t0, &session.call_tree(ThreadIndex(0), &options)));
    assert!(Rc::ptr_eq(&t1, &session.call_tree(ThreadIndex(1), &options)));
}

#[test]
fn transform_stacks_round_trip_through_their_string_form() {
    let mut session = session();
    session.set_transforms_from_str(THREAD, "mf-1~df-2");
    assert_eq!(session.transforms_encoded(THREAD), "mf-1~df-2");
    assert_eq!(session.transform_stack(THREAD).len(), 2);

    session.pop_transforms_until(THREAD, 1);
    assert_eq!(session.transforms_encoded(THREAD), "mf-1");

    // the transform actually shapes the tree: func 1 is B
    let tree = session.call_tree(THREAD, &ViewOptions::default());
    let root = tree.roots()[0];
    assert_eq!(tree.func_name(root), "A");
    assert_eq!(
        common::names(&tree, &tree.children(root)),
        vec!["C", "D"]
    );
}

#[test]
fn missing_allocation_tables_fall_back_to_timing() {
    let mut session = session();
    let timing = session.call_tree(THREAD, &ViewOptions::default());
    let js = session.call_tree(
        THREAD,
        &ViewOptions {
            strategy: SummaryStrategy::JsAllocations,
            ..Default::default()
        },
    );
    // no allocation tables were recorded, so both summarize timing samples
    assert!(!Rc::ptr_eq(&timing, &js));
    assert_eq!(timing.summary(), js.summary());
}
