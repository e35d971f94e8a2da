mod common;

use pretty_assertions::assert_eq;

use smolder::callnode::compute_call_node_info;
use smolder::filter::ViewOptions;
use smolder::flamegraph::{compute_flame_graph_timing, FlameGraphInterval};
use smolder::profile::CallNodeIndex;
use smolder::stack_timing::{compute_stack_timing, StackTiming, StackTimingBox};
use smolder::transform::{Transform, TransformStack};

#[test]
fn flame_graph_extents_are_total_shares_in_name_order() {
    // A is self 1/4; its children draw in name order (B before C) even
    // though C is heavier.
    let tree = common::tree(
        "A  A  A  A\n\
         C  C  B\n",
    );
    let root = tree.roots()[0];
    let path = |name: &str| {
        let thread = tree.thread();
        tree.node_for_path(&vec![
            common::func_index(thread, "A"),
            common::func_index(thread, name),
        ])
        .unwrap()
    };

    let timing = compute_flame_graph_timing(&tree);
    assert_eq!(timing.rows.len(), 2);
    assert_eq!(
        timing.rows[0],
        vec![FlameGraphInterval {
            start: 0.0,
            end: 1.0,
            self_relative: 0.25,
            node: root,
        }]
    );
    assert_eq!(
        timing.rows[1],
        vec![
            FlameGraphInterval {
                start: 0.0,
                end: 0.25,
                self_relative: 0.25,
                node: path("B"),
            },
            FlameGraphInterval {
                start: 0.25,
                end: 0.75,
                self_relative: 0.5,
                node: path("C"),
            },
        ]
    );
}

#[test]
fn flame_graph_lays_out_multiple_roots_side_by_side() {
    let tree = common::tree("A  B\n");
    let timing = compute_flame_graph_timing(&tree);
    assert_eq!(timing.rows.len(), 1);
    let extents: Vec<(f64, f64)> = timing.rows[0]
        .iter()
        .map(|interval| (interval.start, interval.end))
        .collect();
    assert_eq!(extents, vec![(0.0, 0.5), (0.5, 1.0)]);
}

#[test]
fn flame_graph_of_a_weightless_tree_is_empty_rows() {
    let profile = common::profile("A\n");
    let mut stack = TransformStack::new();
    stack.push(Transform::DropFunction {
        func: common::func_index(&profile.threads[0], "A"),
    });
    let tree = common::tree_with(&profile, &stack, &ViewOptions::default());
    let timing = compute_flame_graph_timing(&tree);
    assert!(timing.rows.iter().all(|row| row.is_empty()));
}

#[test]
fn flame_graph_self_shading_is_unsigned() {
    let profile = common::profile(
        "A  A\n\
         B  C\n",
    );
    let mut thread = profile.threads[0].clone();
    // a diff-style thread where the C branch lost weight
    thread.samples.weight = Some(vec![2.0, -1.0]);
    let tree = smolder::calltree::compute_call_tree(
        thread,
        &profile.categories,
        profile.interval,
        profile.default_category(),
        Default::default(),
        false,
    );

    let timing = compute_flame_graph_timing(&tree);
    assert!(timing
        .rows
        .iter()
        .flatten()
        .all(|interval| interval.self_relative >= 0.0));
    // C keeps a drawable self share despite its negative weight
    let c = timing.rows[1]
        .iter()
        .find(|interval| tree.func_name(interval.node) == "C")
        .unwrap();
    assert_eq!(c.self_relative, 1.0);
}

#[test]
fn stack_timing_closes_boxes_where_paths_diverge() {
    let profile = common::profile(
        "A  A  B  A\n\
         X  X     X\n",
    );
    let thread = &profile.threads[0];
    let info = compute_call_node_info(&thread.stacks, &thread.frames, profile.default_category());
    let node_at = |sample: usize| info.stack_to_node[thread.samples.stack[sample].unwrap().0];
    let a = info.table.prefix[node_at(0).0].unwrap();
    let x = node_at(0);
    let b = node_at(2);

    let timing = compute_stack_timing(&thread.samples, &info, profile.interval);
    let boxed = |start: f64, end: f64, node: CallNodeIndex| StackTimingBox { start, end, node };
    assert_eq!(
        timing,
        StackTiming {
            rows: vec![
                vec![boxed(0.0, 2.0, a), boxed(2.0, 3.0, b), boxed(3.0, 4.0, a)],
                vec![boxed(0.0, 2.0, x), boxed(3.0, 4.0, x)],
            ],
        }
    );
}

#[test]
fn stack_timing_treats_missing_stacks_as_gaps() {
    let profile = common::profile("A  A  A\n");
    let mut thread = profile.threads[0].clone();
    thread.samples.stack[1] = None;
    let info = compute_call_node_info(&thread.stacks, &thread.frames, profile.default_category());

    let timing = compute_stack_timing(&thread.samples, &info, profile.interval);
    assert_eq!(timing.rows.len(), 1);
    let spans: Vec<(f64, f64)> = timing.rows[0].iter().map(|b| (b.start, b.end)).collect();
    assert_eq!(spans, vec![(0.0, 1.0), (2.0, 3.0)]);
}
