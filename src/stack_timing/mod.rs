//! Stack chart timing: per-depth wall-clock boxes describing when each call
//! node was on the stack.
//!
//! Consecutive samples sharing a call-path prefix keep that prefix's boxes
//! open; where the paths diverge, the old suffix's boxes close at the new
//! sample's time and the new suffix's boxes open. The final sample closes
//! everything at its time plus one sampling interval.

use crate::callnode::CallNodeInfo;
use crate::profile::{CallNodeIndex, SamplesTable};

/// One call node's box at its depth: the node was continuously on the stack
/// for `[start, end)`.
#[derive(Clone, Debug, PartialEq)]
pub struct StackTimingBox {
    /// When the box opens, in milliseconds.
    pub start: f64,
    /// When the box closes, in milliseconds.
    pub end: f64,
    /// The call node on the stack.
    pub node: CallNodeIndex,
}

/// Per-depth box lists; `rows[0]` holds the roots. Boxes within a row are
/// sorted by start and never overlap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StackTiming {
    /// One list per depth level.
    pub rows: Vec<Vec<StackTimingBox>>,
}

/// Builds the stack chart for a samples table.
///
/// `interval` is the sampling interval, used to close the last sample's
/// boxes one interval after it was taken.
pub fn compute_stack_timing(
    samples: &SamplesTable,
    info: &CallNodeInfo,
    interval: f64,
) -> StackTiming {
    let mut rows: Vec<Vec<StackTimingBox>> = vec![Vec::new(); info.table.max_depth()];
    // the currently open box per depth
    let mut open: Vec<(CallNodeIndex, f64)> = Vec::new();
    let mut chain: Vec<CallNodeIndex> = Vec::new();
    let mut last_time = 0.0;

    for i in 0..samples.len() {
        let time = samples.time[i];
        chain.clear();
        if let Some(stack) = samples.stack[i] {
            let mut cur = Some(info.stack_to_node[stack.0]);
            while let Some(node) = cur {
                chain.push(node);
                cur = info.table.prefix[node.0];
            }
            chain.reverse();
        }

        // the shared prefix stays open
        let shared = open
            .iter()
            .zip(chain.iter())
            .take_while(|((open_node, _), &new_node)| *open_node == new_node)
            .count();
        close_from(&mut rows, &mut open, shared, time);
        for &node in &chain[shared..] {
            open.push((node, time));
        }
        last_time = time;
    }

    close_from(&mut rows, &mut open, 0, last_time + interval);
    StackTiming { rows }
}

// Close every open box at depth `from` and deeper.
fn close_from(
    rows: &mut [Vec<StackTimingBox>],
    open: &mut Vec<(CallNodeIndex, f64)>,
    from: usize,
    time: f64,
) {
    while open.len() > from {
        let (node, start) = open.pop().expect("open boxes cannot be empty here");
        rows[open.len()].push(StackTimingBox {
            start,
            end: time,
            node,
        });
    }
}
