//! Reads folded stack lines into a [`Profile`].
//!
//! The folded format is the interchange format of the flame graph tool suite:
//! one line per distinct stack, with a semicolon-separated list of frame
//! names followed by a sample count:
//!
//! ```text
//! main;run;parse 12
//! main;run;render 30
//! ```
//!
//! Lines that cannot be parsed are skipped with a warning rather than
//! aborting the read; a single corrupt line should not cost the whole
//! profile.

use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use ahash::AHashMap;

use super::{
    Category, CategoryIndex, FrameIndex, Profile, SamplesTable, StackBuilder, Thread, WeightType,
};

const READER_CAPACITY: usize = 128 * 1024;

/// Reads folded stack lines from `reader` into a one-thread [`Profile`].
///
/// Each line becomes one weighted sample; repeated stacks share rows in the
/// stack table. Unparseable lines are skipped with a warning.
pub fn profile_from_folded<R>(mut reader: R) -> io::Result<Profile>
where
    R: BufRead,
{
    let mut thread = Thread::default();
    let mut frames: AHashMap<String, FrameIndex> = AHashMap::new();
    let mut builder = StackBuilder::new();

    let mut stacks = Vec::new();
    let mut weights = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let (stack, count) = match parse_line(&line) {
            Some(parsed) => parsed,
            None => {
                warn!("Unable to parse line: {}", line.trim_end());
                continue;
            }
        };

        let mut prefix = None;
        for name in stack.split(';') {
            let frame = *frames.entry(name.to_string()).or_insert_with(|| {
                let interned = thread.strings.intern(name);
                let func = thread.funcs.push(interned, None, false, None, None);
                thread.frames.push(func, CategoryIndex(0), 0, None)
            });
            prefix = Some(builder.stack_for(prefix, frame));
        }
        stacks.push(prefix);
        weights.push(count as f64);
    }

    thread.stacks = builder.finish();
    thread.samples = SamplesTable {
        time: (0..stacks.len()).map(|i| i as f64).collect(),
        stack: stacks,
        weight: Some(weights),
        thread_cpu_delta: None,
        weight_type: WeightType::Samples,
    };

    Ok(Profile {
        interval: 1.0,
        categories: vec![Category {
            name: "Other".to_string(),
            color: "grey".to_string(),
            subcategories: vec!["Other".to_string()],
        }],
        threads: vec![thread],
    })
}

/// Reads a folded stacks file (or STDIN when `infile` is `None`) into a
/// [`Profile`].
pub fn profile_from_folded_file<P>(infile: Option<P>) -> io::Result<Profile>
where
    P: AsRef<Path>,
{
    match infile {
        Some(ref path) => {
            let file = File::open(path)?;
            profile_from_folded(io::BufReader::with_capacity(READER_CAPACITY, file))
        }
        None => {
            let stdin = io::stdin();
            let guard = stdin.lock();
            profile_from_folded(io::BufReader::with_capacity(READER_CAPACITY, guard))
        }
    }
}

// Parse stack and sample count from one folded line.
fn parse_line(line: &str) -> Option<(&str, usize)> {
    let counti = line.rfind(' ')?;
    let count = line[(counti + 1)..].trim_end().parse::<usize>().ok()?;
    let stack = line[..counti].trim_end();
    if stack.is_empty() {
        return None;
    }
    Some((stack, count))
}
