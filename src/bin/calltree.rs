use std::io;
use std::io::prelude::*;
use std::path::PathBuf;

use clap::Parser;
use env_logger::Env;

use smolder::calltree::{compute_call_tree, CallTree};
use smolder::filter::{filtered_thread, ViewOptions};
use smolder::profile::folded::profile_from_folded_file;
use smolder::transform::TransformStack;

#[derive(Debug, Parser)]
#[command(name = "smolder-calltree", about = "Print the call tree of a folded stacks file")]
struct Opt {
    /// Invert the call stacks ("who calls this the most")
    #[arg(long = "reverse")]
    reverse: bool,

    /// Only show samples matching these comma-separated terms
    #[arg(long = "search", value_name = "TERMS")]
    search: Option<String>,

    /// Apply a transform stack, in its canonical string form (e.g. "mf-13~df-2")
    #[arg(long = "transforms", value_name = "TRANSFORMS")]
    transforms: Option<String>,

    /// Only print nodes up to this depth
    #[arg(long = "depth", value_name = "DEPTH")]
    depth: Option<usize>,

    /// Silence all log output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Verbose logging mode (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Folded stacks file, or STDIN if not specified
    #[arg(value_name = "INFILE")]
    infile: Option<PathBuf>,
}

fn main() -> io::Result<()> {
    let opt = Opt::parse();

    // Initialize logger
    if !opt.quiet {
        env_logger::Builder::from_env(Env::default().default_filter_or(match opt.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }))
        .format_timestamp(None)
        .init();
    }

    let profile = profile_from_folded_file(opt.infile.as_ref())?;
    let transforms = match &opt.transforms {
        Some(s) => TransformStack::decode(s),
        None => TransformStack::new(),
    };
    let options = ViewOptions {
        search: opt.search.clone().unwrap_or_default(),
        invert: opt.reverse,
        ..Default::default()
    };
    let thread = filtered_thread(&profile.threads[0], &transforms, &options);
    let tree = compute_call_tree(
        thread,
        &profile.categories,
        profile.interval,
        profile.default_category(),
        options.strategy,
        options.invert,
    );

    print_tree(&tree, opt.depth, io::stdout().lock())
}

// Depth-first with an explicit stack; recursion depth follows profile stack
// depth, which can be in the thousands.
fn print_tree<W>(tree: &CallTree, max_depth: Option<usize>, mut writer: W) -> io::Result<()>
where
    W: Write,
{
    let mut pending = tree.roots();
    pending.reverse();
    while let Some(node) = pending.pop() {
        let depth = tree.depth(node);
        if max_depth.map_or(false, |max| depth > max) {
            continue;
        }
        let data = tree.display_data(node);
        writeln!(
            writer,
            "{:indent$}{} {} ({} self, {})",
            "",
            data.name,
            data.total,
            data.self_weight,
            data.total_percent,
            indent = depth * 2,
        )?;
        let mut children = tree.children(node);
        children.reverse();
        pending.append(&mut children);
    }
    Ok(())
}
