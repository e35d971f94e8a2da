//! Builds small [`Profile`]s from column-per-sample text diagrams.
//!
//! Each column of the diagram is one sample; each line is one depth level,
//! with the leaf function at the bottom:
//!
//! ```text
//! A    A       A
//! B    B       B
//! C    C.js    H[lib]
//! ```
//!
//! produces three samples with call paths `A→B→C`, `A→B→C.js`, and `A→B→H`.
//! Name suffixes annotate the function:
//!
//! - `name[lib]` places the function in a resource called `lib`,
//! - a `.js` file extension marks a JS function with that file name,
//! - `name[cat:Layout]` assigns the frame a category,
//! - `name[inl:symbol]` marks the frame as inlined into a native symbol.
//!
//! Columns are identified by character offset, so stacks of different depths
//! are expressed by leaving a column blank below its leaf.

use ahash::AHashMap;
use thiserror::Error;

use super::{
    Category, CategoryIndex, FrameIndex, FuncIndex, NativeSymbolIndex, Profile, SamplesTable,
    StackBuilder, StackIndex, Thread, WeightType,
};

/// The ways a text diagram can fail to describe a profile.
#[derive(Debug, Error)]
pub enum TextProfileError {
    /// The diagram contained no samples at all.
    #[error("the text profile contains no samples")]
    Empty,
    /// A token did not start at any known column offset.
    #[error("token {token:?} on line {line} does not line up with any sample column")]
    MisalignedToken {
        /// The offending token.
        token: String,
        /// The 1-based diagram line.
        line: usize,
    },
    /// A column resumed after a blank cell, which would leave a hole in the
    /// call path.
    #[error("sample column at offset {column} resumes on line {line} after a blank cell")]
    GapInColumn {
        /// The column's character offset.
        column: usize,
        /// The 1-based diagram line.
        line: usize,
    },
}

/// Builds a one-thread [`Profile`] from a text diagram (see the module docs
/// for the format). Samples are unweighted and one millisecond apart.
pub fn profile_from_text_samples(text: &str) -> Result<Profile, TextProfileError> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();

    // The first line names every sample, so its token offsets define the
    // columns; later lines must line up with them.
    let tokenized: Vec<Vec<(usize, &str)>> = lines.iter().map(|line| tokenize(line)).collect();
    let columns: Vec<usize> = match tokenized.first() {
        Some(tokens) => tokens.iter().map(|&(offset, _)| offset).collect(),
        None => return Err(TextProfileError::Empty),
    };

    // paths[c] is column c's call path, top to bottom.
    let mut paths: Vec<Vec<&str>> = vec![Vec::new(); columns.len()];
    let mut ended: Vec<bool> = vec![false; columns.len()];
    for (lineno, tokens) in tokenized.iter().enumerate() {
        let mut seen: Vec<bool> = vec![false; columns.len()];
        for &(offset, token) in tokens {
            let column = match columns.iter().position(|&c| c == offset) {
                Some(c) => c,
                None => {
                    return Err(TextProfileError::MisalignedToken {
                        token: token.to_string(),
                        line: lineno + 1,
                    })
                }
            };
            if ended[column] {
                return Err(TextProfileError::GapInColumn {
                    column: offset,
                    line: lineno + 1,
                });
            }
            paths[column].push(token);
            seen[column] = true;
        }
        for (column, &present) in seen.iter().enumerate() {
            if !present && !paths[column].is_empty() {
                ended[column] = true;
            }
        }
    }

    let mut thread = Thread::default();
    let mut categories: Vec<Category> = vec![Category {
        name: "Other".to_string(),
        color: "grey".to_string(),
        subcategories: vec!["Other".to_string()],
    }];

    let mut funcs: AHashMap<String, FuncIndex> = AHashMap::new();
    let mut frames: AHashMap<(FuncIndex, CategoryIndex, Option<NativeSymbolIndex>), FrameIndex> =
        AHashMap::new();
    let mut symbols: AHashMap<String, NativeSymbolIndex> = AHashMap::new();
    let mut resources: AHashMap<String, usize> = AHashMap::new();
    let mut builder = StackBuilder::new();

    let mut sample_stacks: Vec<Option<StackIndex>> = Vec::new();
    for path in &paths {
        let mut prefix = None;
        for &token in path {
            let spec = parse_token(token);
            let func = *funcs.entry(token.to_string()).or_insert_with(|| {
                let name = thread.strings.intern(spec.name);
                let resource = spec.resource.map(|r| {
                    let at = *resources.entry(r.to_string()).or_insert_with(|| {
                        let name = thread.strings.intern(r);
                        thread.resources.push(name).0
                    });
                    super::ResourceIndex(at)
                });
                let file_name = spec.file.map(|f| thread.strings.intern(f));
                thread
                    .funcs
                    .push(name, resource, spec.is_js, file_name, None)
            });
            let category = match spec.category {
                Some(name) => match categories.iter().position(|c| c.name == name) {
                    Some(at) => CategoryIndex(at),
                    None => {
                        categories.push(Category {
                            name: name.to_string(),
                            color: "blue".to_string(),
                            subcategories: vec!["Other".to_string()],
                        });
                        CategoryIndex(categories.len() - 1)
                    }
                },
                None => CategoryIndex(0),
            };
            let inline_into = spec.inlined_into.map(|s| {
                *symbols.entry(s.to_string()).or_insert_with(|| {
                    let name = thread.strings.intern(s);
                    thread.native_symbols.push(name)
                })
            });
            let frame = *frames
                .entry((func, category, inline_into))
                .or_insert_with(|| thread.frames.push(func, category, 0, inline_into));
            prefix = Some(builder.stack_for(prefix, frame));
        }
        sample_stacks.push(prefix);
    }

    thread.stacks = builder.finish();
    thread.samples = SamplesTable {
        time: (0..sample_stacks.len()).map(|i| i as f64).collect(),
        stack: sample_stacks,
        weight: None,
        thread_cpu_delta: None,
        weight_type: WeightType::Samples,
    };

    Ok(Profile {
        interval: 1.0,
        categories,
        threads: vec![thread],
    })
}

struct TokenSpec<'a> {
    name: &'a str,
    resource: Option<&'a str>,
    file: Option<&'a str>,
    is_js: bool,
    category: Option<&'a str>,
    inlined_into: Option<&'a str>,
}

// Strip bracket annotations off the end of a token, innermost last.
fn parse_token(token: &str) -> TokenSpec<'_> {
    let mut rest = token;
    let mut resource = None;
    let mut category = None;
    let mut inlined_into = None;
    while let Some(open) = rest.rfind('[') {
        if !rest.ends_with(']') {
            break;
        }
        let annotation = &rest[open + 1..rest.len() - 1];
        if let Some(name) = annotation.strip_prefix("cat:") {
            category = Some(name);
        } else if let Some(name) = annotation.strip_prefix("inl:") {
            inlined_into = Some(name);
        } else {
            resource = Some(annotation);
        }
        rest = &rest[..open];
    }
    let is_js = rest.ends_with(".js");
    TokenSpec {
        name: rest,
        resource,
        file: if is_js { Some(rest) } else { None },
        is_js,
        category,
        inlined_into,
    }
}

// Split a line into (character offset, token) pairs.
fn tokenize(line: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                tokens.push((s, &line[s..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push((s, &line[s..]));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_annotations() {
        let spec = parse_token("render[lib][cat:Graphics]");
        assert_eq!(spec.name, "render");
        assert_eq!(spec.resource, Some("lib"));
        assert_eq!(spec.category, Some("Graphics"));
        assert!(!spec.is_js);

        let spec = parse_token("onClick.js");
        assert_eq!(spec.name, "onClick.js");
        assert!(spec.is_js);
        assert_eq!(spec.file, Some("onClick.js"));

        let spec = parse_token("memcpy[inl:doFrame]");
        assert_eq!(spec.inlined_into, Some("doFrame"));
    }

    #[test]
    fn shared_prefixes_are_interned_once() {
        let profile = profile_from_text_samples(
            "A  A  A\n\
             B  B  B\n\
             C  C  D\n",
        )
        .unwrap();
        let thread = &profile.threads[0];
        // A, A→B, A→B→C, A→B→D
        assert_eq!(thread.stacks.len(), 4);
        assert_eq!(thread.samples.len(), 3);
        assert_eq!(thread.samples.stack[0], thread.samples.stack[1]);
        assert_ne!(thread.samples.stack[0], thread.samples.stack[2]);
    }

    #[test]
    fn ragged_columns_end_stacks_early() {
        let profile = profile_from_text_samples(
            "A  A\n\
             B\n",
        )
        .unwrap();
        let thread = &profile.threads[0];
        assert_eq!(thread.samples.len(), 2);
        // first sample is A→B, second just A
        assert!(thread.stacks.prefix[thread.samples.stack[0].unwrap().0].is_some());
        assert_eq!(thread.stacks.prefix[thread.samples.stack[1].unwrap().0], None);
    }

    #[test]
    fn gap_in_column_is_an_error() {
        let err = profile_from_text_samples(
            "A  A\n\
             B\n\
             C  C\n",
        )
        .unwrap_err();
        assert!(matches!(err, TextProfileError::GapInColumn { .. }));
    }
}
