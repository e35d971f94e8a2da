//! The canonical short-string encoding of transform stacks.
//!
//! Each transform serializes to a short token followed by `-`-joined fields;
//! transforms join with `~`. The short tokens are a serialization contract:
//! strings produced here end up in URLs, and URLs produced by older versions
//! must keep decoding.
//!
//! ```text
//! f-<impl>-<path>[-i]            focus-subtree
//! ff-<func>                      focus-function
//! fg-<category>                  focus-category
//! mcn-<impl>-<path>              merge-call-node
//! mf-<func>                      merge-function
//! df-<func>                      drop-function
//! cr-<impl>-<resource>-<func>    collapse-resource
//! rec-<impl>-<func>              collapse-direct-recursion
//! irec-<impl>-<func>             collapse-indirect-recursion
//! cfs-<func>                     collapse-function-subtree
//! ```
//!
//! Call-node paths encode as a run-length-compressed unsigned integer array:
//! each index in base-32 digits (`0-9a-v`), items joined with `x`, and a
//! consecutive ascending run `a..=b` of three or more compressed to
//! `<a>w<b>`.
//!
//! Decoding a whole stack never fails: an unknown token or malformed fields
//! skip that single transform with a warning, so one corrupt or
//! future-versioned entry cannot take the rest of the stack down with it.

use std::fmt::Write;

use thiserror::Error;

use crate::callnode::CallNodePath;
use crate::filter::ImplementationFilter;
use crate::profile::{CategoryIndex, FuncIndex, ResourceIndex};

use super::{Transform, TransformStack};

/// Why a single transform token failed to decode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformParseError {
    /// The leading short token named no known transform.
    #[error("unknown transform kind {0:?}")]
    UnknownKind(String),
    /// The token had too few `-`-joined fields.
    #[error("missing field {0} in transform")]
    MissingField(&'static str),
    /// A numeric field failed to parse.
    #[error("malformed number {0:?} in transform")]
    BadNumber(String),
    /// The implementation tag was not `combined`, `js`, or `cpp`.
    #[error("unknown implementation filter {0:?}")]
    BadImplementation(String),
    /// The call-node path field failed to parse.
    #[error("malformed call-node path {0:?}")]
    BadPath(String),
}

const BASE32_DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

impl TransformStack {
    /// Encodes the stack as its canonical `~`-joined string.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (i, transform) in self.transforms().iter().enumerate() {
            if i > 0 {
                out.push('~');
            }
            encode_transform(transform, &mut out);
        }
        out
    }

    /// Decodes a `~`-joined transform string.
    ///
    /// Malformed entries are skipped with a warning rather than failing the
    /// whole stack.
    pub fn decode(s: &str) -> TransformStack {
        let mut stack = TransformStack::new();
        for token in s.split('~') {
            if token.is_empty() {
                continue;
            }
            match decode_transform(token) {
                Ok(transform) => stack.push(transform),
                Err(e) => warn!("skipping unrecognized transform {:?}: {}", token, e),
            }
        }
        stack
    }
}

// One transform to its canonical token.
fn encode_transform(transform: &Transform, out: &mut String) {
    let mut itoa = itoa::Buffer::new();
    match transform {
        Transform::FocusSubtree {
            path,
            implementation,
            inverted,
        } => {
            out.push_str("f-");
            out.push_str(implementation_tag(*implementation));
            out.push('-');
            encode_uint_array(path.iter().map(|f| f.0), out);
            if *inverted {
                out.push_str("-i");
            }
        }
        Transform::FocusFunction { func } => {
            out.push_str("ff-");
            out.push_str(itoa.format(func.0));
        }
        Transform::FocusCategory { category } => {
            out.push_str("fg-");
            out.push_str(itoa.format(category.0));
        }
        Transform::MergeCallNode {
            path,
            implementation,
        } => {
            out.push_str("mcn-");
            out.push_str(implementation_tag(*implementation));
            out.push('-');
            encode_uint_array(path.iter().map(|f| f.0), out);
        }
        Transform::MergeFunction { func } => {
            out.push_str("mf-");
            out.push_str(itoa.format(func.0));
        }
        Transform::DropFunction { func } => {
            out.push_str("df-");
            out.push_str(itoa.format(func.0));
        }
        Transform::CollapseResource {
            resource,
            collapsed_func,
            implementation,
        } => {
            out.push_str("cr-");
            out.push_str(implementation_tag(*implementation));
            write!(out, "-{}-{}", resource.0, collapsed_func.0).unwrap();
        }
        Transform::CollapseDirectRecursion {
            func,
            implementation,
        } => {
            out.push_str("rec-");
            out.push_str(implementation_tag(*implementation));
            out.push('-');
            out.push_str(itoa.format(func.0));
        }
        Transform::CollapseIndirectRecursion {
            func,
            implementation,
        } => {
            out.push_str("irec-");
            out.push_str(implementation_tag(*implementation));
            out.push('-');
            out.push_str(itoa.format(func.0));
        }
        Transform::CollapseFunctionSubtree { func } => {
            out.push_str("cfs-");
            out.push_str(itoa.format(func.0));
        }
    }
}

// One token back to a transform.
fn decode_transform(token: &str) -> Result<Transform, TransformParseError> {
    let mut fields = token.split('-');
    let kind = fields.next().unwrap_or("");
    let mut next = |name: &'static str| {
        fields
            .next()
            .ok_or(TransformParseError::MissingField(name))
    };
    match kind {
        "f" => {
            let implementation = parse_implementation(next("implementation")?)?;
            let path = parse_path(next("path")?)?;
            let inverted = match fields.next() {
                Some("i") => true,
                Some(other) => {
                    return Err(TransformParseError::BadPath(other.to_string()));
                }
                None => false,
            };
            Ok(Transform::FocusSubtree {
                path,
                implementation,
                inverted,
            })
        }
        "ff" => Ok(Transform::FocusFunction {
            func: FuncIndex(parse_uint(next("func")?)?),
        }),
        "fg" => Ok(Transform::FocusCategory {
            category: CategoryIndex(parse_uint(next("category")?)?),
        }),
        "mcn" => {
            let implementation = parse_implementation(next("implementation")?)?;
            let path = parse_path(next("path")?)?;
            Ok(Transform::MergeCallNode {
                path,
                implementation,
            })
        }
        "mf" => Ok(Transform::MergeFunction {
            func: FuncIndex(parse_uint(next("func")?)?),
        }),
        "df" => Ok(Transform::DropFunction {
            func: FuncIndex(parse_uint(next("func")?)?),
        }),
        "cr" => {
            let implementation = parse_implementation(next("implementation")?)?;
            let resource = ResourceIndex(parse_uint(next("resource")?)?);
            let collapsed_func = FuncIndex(parse_uint(next("collapsed func")?)?);
            Ok(Transform::CollapseResource {
                resource,
                collapsed_func,
                implementation,
            })
        }
        "rec" => {
            let implementation = parse_implementation(next("implementation")?)?;
            Ok(Transform::CollapseDirectRecursion {
                func: FuncIndex(parse_uint(next("func")?)?),
                implementation,
            })
        }
        "irec" => {
            let implementation = parse_implementation(next("implementation")?)?;
            Ok(Transform::CollapseIndirectRecursion {
                func: FuncIndex(parse_uint(next("func")?)?),
                implementation,
            })
        }
        "cfs" => Ok(Transform::CollapseFunctionSubtree {
            func: FuncIndex(parse_uint(next("func")?)?),
        }),
        other => Err(TransformParseError::UnknownKind(other.to_string())),
    }
}

fn implementation_tag(implementation: ImplementationFilter) -> &'static str {
    match implementation {
        ImplementationFilter::Combined => "combined",
        ImplementationFilter::Js => "js",
        ImplementationFilter::Cpp => "cpp",
    }
}

fn parse_implementation(tag: &str) -> Result<ImplementationFilter, TransformParseError> {
    match tag {
        "combined" => Ok(ImplementationFilter::Combined),
        "js" => Ok(ImplementationFilter::Js),
        "cpp" => Ok(ImplementationFilter::Cpp),
        other => Err(TransformParseError::BadImplementation(other.to_string())),
    }
}

fn parse_uint(s: &str) -> Result<usize, TransformParseError> {
    s.parse()
        .map_err(|_| TransformParseError::BadNumber(s.to_string()))
}

/// Writes `items` as the compressed base-32 array described in the module
/// docs.
pub(crate) fn encode_uint_array(items: impl IntoIterator<Item = usize>, out: &mut String) {
    let items: Vec<usize> = items.into_iter().collect();
    let mut i = 0;
    let mut first = true;
    while i < items.len() {
        // extent of the ascending run starting here
        let mut j = i;
        while j + 1 < items.len() && items[j + 1] == items[j] + 1 {
            j += 1;
        }
        if !first {
            out.push('x');
        }
        first = false;
        if j - i >= 2 {
            // runs of three or more pay for the `w`
            push_base32(items[i], out);
            out.push('w');
            push_base32(items[j], out);
            i = j + 1;
        } else {
            push_base32(items[i], out);
            i += 1;
        }
    }
}

/// Parses the compressed base-32 array form back into indices.
pub(crate) fn decode_uint_array(s: &str) -> Result<Vec<usize>, TransformParseError> {
    let mut out = Vec::new();
    if s.is_empty() {
        return Ok(out);
    }
    for item in s.split('x') {
        match item.split_once('w') {
            Some((a, b)) => {
                let a = parse_base32(a)?;
                let b = parse_base32(b)?;
                if a > b {
                    return Err(TransformParseError::BadPath(item.to_string()));
                }
                out.extend(a..=b);
            }
            None => out.push(parse_base32(item)?),
        }
    }
    Ok(out)
}

fn parse_path(s: &str) -> Result<CallNodePath, TransformParseError> {
    Ok(decode_uint_array(s)?.into_iter().map(FuncIndex).collect())
}

fn push_base32(mut n: usize, out: &mut String) {
    // enough digits for a 64-bit usize
    let mut buf = [0u8; 13];
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = BASE32_DIGITS[n % 32];
        n /= 32;
        if n == 0 {
            break;
        }
    }
    for &digit in &buf[i..] {
        out.push(digit as char);
    }
}

fn parse_base32(s: &str) -> Result<usize, TransformParseError> {
    if s.is_empty() {
        return Err(TransformParseError::BadPath(s.to_string()));
    }
    usize::from_str_radix(s, 32).map_err(|_| TransformParseError::BadPath(s.to_string()))
}
