//! Reversible flattening of relative paths into single directory entry names
//!
//! The grid stores every snapshotted file under one flat collective directory,
//! so `a/b@c` has to become a single segment. Separators become `@_` and a
//! literal `@` becomes `@@`; no other character is touched.

use std::path::{Component, Path};

/// Escape prefix character
const ESCAPE: char = '@';
/// Second character of an escaped separator
const SEPARATOR_MARK: char = '_';

/// Leaf suffixes for editor backups, temporaries and conflict copies
pub const IGNORE_SUFFIXES: [&str; 3] = [".backup", ".tmp", ".conflict"];
/// Any segment starting with this is hidden
pub const HIDDEN_PREFIX: char = '.';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MagicPathError {
    /// `@` followed by anything other than `_` or `@`, or a trailing `@`
    #[error("malformed magic path {name:?}: bad escape at byte {position}")]
    MalformedEncoding { name: String, position: usize },
}

/// Encode a `/`-separated relative path into a flat name
pub fn path2magic(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '/' => {
                out.push(ESCAPE);
                out.push(SEPARATOR_MARK);
            }
            ESCAPE => {
                out.push(ESCAPE);
                out.push(ESCAPE);
            }
            other => out.push(other),
        }
    }
    out
}

/// Decode a flat name produced by [`path2magic`]
pub fn magic2path(name: &str) -> Result<String, MagicPathError> {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.char_indices();
    while let Some((position, c)) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some((_, SEPARATOR_MARK)) => out.push('/'),
            Some((_, ESCAPE)) => out.push(ESCAPE),
            _ => {
                return Err(MagicPathError::MalformedEncoding {
                    name: name.to_string(),
                    position,
                })
            }
        }
    }
    Ok(out)
}

/// Encode a relative filesystem path, joining its components with `/`
///
/// Returns `None` if any component is not valid unicode.
pub fn mangle_path(path: &Path) -> Option<String> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?),
            Component::CurDir => {}
            _ => segments.push(component.as_os_str().to_str()?),
        }
    }
    Some(path2magic(&segments.join("/")))
}

/// Whether changes to this path should never be snapshotted
///
/// True when the leaf ends with one of [`IGNORE_SUFFIXES`], or when any
/// segment (leaf included) starts with [`HIDDEN_PREFIX`]. Root and prefix
/// components of an absolute path are not segments.
pub fn should_ignore_file(path: &Path) -> bool {
    if let Some(leaf) = path.file_name().and_then(|name| name.to_str()) {
        if IGNORE_SUFFIXES.iter().any(|suffix| leaf.ends_with(suffix)) {
            return true;
        }
    }

    path.components().any(|component| match component {
        Component::Normal(segment) => segment
            .to_str()
            .map(|s| s.starts_with(HIDDEN_PREFIX))
            .unwrap_or(false),
        Component::CurDir | Component::ParentDir => true,
        Component::RootDir | Component::Prefix(_) => false,
    })
}
