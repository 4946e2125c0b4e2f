// src/work/path.rs

//! Hierarchical name handling.

use crate::errors::{EngineError, Result};

/// Split a hierarchical name into segments.
///
/// The empty name denotes the node itself and yields no segments. Empty
/// segments (`"a..b"`, `".a"`, `"a."`) are rejected.
pub fn split_name(name: &str, separator: char) -> Result<Vec<&str>> {
    if name.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<&str> = name.split(separator).collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(EngineError::InvalidName(name.to_string()));
    }
    Ok(segments)
}

/// Full name of a child called `segment` under a node named `parent`.
pub fn join_name(parent: &str, segment: &str, separator: char) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{parent}{separator}{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_is_the_node_itself() {
        assert!(split_name("", '.').unwrap().is_empty());
    }

    #[test]
    fn splits_on_separator() {
        assert_eq!(split_name("a.b.c", '.').unwrap(), vec!["a", "b", "c"]);
        assert_eq!(split_name("a/b", '/').unwrap(), vec!["a", "b"]);
        assert_eq!(split_name("a.b", '/').unwrap(), vec!["a.b"]);
    }

    #[test]
    fn rejects_empty_segments() {
        for bad in ["a..b", ".a", "a.", " . "] {
            assert!(
                matches!(split_name(bad, '.'), Err(EngineError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn join_under_root_has_no_separator() {
        assert_eq!(join_name("", "a", '.'), "a");
        assert_eq!(join_name("a.b", "c", '.'), "a.b.c");
    }
}
