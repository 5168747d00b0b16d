// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Text-property loader.
//!
//! Line-oriented format: one indentation level is four spaces, a line is
//! `name [= value] [# comment]`, names are `[A-Za-z0-9_/]+` without a
//! leading or trailing slash, values are bare text up to the comment or
//! a quoted string. The whole file is accepted or rejected atomically.

use super::PropertyTree;

/// Parse text-property input. Any syntax error rejects the whole file
/// and yields an empty tree; every offending line is logged.
pub(super) fn parse(input: &str) -> PropertyTree {
    let mut tree = PropertyTree::new();
    let mut valid = true;
    for (index, line) in input.lines().enumerate() {
        if let Err(reason) = process_line(&mut tree, line) {
            log::warn!("[ZPL] line {}: {}", index + 1, reason);
            valid = false;
        }
    }
    if valid {
        tree
    } else {
        PropertyTree::new()
    }
}

/// Parse one line and attach its node, if any, to the tree.
fn process_line(tree: &mut PropertyTree, line: &str) -> Result<(), String> {
    let line = line.trim_end();

    let body = line.trim_start_matches(' ');
    let indent = line.len() - body.len();
    if indent % 4 != 0 {
        return Err("indent 4 spaces at once".to_string());
    }
    let level = indent / 4;

    let name_len = body
        .bytes()
        .take_while(|&b| b.is_ascii_alphanumeric() || b == b'_' || b == b'/')
        .count();
    let (name, rest) = body.split_at(name_len);

    if name.is_empty() {
        // Blank line or comment-only line
        return verify_eoln(rest);
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err("'/' not valid at name start or end".to_string());
    }

    let value = collect_value(rest)?;
    let parent = tree
        .at_depth(level)
        .ok_or_else(|| format!("indentation error at level {}", level))?;
    let node = tree.append_child(parent, name);
    if !value.is_empty() {
        tree.set_string(node, &value);
    }
    Ok(())
}

/// Collect the `= value` clause, if any. Returns the empty string for a
/// valueless line.
fn collect_value(rest: &str) -> Result<String, String> {
    let rest = rest.trim_start();
    let Some(rest) = rest.strip_prefix('=') else {
        verify_eoln(rest)?;
        return Ok(String::new());
    };
    let rest = rest.trim_start();

    // Quoted value: matching single or double quote at both ends
    if let Some(quote) = rest.chars().next().filter(|&c| c == '"' || c == '\'') {
        let inner = &rest[1..];
        let Some(end) = inner.find(quote) else {
            return Err(format!("missing {}", quote));
        };
        verify_eoln(&inner[end + 1..])?;
        return Ok(inner[..end].to_string());
    }

    // Bare value runs up to the comment marker
    let value = match rest.find('#') {
        Some(pos) => rest[..pos].trim_end(),
        None => rest,
    };
    Ok(value.to_string())
}

/// Check there is nothing but whitespace before the end of line or a
/// comment marker.
fn verify_eoln(rest: &str) -> Result<(), String> {
    for c in rest.chars() {
        if c == '#' {
            break;
        }
        if !c.is_whitespace() {
            return Err(format!("invalid syntax '{}'", rest.trim_start()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
context
    iothreads = 2
main
    type = zmq_queue
    frontend
        option
            hwm = 1000
        bind = tcp://*:5555
";

    #[test]
    fn test_sample_layout() {
        let tree = parse(SAMPLE);
        assert_eq!(tree.resolve("context/iothreads", "1"), "2");
        let hwm = tree.locate("main/frontend/option/hwm").unwrap();
        assert_eq!(tree.string(hwm), "1000");

        // First non-context top-level child is "main"
        let mut child = tree.child(tree.root());
        while let Some(id) = child {
            if tree.name(id) != "context" {
                assert_eq!(tree.name(id), "main");
                break;
            }
            child = tree.next(id);
        }
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let tree = parse("# leading comment\n\nmain\n    type = zmq_queue   # trailing comment\n\n");
        assert_eq!(tree.resolve("main/type", ""), "zmq_queue");
    }

    #[test]
    fn test_quoted_values() {
        let tree =
            parse("main\n    single = 'inproc://one'\n    double = \"has # no comment\"\n");
        assert_eq!(tree.resolve("main/single", ""), "inproc://one");
        assert_eq!(tree.resolve("main/double", ""), "has # no comment");
    }

    #[test]
    fn test_underscore_names() {
        let tree = parse("main\n    option\n        recovery_ivl = 100\n        mcast_loop = 1\n");
        assert_eq!(tree.resolve("main/option/recovery_ivl", ""), "100");
        assert_eq!(tree.resolve("main/option/mcast_loop", ""), "1");
    }

    #[test]
    fn test_repeated_names_preserved() {
        let tree = parse("main\n    bind = inproc://one\n    bind = inproc://two\n");
        let first = tree.locate("main/bind").unwrap();
        assert_eq!(tree.string(first), "inproc://one");
        let second = tree.next(first).unwrap();
        assert_eq!(tree.name(second), "bind");
        assert_eq!(tree.string(second), "inproc://two");
    }

    #[test]
    fn test_partial_indent_rejects_file() {
        // Six spaces is not a whole number of indentation levels
        let tree = parse("main\n      type = zmq_queue\n");
        assert!(tree.child(tree.root()).is_none());
    }

    #[test]
    fn test_one_bad_line_rejects_whole_file() {
        let tree = parse("main\n    type = zmq_queue\n    bad name here\nother\n");
        assert!(tree.child(tree.root()).is_none());
    }

    #[test]
    fn test_slash_at_name_edge_rejected() {
        let leading = parse("/name\n");
        assert!(leading.child(leading.root()).is_none());
        let trailing = parse("name/\n");
        assert!(trailing.child(trailing.root()).is_none());
        // Interior slash is allowed
        let interior = parse("a/b = 1\n");
        assert!(interior.child(interior.root()).is_some());
    }

    #[test]
    fn test_missing_endquote_rejected() {
        let tree = parse("name = 'unterminated\n");
        assert!(tree.child(tree.root()).is_none());
    }

    #[test]
    fn test_junk_after_quoted_value_rejected() {
        let tree = parse("name = 'value' junk\n");
        assert!(tree.child(tree.root()).is_none());
    }

    #[test]
    fn test_empty_input_is_empty_tree() {
        let tree = parse("");
        assert!(tree.child(tree.root()).is_none());
    }

    #[test]
    fn test_deep_indentation_without_parent_rejected() {
        // First line cannot start at level 1
        let tree = parse("    orphan = 1\n");
        assert!(tree.child(tree.root()).is_none());
    }
}
