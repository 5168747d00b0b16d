// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON configuration loader.
//!
//! Object members become named children, array members become repeated
//! named children (the array itself collapses; the sibling list encodes
//! multiplicity), strings and numbers become leaf values. The top-level
//! object becomes the child list of the synthetic root node.

use super::PropertyTree;
use serde_json::Value;

/// Parse a JSON object into a property tree. Invalid JSON or a
/// non-object top level yields an empty tree.
pub(super) fn parse(input: &str) -> PropertyTree {
    let mut tree = PropertyTree::new();
    let value: Value = match serde_json::from_str(input) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("[JSON] parse failed: {}", e);
            return tree;
        }
    };
    let Some(members) = value.as_object() else {
        log::warn!("[JSON] top-level value must be an object");
        return tree;
    };
    let root = tree.root();
    for (name, member) in members {
        load_member(&mut tree, root, name, member);
    }
    tree
}

/// Attach one named member under `parent`, recursively.
fn load_member(tree: &mut PropertyTree, parent: super::NodeId, name: &str, value: &Value) {
    match value {
        Value::Object(members) => {
            let node = tree.append_child(parent, name);
            for (child_name, child) in members {
                load_member(tree, node, child_name, child);
            }
        }
        Value::Array(items) => {
            // One child per element, all under the member's name
            for item in items {
                load_member(tree, parent, name, item);
            }
        }
        scalar => {
            let node = tree.append_child(parent, name);
            let text = scalar_text(scalar);
            if !text.is_empty() {
                tree.set_string(node, &text);
            }
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    {
        "context": {
            "iothreads": 1,
            "verbose": false
        },
        "main": {
            "type": "zmq_queue",
            "frontend": {
                "option": {
                    "hwm": 1000,
                    "swap": 25000000
                },
                "bind": [ "inproc://addr1", "ipc://addr2" ]
            },
            "backend": {
                "bind": "inproc://addr3"
            }
        }
    }
    "#;

    #[test]
    fn test_objects_become_children() {
        let tree = parse(SAMPLE);
        assert_eq!(tree.resolve("main/type", ""), "zmq_queue");
        assert_eq!(tree.resolve("main/backend/bind", ""), "inproc://addr3");
    }

    #[test]
    fn test_numbers_stringified() {
        let tree = parse(SAMPLE);
        assert_eq!(tree.resolve("context/iothreads", ""), "1");
        assert_eq!(tree.resolve("main/frontend/option/hwm", ""), "1000");
        assert_eq!(tree.resolve("main/frontend/option/swap", ""), "25000000");
    }

    #[test]
    fn test_booleans_become_flags() {
        let tree = parse(SAMPLE);
        assert_eq!(tree.resolve("context/verbose", "1"), "0");
    }

    #[test]
    fn test_arrays_become_repeated_children() {
        let tree = parse(SAMPLE);
        let first = tree.locate("main/frontend/bind").unwrap();
        assert_eq!(tree.string(first), "inproc://addr1");
        let second = tree.next(first).unwrap();
        assert_eq!(tree.name(second), "bind");
        assert_eq!(tree.string(second), "ipc://addr2");
    }

    #[test]
    fn test_member_order_preserved() {
        let tree = parse(r#"{"zeta": 1, "alpha": 2}"#);
        let first = tree.child(tree.root()).unwrap();
        assert_eq!(tree.name(first), "zeta");
        let second = tree.next(first).unwrap();
        assert_eq!(tree.name(second), "alpha");
    }

    #[test]
    fn test_invalid_json_is_empty_tree() {
        let tree = parse("{ not json");
        assert!(tree.child(tree.root()).is_none());
    }

    #[test]
    fn test_non_object_top_level_is_empty_tree() {
        let tree = parse("[1, 2, 3]");
        assert!(tree.child(tree.root()).is_none());
    }
}
