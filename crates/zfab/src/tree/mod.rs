// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hierarchical property tree.
//!
//! A sideways binary tree: every node links to its first child and its
//! next sibling, which preserves document order while keeping the
//! structure a plain list-of-lists. Nodes carry a name and an optional
//! value blob read back as a string.
//!
//! Nodes live in an arena (`Vec`) and link to each other through
//! [`NodeId`] indices, so the parent back-reference is a plain index
//! rather than a shared owning pointer.
//!
//! Trees are populated by hand via [`PropertyTree::append_child`], or by
//! the loaders: the text-property format ([`PropertyTree::from_zpl`])
//! and a JSON subset ([`PropertyTree::from_json`]).

mod json;
mod zpl;

use crate::error::{Error, Result};
use std::io::Write;
use std::ops::ControlFlow;
use std::path::Path;

/// Handle to a node inside a [`PropertyTree`] arena.
///
/// Ids are only meaningful for the tree that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    name: String,
    value: Option<Vec<u8>>,
    child: Option<NodeId>,
    next: Option<NodeId>,
    parent: Option<NodeId>,
}

/// Arena-backed property tree with a single root node.
#[derive(Debug, Clone)]
pub struct PropertyTree {
    nodes: Vec<Node>,
}

impl Default for PropertyTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyTree {
    /// Create a tree holding only the synthetic `root` node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: "root".to_string(),
                value: None,
                child: None,
                next: None,
                parent: None,
            }],
        }
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Create a new node and attach it as the last child of `parent`,
    /// preserving document order.
    pub fn append_child(&mut self, parent: NodeId, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            value: None,
            child: None,
            next: None,
            parent: Some(parent),
        });
        match self.nodes[parent.0].child {
            None => self.nodes[parent.0].child = Some(id),
            Some(first) => {
                let mut last = first;
                while let Some(next) = self.nodes[last.0].next {
                    last = next;
                }
                self.nodes[last.0].next = Some(id);
            }
        }
        id
    }

    /// Node name.
    #[must_use]
    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].name
    }

    /// Rename a node.
    pub fn set_name(&mut self, node: NodeId, name: &str) {
        self.nodes[node.0].name = name.to_string();
    }

    /// Node value blob, if any.
    #[must_use]
    pub fn value(&self, node: NodeId) -> Option<&[u8]> {
        self.nodes[node.0].value.as_deref()
    }

    /// Replace the node value blob; `None` wipes it.
    pub fn set_value(&mut self, node: NodeId, value: Option<Vec<u8>>) {
        self.nodes[node.0].value = value;
    }

    /// Node value as text; the empty string when the node has no value
    /// or the value is not valid UTF-8.
    #[must_use]
    pub fn string(&self, node: NodeId) -> &str {
        self.nodes[node.0]
            .value
            .as_deref()
            .and_then(|v| std::str::from_utf8(v).ok())
            .unwrap_or("")
    }

    /// Set the node value from a string.
    pub fn set_string(&mut self, node: NodeId, value: &str) {
        self.nodes[node.0].value = Some(value.as_bytes().to_vec());
    }

    /// First child, if any.
    #[must_use]
    pub fn child(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].child
    }

    /// Next sibling, if any.
    #[must_use]
    pub fn next(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].next
    }

    /// Parent node; `None` only for the root.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// Find a node by `a/b/c` path, walking children that match each
    /// segment starting at the root's children.
    #[must_use]
    pub fn locate(&self, path: &str) -> Option<NodeId> {
        self.locate_from(self.root(), path)
    }

    /// Find a node by path relative to `from`.
    #[must_use]
    pub fn locate_from(&self, from: NodeId, path: &str) -> Option<NodeId> {
        let (segment, rest) = match path.split_once('/') {
            Some((seg, rest)) => (seg, Some(rest)),
            None => (path, None),
        };
        let mut child = self.child(from);
        while let Some(id) = child {
            if self.nodes[id.0].name == segment {
                return match rest {
                    Some(rest) => self.locate_from(id, rest),
                    None => Some(id),
                };
            }
            child = self.next(id);
        }
        None
    }

    /// String value of the node at `path`, or `default` when the path
    /// does not exist.
    #[must_use]
    pub fn resolve<'a>(&'a self, path: &str, default: &'a str) -> &'a str {
        match self.locate(path) {
            Some(node) => self.string(node),
            None => default,
        }
    }

    /// Latest node at the given depth, where 0 is the root: descend by
    /// repeatedly taking the last child. Used by the loaders to find the
    /// current indentation parent.
    #[must_use]
    pub fn at_depth(&self, level: usize) -> Option<NodeId> {
        let mut node = self.root();
        for _ in 0..level {
            let mut child = self.child(node)?;
            while let Some(next) = self.next(child) {
                child = next;
            }
            node = child;
        }
        Some(node)
    }

    /// Pre-order walk. The visitor receives the tree, the node and its
    /// depth (root = 0) and may short-circuit by returning
    /// `ControlFlow::Break(())`.
    pub fn walk<F>(&self, mut visitor: F) -> ControlFlow<()>
    where
        F: FnMut(&PropertyTree, NodeId, usize) -> ControlFlow<()>,
    {
        self.walk_node(self.root(), 0, &mut visitor)
    }

    fn walk_node<F>(&self, node: NodeId, depth: usize, visitor: &mut F) -> ControlFlow<()>
    where
        F: FnMut(&PropertyTree, NodeId, usize) -> ControlFlow<()>,
    {
        if let ControlFlow::Break(()) = visitor(self, node, depth) {
            return ControlFlow::Break(());
        }
        let mut child = self.child(node);
        while let Some(id) = child {
            if let ControlFlow::Break(()) = self.walk_node(id, depth + 1, visitor) {
                return ControlFlow::Break(());
            }
            child = self.next(id);
        }
        ControlFlow::Continue(())
    }

    /// Pretty-print the tree to `out` as indented name/value pairs, the
    /// canonical text-property rendition. The root node itself is not
    /// printed.
    pub fn dump<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let mut result = Ok(());
        self.walk(|tree, node, depth| {
            if depth == 0 {
                return ControlFlow::Continue(());
            }
            let indent = (depth - 1) * 4;
            let line = match tree.value(node) {
                Some(_) => writeln!(
                    out,
                    "{:indent$}{} = {}",
                    "",
                    tree.name(node),
                    tree.string(node)
                ),
                None => writeln!(out, "{:indent$}{}", "", tree.name(node)),
            };
            if let Err(e) = line {
                result = Err(e);
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        });
        result
    }

    /// Save the tree to a file in text-property format.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        self.dump(&mut file)?;
        Ok(())
    }

    /// Load a tree from a file, autodetecting JSON (first non-blank
    /// byte `{`) versus text-property format. A non-blank file that
    /// parses to an empty tree is rejected as a configuration error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<PropertyTree> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)?;
        let tree = Self::from_config_str(&input);
        if tree.child(tree.root()).is_none() && !input.trim().is_empty() {
            return Err(Error::config(format!(
                "{}: invalid configuration",
                path.display()
            )));
        }
        Ok(tree)
    }

    /// Parse configuration text, autodetecting JSON versus the
    /// text-property format.
    #[must_use]
    pub fn from_config_str(input: &str) -> PropertyTree {
        if input.trim_start().starts_with('{') {
            Self::from_json(input)
        } else {
            Self::from_zpl(input)
        }
    }

    /// Parse text-property input. The file is accepted or rejected
    /// atomically: any syntax error yields an empty tree, with each
    /// offending line logged.
    #[must_use]
    pub fn from_zpl(input: &str) -> PropertyTree {
        zpl::parse(input)
    }

    /// Parse a JSON subset. Object members become named children, array
    /// members become repeated named children, scalars become leaf
    /// values. Invalid JSON yields an empty tree.
    #[must_use]
    pub fn from_json(input: &str) -> PropertyTree {
        json::parse(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build the canonical test tree:
    ///
    /// root
    ///     type = zmq_queue
    ///     frontend
    ///         option
    ///             hwm = 1000
    ///             subscribe = #2
    ///         bind = tcp://eth0:5555
    ///     backend
    ///         bind = tcp://eth0:5556
    fn sample_tree() -> PropertyTree {
        let mut tree = PropertyTree::new();
        let root = tree.root();
        let type_node = tree.append_child(root, "type");
        tree.set_string(type_node, "zmq_queue");
        let frontend = tree.append_child(root, "frontend");
        let option = tree.append_child(frontend, "option");
        let hwm = tree.append_child(option, "hwm");
        tree.set_string(hwm, "1000");
        let subscribe = tree.append_child(option, "subscribe");
        tree.set_string(subscribe, "#2");
        let bind = tree.append_child(frontend, "bind");
        tree.set_string(bind, "tcp://eth0:5555");
        let backend = tree.append_child(root, "backend");
        let bind = tree.append_child(backend, "bind");
        tree.set_string(bind, "tcp://eth0:5556");
        tree
    }

    #[test]
    fn test_children_attach_in_document_order() {
        let tree = sample_tree();
        let mut names = Vec::new();
        let mut child = tree.child(tree.root());
        while let Some(id) = child {
            names.push(tree.name(id).to_string());
            child = tree.next(id);
        }
        assert_eq!(names, ["type", "frontend", "backend"]);
    }

    #[test]
    fn test_locate_and_resolve() {
        let tree = sample_tree();
        let hwm = tree.locate("frontend/option/hwm").unwrap();
        assert_eq!(tree.string(hwm), "1000");
        assert_eq!(tree.resolve("frontend/option/hwm", "0"), "1000");
        assert_eq!(tree.resolve("frontend/option/missing", "fallback"), "fallback");
        assert!(tree.locate("frontend/missing/hwm").is_none());
    }

    #[test]
    fn test_resolve_default_iff_locate_none() {
        let tree = sample_tree();
        for path in ["type", "backend/bind", "nope", "frontend/nope"] {
            match tree.locate(path) {
                Some(node) => assert_eq!(tree.resolve(path, "dflt"), tree.string(node)),
                None => assert_eq!(tree.resolve(path, "dflt"), "dflt"),
            }
        }
    }

    #[test]
    fn test_valueless_node_reads_as_empty_string() {
        let tree = sample_tree();
        let frontend = tree.locate("frontend").unwrap();
        assert!(tree.value(frontend).is_none());
        assert_eq!(tree.string(frontend), "");
    }

    #[test]
    fn test_at_depth_follows_last_children() {
        let tree = sample_tree();
        assert_eq!(tree.at_depth(0), Some(tree.root()));
        // Depth 1: last top-level child is "backend"
        let level1 = tree.at_depth(1).unwrap();
        assert_eq!(tree.name(level1), "backend");
        // Depth 2: backend's last child is its "bind"
        let level2 = tree.at_depth(2).unwrap();
        assert_eq!(tree.name(level2), "bind");
        assert!(tree.at_depth(3).is_none());
    }

    #[test]
    fn test_parent_backreference() {
        let tree = sample_tree();
        let hwm = tree.locate("frontend/option/hwm").unwrap();
        let option = tree.parent(hwm).unwrap();
        assert_eq!(tree.name(option), "option");
        assert!(tree.parent(tree.root()).is_none());
    }

    #[test]
    fn test_walk_preorder_with_depth() {
        let tree = sample_tree();
        let mut visits = Vec::new();
        tree.walk(|t, node, depth| {
            visits.push((t.name(node).to_string(), depth));
            ControlFlow::Continue(())
        });
        assert_eq!(visits[0], ("root".to_string(), 0));
        assert_eq!(visits[1], ("type".to_string(), 1));
        assert_eq!(visits[2], ("frontend".to_string(), 1));
        assert_eq!(visits[3], ("option".to_string(), 2));
        assert_eq!(visits[4], ("hwm".to_string(), 3));
    }

    #[test]
    fn test_walk_short_circuits() {
        let tree = sample_tree();
        let mut count = 0;
        let flow = tree.walk(|t, node, _| {
            count += 1;
            if t.name(node) == "option" {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(flow, ControlFlow::Break(()));
        // root, type, frontend, option
        assert_eq!(count, 4);
    }

    #[test]
    fn test_dump_renders_canonical_text() {
        let tree = sample_tree();
        let mut out = Vec::new();
        tree.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = "\
type = zmq_queue
frontend
    option
        hwm = 1000
        subscribe = #2
    bind = tcp://eth0:5555
backend
    bind = tcp://eth0:5556
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_save_and_reload() {
        let tree = sample_tree();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.cfg");
        tree.save(&path).unwrap();

        let reloaded = PropertyTree::load(&path).unwrap();
        assert_eq!(reloaded.resolve("frontend/option/hwm", ""), "1000");
        assert_eq!(reloaded.resolve("type", ""), "zmq_queue");
    }

    #[test]
    fn test_load_rejects_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.cfg");
        std::fs::write(&path, "   bad-indent\n").unwrap();
        assert!(matches!(PropertyTree::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        assert!(matches!(
            PropertyTree::load("/nonexistent/zfab.cfg"),
            Err(Error::Io(_))
        ));
    }
}
