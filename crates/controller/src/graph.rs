//! Directed workflow graph: a node table plus ordered adjacency.
//!
//! Used both for the immutable template parsed from an SOP and for the
//! append-only execution graph the driver grows as agents make progress.

use std::collections::HashMap;
use std::fmt::Write;

/// Shape that marks a branch/conditional node.
pub const BRANCH_SHAPE: &str = "diamond";

/// Completion colour of an execution-graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeColor {
    Executing,
    Done,
}

impl NodeColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executing => "green",
            Self::Done => "red",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub label: String,
    pub shape: String,
    pub color: Option<NodeColor>,
    /// Free-text annotation rendered as the DOT `comment` attribute.
    pub comment: String,
}

impl Node {
    /// Node labelled with its own name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            shape: String::new(),
            color: None,
            comment: String::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_shape(mut self, shape: impl Into<String>) -> Self {
        self.shape = shape.into();
        self
    }

    pub fn is_branch(&self) -> bool {
        self.shape.eq_ignore_ascii_case(BRANCH_SHAPE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub label: String,
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    name: String,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a node unless one with the same name exists. Returns whether
    /// it was inserted.
    pub fn add_node(&mut self, node: Node) -> bool {
        if self.index.contains_key(&node.name) {
            return false;
        }
        self.index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// Get or create a plain node.
    pub fn ensure_node(&mut self, name: &str) -> &mut Node {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                self.add_node(Node::new(name));
                self.nodes.len() - 1
            }
        };
        &mut self.nodes[idx]
    }

    /// Insert an edge, creating missing endpoints. Parallel edges with the
    /// same label are collapsed. Returns whether it was inserted.
    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        label: impl Into<String>,
    ) -> bool {
        let edge = Edge {
            from: from.into(),
            to: to.into(),
            label: label.into(),
        };
        if self.edges.contains(&edge) {
            return false;
        }
        self.ensure_node(&edge.from);
        self.ensure_node(&edge.to);
        self.edges.push(edge);
        true
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&idx| &self.nodes[idx])
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.index.get(name).map(|&idx| &mut self.nodes[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// First node inserted.
    pub fn entry(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn out_edges<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == name)
    }

    pub fn in_edges<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.to == name)
    }

    pub fn out_degree(&self, name: &str) -> usize {
        self.out_edges(name).count()
    }

    pub fn in_degree(&self, name: &str) -> usize {
        self.in_edges(name).count()
    }

    /// Serialize to DOT.
    pub fn to_dot(&self) -> String {
        self.render(true)
    }

    /// Serialize to DOT leaving every `comment` attribute empty.
    pub fn to_dot_without_comments(&self) -> String {
        self.render(false)
    }

    fn render(&self, comments: bool) -> String {
        let mut out = String::new();
        if self.name.is_empty() {
            out.push_str("digraph {\n");
        } else {
            let _ = writeln!(out, "digraph {} {{", quote(&self.name));
        }

        for node in &self.nodes {
            let mut attrs = vec![format!("label={}", quote(&node.label))];
            if !node.shape.is_empty() {
                attrs.push(format!("shape={}", quote(&node.shape)));
            }
            if let Some(color) = node.color {
                attrs.push(format!("color={}", color.as_str()));
            }
            if comments && !node.comment.is_empty() {
                attrs.push(format!("comment={}", quote(&node.comment)));
            }
            let _ = writeln!(out, "  {} [{}];", quote(&node.name), attrs.join(", "));
        }

        for edge in &self.edges {
            let _ = write!(out, "  {} -> {}", quote(&edge.from), quote(&edge.to));
            if !edge.label.is_empty() {
                let _ = write!(out, " [label={}]", quote(&edge.label));
            }
            out.push_str(";\n");
        }

        out.push_str("}\n");
        out
    }
}

fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
