//! SOP progress tracking.
//!
//! [`GraphDriver`] keeps the template graph parsed from the SOP next to an
//! execution graph that only ever grows. Actions name the template node they
//! work on; the driver copies those nodes, lazily reconstructs the traversed
//! edges, colours nodes `executing` → `done`, and suggests what comes next.

use std::collections::BTreeMap;

use teamflow_core::{types::StepAction, Error, Result};

use crate::graph::{Graph, Node, NodeColor};
use crate::sop;

/// Prompt-ready projections of the driver state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedStates {
    /// `- name: label` per current node.
    pub current: String,
    /// `- name: label` per candidate next node.
    pub next: String,
    /// Every name above, de-duplicated, comma separated.
    pub all: String,
}

#[derive(Debug, Clone)]
pub struct GraphDriver {
    template: Graph,
    execution: Graph,
    current: Vec<String>,
    /// Execution nodes in the order they were first touched.
    touched: Vec<String>,
}

impl GraphDriver {
    /// Track progress against `template`, which must have an entry node.
    pub fn new(template: Graph) -> Result<Self> {
        if template.is_empty() {
            return Err(Error::graph("sop graph has no nodes"));
        }
        Ok(Self {
            template,
            execution: Graph::new(),
            current: Vec::new(),
            touched: Vec::new(),
        })
    }

    /// Parse the SOP text and track progress against it.
    pub fn from_sop(text: &str) -> Result<Self> {
        Self::new(sop::parse(text)?)
    }

    pub fn template(&self) -> &Graph {
        &self.template
    }

    pub fn execution(&self) -> &Graph {
        &self.execution
    }

    pub fn color(&self, name: &str) -> Option<NodeColor> {
        self.execution.node(name).and_then(|n| n.color)
    }

    /// Fold a round of executed `actions` into the execution graph.
    ///
    /// `steps` is the whole step history of the run, used to rebuild each
    /// node's annotation.
    pub fn update_graph_state(&mut self, steps: &[StepAction], actions: &[StepAction]) {
        let mut names: Vec<String> = Vec::with_capacity(actions.len());
        for action in actions {
            if self.template.contains(&action.node) && !names.contains(&action.node) {
                names.push(action.node.clone());
            } else if !action.node.is_empty() && !self.template.contains(&action.node) {
                tracing::debug!(node = %action.node, "Ignoring action for unknown SOP node");
            }
        }

        self.add_nodes(&names);
        self.current = names;
        self.add_edges();
        self.update_colors();
        self.update_annotations(steps);
    }

    fn add_nodes(&mut self, names: &[String]) {
        for name in names {
            if self.execution.contains(name) {
                continue;
            }
            let Some(template) = self.template.node(name) else {
                continue;
            };
            self.execution.add_node(Node {
                color: Some(NodeColor::Executing),
                comment: String::new(),
                ..template.clone()
            });
            self.touched.push(name.clone());
        }
    }

    /// Copy template in-edges of current nodes whose source already executed.
    fn add_edges(&mut self) {
        for name in &self.current {
            for edge in self.template.in_edges(name) {
                if self.execution.contains(&edge.from)
                    && self
                        .execution
                        .add_edge(edge.from.as_str(), edge.to.as_str(), edge.label.as_str())
                {
                    tracing::debug!(from = %edge.from, to = %edge.to, "Execution edge added");
                }
            }
        }
    }

    fn update_colors(&mut self) {
        for name in &self.touched {
            let out_degree = self.execution.out_degree(name);
            let template_degree = self.template.out_degree(name);
            let Some(node) = self.execution.node_mut(name) else {
                continue;
            };
            if node.color == Some(NodeColor::Done) {
                continue;
            }
            let done = if node.is_branch() {
                out_degree >= 1
            } else {
                out_degree == template_degree
            };
            if done {
                node.color = Some(NodeColor::Done);
                tracing::debug!(node = %name, "SOP node done");
            }
        }
    }

    fn update_annotations(&mut self, steps: &[StepAction]) {
        let mut per_node: BTreeMap<&str, String> = BTreeMap::new();
        for (i, step) in steps.iter().enumerate() {
            per_node.entry(step.node.as_str()).or_default().push_str(&format!(
                "step {}:\nThought: {}\nAction: {}, \nAction Input: {}\nObservation: {}\n",
                i, step.thought, step.action, step.input, step.observation
            ));
        }
        for (name, comment) in per_node {
            if let Some(node) = self.execution.node_mut(name) {
                node.comment = comment;
            }
        }
    }

    /// Nodes touched by the latest round.
    pub fn current_nodes(&self) -> Vec<&Node> {
        self.current
            .iter()
            .filter_map(|name| self.execution.node(name))
            .collect()
    }

    /// Candidate next nodes from the template graph.
    ///
    /// Successors of current nodes, plus the not-yet-started successors of
    /// each current node's non-branch predecessors. Before anything ran the
    /// only candidate is the entry node. With `filter_executed`, nodes
    /// already in the execution graph are dropped.
    pub fn next_nodes(&self, filter_executed: bool) -> Vec<&Node> {
        let mut names: Vec<&str> = Vec::new();
        if self.current.is_empty() {
            names.extend(self.template.entry().map(|n| n.name.as_str()));
        }

        for name in &self.current {
            for edge in self.template.out_edges(name) {
                if !names.contains(&edge.to.as_str()) {
                    names.push(&edge.to);
                }
            }
            for edge in self.template.in_edges(name) {
                let is_branch = self
                    .template
                    .node(&edge.from)
                    .is_some_and(|n| n.is_branch());
                if is_branch {
                    continue;
                }
                for sibling in self.template.out_edges(&edge.from) {
                    if self.color(&sibling.to).is_some() {
                        continue;
                    }
                    if !names.contains(&sibling.to.as_str()) {
                        names.push(&sibling.to);
                    }
                }
            }
        }

        names
            .into_iter()
            .filter(|name| !filter_executed || !self.execution.contains(name))
            .filter_map(|name| self.template.node(name))
            .collect()
    }

    pub fn render_states(&self) -> RenderedStates {
        let mut states = RenderedStates::default();
        let mut names: Vec<&str> = Vec::new();

        for node in self.current_nodes() {
            states
                .current
                .push_str(&format!("- {}: {}\n", node.name, node.label));
            if !names.contains(&node.name.as_str()) {
                names.push(&node.name);
            }
        }
        for node in self.next_nodes(true) {
            states.next.push_str(&format!("- {}: {}\n", node.name, node.label));
            if !names.contains(&node.name.as_str()) {
                names.push(&node.name);
            }
        }
        states.all = names.join(",");
        states
    }

    /// Execution graph as DOT, annotations included.
    pub fn render(&self) -> String {
        self.execution.to_dot()
    }

    /// Execution graph as DOT with every annotation left blank.
    pub fn render_without_annotations(&self) -> String {
        self.execution.to_dot_without_comments()
    }
}
