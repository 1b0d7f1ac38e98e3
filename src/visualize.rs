//! Presentational views of a plan tree. Nothing here looks at costs.
use crate::plan::{PlanNode, PlanTree, ALIAS, NODE_TYPE, RELATION_NAME};
use itertools::Itertools;
use serde_json::Value;
use std::fmt;

static GROUP_KEY: &str = "Group Key";
static STRATEGY: &str = "Strategy";

fn is_primary_key(key: &str) -> bool {
    key == NODE_TYPE
        || key == RELATION_NAME
        || key == ALIAS
        || key == GROUP_KEY
        || key == STRATEGY
        || (key.contains("Filter") && !key.contains("Removed by"))
        || key.contains("Cond")
}

/// The attributes worth showing for a node, in the order the planner reported them.
pub fn primary_info(node: &PlanNode) -> Vec<(&str, &Value)> {
    node.attributes()
        .iter()
        .filter(|(key, _)| is_primary_key(key))
        .map(|(key, val)| (key.as_str(), val))
        .collect()
}

fn value_text(val: &Value) -> String {
    match val {
        Value::String(s) => s.clone(),
        Value::Array(vals) => format!("[{}]", vals.iter().map(value_text).join(", ")),
        _ => val.to_string(),
    }
}

/// One line describing a node, e.g. `Seq Scan (Relation Name: orders, Alias: o)`.
pub fn node_label(node: &PlanNode) -> String {
    let details = primary_info(node)
        .into_iter()
        .filter(|(key, _)| *key != NODE_TYPE)
        .map(|(key, val)| format!("{}: {}", key, value_text(val)))
        .join(", ");
    if details.is_empty() {
        node.node_type().to_string()
    } else {
        format!("{} ({})", node.node_type(), details)
    }
}

/// Renders the tree as lines prefixed by their depth, parents before children.
pub fn render_lines(tree: &PlanTree) -> String {
    fn render(node: &PlanNode, depth: usize, lines: &mut Vec<String>) {
        lines.push(format!("{}-> {}", ":   ".repeat(depth), node_label(node)));
        for child in node.children() {
            render(child, depth + 1, lines);
        }
    }

    let mut lines = vec![];
    render(tree.root(), 0, &mut lines);
    lines.join("\n")
}

pub fn render_tree(tree: &PlanTree) -> termtree::Tree<String> {
    termtree::Tree::from(tree.root())
}

impl From<&PlanNode> for termtree::Tree<String> {
    fn from(node: &PlanNode) -> Self {
        Self::new(node_label(node)).with_leaves(node.children())
    }
}

/// A node/edge description of a plan, ready to hand to a graph renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanGraph {
    pub nodes: Vec<GraphNode>,
    /// Parent to child, by node id.
    pub edges: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: usize,
    pub label: String,
}

impl PlanGraph {
    pub fn new(tree: &PlanTree) -> Self {
        fn add(node: &PlanNode, graph: &mut PlanGraph) -> usize {
            let id = graph.nodes.len();
            graph.nodes.push(GraphNode {
                id,
                label: node_label(node),
            });
            for child in node.children() {
                let child_id = add(child, graph);
                graph.edges.push((id, child_id));
            }
            id
        }

        let mut graph = Self {
            nodes: vec![],
            edges: vec![],
        };
        add(tree.root(), &mut graph);
        graph
    }
}

/// Graphviz DOT.
impl fmt::Display for PlanGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digraph plan {{")?;
        writeln!(f, "    node [shape=box];")?;
        for node in &self.nodes {
            writeln!(
                f,
                "    n{} [label=\"{}\"];",
                node.id,
                node.label.replace('\\', "\\\\").replace('"', "\\\"")
            )?;
        }
        for (parent, child) in &self.edges {
            writeln!(f, "    n{} -> n{};", parent, child)?;
        }
        write!(f, "}}")
    }
}
