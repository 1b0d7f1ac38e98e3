use crate::cost::Cost;
use crate::relation::{Relation, RelationSet};
use phf::phf_set;
use serde_json::{Map, Value};

mod build;

pub use build::plan_of_explain;

pub static NODE_TYPE: &str = "Node Type";
pub static STARTUP_COST: &str = "Startup Cost";
pub static TOTAL_COST: &str = "Total Cost";
pub static RELATION_NAME: &str = "Relation Name";
pub static ALIAS: &str = "Alias";
pub static PLANS: &str = "Plans";

pub static BITMAP_HEAP_SCAN: &str = "Bitmap Heap Scan";
pub static BITMAP_INDEX_SCAN: &str = "Bitmap Index Scan";

pub static SCAN_TYPES: phf::Set<&'static str> = phf_set! {
    "Bitmap Heap Scan",
    "Bitmap Index Scan",
    "Index Scan",
    "Index Only Scan",
    "Seq Scan",
    "Tid Scan",
};

pub static JOIN_TYPES: phf::Set<&'static str> = phf_set! {
    "Hash Join",
    "Merge Join",
    "Nested Loop",
};

/// Position of a node within its tree, as the sequence of child indices taken from the root.
pub type NodePath = Vec<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Scan,
    Join,
    Other,
}

impl NodeKind {
    pub fn of(node_type: &str) -> Self {
        if SCAN_TYPES.contains(node_type) {
            Self::Scan
        } else if JOIN_TYPES.contains(node_type) {
            Self::Join
        } else {
            Self::Other
        }
    }
}

/// One operator of a plan as reported by the planner. Each node owns its children.
#[derive(Debug, Clone)]
pub struct PlanNode {
    node_type: String,
    attributes: Map<String, Value>,
    children: Vec<PlanNode>,
    relations: RelationSet,
    own_relation: Option<Relation>,
    startup_cost: Cost,
    total_cost: Cost,
    exclusive_cost: Cost,
}

/// A plan built once from a raw planner description. The scan and join nodes are recorded during
/// construction in post order.
#[derive(Debug, Clone)]
pub struct PlanTree {
    root: PlanNode,
    scan_paths: Vec<NodePath>,
    join_paths: Vec<NodePath>,
    query: String,
}

impl PlanNode {
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::of(&self.node_type)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn children(&self) -> &[PlanNode] {
        &self.children
    }

    pub fn relations(&self) -> &RelationSet {
        &self.relations
    }

    /// The relation this node reads itself, ignoring anything read by its children.
    pub fn own_relation(&self) -> Option<&Relation> {
        self.own_relation.as_ref()
    }

    pub fn startup_cost(&self) -> Cost {
        self.startup_cost
    }

    pub fn total_cost(&self) -> Cost {
        self.total_cost
    }

    /// The cost contributed by this operator alone. May be slightly negative when the planner's
    /// own rounding makes the children add up to more than the parent.
    pub fn exclusive_cost(&self) -> Cost {
        self.exclusive_cost
    }

    /// The exclusive cost floored at zero, for rendering.
    pub fn display_cost(&self) -> Cost {
        self.exclusive_cost.max(0.)
    }

    pub fn iter_post_order(&self) -> PostOrderIter<'_> {
        PostOrderIter {
            stack: vec![(self, 0)],
        }
    }

    fn at(&self, path: &[usize]) -> Option<&PlanNode> {
        path.iter()
            .try_fold(self, |node, &idx| node.children.get(idx))
    }
}

impl PlanTree {
    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn total_cost(&self) -> Cost {
        self.root.total_cost
    }

    pub fn scan_nodes(&self) -> impl Iterator<Item = &PlanNode> + '_ {
        self.scan_paths
            .iter()
            .filter_map(|path| self.root.at(path))
    }

    pub fn join_nodes(&self) -> impl Iterator<Item = &PlanNode> + '_ {
        self.join_paths
            .iter()
            .filter_map(|path| self.root.at(path))
    }
}

pub struct PostOrderIter<'a> {
    // Each entry holds a node and the index of the next child to descend into.
    stack: Vec<(&'a PlanNode, usize)>,
}

impl<'a> Iterator for PostOrderIter<'a> {
    type Item = &'a PlanNode;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (node, next_child) = self.stack.last_mut()?;
            let node: &'a PlanNode = *node;
            if let Some(child) = node.children.get(*next_child) {
                *next_child += 1;
                self.stack.push((child, 0));
            } else {
                self.stack.pop();
                return Some(node);
            }
        }
    }
}
