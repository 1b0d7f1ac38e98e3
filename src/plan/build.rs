use super::{
    NodeKind, NodePath, PlanNode, PlanTree, ALIAS, NODE_TYPE, PLANS, RELATION_NAME, STARTUP_COST,
    TOTAL_COST,
};
use crate::cost::{round_cost, Cost};
use crate::error::{Error, Result};
use crate::relation::{Relation, RelationSet};
use log::warn;
use serde_json::{Map, Value};

/// Accumulates the scan and join positions while a tree is being built.
#[derive(Default)]
struct Classified {
    scan_paths: Vec<NodePath>,
    join_paths: Vec<NodePath>,
}

impl PlanTree {
    /// Builds a tree from the plan object of an explain result, i.e. the value under `"Plan"`.
    pub fn build(raw: &Value, query: &str) -> Result<Self> {
        let mut classified = Classified::default();
        let mut path = vec![];
        let root = build_node(raw, &mut path, &mut classified)?;
        Ok(Self {
            root,
            scan_paths: classified.scan_paths,
            join_paths: classified.join_paths,
            query: query.to_string(),
        })
    }

    /// Builds a tree from a whole `EXPLAIN (FORMAT JSON)` document. Both the list form returned by
    /// the server and a bare `{"Plan": ...}` object are accepted.
    pub fn from_explain(doc: &Value, query: &str) -> Result<Self> {
        Self::build(plan_of_explain(doc)?, query)
    }
}

/// Extracts the plan object from an `EXPLAIN (FORMAT JSON)` document.
pub fn plan_of_explain(doc: &Value) -> Result<&Value> {
    let doc = match doc {
        Value::Array(items) => items.first().ok_or_else(|| {
            Error::MalformedPlan("explain output is an empty list".to_string())
        })?,
        _ => doc,
    };
    match doc.get("Plan") {
        Some(plan) => Ok(plan),
        // Already a bare plan node.
        None if doc.get(NODE_TYPE).is_some() => Ok(doc),
        None => Err(Error::MalformedPlan(
            "explain output has no \"Plan\" entry".to_string(),
        )),
    }
}

fn build_node(raw: &Value, path: &mut NodePath, classified: &mut Classified) -> Result<PlanNode> {
    let raw = raw
        .as_object()
        .ok_or_else(|| Error::MalformedPlan(format!("plan node is not an object: {}", raw)))?;

    let node_type = raw
        .get(NODE_TYPE)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::MalformedPlan(format!("plan node has no \"{}\"", NODE_TYPE)))?
        .to_string();

    let mut children = vec![];
    if let Some(subplans) = raw.get(PLANS) {
        let subplans = subplans.as_array().ok_or_else(|| {
            Error::MalformedPlan(format!("\"{}\" of {} is not a list", PLANS, node_type))
        })?;
        for (i, subplan) in subplans.iter().enumerate() {
            path.push(i);
            children.push(build_node(subplan, path, classified)?);
            path.pop();
        }
    }

    let mut relations: RelationSet = children
        .iter()
        .flat_map(|child| child.relations.iter().cloned())
        .collect();

    let attributes: Map<String, Value> = raw
        .iter()
        .filter(|(key, _)| key.as_str() != PLANS)
        .map(|(key, val)| (key.clone(), val.clone()))
        .collect();

    let own_relation = match (
        attributes.get(RELATION_NAME).and_then(Value::as_str),
        attributes.get(ALIAS).and_then(Value::as_str),
    ) {
        (Some(name), Some(alias)) => Some(Relation::new(name, alias)),
        _ => None,
    };
    relations.extend(own_relation.iter().cloned());

    let total_cost = read_cost(&attributes, TOTAL_COST, &node_type)?
        .ok_or_else(|| Error::MalformedPlan(format!("{} has no \"{}\"", node_type, TOTAL_COST)))?;
    let startup_cost = read_cost(&attributes, STARTUP_COST, &node_type)?.unwrap_or(0.);

    let children_cost: Cost = children.iter().map(|child| child.total_cost).sum();
    let exclusive_cost = round_cost(total_cost - children_cost);
    if exclusive_cost < 0. {
        warn!(
            "{} has negative exclusive cost {} (total {}, children {})",
            node_type, exclusive_cost, total_cost, children_cost
        );
    }

    match NodeKind::of(&node_type) {
        NodeKind::Scan => classified.scan_paths.push(path.clone()),
        NodeKind::Join => classified.join_paths.push(path.clone()),
        NodeKind::Other => {}
    }

    Ok(PlanNode {
        node_type,
        attributes,
        children,
        relations,
        own_relation,
        startup_cost,
        total_cost,
        exclusive_cost,
    })
}

fn read_cost(attributes: &Map<String, Value>, key: &str, node_type: &str) -> Result<Option<Cost>> {
    attributes
        .get(key)
        .map(|val| {
            val.as_f64().ok_or_else(|| {
                Error::MalformedPlan(format!("\"{}\" of {} is not a number: {}", key, node_type, val))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::relation_key;
    use crate::test_utils::{join, node, scan};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Value {
        node(
            "Sort",
            130.5,
            vec![join(
                "Hash Join",
                120.3,
                vec![
                    scan("Seq Scan", "orders", "o", 60.1),
                    node("Hash", 40., vec![scan("Index Scan", "customer", "customer", 35.)]),
                ],
            )],
        )
    }

    #[test]
    fn test_relations_are_union_of_leaves() {
        let tree = PlanTree::build(&sample(), "q").unwrap();
        assert_eq!(relation_key(tree.root().relations()), "customer orders o");

        let leaves: RelationSet = tree
            .root()
            .iter_post_order()
            .filter(|node| node.children().is_empty())
            .flat_map(|node| node.relations().iter().cloned())
            .collect();
        assert_eq!(&leaves, tree.root().relations());
    }

    #[test]
    fn test_exclusive_cost() {
        let tree = PlanTree::build(&sample(), "q").unwrap();
        let costs: Vec<_> = tree
            .root()
            .iter_post_order()
            .map(|node| (node.node_type().to_string(), node.exclusive_cost()))
            .collect();
        assert_eq!(
            costs,
            vec![
                ("Seq Scan".to_string(), 60.1),
                ("Index Scan".to_string(), 35.),
                ("Hash".to_string(), 5.),
                ("Hash Join".to_string(), 20.2),
                ("Sort".to_string(), 10.2),
            ]
        );
    }

    #[test]
    fn test_classification() {
        let tree = PlanTree::build(&sample(), "q").unwrap();
        let scans: Vec<_> = tree.scan_nodes().map(|node| node.node_type()).collect();
        let joins: Vec<_> = tree.join_nodes().map(|node| node.node_type()).collect();
        assert_eq!(scans, vec!["Seq Scan", "Index Scan"]);
        assert_eq!(joins, vec!["Hash Join"]);
        assert_eq!(tree.query(), "q");
    }

    #[test]
    fn test_attributes_exclude_children() {
        let tree = PlanTree::build(&sample(), "q").unwrap();
        assert!(tree.root().attribute(PLANS).is_none());
        assert_eq!(tree.root().attribute(NODE_TYPE), Some(&json!("Sort")));
        assert_eq!(tree.root().startup_cost(), 0.);
    }

    #[test]
    fn test_relation_needs_name_and_alias() {
        let raw = json!({"Node Type": "Seq Scan", "Relation Name": "t", "Total Cost": 1.0});
        let tree = PlanTree::build(&raw, "q").unwrap();
        assert!(tree.root().relations().is_empty());
    }

    #[test]
    fn test_negative_exclusive_cost_is_kept() {
        let raw = node("Limit", 9.9, vec![scan("Seq Scan", "t", "t", 10.)]);
        let tree = PlanTree::build(&raw, "q").unwrap();
        assert_eq!(tree.root().exclusive_cost(), -0.1);
        assert_eq!(tree.root().display_cost(), 0.);
    }

    #[test]
    fn test_missing_node_type() {
        let raw = json!({
            "Node Type": "Hash Join",
            "Total Cost": 5.0,
            "Plans": [{"Total Cost": 1.0}]
        });
        assert!(matches!(
            PlanTree::build(&raw, "q"),
            Err(Error::MalformedPlan(_))
        ));
    }

    #[test]
    fn test_missing_total_cost() {
        let raw = json!({"Node Type": "Result"});
        assert!(matches!(
            PlanTree::build(&raw, "q"),
            Err(Error::MalformedPlan(_))
        ));
    }

    #[test]
    fn test_from_explain() {
        let doc = json!([{"Plan": scan("Seq Scan", "t", "t", 3.)}]);
        let tree = PlanTree::from_explain(&doc, "q").unwrap();
        assert_eq!(tree.root().node_type(), "Seq Scan");

        let doc = json!({"Plan": scan("Seq Scan", "t", "t", 3.)});
        assert!(PlanTree::from_explain(&doc, "q").is_ok());
        assert!(PlanTree::from_explain(&json!([]), "q").is_err());
        assert!(PlanTree::from_explain(&json!({"Planning": 1}), "q").is_err());
    }
}
