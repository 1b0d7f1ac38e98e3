use crate::plan::{PlanTree, BITMAP_HEAP_SCAN, BITMAP_INDEX_SCAN};
use crate::relation::relation_key;
use float_ord::FloatOrd;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

pub type Cost = f64;

/// Minimum observed exclusive cost, keyed by relation key and then by operator type.
pub type CostTable = BTreeMap<String, BTreeMap<String, Cost>>;

/// Label under which bitmap heap scans are recorded. The heap scan's exclusive cost stands for the
/// whole bitmap scan once the index probe below it is rolled in.
pub static BITMAP_SCAN: &str = "Bitmap Scan";

/// Rounds a cost to one decimal place, the precision the planner reports costs at.
pub fn round_cost(cost: Cost) -> Cost {
    (cost * 10.).round() / 10.
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostTables {
    pub scans: CostTable,
    pub joins: CostTable,
    /// The cheapest root total cost among the alternative plans, if there were any.
    pub min_total_cost: Option<Cost>,
}

/// One flattened cost table entry, for exporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostRecord {
    pub kind: &'static str,
    pub relations: String,
    pub operator: String,
    pub cost: Cost,
}

impl CostTables {
    pub fn from_aqps(aqp_trees: &[PlanTree]) -> Self {
        let tables = Self {
            scans: collect_scans(aqp_trees),
            joins: collect_joins(aqp_trees),
            min_total_cost: aqp_trees
                .iter()
                .map(|tree| FloatOrd(tree.total_cost()))
                .min()
                .map(|cost| cost.0),
        };
        debug!(
            "aggregated {} AQPs into {} scan keys and {} join keys",
            aqp_trees.len(),
            tables.scans.len(),
            tables.joins.len()
        );
        tables
    }

    pub fn records(&self) -> Vec<CostRecord> {
        let flatten = |kind: &'static str, table: &CostTable| {
            table
                .iter()
                .flat_map(move |(relations, costs)| {
                    costs.iter().map(move |(operator, &cost)| CostRecord {
                        kind,
                        relations: relations.clone(),
                        operator: operator.clone(),
                        cost,
                    })
                })
                .collect::<Vec<_>>()
        };
        let mut records = flatten("scan", &self.scans);
        records.extend(flatten("join", &self.joins));
        records
    }
}

/// Collects the cheapest exclusive cost of every scan type seen for each relation.
pub fn collect_scans(aqp_trees: &[PlanTree]) -> CostTable {
    let mut result = CostTable::new();
    for tree in aqp_trees {
        for node in tree.scan_nodes() {
            let node_type = node.node_type();
            if node_type == BITMAP_INDEX_SCAN {
                continue;
            }
            let node_type = if node_type == BITMAP_HEAP_SCAN {
                BITMAP_SCAN
            } else {
                node_type
            };
            record_min(
                &mut result,
                relation_key(node.relations()),
                node_type,
                node.exclusive_cost(),
            );
        }
    }
    result
}

/// Collects the cheapest exclusive cost of every join type seen for each set of joined relations.
pub fn collect_joins(aqp_trees: &[PlanTree]) -> CostTable {
    let mut result = CostTable::new();
    for tree in aqp_trees {
        for node in tree.join_nodes() {
            record_min(
                &mut result,
                relation_key(node.relations()),
                node.node_type(),
                node.exclusive_cost(),
            );
        }
    }
    result
}

fn record_min(table: &mut CostTable, key: String, node_type: &str, cost: Cost) {
    let costs = table.entry(key).or_default();
    match costs.get_mut(node_type) {
        Some(min_cost) if cost < *min_cost => *min_cost = cost,
        Some(_) => {}
        None => {
            costs.insert(node_type.to_string(), cost);
        }
    }
}
