use crate::cost::{Cost, CostTable, CostTables, BITMAP_SCAN};
use crate::plan::{NodeKind, PlanNode, PlanTree, BITMAP_HEAP_SCAN, BITMAP_INDEX_SCAN};
use crate::relation::relation_key;
use approx::{abs_diff_eq, relative_eq};
use itertools::Itertools;
use log::debug;

/// Relative difference under which two costs are reported as similar.
pub static DEFAULT_COST_TOLERANCE: f64 = 1e-6;

// Absolute slack for costs that are effectively zero.
static COST_EPSILON: Cost = 1e-9;

static ONLY_SCAN_TYPE: &str = "This is the only possible scan type among all AQPs.";

/// How an alternative's cost relates to the chosen operator's cost. The payload is the absolute
/// difference.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Comparison {
    Similar,
    More(Cost),
    Less(Cost),
}

/// Writes the step-numbered justification of a QEP against the costs seen in its AQPs.
pub struct AnnotationGenerator {
    tolerance: f64,
}

impl Default for AnnotationGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_COST_TOLERANCE)
    }
}

impl AnnotationGenerator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn annotate(&self, qep: &PlanTree, tables: &CostTables) -> String {
        let mut steps = vec![];
        let mut next_step = 1;
        self.annotate_node(qep.root(), &mut next_step, tables, &mut steps);
        steps.push(trailer(qep, tables));
        steps.join("\n\n")
    }

    /// Annotates `node` after its children and returns the step number it was given, if any. The
    /// index probe of a bitmap scan is described by its heap scan and gets no step of its own.
    fn annotate_node(
        &self,
        node: &PlanNode,
        next_step: &mut usize,
        tables: &CostTables,
        out: &mut Vec<String>,
    ) -> Option<usize> {
        let child_steps: Vec<usize> = node
            .children()
            .iter()
            .filter_map(|child| self.annotate_node(child, next_step, tables, out))
            .collect();
        if node.node_type() == BITMAP_INDEX_SCAN {
            return None;
        }

        let (target, reasons) = match node.kind() {
            NodeKind::Scan => (scan_target(node), self.scan_reasons(node, &tables.scans)),
            NodeKind::Join => (
                results_target(node, &child_steps),
                self.join_reasons(node, &tables.joins),
            ),
            NodeKind::Other => (results_target(node, &child_steps), vec![]),
        };

        let step = *next_step;
        *next_step += 1;

        let mut text = format!("{}. Perform {}", step, node.node_type());
        if !target.is_empty() {
            text.push(' ');
            text.push_str(&target);
        }
        for reason in reasons {
            text.push_str("\n\t");
            text.push_str(&reason);
        }
        out.push(text);
        Some(step)
    }

    fn scan_reasons(&self, node: &PlanNode, scans: &CostTable) -> Vec<String> {
        let key = relation_key(node.relations());
        let node_type = node.node_type();
        let is_bitmap = node_type == BITMAP_HEAP_SCAN;
        let chosen = if is_bitmap { BITMAP_SCAN } else { node_type };

        let choices = match scans.get(&key) {
            Some(choices) if choices.keys().any(|scan_type| scan_type != chosen) => choices,
            Some(_) => return vec![ONLY_SCAN_TYPE.to_string()],
            None => {
                debug!("no AQP scanned {}", key);
                return vec![ONLY_SCAN_TYPE.to_string()];
            }
        };

        let baseline = if is_bitmap {
            choices
                .get(BITMAP_SCAN)
                .copied()
                .unwrap_or_else(|| node.display_cost())
        } else {
            node.display_cost()
        };
        let zero_baseline = is_zero(baseline);

        choices
            .iter()
            .filter(|(scan_type, _)| scan_type.as_str() != chosen)
            .map(|(scan_type, &cost)| match self.compare(cost, baseline) {
                Comparison::Similar => format!(
                    "Using {} in AQP has similar cost as {}.",
                    scan_type, node_type
                ),
                Comparison::More(diff) if zero_baseline => {
                    format!("Using {} in AQP costs {} more.", scan_type, format_cost(diff))
                }
                Comparison::Less(diff) if zero_baseline => {
                    format!("Using {} in AQP costs {} less.", scan_type, format_cost(diff))
                }
                Comparison::More(diff) => format!(
                    "Using {} in AQP costs {}x more, resulting in increased cost of {}.",
                    scan_type,
                    format_cost(diff / baseline),
                    format_cost(diff)
                ),
                Comparison::Less(diff) => format!(
                    "Using {} in AQP costs {}x less, resulting in decreased cost of {}.",
                    scan_type,
                    format_cost(diff / baseline),
                    format_cost(diff)
                ),
            })
            .collect()
    }

    fn join_reasons(&self, node: &PlanNode, joins: &CostTable) -> Vec<String> {
        let key = relation_key(node.relations());
        let node_type = node.node_type();

        let others: Vec<_> = match joins.get(&key) {
            Some(choices) => choices
                .iter()
                .filter(|(join_type, _)| join_type.as_str() != node_type)
                .collect(),
            None => {
                debug!("no AQP joined exactly {}", key);
                vec![]
            }
        };
        if others.is_empty() {
            return vec![format!(
                "This is the only join type performed on {} among all AQPs.",
                node.relations().iter().join(", ")
            )];
        }

        let baseline = node.display_cost();
        let zero_baseline = is_zero(baseline);

        others
            .into_iter()
            .map(|(join_type, &cost)| match self.compare(cost, baseline) {
                Comparison::Similar => format!(
                    "Using {} in AQP has similar cost as {}.",
                    join_type, node_type
                ),
                Comparison::More(diff) if zero_baseline => format!(
                    "Using {} in AQP costs {} more than {}.",
                    join_type,
                    format_cost(diff),
                    node_type
                ),
                Comparison::Less(diff) if zero_baseline => format!(
                    "Using {} in AQP costs {} less than {}.",
                    join_type,
                    format_cost(diff),
                    node_type
                ),
                Comparison::More(diff) => format!(
                    "Using {} in AQP costs {}x the cost of using {} (costs {} more).",
                    join_type,
                    format_cost(cost / baseline),
                    node_type,
                    format_cost(diff)
                ),
                Comparison::Less(diff) => format!(
                    "Using {} in AQP costs {}x the cost of using {} (costs {} less).",
                    join_type,
                    format_cost(cost / baseline),
                    node_type,
                    format_cost(diff)
                ),
            })
            .collect()
    }

    fn compare(&self, cost: Cost, baseline: Cost) -> Comparison {
        if relative_eq!(
            cost,
            baseline,
            epsilon = COST_EPSILON,
            max_relative = self.tolerance
        ) {
            Comparison::Similar
        } else if cost > baseline {
            Comparison::More(cost - baseline)
        } else {
            Comparison::Less(baseline - cost)
        }
    }
}

fn is_zero(cost: Cost) -> bool {
    abs_diff_eq!(cost, 0., epsilon = COST_EPSILON)
}

/// Names the relation a scan reads. Subplans under the scan, e.g. an InitPlan, do not count.
fn scan_target(node: &PlanNode) -> String {
    match node.own_relation() {
        Some(relation) => format!("on {}.", relation),
        None => format!("on {}.", relation_key(node.relations())),
    }
}

fn results_target(node: &PlanNode, child_steps: &[usize]) -> String {
    if child_steps.is_empty() {
        if node.relations().is_empty() {
            String::new()
        } else {
            format!("on {}.", relation_key(node.relations()))
        }
    } else {
        format!(
            "on result(s) from {}",
            child_steps.iter().map(|step| format!("({})", step)).join(", ")
        )
    }
}

fn trailer(qep: &PlanTree, tables: &CostTables) -> String {
    let min_aqp = match tables.min_total_cost {
        Some(cost) => format!(
            "Minimum total estimated cost among all AQPs: {}.",
            format_cost(cost)
        ),
        None => "No alternative plans were produced.".to_string(),
    };
    format!(
        "Total estimated cost of the QEP: {}.\n{}\n\
         Note: all costs are estimates made by the planner, not measured runtimes.",
        format_cost(qep.total_cost()),
        min_aqp
    )
}

/// Formats a cost or ratio with at most two decimals and no trailing zeros.
pub fn format_cost(cost: Cost) -> String {
    let formatted = format!("{:.2}", cost);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{bitmap_scan, join, node, scan};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn tree(raw: serde_json::Value) -> PlanTree {
        PlanTree::build(&raw, "q").unwrap()
    }

    fn table(entries: &[(&str, &[(&str, Cost)])]) -> CostTable {
        entries
            .iter()
            .map(|(key, costs)| {
                (
                    key.to_string(),
                    costs
                        .iter()
                        .map(|(op, cost)| (op.to_string(), *cost))
                        .collect::<BTreeMap<_, _>>(),
                )
            })
            .collect()
    }

    #[test]
    fn test_format_cost() {
        assert_eq!(format_cost(1.25), "1.25");
        assert_eq!(format_cost(30.), "30");
        assert_eq!(format_cost(0.2), "0.2");
        assert_eq!(format_cost(0.), "0");
        assert_eq!(format_cost(-0.001), "0");
        assert_eq!(format_cost(1.0 / 3.0), "0.33");
    }

    #[test]
    fn test_cheaper_scan_alternative() {
        let qep = tree(scan("Seq Scan", "r", "r", 100.));
        let tables = CostTables {
            scans: table(&[("r", &[("Seq Scan", 100.), ("Index Scan", 80.)])]),
            ..Default::default()
        };
        let text = AnnotationGenerator::default().annotate(&qep, &tables);
        assert!(text.starts_with(
            "1. Perform Seq Scan on r.\n\tUsing Index Scan in AQP costs 0.2x less, \
             resulting in decreased cost of 20.\n\n"
        ));
        assert!(!text.contains("only possible"));
    }

    #[test]
    fn test_costlier_join_alternative() {
        let qep = tree(join(
            "Hash Join",
            270.,
            vec![scan("Seq Scan", "a", "a", 100.), scan("Seq Scan", "b", "b", 50.)],
        ));
        let tables = CostTables {
            scans: table(&[("a", &[("Seq Scan", 100.)]), ("b", &[("Seq Scan", 50.)])]),
            joins: table(&[("a b", &[("Hash Join", 120.), ("Nested Loop", 150.)])]),
            min_total_cost: Some(270.),
        };
        let text = AnnotationGenerator::default().annotate(&qep, &tables);
        assert!(text.contains(
            "3. Perform Hash Join on result(s) from (1), (2)\n\tUsing Nested Loop in AQP costs \
             1.25x the cost of using Hash Join (costs 30 more)."
        ));
    }

    #[test]
    fn test_zero_baseline() {
        let qep = tree(scan("Index Only Scan", "r", "r", 0.));
        let tables = CostTables {
            scans: table(&[("r", &[("Index Only Scan", 0.), ("Seq Scan", 5.)])]),
            ..Default::default()
        };
        let text = AnnotationGenerator::default().annotate(&qep, &tables);
        assert!(text.contains("\tUsing Seq Scan in AQP costs 5 more.\n"));
        assert!(!text.contains("x more"));

        let qep = tree(join(
            "Nested Loop",
            3.,
            vec![scan("Seq Scan", "a", "a", 1.), scan("Seq Scan", "b", "b", 2.)],
        ));
        let tables = CostTables {
            joins: table(&[("a b", &[("Nested Loop", 0.), ("Hash Join", 4.5)])]),
            ..Default::default()
        };
        let text = AnnotationGenerator::default().annotate(&qep, &tables);
        assert!(text.contains("\tUsing Hash Join in AQP costs 4.5 more than Nested Loop.\n"));
    }

    #[test]
    fn test_similar_cost() {
        let qep = tree(scan("Seq Scan", "r", "r", 100.));
        let tables = CostTables {
            scans: table(&[("r", &[("Seq Scan", 100.), ("Tid Scan", 100.00000001)])]),
            ..Default::default()
        };
        let text = AnnotationGenerator::default().annotate(&qep, &tables);
        assert!(text.contains("\tUsing Tid Scan in AQP has similar cost as Seq Scan.\n"));
    }

    #[test]
    fn test_bitmap_index_scan_is_not_numbered() {
        let qep = tree(bitmap_scan("part", "p", 40., 10.));
        let tables = CostTables {
            scans: table(&[("part p", &[("Bitmap Scan", 25.), ("Seq Scan", 50.)])]),
            ..Default::default()
        };
        let text = AnnotationGenerator::default().annotate(&qep, &tables);
        assert!(text.starts_with(
            "1. Perform Bitmap Heap Scan on part p.\n\tUsing Seq Scan in AQP costs 1x more, \
             resulting in increased cost of 25.\n\n"
        ));
        assert!(
            !text.contains("Bitmap Index Scan"),
            "the index probe is folded into its heap scan and gets no step of its own"
        );

        let qep = tree(node("Hash", 45., vec![bitmap_scan("part", "p", 40., 10.)]));
        let text = AnnotationGenerator::default().annotate(&qep, &tables);
        assert!(text.contains("\n\n2. Perform Hash on result(s) from (1)\n\n"));
    }

    #[test]
    fn test_single_aqp_round_trip() {
        let qep = tree(node(
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
        ));
        let tables = CostTables::from_aqps(std::slice::from_ref(&qep));
        let text = AnnotationGenerator::default().annotate(&qep, &tables);
        assert_eq!(
            text,
            "1. Perform Seq Scan on orders o.\n\
             \tThis is the only possible scan type among all AQPs.\n\n\
             2. Perform Index Scan on customer.\n\
             \tThis is the only possible scan type among all AQPs.\n\n\
             3. Perform Hash on result(s) from (2)\n\n\
             4. Perform Hash Join on result(s) from (1), (3)\n\
             \tThis is the only join type performed on customer, orders o among all AQPs.\n\n\
             5. Perform Sort on result(s) from (4)\n\n\
             Total estimated cost of the QEP: 130.5.\n\
             Minimum total estimated cost among all AQPs: 130.5.\n\
             Note: all costs are estimates made by the planner, not measured runtimes."
        );
    }

    #[test]
    fn test_missing_cost_data() {
        let qep = tree(join(
            "Merge Join",
            30.,
            vec![scan("Seq Scan", "a", "a", 10.), scan("Seq Scan", "b", "b", 10.)],
        ));
        let text = AnnotationGenerator::default().annotate(&qep, &CostTables::default());
        assert_eq!(text.matches("only possible scan type").count(), 2);
        assert!(text.contains("This is the only join type performed on a, b among all AQPs."));
        assert!(text.contains("No alternative plans were produced."));
    }

    #[test]
    fn test_scan_with_init_plan_names_own_relation() {
        let mut outer = scan("Seq Scan", "orders", "orders", 120.);
        outer["Filter"] = json!("(o_totalprice > $0)");
        outer["Plans"] = json!([{
            "Node Type": "Aggregate",
            "Parent Relationship": "InitPlan",
            "Subplan Name": "InitPlan 1 (returns $0)",
            "Startup Cost": 0.0,
            "Total Cost": 50.0,
            "Plans": [scan("Seq Scan", "orders", "orders_1", 45.)],
        }]);
        let qep = tree(outer);
        let tables = CostTables::from_aqps(std::slice::from_ref(&qep));
        let text = AnnotationGenerator::default().annotate(&qep, &tables);
        assert!(text.starts_with("1. Perform Seq Scan on orders orders_1.\n"));
        assert!(text.contains("\n\n3. Perform Seq Scan on orders.\n"));
        assert!(!text.contains("on orders orders orders_1."));
    }

    #[test]
    fn test_leaf_without_children() {
        let qep = tree(node("Result", 0.01, vec![]));
        let text = AnnotationGenerator::default().annotate(&qep, &CostTables::default());
        assert!(text.starts_with("1. Perform Result\n\n"));
    }
}
