/// Utility module useful for testing. Plans built here carry only the fields the analysis reads,
/// and `FakeSession` answers explains from a fixed set of rules instead of a planner.
use crate::error::{Error, Result};
use crate::session::PlannerSession;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// A plan node that scans `name` under `alias`.
pub fn scan(node_type: &str, name: &str, alias: &str, total_cost: f64) -> Value {
    json!({
        "Node Type": node_type,
        "Relation Name": name,
        "Alias": alias,
        "Startup Cost": 0.0,
        "Total Cost": total_cost,
    })
}

/// A bitmap heap scan over a bitmap index scan on the same relation.
pub fn bitmap_scan(name: &str, alias: &str, heap_total_cost: f64, index_total_cost: f64) -> Value {
    json!({
        "Node Type": "Bitmap Heap Scan",
        "Relation Name": name,
        "Alias": alias,
        "Startup Cost": 0.0,
        "Total Cost": heap_total_cost,
        "Recheck Cond": "(id < 100)",
        "Plans": [{
            "Node Type": "Bitmap Index Scan",
            "Index Name": format!("{}_pkey", name),
            "Startup Cost": 0.0,
            "Total Cost": index_total_cost,
            "Index Cond": "(id < 100)",
        }],
    })
}

pub fn join(node_type: &str, total_cost: f64, children: Vec<Value>) -> Value {
    json!({
        "Node Type": node_type,
        "Join Type": "Inner",
        "Startup Cost": 0.0,
        "Total Cost": total_cost,
        "Plans": children,
    })
}

pub fn node(node_type: &str, total_cost: f64, children: Vec<Value>) -> Value {
    if children.is_empty() {
        json!({
            "Node Type": node_type,
            "Startup Cost": 0.0,
            "Total Cost": total_cost,
        })
    } else {
        json!({
            "Node Type": node_type,
            "Startup Cost": 0.0,
            "Total Cost": total_cost,
            "Plans": children,
        })
    }
}

/// Wraps a plan node the way `EXPLAIN (FORMAT JSON)` does.
pub fn explain_doc(plan: Value) -> Value {
    json!([{ "Plan": plan }])
}

/// A session that answers explains from rules: the plan of the first rule whose setting is
/// currently disabled, otherwise the default plan.
pub struct FakeSession {
    default: Value,
    rules: Vec<(String, Value)>,
    disabled: BTreeSet<String>,
    fail_after: Option<usize>,
    fail_on_flag: Option<String>,
    num_begins: usize,
    num_explains: usize,
    num_rollbacks: usize,
}

impl FakeSession {
    pub fn new(default: Value) -> Self {
        Self {
            default,
            rules: vec![],
            disabled: BTreeSet::new(),
            fail_after: None,
            fail_on_flag: None,
            num_begins: 0,
            num_explains: 0,
            num_rollbacks: 0,
        }
    }

    pub fn with_plan(mut self, disabled_setting: &str, plan: Value) -> Self {
        self.rules.push((disabled_setting.to_string(), plan));
        self
    }

    /// Makes every explain after the first `num_explains` fail.
    pub fn fail_after(mut self, num_explains: usize) -> Self {
        self.fail_after = Some(num_explains);
        self
    }

    /// Makes every change of `setting` fail.
    pub fn fail_on_flag(mut self, setting: &str) -> Self {
        self.fail_on_flag = Some(setting.to_string());
        self
    }

    pub fn disabled(&self) -> &BTreeSet<String> {
        &self.disabled
    }

    pub fn num_begins(&self) -> usize {
        self.num_begins
    }

    pub fn num_explains(&self) -> usize {
        self.num_explains
    }

    pub fn num_rollbacks(&self) -> usize {
        self.num_rollbacks
    }
}

impl PlannerSession for FakeSession {
    fn begin(&mut self) -> Result<()> {
        self.num_begins += 1;
        Ok(())
    }

    fn set_flag(&mut self, name: &str, enabled: bool) -> Result<()> {
        if self.fail_on_flag.as_deref() == Some(name) {
            return Err(Error::PlannerRequest(format!(
                "unrecognized configuration parameter \"{}\"",
                name
            )));
        }
        if enabled {
            self.disabled.remove(name);
        } else {
            self.disabled.insert(name.to_string());
        }
        Ok(())
    }

    fn explain(&mut self, _query: &str) -> Result<Value> {
        if self.fail_after.map_or(false, |limit| self.num_explains >= limit) {
            return Err(Error::PlannerRequest(
                "syntax error at or near \"selec\"".to_string(),
            ));
        }
        self.num_explains += 1;
        let plan = self
            .rules
            .iter()
            .find(|(setting, _)| self.disabled.contains(setting))
            .map(|(_, plan)| plan)
            .unwrap_or(&self.default);
        Ok(explain_doc(plan.clone()))
    }

    fn rollback(&mut self) -> Result<()> {
        self.num_rollbacks += 1;
        self.disabled.clear();
        Ok(())
    }
}
