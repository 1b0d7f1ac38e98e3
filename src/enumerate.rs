use crate::error::Result;
use crate::plan::{plan_of_explain, PlanTree};
use crate::session::PlannerSession;
use itertools::Itertools;
use log::{debug, info};
use serde_json::Value;
use strum::IntoEnumIterator;

/// Planner settings that enable a class of scan methods.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum ScanFlag {
    BitmapScan,
    IndexScan,
    IndexOnlyScan,
    SeqScan,
    TidScan,
}

/// Planner settings that enable a class of join methods.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum JoinFlag {
    HashJoin,
    MergeJoin,
    NestLoop,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum EnumerationMode {
    /// Every configuration that disables at least one but not all scan flags, and at least one
    /// but not all join flags.
    #[default]
    Exhaustive,
    /// Only the configurations that leave exactly one scan flag and one join flag enabled.
    SingleMethod,
}

/// One set of method flags to turn off before asking for a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlagConfig {
    pub disabled_scans: Vec<ScanFlag>,
    pub disabled_joins: Vec<JoinFlag>,
}

impl FlagConfig {
    /// The setting names to turn off, e.g. `enable_seqscan`.
    pub fn disabled_settings(&self) -> impl Iterator<Item = String> + '_ {
        self.disabled_scans
            .iter()
            .map(|flag| flag.to_string())
            .chain(self.disabled_joins.iter().map(|flag| flag.to_string()))
            .map(|flag| format!("enable_{}", flag))
    }
}

/// Lists the flag configurations to try, in a fixed order.
pub fn flag_configs(mode: EnumerationMode) -> Vec<FlagConfig> {
    let num_scans = ScanFlag::iter().count();
    let num_joins = JoinFlag::iter().count();

    let (scan_range, join_range) = match mode {
        EnumerationMode::Exhaustive => (1..num_scans, 1..num_joins),
        EnumerationMode::SingleMethod => ((num_scans - 1)..num_scans, (num_joins - 1)..num_joins),
    };

    let mut configs = vec![];
    for num_disabled_scans in scan_range {
        for num_disabled_joins in join_range.clone() {
            for kept_scans in ScanFlag::iter().combinations(num_scans - num_disabled_scans) {
                for kept_joins in JoinFlag::iter().combinations(num_joins - num_disabled_joins) {
                    configs.push(FlagConfig {
                        disabled_scans: ScanFlag::iter()
                            .filter(|flag| !kept_scans.contains(flag))
                            .collect(),
                        disabled_joins: JoinFlag::iter()
                            .filter(|flag| !kept_joins.contains(flag))
                            .collect(),
                    });
                }
            }
        }
    }
    configs
}

/// Coerces the planner into alternative plans by turning method flags off.
pub struct AlternativePlanEnumerator {
    mode: EnumerationMode,
}

impl AlternativePlanEnumerator {
    pub fn new(mode: EnumerationMode) -> Self {
        Self { mode }
    }

    /// Returns one tree per distinct plan, in the order the plans were first seen. Fails as a
    /// whole if any single request fails.
    pub fn enumerate(&self, query: &str, session: &mut dyn PlannerSession) -> Result<Vec<PlanTree>> {
        let configs = flag_configs(self.mode);
        let mut plans: Vec<Value> = vec![];
        for config in &configs {
            let plan = explain_with(query, config, session)?;
            if plans.contains(&plan) {
                debug!("{:?} produced a duplicate plan", config);
            } else {
                plans.push(plan);
            }
        }
        info!(
            "{} flag configurations produced {} distinct plans",
            configs.len(),
            plans.len()
        );

        plans
            .iter()
            .map(|plan| PlanTree::build(plan, query))
            .collect()
    }
}

/// Explains `query` with the flags of `config` turned off. The scope is rolled back whether or
/// not the explain succeeded.
fn explain_with(query: &str, config: &FlagConfig, session: &mut dyn PlannerSession) -> Result<Value> {
    let result = match session.begin() {
        Ok(()) => disable_and_explain(query, config, session),
        Err(err) => Err(err),
    };
    let rolled_back = session.rollback();
    let doc = result?;
    rolled_back?;
    Ok(plan_of_explain(&doc)?.clone())
}

fn disable_and_explain(
    query: &str,
    config: &FlagConfig,
    session: &mut dyn PlannerSession,
) -> Result<Value> {
    for setting in config.disabled_settings() {
        session.set_flag(&setting, false)?;
    }
    session.explain(query)
}
