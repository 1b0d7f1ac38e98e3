mod annotate;
pub mod bin_utils;
mod cost;
mod engine;
mod enumerate;
mod error;
mod plan;
mod query;
mod relation;
mod session;
pub mod test_utils;
mod visualize;

pub use annotate::{format_cost, AnnotationGenerator, DEFAULT_COST_TOLERANCE};
pub use cost::{Cost, CostRecord, CostTable, CostTables};
pub use engine::{Analysis, Analyzer, AnalyzerConfig};
pub use enumerate::{
    flag_configs, AlternativePlanEnumerator, EnumerationMode, FlagConfig, JoinFlag, ScanFlag,
};
pub use error::{Error, Result};
pub use plan::{plan_of_explain, NodeKind, PlanNode, PlanTree};
pub use query::Query;
pub use relation::{relation_key, Relation, RelationSet};
pub use session::{
    PlanFixture, PlannerSession, PsqlSession, RecordedPlan, RecordedSession, RecordingSession,
};
pub use visualize::{node_label, primary_info, render_lines, render_tree, GraphNode, PlanGraph};
