use crate::annotate::{AnnotationGenerator, DEFAULT_COST_TOLERANCE};
use crate::cost::CostTables;
use crate::enumerate::{AlternativePlanEnumerator, EnumerationMode};
use crate::error::Result;
use crate::plan::PlanTree;
use crate::query::Query;
use crate::session::PlannerSession;
use crate::visualize::PlanGraph;
use log::{debug, info};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub mode: EnumerationMode,
    pub cost_tolerance: f64,
    /// If true, query text is checked to be a single read-only statement before it reaches the
    /// planner.
    pub validate_query: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            mode: EnumerationMode::Exhaustive,
            cost_tolerance: DEFAULT_COST_TOLERANCE,
            validate_query: true,
        }
    }
}

/// Everything learned about one query: its chosen plan and the costs seen across its
/// alternatives.
pub struct Analysis {
    pub qep: PlanTree,
    pub num_aqps: usize,
    pub cost_tables: CostTables,
}

/// Entry point for hosts. One analyzer can be reused across queries and sessions.
#[derive(Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn with_mode(&mut self, mode: EnumerationMode) -> &mut Self {
        self.config.mode = mode;
        self
    }

    pub fn with_cost_tolerance(&mut self, cost_tolerance: f64) -> &mut Self {
        self.config.cost_tolerance = cost_tolerance;
        self
    }

    pub fn set_validate_query(&mut self, validate_query: bool) -> &mut Self {
        self.config.validate_query = validate_query;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    fn make_query(&self, query: &str) -> Result<Query> {
        if self.config.validate_query {
            Query::parse(query)
        } else {
            Ok(Query::new(query))
        }
    }

    /// Asks the planner for its plan under default settings.
    pub fn get_qep(&self, query: &str, session: &mut dyn PlannerSession) -> Result<PlanTree> {
        let query = self.make_query(query)?;
        let result = match session.begin() {
            Ok(()) => session.explain(query.as_str()),
            Err(err) => Err(err),
        };
        let rolled_back = session.rollback();
        let doc = result?;
        rolled_back?;
        PlanTree::from_explain(&doc, query.as_str())
    }

    /// Builds the QEP, enumerates its alternatives and aggregates their costs. Nothing partial is
    /// returned if any planner request fails.
    pub fn analyze(&self, query: &str, session: &mut dyn PlannerSession) -> Result<Analysis> {
        let now = Instant::now();
        let qep = self.get_qep(query, session)?;
        debug!("QEP root {} with total cost {}", qep.root().node_type(), qep.total_cost());

        let aqps = AlternativePlanEnumerator::new(self.config.mode).enumerate(qep.query(), session)?;
        let cost_tables = CostTables::from_aqps(&aqps);
        info!(
            "analyzed query with {} AQPs in {} ms",
            aqps.len(),
            now.elapsed().as_millis()
        );

        Ok(Analysis {
            qep,
            num_aqps: aqps.len(),
            cost_tables,
        })
    }

    pub fn annotate(&self, analysis: &Analysis) -> String {
        AnnotationGenerator::new(self.config.cost_tolerance)
            .annotate(&analysis.qep, &analysis.cost_tables)
    }

    /// Returns the step-numbered justification of the planner's choice for `query`. Every flag
    /// change made on `session` is rolled back before this returns.
    pub fn get_annotation(&self, query: &str, session: &mut dyn PlannerSession) -> Result<String> {
        let analysis = self.analyze(query, session)?;
        Ok(self.annotate(&analysis))
    }

    pub fn get_visualization(&self, qep: &PlanTree) -> PlanGraph {
        PlanGraph::new(qep)
    }
}
