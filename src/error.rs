use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A raw plan node could not be turned into a `PlanNode`.
    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    /// The external planner rejected an explain, flag change or rollback.
    #[error("planner request failed: {0}")]
    PlannerRequest(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
