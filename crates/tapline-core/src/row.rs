//! Streamed rows and job-run selectors.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaplineError};

/// One streamed record: column name to raw byte payload.
///
/// `None` is SQL NULL or JSON null, never the literal text "null".
pub type Row = HashMap<String, Option<Vec<u8>>>;

/// Selects the job run whose object-store artifacts are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunLocator {
    /// Use this run directly.
    JobRunId(String),
    /// Resolve to the newest run of this job that has data.
    JobId(String),
}

impl RunLocator {
    /// Build a locator from optional request fields. An explicit run id wins.
    pub fn from_parts(job_id: Option<&str>, job_run_id: Option<&str>) -> Result<Self> {
        match (non_empty(job_run_id), non_empty(job_id)) {
            (Some(run), _) => Ok(RunLocator::JobRunId(run.to_string())),
            (None, Some(job)) => Ok(RunLocator::JobId(job.to_string())),
            (None, None) => Err(TaplineError::bad_request(
                "object-store connections require a job id or a job run id",
            )),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// One entry of a job's run history as returned by the job-run registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    pub run_id: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl JobRun {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: None,
        }
    }
}
