//! Latest-run resolution for job-scoped object-store reads.

use tapline_core::{JobRun, JobRunHistory, RequestContext, Result, TaplineError};
use tracing::{debug, info};

use super::activities_prefix;
use super::client::{ListObjectsRequest, ObjectClient};

/// Order a run history newest first.
///
/// Histories arrive newest-last, so the list is reversed; when every run
/// carries a start time, that time decides instead.
pub fn newest_first(mut runs: Vec<JobRun>) -> Vec<JobRun> {
    runs.reverse();
    if runs.iter().all(|r| r.started_at.is_some()) {
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    }
    runs
}

/// The most recent run of `job_id` whose activities prefix lists at least
/// one key. Linear scan, one listing per run, no caching.
pub async fn find_latest_run_with_data(
    ctx: &RequestContext,
    client: &dyn ObjectClient,
    history: &dyn JobRunHistory,
    job_id: &str,
) -> Result<String> {
    let runs = newest_first(history.recent_runs(ctx, job_id).await?);
    for run in runs {
        ctx.check_cancelled("run resolution")?;
        let page = client
            .list_objects(&ListObjectsRequest {
                prefix: activities_prefix(&run.run_id),
                delimited: true,
                continuation_token: None,
                max_keys: Some(1),
            })
            .await?;
        if page.key_count() > 0 {
            info!("found latest job run: {}", run.run_id);
            return Ok(run.run_id);
        }
        debug!("job run '{}' has no data", run.run_id);
    }
    Err(TaplineError::NotFound(format!(
        "no run with data for job '{}'",
        job_id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeObjectClient, StaticJobRuns};
    use chrono::{TimeZone, Utc};

    fn client_with_data_for(runs: &[&str]) -> FakeObjectClient {
        let client = FakeObjectClient::new();
        for run in runs {
            client.put(
                &format!("workflows/{}/activities/public.users/data/1.json.gz", run),
                Vec::new(),
            );
        }
        client
    }

    #[tokio::test]
    async fn picks_newest_run_with_data() {
        // newest-to-oldest: r1 (empty), r2 (data), r3 (empty); history is newest-last
        let history = StaticJobRuns::new().with_runs(
            "job",
            vec![JobRun::new("r3"), JobRun::new("r2"), JobRun::new("r1")],
        );
        let client = client_with_data_for(&["r2"]);
        let ctx = RequestContext::new("u");
        let run = find_latest_run_with_data(&ctx, &client, &history, "job")
            .await
            .unwrap();
        assert_eq!(run, "r2");
    }

    #[tokio::test]
    async fn no_run_with_data_is_not_found() {
        let history = StaticJobRuns::new().with_runs("job", vec![JobRun::new("r1")]);
        let client = client_with_data_for(&[]);
        let ctx = RequestContext::new("u");
        let err = find_latest_run_with_data(&ctx, &client, &history, "job")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert!(err.to_string().contains("job"));
    }

    #[tokio::test]
    async fn empty_history_is_not_found() {
        let history = StaticJobRuns::new();
        let client = client_with_data_for(&["r1"]);
        let ctx = RequestContext::new("u");
        let err = find_latest_run_with_data(&ctx, &client, &history, "job")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn start_times_override_list_order() {
        let at = |h| Some(Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap());
        let runs = vec![
            JobRun { run_id: "late".into(), started_at: at(9) },
            JobRun { run_id: "early".into(), started_at: at(1) },
            JobRun { run_id: "mid".into(), started_at: at(5) },
        ];
        let ids: Vec<String> = newest_first(runs).into_iter().map(|r| r.run_id).collect();
        assert_eq!(ids, vec!["late", "mid", "early"]);
    }

    #[test]
    fn list_order_used_without_start_times() {
        let runs = vec![JobRun::new("a"), JobRun::new("b"), JobRun::new("c")];
        let ids: Vec<String> = newest_first(runs).into_iter().map(|r| r.run_id).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }
}
