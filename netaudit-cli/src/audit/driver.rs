//! Audit driver
//!
//! Runs the row assembler over every cluster identifier in input order. A
//! connectivity failure earns exactly one retry after a fixed delay; any other
//! failure, or a second connectivity failure, drops the cluster from the output.

use super::assembler::{self, AssembleOptions};
use crate::api::ManagementApi;
use crate::logging;
use indicatif::{ProgressBar, ProgressStyle};
use netaudit_common::{AuditError, ClusterRecord, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

/// Fixed wait before the single retry of a cluster
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub retry_delay: Duration,
    pub show_progress: bool,
    pub assemble: AssembleOptions,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            show_progress: false,
            assemble: AssembleOptions::default(),
        }
    }
}

/// A cluster left out of the output and why
#[derive(Debug, Clone)]
pub struct OmittedCluster {
    pub cluster_id: String,
    pub reason: AuditError,
}

/// Outcome of one audit run
#[derive(Debug, Default)]
pub struct AuditRun {
    /// Assembled rows, in input order
    pub records: Vec<ClusterRecord>,
    pub omitted: Vec<OmittedCluster>,
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    // Log lines clear the bar instead of tearing it
    logging::set_active_progress(Some(bar.clone()));
    bar
}

/// Audit every cluster in `cluster_ids`
pub async fn run(
    api: &dyn ManagementApi,
    cluster_ids: &[String],
    audit_dir: Option<&Path>,
    options: &DriverOptions,
) -> AuditRun {
    let mut outcome = AuditRun::default();
    let progress = progress_bar(cluster_ids.len(), options.show_progress);

    for cluster_id in cluster_ids {
        progress.set_message(cluster_id.clone());

        match assemble_with_retry(api, cluster_id, audit_dir, options).await {
            Ok(record) => {
                info!(cluster_id = %cluster_id, "Cluster audited");
                outcome.records.push(record);
            }
            Err(reason) => {
                error!(cluster_id = %cluster_id, "Omitting cluster: {}", reason);
                outcome.omitted.push(OmittedCluster {
                    cluster_id: cluster_id.clone(),
                    reason,
                });
            }
        }

        progress.inc(1);
    }

    progress.finish_and_clear();
    if options.show_progress {
        logging::set_active_progress(None);
    }
    outcome
}

async fn assemble_with_retry(
    api: &dyn ManagementApi,
    cluster_id: &str,
    audit_dir: Option<&Path>,
    options: &DriverOptions,
) -> Result<ClusterRecord> {
    match assembler::assemble(api, cluster_id, audit_dir, &options.assemble).await {
        Err(e) if e.is_transient() => {
            warn!(
                cluster_id,
                "{}; retrying in {}s",
                e,
                options.retry_delay.as_secs_f32()
            );
            tokio::time::sleep(options.retry_delay).await;
            assembler::assemble(api, cluster_id, audit_dir, &options.assemble).await
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::testing::{cluster_path, fixed_nodes, FakeApi};
    use netaudit_common::Cell;

    fn options() -> DriverOptions {
        DriverOptions {
            retry_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn cids(run: &AuditRun) -> Vec<String> {
        run.records
            .iter()
            .map(|r| r.get("cid").unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_run_with_progress_bar() {
        let api = FakeApi::new()
            .with_cluster("c1", fixed_nodes())
            .failing(&cluster_path("c1"), 1);
        let options = DriverOptions {
            show_progress: true,
            ..options()
        };

        let outcome = run(&api, &ids(&["c1", "missing"]), None, &options).await;

        assert_eq!(cids(&outcome), vec!["c1"]);
        assert_eq!(outcome.omitted.len(), 1);
    }

    #[tokio::test]
    async fn test_output_follows_input_order() {
        let api = FakeApi::new()
            .with_cluster("c1", fixed_nodes())
            .with_cluster("c2", fixed_nodes())
            .with_cluster("c3", fixed_nodes());

        let outcome = run(&api, &ids(&["c3", "c1", "c2", "c1"]), None, &options()).await;

        assert_eq!(cids(&outcome), vec!["c3", "c1", "c2", "c1"]);
        assert!(outcome.omitted.is_empty());
    }

    #[tokio::test]
    async fn test_single_connectivity_failure_is_retried() {
        let api = FakeApi::new()
            .with_cluster("c1", fixed_nodes())
            .failing(&cluster_path("c1"), 1);

        let outcome = run(&api, &ids(&["c1"]), None, &options()).await;

        assert_eq!(cids(&outcome), vec!["c1"]);
        assert_eq!(api.call_count(&cluster_path("c1")), 2);
    }

    #[tokio::test]
    async fn test_two_connectivity_failures_omit_cluster() {
        let api = FakeApi::new()
            .with_cluster("c1", fixed_nodes())
            .with_cluster("c2", fixed_nodes())
            .failing(&cluster_path("c1"), 2);

        let outcome = run(&api, &ids(&["c1", "c2"]), None, &options()).await;

        assert_eq!(cids(&outcome), vec!["c2"]);
        assert_eq!(api.call_count(&cluster_path("c1")), 2);
        assert_eq!(outcome.omitted.len(), 1);
        assert_eq!(outcome.omitted[0].cluster_id, "c1");
        assert!(outcome.omitted[0].reason.is_transient());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_not_retried() {
        let api = FakeApi::new().with_cluster("c2", fixed_nodes());

        let outcome = run(&api, &ids(&["missing", "c2"]), None, &options()).await;

        assert_eq!(cids(&outcome), vec!["c2"]);
        assert_eq!(api.call_count(&cluster_path("missing")), 1);
        assert!(matches!(outcome.omitted[0].reason, AuditError::Lookup(_)));
    }

    #[tokio::test]
    async fn test_records_share_columns() {
        let api = FakeApi::new()
            .with_cluster("c1", fixed_nodes())
            .with_cluster("c2", serde_json::json!({"master": 3, "infra": 3,
                "autoscale_compute": {"min_replicas": 2, "max_replicas": 6}}));

        let outcome = run(&api, &ids(&["c1", "c2"]), None, &options()).await;

        let first: Vec<&str> = outcome.records[0].keys().collect();
        let second: Vec<&str> = outcome.records[1].keys().collect();
        assert_eq!(first, second);
        assert_eq!(outcome.records[1].get("compute_nodes"), Some(&Cell::from("2-6")));
    }
}
