//! Row assembly for a single cluster
//!
//! Remote metadata is resolved first and is fatal to the cluster on failure.
//! On-cluster artifacts are layered on top, each one recovering on its own.

use super::artifacts::{self, MARKER_METRICS};
use super::resolver;
use crate::api::ManagementApi;
use netaudit_common::{
    ArtifactError, Cell, ClusterMetadata, ClusterRecord, NetworkConfig, NodeInventory, Result,
};
use std::path::Path;
use tracing::{error, warn};

#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    /// Treat a cluster-version mismatch between OCM and the cluster as an error
    pub check_version: bool,
}

/// Build the export row for one cluster
///
/// `audit_dir` is the root of the on-cluster audit tree; the cluster's own
/// artifacts live in `audit_dir/<cluster_id>`.
pub async fn assemble(
    api: &dyn ManagementApi,
    cluster_id: &str,
    audit_dir: Option<&Path>,
    options: &AssembleOptions,
) -> Result<ClusterRecord> {
    let metadata = resolver::resolve(api, cluster_id).await?;
    let mut record = metadata.to_record();

    if let Some(audit_dir) = audit_dir {
        apply_artifacts(&mut record, &metadata, &audit_dir.join(cluster_id), options);
    }

    Ok(record)
}

/// Merge every on-cluster artifact into `record`
pub fn apply_artifacts(
    record: &mut ClusterRecord,
    metadata: &ClusterMetadata,
    cluster_dir: &Path,
    options: &AssembleOptions,
) {
    let cluster_id = metadata.cid.as_str();

    if !cluster_dir.is_dir() {
        warn!(cluster_id, path = %cluster_dir.display(), "No on-cluster audit directory");
        record.fill_missing(ClusterRecord::unknown(&NetworkConfig::FIELDS));
        record.fill_missing(ClusterRecord::unknown(&NodeInventory::FIELDS));
        record.fill_missing(ClusterRecord::unknown(&MARKER_METRICS));
        return;
    }

    let network = artifacts::parse_network_operator(cluster_dir, Some(&metadata.network))
        .map(|config| config.to_record());
    apply_stage(record, cluster_id, network, &NetworkConfig::FIELDS);

    let nodes = artifacts::parse_nodes(cluster_dir).map(|inventory| inventory.to_record());
    apply_stage(record, cluster_id, nodes, &NodeInventory::FIELDS);

    let expected_version = options.check_version.then_some(metadata.version.as_str());
    let version = artifacts::parse_cluster_version(cluster_dir, expected_version)
        .map(|version| ClusterRecord::from_iter([("version", version)]));
    apply_stage(record, cluster_id, version, &["version"]);

    for metric in MARKER_METRICS {
        match artifacts::file_not_empty(cluster_dir, metric) {
            Ok(present) => {
                record.insert(metric, present);
            }
            Err(e) => {
                warn!(cluster_id, path = %e.path().display(), "Failed to parse {}: {}", metric, e);
                record.insert(metric, Cell::Unknown);
            }
        }
    }
}

/// Merge one extraction's result, recovering from its failure
fn apply_stage(
    record: &mut ClusterRecord,
    cluster_id: &str,
    stage: std::result::Result<ClusterRecord, ArtifactError>,
    placeholders: &[&str],
) {
    match stage {
        Ok(fields) => record.merge(fields),
        Err(ArtifactError::ExpectationMismatch {
            path,
            expected,
            observed,
            best_effort,
        }) => {
            error!(
                cluster_id,
                path = %path.display(),
                "On-cluster state disagrees with OCM: expected {}, found {}",
                expected,
                observed
            );
            record.merge(best_effort);
        }
        Err(e) => {
            warn!(cluster_id, path = %e.path().display(), "Failed to parse artifact: {}", e);
            // Keep values an earlier stage produced
            record.fill_missing(ClusterRecord::unknown(placeholders));
        }
    }
}
