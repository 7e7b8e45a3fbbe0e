//! Audit-row assembly pipeline
//!
//! - `resolver`: cluster metadata from the management API
//! - `artifacts`: fields from on-cluster diagnostic snapshots
//! - `assembler`: merges both sources into one record per cluster
//! - `driver`: runs the assembler over a list of clusters with a single retry

pub mod artifacts;
pub mod assembler;
pub mod driver;
pub mod resolver;

use anyhow::{bail, Context};
use std::path::Path;

/// Parse cluster identifiers, one per line. Blank lines are skipped.
///
/// Identifiers become URL path segments and audit directory names, so any
/// line that could leave either is rejected.
pub fn parse_cluster_ids(contents: &str) -> anyhow::Result<Vec<String>> {
    let mut ids = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let id = line.trim();
        if id.is_empty() {
            continue;
        }
        if !is_safe_cluster_id(id) {
            bail!("line {}: invalid cluster ID {:?}", index + 1, id);
        }
        ids.push(id.to_string());
    }
    Ok(ids)
}

fn is_safe_cluster_id(id: &str) -> bool {
    id != "." && !id.contains(['/', '\\', '?', '#']) && !id.contains("..")
}

pub fn read_cluster_ids(path: &Path) -> anyhow::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read cluster ID file {}", path.display()))?;
    parse_cluster_ids(&contents).with_context(|| format!("in {}", path.display()))
}
