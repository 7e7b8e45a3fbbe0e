//! Remote metadata resolution
//!
//! Turns a cluster identifier into `ClusterMetadata` through a short chain of
//! dependent OCM lookups: cluster, subscription, organization, machine type,
//! and machine pools.

use crate::api::ManagementApi;
use netaudit_common::{AuditError, ClusterMetadata, ComputeNodes, NodeAccounting, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{debug, warn};

pub const CLUSTERS_PATH: &str = "/api/clusters_mgmt/v1/clusters";
pub const MACHINE_TYPES_PATH: &str = "/api/clusters_mgmt/v1/machine_types";
pub const ORGANIZATIONS_PATH: &str = "/api/accounts_mgmt/v1/organizations";

/// Local zone names look like `us-east-1-bos-1a`
static LOCAL_ZONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]+-[a-z]+-[0-9]-[a-z]+-[a-z0-9]+$").unwrap()
});

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

#[derive(Debug, Deserialize)]
struct NetworkSpec {
    #[serde(rename = "type")]
    network_type: String,
}

#[derive(Debug, Deserialize)]
struct ClusterStatus {
    limited_support_reason_count: u64,
}

#[derive(Debug, Deserialize)]
struct AutoscaleCompute {
    min_replicas: u64,
    max_replicas: u64,
}

#[derive(Debug, Deserialize)]
struct NodesSpec {
    master: u64,
    infra: u64,
    #[serde(default)]
    compute: Option<u64>,
    #[serde(default)]
    autoscale_compute: Option<AutoscaleCompute>,
    #[serde(default)]
    compute_machine_type: Option<IdRef>,
}

impl NodesSpec {
    /// Fixed pools take precedence over autoscaling bounds
    fn compute_shape(&self) -> Option<ComputeNodes> {
        match (self.compute, &self.autoscale_compute) {
            (Some(n), _) => Some(ComputeNodes::Fixed(n)),
            (None, Some(a)) => Some(ComputeNodes::Autoscaled {
                min: a.min_replicas,
                max: a.max_replicas,
            }),
            (None, None) => None,
        }
    }
}

/// Cluster object as returned by `/api/clusters_mgmt/v1/clusters/{id}`
#[derive(Debug, Deserialize)]
struct ClusterObject {
    id: String,
    name: String,
    product: IdRef,
    cloud_provider: IdRef,
    region: IdRef,
    openshift_version: String,
    state: String,
    network: NetworkSpec,
    multi_az: bool,
    status: ClusterStatus,
    nodes: NodesSpec,
    #[serde(default)]
    fips: bool,
    #[serde(default)]
    proxy: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    subscription: Option<Href>,
    #[serde(default)]
    machine_pools: Option<Href>,
}

#[derive(Debug, Deserialize)]
struct Subscription {
    organization_id: String,
}

#[derive(Debug, Deserialize)]
struct Organization {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CpuQuantity {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct MachineType {
    cpu: CpuQuantity,
}

#[derive(Debug, Deserialize)]
struct MachinePool {
    #[serde(default)]
    availability_zones: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct MachinePoolList {
    #[serde(default)]
    items: Vec<MachinePool>,
}

/// GET `path` and decode it; a body that lacks required keys is a lookup failure
async fn fetch<T: DeserializeOwned>(api: &dyn ManagementApi, path: &str) -> Result<T> {
    let body = api.get_json(path).await?;
    serde_json::from_value(body).map_err(|e| AuditError::Lookup(format!("{}: {}", path, e)))
}

/// Resolve a cluster's metadata
pub async fn resolve(api: &dyn ManagementApi, cluster_id: &str) -> Result<ClusterMetadata> {
    let cluster: ClusterObject = fetch(api, &format!("{}/{}", CLUSTERS_PATH, cluster_id)).await?;

    let (org_id, org_name) = match resolve_organization(api, &cluster).await {
        Ok((id, name)) => (Some(id), Some(name)),
        Err(AuditError::Lookup(reason)) => {
            warn!(cluster_id, "Failed to resolve organization: {}", reason);
            (None, None)
        }
        Err(e) => return Err(e),
    };

    let compute = cluster.nodes.compute_shape().ok_or_else(|| {
        AuditError::Lookup(format!(
            "cluster {} reports neither nodes.compute nor nodes.autoscale_compute",
            cluster_id
        ))
    })?;

    let machine_vcpu = match &cluster.nodes.compute_machine_type {
        Some(machine_type) => Some(machine_type_vcpu(api, &machine_type.id).await?),
        None => {
            warn!(cluster_id, "No compute machine type, vCPU maximum not computable");
            None
        }
    };

    let uses_local_zones = resolve_local_zones(api, cluster_id, &cluster).await?;

    let nodes = NodeAccounting::new(cluster.nodes.master, cluster.nodes.infra, compute, machine_vcpu);
    debug!(cluster_id, total_nodes = nodes.total_nodes(), "Resolved cluster metadata");

    Ok(ClusterMetadata {
        org_name,
        org_id,
        cid: cluster.id,
        name: cluster.name,
        product: cluster.product.id,
        cloud: cluster.cloud_provider.id,
        region: cluster.region.id,
        version: cluster.openshift_version,
        state: cluster.state,
        network: cluster.network.network_type,
        nodes,
        fips: cluster.fips,
        multi_az: cluster.multi_az,
        limited_support: cluster.status.limited_support_reason_count > 0,
        proxy: cluster.proxy.map(|p| !p.is_empty()).unwrap_or(false),
        uses_local_zones,
    })
}

/// Follow cluster → subscription → organization, returning `(id, name)`
async fn resolve_organization(
    api: &dyn ManagementApi,
    cluster: &ClusterObject,
) -> Result<(String, String)> {
    let href = cluster
        .subscription
        .as_ref()
        .ok_or_else(|| AuditError::Lookup("cluster has no subscription href".to_string()))?;
    let subscription: Subscription = fetch(api, &href.href).await?;
    let organization: Organization = fetch(
        api,
        &format!("{}/{}", ORGANIZATIONS_PATH, subscription.organization_id),
    )
    .await?;
    Ok((subscription.organization_id, organization.name))
}

/// Number of vCPUs in a machine type
pub async fn machine_type_vcpu(api: &dyn ManagementApi, machine_type: &str) -> Result<u64> {
    let machine_type: MachineType =
        fetch(api, &format!("{}/{}", MACHINE_TYPES_PATH, machine_type)).await?;
    Ok(machine_type.cpu.value.max(0.0).round() as u64)
}

pub fn is_local_zone(availability_zone: &str) -> bool {
    LOCAL_ZONE_REGEX.is_match(availability_zone)
}

/// `None` when the cluster's machine pools carry no availability zone data
async fn resolve_local_zones(
    api: &dyn ManagementApi,
    cluster_id: &str,
    cluster: &ClusterObject,
) -> Result<Option<bool>> {
    let Some(href) = &cluster.machine_pools else {
        return Ok(None);
    };

    let pools: MachinePoolList = match fetch(api, &href.href).await {
        Ok(pools) => pools,
        Err(AuditError::Lookup(reason)) => {
            warn!(cluster_id, "Failed to list machine pools: {}", reason);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let zones: Vec<&Vec<String>> = pools
        .items
        .iter()
        .filter_map(|pool| pool.availability_zones.as_ref())
        .collect();
    if zones.is_empty() {
        return Ok(None);
    }

    Ok(Some(
        zones.iter().flat_map(|z| z.iter()).any(|az| is_local_zone(az)),
    ))
}
