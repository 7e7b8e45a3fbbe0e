//! On-cluster artifact parsing
//!
//! Each extraction reads one file from a cluster's audit directory and fails
//! independently of the others. Missing and malformed files are reported as
//! `ArtifactError` so the caller can substitute placeholders.

use netaudit_common::{
    ArtifactError, ClusterRecord, NetworkConfig, NetworkPlugin, NodeInventory, Setting,
};
use serde::de::{DeserializeOwned, Error as _};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const NETWORK_OPERATOR_FILE: &str = "network.operator.json";
pub const NODES_FILE: &str = "nodes.json";
pub const CLUSTER_VERSION_FILE: &str = "clusterversion.json";

/// Marker files whose non-empty presence flags a feature in use
pub const MARKER_METRICS: [&str; 3] = ["egress_network_policy", "egress_cidrs", "multicast"];

const ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";
const WORKER_ROLE: &str = "worker";
const NON_COMPUTE_ROLES: [&str; 3] = ["master", "control-plane", "infra"];

fn read_artifact(dir: &Path, name: &str) -> Result<(PathBuf, String), ArtifactError> {
    let path = dir.join(name);
    match std::fs::read(&path) {
        Ok(bytes) => Ok((path, String::from_utf8_lossy(&bytes).into_owned())),
        Err(source) => Err(ArtifactError::Missing { path, source }),
    }
}

fn read_json<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<(PathBuf, T), ArtifactError> {
    let (path, contents) = read_artifact(dir, name)?;
    match serde_json::from_str(&contents) {
        Ok(value) => Ok((path, value)),
        Err(source) => Err(ArtifactError::Malformed { path, source }),
    }
}

// network.operator.json

#[derive(Debug, Deserialize)]
struct NetworkOperator {
    spec: OperatorSpec,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperatorSpec {
    default_network: DefaultNetwork,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultNetwork {
    #[serde(rename = "type")]
    network_type: String,
    #[serde(default, rename = "openshiftSDNConfig")]
    openshift_sdn_config: Option<SdnConfig>,
    #[serde(default)]
    ovn_kubernetes_config: Option<OvnConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SdnConfig {
    mode: Option<String>,
    mtu: Option<u32>,
    vxlan_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OvnConfig {
    mtu: Option<u32>,
    geneve_port: Option<u16>,
    gateway_config: Option<GatewayConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayConfig {
    routing_via_host: Option<bool>,
}

/// Log and pass through a setting that could not be determined
fn noted<T>(path: &Path, field: &str, value: Option<T>) -> Setting<T> {
    if value.is_none() {
        warn!(path = %path.display(), "Network operator spec has no {}", field);
    }
    value.into()
}

/// Extract network plugin settings from `network.operator.json`
///
/// When `expected` is given and the observed plugin type differs, the
/// extracted settings are returned inside `ArtifactError::ExpectationMismatch`.
pub fn parse_network_operator(
    dir: &Path,
    expected: Option<&str>,
) -> Result<NetworkConfig, ArtifactError> {
    let (path, operator): (_, NetworkOperator) = read_json(dir, NETWORK_OPERATOR_FILE)?;
    let network = operator.spec.default_network;
    let plugin = NetworkPlugin::from_type(&network.network_type);

    let config = match plugin {
        NetworkPlugin::OpenShiftSdn => {
            let sdn = network.openshift_sdn_config.unwrap_or_default();
            NetworkConfig {
                mtu: noted(&path, "openshiftSDNConfig.mtu", sdn.mtu),
                tunnel_port: noted(&path, "openshiftSDNConfig.vxlanPort", sdn.vxlan_port),
                multitenant: noted(
                    &path,
                    "openshiftSDNConfig.mode",
                    sdn.mode.map(|m| m.eq_ignore_ascii_case("multitenant")),
                ),
                local_gateway: Setting::NotApplicable,
                plugin,
            }
        }
        NetworkPlugin::OvnKubernetes => {
            let ovn = network.ovn_kubernetes_config.unwrap_or_default();
            NetworkConfig {
                mtu: noted(&path, "ovnKubernetesConfig.mtu", ovn.mtu),
                tunnel_port: noted(&path, "ovnKubernetesConfig.genevePort", ovn.geneve_port),
                multitenant: Setting::NotApplicable,
                local_gateway: noted(
                    &path,
                    "ovnKubernetesConfig.gatewayConfig.routingViaHost",
                    ovn.gateway_config.and_then(|g| g.routing_via_host),
                ),
                plugin,
            }
        }
        NetworkPlugin::Other(_) => NetworkConfig::unknown(plugin),
    };

    match expected {
        Some(expected) if !config.plugin.matches(expected) => {
            Err(ArtifactError::ExpectationMismatch {
                path,
                expected: expected.to_string(),
                observed: network.network_type,
                best_effort: config.to_record(),
            })
        }
        _ => Ok(config),
    }
}

// nodes.json

#[derive(Debug, Deserialize)]
struct NodeList {
    items: Vec<Node>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeMetadata {
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeStatus {
    #[serde(default)]
    capacity: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    metadata: NodeMetadata,
    #[serde(default)]
    status: NodeStatus,
}

impl Node {
    fn roles(&self) -> impl Iterator<Item = &str> {
        self.metadata
            .labels
            .keys()
            .filter_map(|k| k.strip_prefix(ROLE_LABEL_PREFIX))
    }

    fn is_compute(&self) -> bool {
        let roles: Vec<&str> = self.roles().collect();
        roles.contains(&WORKER_ROLE) && !roles.iter().any(|r| NON_COMPUTE_ROLES.contains(r))
    }

    fn cpu_capacity(&self) -> Option<u64> {
        self.status.capacity.get("cpu").and_then(|q| parse_cpu_quantity(q))
    }
}

/// Parse a Kubernetes CPU quantity (`"4"` or `"3500m"`) into whole cores
pub fn parse_cpu_quantity(quantity: &str) -> Option<u64> {
    let quantity = quantity.trim();
    match quantity.strip_suffix('m') {
        Some(millis) => millis.parse::<u64>().ok().map(|m| m / 1000),
        None => quantity.parse::<u64>().ok(),
    }
}

/// Count nodes and compute capacity from `nodes.json`
pub fn parse_nodes(dir: &Path) -> Result<NodeInventory, ArtifactError> {
    let (path, list): (_, NodeList) = read_json(dir, NODES_FILE)?;
    let total = list.items.len() as u64;

    if !list.items.iter().any(|node| node.roles().next().is_some()) {
        warn!(path = %path.display(), "No node carries a role label, compute counts unknown");
        return Ok(NodeInventory {
            total,
            compute: None,
            compute_vcpu: None,
        });
    }

    let compute: Vec<&Node> = list.items.iter().filter(|node| node.is_compute()).collect();
    let compute_vcpu = compute
        .iter()
        .map(|node| node.cpu_capacity())
        .sum::<Option<u64>>();
    if compute_vcpu.is_none() {
        warn!(path = %path.display(), "Compute node without a CPU capacity, vCPU total unknown");
    }

    Ok(NodeInventory {
        total,
        compute: Some(compute.len() as u64),
        compute_vcpu,
    })
}

// clusterversion.json

#[derive(Debug, Default, Deserialize)]
struct Release {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateHistory {
    state: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClusterVersionStatus {
    #[serde(default)]
    desired: Option<Release>,
    #[serde(default)]
    history: Vec<UpdateHistory>,
}

#[derive(Debug, Deserialize)]
struct ClusterVersion {
    status: ClusterVersionStatus,
}

/// Read the running version from `clusterversion.json`
///
/// Uses the desired release, falling back to the most recent completed update.
/// When `expected` is given and differs, the observed version is returned in
/// `ArtifactError::ExpectationMismatch`.
pub fn parse_cluster_version(dir: &Path, expected: Option<&str>) -> Result<String, ArtifactError> {
    let (path, cv): (_, ClusterVersion) = read_json(dir, CLUSTER_VERSION_FILE)?;
    let status = cv.status;

    let observed = status
        .desired
        .and_then(|d| d.version)
        .or_else(|| {
            status
                .history
                .into_iter()
                .find(|h| h.state.as_deref() == Some("Completed"))
                .and_then(|h| h.version)
        });

    let Some(observed) = observed else {
        return Err(ArtifactError::Malformed {
            path,
            source: serde_json::Error::custom("no desired or completed version in status"),
        });
    };

    match expected {
        Some(expected) if expected != observed => Err(ArtifactError::ExpectationMismatch {
            path,
            expected: expected.to_string(),
            best_effort: ClusterRecord::from_iter([("version", observed.as_str())]),
            observed,
        }),
        _ => Ok(observed),
    }
}

/// Whether `dir/name` holds something other than whitespace or `null`
pub fn file_not_empty(dir: &Path, name: &str) -> Result<bool, ArtifactError> {
    let (_, contents) = read_artifact(dir, name)?;
    let contents = contents.trim();
    Ok(!contents.is_empty() && !contents.eq_ignore_ascii_case("null"))
}
