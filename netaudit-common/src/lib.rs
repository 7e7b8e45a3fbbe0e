//! Common types shared by the netaudit pipeline and its front ends

pub mod record;

pub use record::{Cell, ClusterRecord, NOT_APPLICABLE, UNKNOWN};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Compute pool shape as reported by the management API
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComputeNodes {
    /// Fixed-size pool
    Fixed(u64),
    /// Autoscaled pool bounded by replica counts
    Autoscaled { min: u64, max: u64 },
}

impl ComputeNodes {
    /// Largest number of compute nodes the pool can reach
    pub fn upper_bound(&self) -> u64 {
        match self {
            ComputeNodes::Fixed(n) => *n,
            ComputeNodes::Autoscaled { max, .. } => *max,
        }
    }
}

impl From<ComputeNodes> for Cell {
    fn from(nodes: ComputeNodes) -> Self {
        match nodes {
            ComputeNodes::Fixed(n) => Cell::from(n),
            ComputeNodes::Autoscaled { min, max } => Cell::Text(format!("{}-{}", min, max)),
        }
    }
}

/// Node counts and compute capacity derived from cluster metadata
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeAccounting {
    pub master: u64,
    pub infra: u64,
    pub compute: ComputeNodes,
    /// `None` when the compute machine type is unknown or the product overflows
    pub compute_vcpu_max: Option<u64>,
}

impl NodeAccounting {
    /// Build accounting from pool shape and the per-machine vCPU count
    pub fn new(master: u64, infra: u64, compute: ComputeNodes, machine_vcpu: Option<u64>) -> Self {
        Self {
            master,
            infra,
            compute,
            compute_vcpu_max: machine_vcpu.and_then(|vcpu| vcpu.checked_mul(compute.upper_bound())),
        }
    }

    pub fn total_nodes(&self) -> u64 {
        self.master
            .saturating_add(self.infra)
            .saturating_add(self.compute.upper_bound())
    }
}

/// Pod network plugin family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkPlugin {
    OpenShiftSdn,
    OvnKubernetes,
    Other(String),
}

impl NetworkPlugin {
    /// Classify a network type string, ignoring case
    pub fn from_type(network_type: &str) -> Self {
        match network_type.to_lowercase().as_str() {
            "openshiftsdn" => NetworkPlugin::OpenShiftSdn,
            "ovnkubernetes" => NetworkPlugin::OvnKubernetes,
            _ => NetworkPlugin::Other(network_type.to_string()),
        }
    }

    pub fn matches(&self, network_type: &str) -> bool {
        self.to_string().eq_ignore_ascii_case(network_type)
    }
}

impl fmt::Display for NetworkPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkPlugin::OpenShiftSdn => write!(f, "OpenShiftSDN"),
            NetworkPlugin::OvnKubernetes => write!(f, "OVNKubernetes"),
            NetworkPlugin::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A plugin-specific setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Setting<T> {
    Known(T),
    Unknown,
    NotApplicable,
}

impl<T> Setting<T> {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Setting::Unknown)
    }
}

impl<T> From<Option<T>> for Setting<T> {
    fn from(value: Option<T>) -> Self {
        value.map(Setting::Known).unwrap_or(Setting::Unknown)
    }
}

impl<T: Into<Cell>> From<Setting<T>> for Cell {
    fn from(setting: Setting<T>) -> Self {
        match setting {
            Setting::Known(value) => value.into(),
            Setting::Unknown => Cell::Unknown,
            Setting::NotApplicable => Cell::NotApplicable,
        }
    }
}

/// Network operator settings observed on a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub plugin: NetworkPlugin,
    pub mtu: Setting<u32>,
    pub tunnel_port: Setting<u16>,
    pub multitenant: Setting<bool>,
    pub local_gateway: Setting<bool>,
}

impl NetworkConfig {
    pub const FIELDS: [&'static str; 4] = ["mtu", "tunnel_port", "multitenant", "local_gateway"];

    /// Configuration with every field undetermined
    pub fn unknown(plugin: NetworkPlugin) -> Self {
        Self {
            plugin,
            mtu: Setting::Unknown,
            tunnel_port: Setting::Unknown,
            multitenant: Setting::Unknown,
            local_gateway: Setting::Unknown,
        }
    }

    pub fn to_record(&self) -> ClusterRecord {
        let mut record = ClusterRecord::new();
        record.insert("mtu", self.mtu);
        record.insert("tunnel_port", self.tunnel_port);
        record.insert("multitenant", self.multitenant);
        record.insert("local_gateway", self.local_gateway);
        record
    }
}

/// Node counts observed directly from the cluster's node list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInventory {
    pub total: u64,
    /// `None` when no node carries a role label
    pub compute: Option<u64>,
    pub compute_vcpu: Option<u64>,
}

impl NodeInventory {
    pub const FIELDS: [&'static str; 3] = ["total_nodes", "compute_nodes", "compute_vcpu_max"];

    pub fn to_record(&self) -> ClusterRecord {
        let mut record = ClusterRecord::new();
        record.insert("total_nodes", self.total);
        record.insert("compute_nodes", self.compute);
        record.insert("compute_vcpu_max", self.compute_vcpu);
        record
    }
}

/// Cluster attributes resolved from the management API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetadata {
    pub org_name: Option<String>,
    pub org_id: Option<String>,
    pub cid: String,
    pub name: String,
    pub product: String,
    pub cloud: String,
    pub region: String,
    pub version: String,
    pub state: String,
    pub network: String,
    pub nodes: NodeAccounting,
    pub fips: bool,
    pub multi_az: bool,
    pub limited_support: bool,
    pub proxy: bool,
    /// `None` when machine pools carry no availability zone data
    pub uses_local_zones: Option<bool>,
}

impl ClusterMetadata {
    /// Flatten into an export row. An unknown vCPU maximum becomes `-1`.
    pub fn to_record(&self) -> ClusterRecord {
        let mut record = ClusterRecord::new();
        record.insert("org_name", self.org_name.clone());
        record.insert("org_id", self.org_id.clone());
        record.insert("cid", self.cid.as_str());
        record.insert("name", self.name.as_str());
        record.insert("product", self.product.as_str());
        record.insert("cloud", self.cloud.as_str());
        record.insert("region", self.region.as_str());
        record.insert("version", self.version.as_str());
        record.insert("state", self.state.as_str());
        record.insert("network", self.network.as_str());
        record.insert("total_nodes", self.nodes.total_nodes());
        record.insert("compute_nodes", self.nodes.compute);
        record.insert(
            "compute_vcpu_max",
            self.nodes
                .compute_vcpu_max
                .map(Cell::from)
                .unwrap_or(Cell::Int(-1)),
        );
        record.insert("fips", self.fips);
        record.insert("multi_az", self.multi_az);
        record.insert("limited_support", self.limited_support);
        record.insert("proxy", self.proxy);
        record.insert("uses_local_zones", self.uses_local_zones);
        record
    }
}

/// Failures while resolving a cluster against the management API
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuditError {
    /// The request could not complete; worth retrying
    #[error("Connectivity failure on {path}: {message}")]
    Connectivity { path: String, message: String },

    /// The API answered but a required value is missing
    #[error("Lookup failure: {0}")]
    Lookup(String),
}

impl AuditError {
    pub fn connectivity(path: impl Into<String>, message: impl fmt::Display) -> Self {
        AuditError::Connectivity {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AuditError::Connectivity { .. })
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// Failures while reading an on-cluster artifact
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact missing: {}: {source}", path.display())]
    Missing {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Artifact malformed: {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// On-cluster state disagrees with the management API
    #[error("Expected {expected} but {} reports {observed}", path.display())]
    ExpectationMismatch {
        path: PathBuf,
        expected: String,
        observed: String,
        /// Fields extracted despite the mismatch
        best_effort: ClusterRecord,
    },
}

impl ArtifactError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            ArtifactError::Missing { path, .. }
            | ArtifactError::Malformed { path, .. }
            | ArtifactError::ExpectationMismatch { path, .. } => path,
        }
    }
}
