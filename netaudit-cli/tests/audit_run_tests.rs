//! End-to-end audit runs against a mock OCM server and an on-cluster audit tree

use httpmock::prelude::*;
use netaudit_cli::audit::driver::{self, DriverOptions};
use netaudit_cli::cache::ResponseCache;
use netaudit_cli::config::OcmCredentials;
use netaudit_cli::output::{self, OutputFormat, WriteMode};
use netaudit_cli::OcmClient;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

fn client(server: &MockServer) -> OcmClient {
    let credentials = OcmCredentials {
        access_token: "stale".to_string(),
        refresh_token: "r0".to_string(),
        client_id: "cloud-services".to_string(),
        token_url: server.url("/token"),
        url: server.base_url(),
    };
    OcmClient::new(&credentials, ResponseCache::disabled(), Duration::from_secs(5)).unwrap()
}

fn mount_common(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200)
            .json_body(json!({"access_token": "fresh", "expires_in": 900}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/accounts_mgmt/v1/organizations/org-1");
        then.status(200).json_body(json!({"id": "org-1", "name": "Example Org"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/clusters_mgmt/v1/machine_types/m5.xlarge");
        then.status(200)
            .json_body(json!({"id": "m5.xlarge", "cpu": {"value": 4.0, "unit": "vCPU"}}));
    });
}

fn mount_cluster(server: &MockServer, id: &str) {
    let cluster = json!({
        "kind": "Cluster",
        "id": id,
        "name": format!("cluster-{}", id),
        "product": {"id": "osd"},
        "cloud_provider": {"id": "aws"},
        "region": {"id": "us-east-1"},
        "openshift_version": "4.14.8",
        "state": "ready",
        "network": {"type": "OVNKubernetes"},
        "multi_az": true,
        "status": {"limited_support_reason_count": 0},
        "nodes": {
            "master": 3,
            "infra": 3,
            "compute": 5,
            "compute_machine_type": {"id": "m5.xlarge"},
        },
        "subscription": {"href": format!("/api/accounts_mgmt/v1/subscriptions/sub-{}", id)},
    });
    let cluster_path = format!("/api/clusters_mgmt/v1/clusters/{}", id);
    let subscription_path = format!("/api/accounts_mgmt/v1/subscriptions/sub-{}", id);

    server.mock(|when, then| {
        when.method(GET).path(cluster_path.as_str());
        then.status(200).json_body(cluster);
    });
    server.mock(|when, then| {
        when.method(GET).path(subscription_path.as_str());
        then.status(200).json_body(json!({"organization_id": "org-1"}));
    });
}

fn write_json(dir: &Path, name: &str, value: Value) {
    std::fs::write(dir.join(name), serde_json::to_string(&value).unwrap()).unwrap();
}

fn node(role: &str, cpu: &str) -> Value {
    json!({
        "metadata": {"labels": {format!("node-role.kubernetes.io/{}", role): ""}},
        "status": {"capacity": {"cpu": cpu}},
    })
}

fn write_audit_tree(audit_dir: &Path, id: &str) {
    let dir = audit_dir.join(id);
    std::fs::create_dir_all(&dir).unwrap();

    write_json(
        &dir,
        "network.operator.json",
        json!({"spec": {"defaultNetwork": {
            "type": "OVNKubernetes",
            "ovnKubernetesConfig": {
                "mtu": 8901,
                "genevePort": 6081,
                "gatewayConfig": {"routingViaHost": false},
            },
        }}}),
    );
    write_json(
        &dir,
        "nodes.json",
        json!({"items": [
            node("master", "8"),
            node("master", "8"),
            node("worker", "4"),
            node("worker", "4"),
            node("worker", "4"),
        ]}),
    );
    write_json(
        &dir,
        "clusterversion.json",
        json!({"status": {"desired": {"version": "4.14.9"}}}),
    );
    std::fs::write(dir.join("egress_cidrs"), "10.0.0.0/24\n").unwrap();
    std::fs::write(dir.join("multicast"), "").unwrap();
}

/// Parse CSV output into rows keyed by column name
fn parse_csv(contents: &str) -> (Vec<String>, Vec<HashMap<String, String>>) {
    let mut lines = contents.split("\r\n").filter(|l| !l.is_empty());
    let header: Vec<String> = lines
        .next()
        .map(|l| l.split(',').map(str::to_string).collect())
        .unwrap_or_default();
    let rows = lines
        .map(|l| {
            header
                .iter()
                .cloned()
                .zip(l.split(',').map(str::to_string))
                .collect()
        })
        .collect();
    (header, rows)
}

fn options() -> DriverOptions {
    DriverOptions {
        retry_delay: Duration::from_millis(10),
        ..Default::default()
    }
}

#[tokio::test]
async fn audit_run_merges_remote_and_on_cluster_data() {
    let server = MockServer::start();
    mount_common(&server);
    mount_cluster(&server, "c1");
    mount_cluster(&server, "c3");
    let unavailable = server.mock(|when, then| {
        when.method(GET).path("/api/clusters_mgmt/v1/clusters/c2");
        then.status(503);
    });

    let audit_dir = tempfile::tempdir().unwrap();
    write_audit_tree(audit_dir.path(), "c1");

    let api = client(&server);
    let ids: Vec<String> = ["c1", "c2", "c3"].iter().map(|s| s.to_string()).collect();
    let outcome = driver::run(&api, &ids, Some(audit_dir.path()), &options()).await;

    // c2 gets one retry, then is left out
    unavailable.assert_calls(2);
    assert_eq!(outcome.omitted.len(), 1);
    assert_eq!(outcome.omitted[0].cluster_id, "c2");
    assert!(outcome.omitted[0].reason.is_transient());

    let out_dir = tempfile::tempdir().unwrap();
    let csv_path = out_dir.path().join("audit.csv");
    output::write_records(
        &csv_path,
        &outcome.records,
        OutputFormat::Csv,
        WriteMode::CreateNew,
        true,
    )
    .unwrap();

    let contents = std::fs::read_to_string(&csv_path).unwrap();
    let (header, rows) = parse_csv(&contents);

    assert_eq!(
        header,
        vec![
            "org_name", "org_id", "cid", "name", "product", "cloud", "region", "version",
            "state", "network", "total_nodes", "compute_nodes", "compute_vcpu_max", "fips",
            "multi_az", "limited_support", "proxy", "uses_local_zones", "mtu", "tunnel_port",
            "multitenant", "local_gateway", "egress_network_policy", "egress_cidrs", "multicast",
        ]
    );
    assert_eq!(rows.len(), 2);

    let c1 = &rows[0];
    assert_eq!(c1["cid"], "c1");
    assert_eq!(c1["org_name"], "Example Org");
    assert_eq!(c1["org_id"], "org-1");
    // On-cluster observations replace the OCM view
    assert_eq!(c1["version"], "4.14.9");
    assert_eq!(c1["total_nodes"], "5");
    assert_eq!(c1["compute_nodes"], "3");
    assert_eq!(c1["compute_vcpu_max"], "12");
    assert_eq!(c1["mtu"], "8901");
    assert_eq!(c1["tunnel_port"], "6081");
    assert_eq!(c1["multitenant"], "n/a");
    assert_eq!(c1["local_gateway"], "false");
    assert_eq!(c1["egress_network_policy"], "?");
    assert_eq!(c1["egress_cidrs"], "true");
    assert_eq!(c1["multicast"], "false");
    assert_eq!(c1["multi_az"], "true");

    let c3 = &rows[1];
    assert_eq!(c3["cid"], "c3");
    assert_eq!(c3["version"], "4.14.8");
    assert_eq!(c3["total_nodes"], "11");
    assert_eq!(c3["compute_nodes"], "5");
    assert_eq!(c3["compute_vcpu_max"], "20");
    assert_eq!(c3["uses_local_zones"], "?");
    for column in ["mtu", "tunnel_port", "multitenant", "local_gateway", "multicast"] {
        assert_eq!(c3[column], "?", "column {}", column);
    }
}

#[tokio::test]
async fn append_mode_adds_rows_without_repeating_headers() {
    let server = MockServer::start();
    mount_common(&server);
    mount_cluster(&server, "c1");

    let api = client(&server);
    let outcome = driver::run(&api, &["c1".to_string()], None, &options()).await;
    assert_eq!(outcome.records.len(), 1);

    let out_dir = tempfile::tempdir().unwrap();
    let csv_path = out_dir.path().join("audit.csv");
    output::write_records(&csv_path, &outcome.records, OutputFormat::Csv, WriteMode::CreateNew, true)
        .unwrap();

    // A second create-new write refuses to touch the existing file
    assert!(output::write_records(
        &csv_path,
        &outcome.records,
        OutputFormat::Csv,
        WriteMode::CreateNew,
        true,
    )
    .is_err());

    output::write_records(&csv_path, &outcome.records, OutputFormat::Csv, WriteMode::Append, false)
        .unwrap();

    let contents = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = contents.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("org_name,org_id,cid"));
    assert_eq!(lines[1], lines[2]);
}
