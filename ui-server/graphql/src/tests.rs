use super::*;
use maplit::btreeset;
use serde_json::json;
use std::collections::BTreeSet;
use ui_server_core::{Connections, EdgeLabel, ObjectGraph, ObjectId, SharedGraph};

fn id(group: &str, kind: &str, name: &str) -> ObjectId {
    ObjectId::new(group, kind, "demo", name)
}

fn link(graph: &SharedGraph, src: &ObjectId, label: EdgeLabel, dsts: &[&ObjectId]) {
    let conns: Connections = [(label, dsts.iter().map(|d| d.oid()).collect())]
        .into_iter()
        .collect();
    graph.write().update(&src.oid(), conns);
}

/// A deployment backed up by a configuration that has produced two sessions, and a second
/// configuration that targets something else.
fn backups() -> (SharedGraph, ObjectId) {
    let graph = ObjectGraph::shared();
    let deploy = id("apps", "Deployment", "web");
    let config = id("stash.appscode.com", "BackupConfiguration", "web-backup");
    let other = id("stash.appscode.com", "BackupConfiguration", "db-backup");
    link(&graph, &config, EdgeLabel::BackupVia, &[&deploy]);
    for name in ["web-backup-1", "web-backup-2"] {
        let session = id("stash.appscode.com", "BackupSession", name);
        link(&graph, &session, EdgeLabel::Offshoot, &[&config]);
    }
    let stray = id("stash.appscode.com", "BackupSession", "db-backup-1");
    link(&graph, &stray, EdgeLabel::Offshoot, &[&other]);
    (graph, deploy)
}

const SESSIONS: &str = r#"
query Find($src: String!, $targetGroup: String!, $targetKind: String!) {
  find(oid: $src) {
    backup_via(group: "stash.appscode.com", kind: "BackupConfiguration") {
      refs: offshoot(group: $targetGroup, kind: $targetKind) {
        namespace
        name
      }
    }
  }
}
"#;

#[tokio::test]
async fn traverses_multiple_hops() {
    let (graph, deploy) = backups();
    let schema = build(graph, 8);
    let refs = find_refs(
        &schema,
        SESSIONS,
        json!({
            "src": deploy.oid().as_str(),
            "targetGroup": "stash.appscode.com",
            "targetKind": "BackupSession",
        }),
    )
    .await
    .expect("query must succeed");

    let names = refs.iter().map(|r| r.name.as_str()).collect::<BTreeSet<_>>();
    assert_eq!(names, btreeset! {"web-backup-1", "web-backup-2"});
    assert!(refs.iter().all(|r| r.namespace == "demo"));
}

#[tokio::test]
async fn kind_filter_selects_one_bucket() {
    let (graph, _) = backups();
    let config = id("stash.appscode.com", "BackupConfiguration", "web-backup");
    let schema = build(graph, 8);

    let data = execute(
        &schema,
        r#"query($src: String!) {
            find(oid: $src) {
                all: offshoot { kind name }
                configs: backup_via(kind: "Deployment") { group kind name }
            }
        }"#,
        json!({ "src": config.oid().as_str() }),
    )
    .await
    .expect("query must succeed");

    assert_eq!(data["find"]["all"].as_array().map(Vec::len), Some(2));
    assert_eq!(
        data["find"]["configs"],
        json!([{ "group": "apps", "kind": "Deployment", "name": "web" }])
    );
}

#[tokio::test]
async fn group_without_kind_is_rejected() {
    let (graph, deploy) = backups();
    let schema = build(graph, 8);
    let err = execute(
        &schema,
        r#"query($src: String!) { find(oid: $src) { backup_via(group: "stash.appscode.com") { name } } }"#,
        json!({ "src": deploy.oid().as_str() }),
    )
    .await
    .expect_err("group without kind must fail");
    assert!(matches!(err, Error::Query(msg) if msg.contains("requires kind")));
}

#[tokio::test]
async fn invalid_oid_is_rejected() {
    let schema = build(ObjectGraph::shared(), 8);
    let err = execute(&schema, r#"{ find(oid: "bogus") { name } }"#, json!({}))
        .await
        .expect_err("invalid oid must fail");
    assert!(matches!(err, Error::Query(_)));
}

#[tokio::test]
async fn depth_is_limited() {
    let (graph, deploy) = backups();
    let schema = build(graph, 3);
    let res = execute(
        &schema,
        r#"query($src: String!) {
            find(oid: $src) { offshoot { offshoot { offshoot { name } } } }
        }"#,
        json!({ "src": deploy.oid().as_str() }),
    )
    .await;
    assert!(res.is_err());
}

#[tokio::test]
async fn refs_are_deduplicated() {
    let graph = ObjectGraph::shared();
    let pod = id("", "Pod", "web-0");
    let secret = id("", "Secret", "tls");
    let cm = id("", "ConfigMap", "settings");
    link(&graph, &pod, EdgeLabel::Config, &[&secret, &cm]);
    let schema = build(graph, 8);

    let refs = find_refs(
        &schema,
        r#"query($src: String!) {
            find(oid: $src) {
                a: config { refs: config(kind: "Pod") { group kind namespace name } }
            }
        }"#,
        json!({ "src": pod.oid().as_str() }),
    )
    .await
    .expect("query must succeed");
    // Both the secret and the configmap lead back to the same pod.
    assert_eq!(refs, vec![pod]);
}
