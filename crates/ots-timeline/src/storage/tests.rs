//! Storage layer tests for the deployment timeline.

#![allow(clippy::unwrap_used)]

use super::db::TimelineDb;
use super::models::{DeploymentAction, ImageRef};
use super::queries::NewDeployment;
use super::queries_services::ServiceInstanceParams;

use super::models::DeploymentAction::{Deploy, Redeploy, Rollback, SetCurrent, Undeploy};

async fn test_db() -> TimelineDb {
    TimelineDb::open_in_memory().await.unwrap()
}

async fn deploy(db: &TimelineDb, tag: &str, action: DeploymentAction) -> i64 {
    db.record_deployment(&NewDeployment::new("img", tag, action))
        .await
        .unwrap()
}

/// Record a deploy and point CURRENT at it, the way the instance commands do.
async fn deploy_live(db: &TimelineDb, tag: &str) {
    deploy(db, tag, Deploy).await;
    db.set_alias("CURRENT", "img", tag).await.unwrap();
}

fn img(tag: &str) -> ImageRef {
    ImageRef::new("img", tag)
}

// === Timeline tests ===

#[tokio::test]
async fn record_deployment_ids_start_at_one_and_increment() {
    let db = test_db().await;

    let id1 = deploy(&db, "v1", Deploy).await;
    let id2 = deploy(&db, "v2", Deploy).await;
    let id3 = deploy(&db, "v3", Redeploy).await;

    assert_eq!((id1, id2, id3), (1, 2, 3));
}

#[tokio::test]
async fn get_deployments_returns_inserted_fields_newest_first() {
    let db = test_db().await;
    db.record_deployment(&NewDeployment::new("ghcr.io/test/image", "v1.0.0", Deploy).port(7043))
        .await
        .unwrap();
    db.record_deployment(
        &NewDeployment::new("ghcr.io/test/image", "v1.0.1", Undeploy)
            .success(false)
            .notes("container exited"),
    )
    .await
    .unwrap();

    let deployments = db.get_deployments(2, None).await.unwrap();

    assert_eq!(deployments.len(), 2);
    let newest = &deployments[0];
    assert_eq!(newest.id, 2);
    assert_eq!(newest.tag, "v1.0.1");
    assert_eq!(newest.action().unwrap(), Undeploy);
    assert!(!newest.success);
    assert_eq!(newest.port, None);
    assert_eq!(newest.notes.as_deref(), Some("container exited"));

    let oldest = &deployments[1];
    assert_eq!(oldest.id, 1);
    assert_eq!(oldest.image, "ghcr.io/test/image");
    assert_eq!(oldest.port, Some(7043));
    assert!(oldest.success);
    assert_eq!(oldest.notes, None);
    assert!(!oldest.timestamp.is_empty());
}

#[tokio::test]
async fn get_deployments_respects_limit() {
    let db = test_db().await;
    for i in 0..10 {
        deploy(&db, &format!("v{i}"), Deploy).await;
    }

    let deployments = db.get_deployments(5, None).await.unwrap();

    assert_eq!(deployments.len(), 5);
    assert_eq!(deployments[0].tag, "v9");
    assert_eq!(deployments[4].tag, "v5");
}

#[tokio::test]
async fn get_deployments_filters_by_port() {
    let db = test_db().await;
    for (tag, port) in [("v1", 7043), ("v2", 7044), ("v3", 7043)] {
        db.record_deployment(&NewDeployment::new("img", tag, Deploy).port(port))
            .await
            .unwrap();
    }
    deploy(&db, "v4", Deploy).await;

    let deployments = db.get_deployments(10, Some(7043)).await.unwrap();

    let tags: Vec<_> = deployments.iter().map(|d| d.tag.as_str()).collect();
    assert_eq!(tags, ["v3", "v1"]);
    assert!(deployments.iter().all(|d| d.port == Some(7043)));
}

#[tokio::test]
async fn get_deployments_on_empty_store_is_empty() {
    let db = test_db().await;
    assert!(db.get_deployments(20, None).await.unwrap().is_empty());
    assert!(db.get_deployments(20, Some(7043)).await.unwrap().is_empty());
}

#[tokio::test]
async fn alias_operations_never_touch_existing_records() {
    let db = test_db().await;
    deploy(&db, "v1", Deploy).await;
    deploy(&db, "v2", Deploy).await;
    let before = db.get_deployments(10, None).await.unwrap();

    db.set_current("img", "v2").await.unwrap();
    db.rollback().await.unwrap();

    let after = db.get_deployments(10, None).await.unwrap();
    assert_eq!(after.len(), 4);
    assert_eq!(&after[2..], &before[..]);
}

// === Alias tests ===

#[tokio::test]
async fn set_alias_creates_and_overwrites_single_row() {
    let db = test_db().await;

    db.set_alias("CURRENT", "A", "v1").await.unwrap();
    db.set_alias("CURRENT", "B", "v2").await.unwrap();

    let aliases = db.get_all_aliases().await.unwrap();
    assert_eq!(aliases.len(), 1);
    assert_eq!(aliases[0].alias, "CURRENT");
    assert_eq!((aliases[0].image.as_str(), aliases[0].tag.as_str()), ("B", "v2"));
}

#[tokio::test]
async fn alias_names_are_case_insensitive() {
    let db = test_db().await;

    db.set_alias("current", "img", "v1").await.unwrap();

    let alias = db.get_alias("Current").await.unwrap().unwrap();
    assert_eq!(alias.alias, "CURRENT");
    assert_eq!(db.get_current_image().await.unwrap(), Some(img("v1")));
}

#[tokio::test]
async fn get_alias_returns_none_if_not_found() {
    let db = test_db().await;
    assert!(db.get_alias("NONEXISTENT").await.unwrap().is_none());
    assert!(db.get_current_image().await.unwrap().is_none());
    assert!(db.get_rollback_image().await.unwrap().is_none());
}

#[tokio::test]
async fn get_all_aliases_is_ordered_by_name() {
    let db = test_db().await;
    db.set_alias("ROLLBACK", "img", "v0").await.unwrap();
    db.set_alias("staging", "img", "v2").await.unwrap();
    db.set_alias("CURRENT", "img", "v1").await.unwrap();

    let names: Vec<_> = db
        .get_all_aliases()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.alias)
        .collect();

    assert_eq!(names, ["CURRENT", "ROLLBACK", "STAGING"]);
}

#[tokio::test]
async fn alias_values_are_bound_not_interpolated() {
    let db = test_db().await;
    let hostile = "v1'); DROP TABLE deployments; --";

    db.set_alias("CURRENT", "img", hostile).await.unwrap();
    deploy(&db, hostile, Deploy).await;

    assert_eq!(db.get_current_image().await.unwrap(), Some(img(hostile)));
    assert_eq!(db.get_deployments(1, None).await.unwrap()[0].tag, hostile);
}

// === set_current tests ===

#[tokio::test]
async fn set_current_first_time_has_no_previous() {
    let db = test_db().await;

    let previous = db.set_current("img", "v1").await.unwrap();

    assert_eq!(previous, None);
    assert_eq!(db.get_current_image().await.unwrap(), Some(img("v1")));
    assert_eq!(db.get_rollback_image().await.unwrap(), None);

    let record = &db.get_deployments(1, None).await.unwrap()[0];
    assert_eq!(record.action().unwrap(), SetCurrent);
    assert_eq!(record.notes.as_deref(), Some("Initial current"));
}

#[tokio::test]
async fn set_current_moves_previous_to_rollback() {
    let db = test_db().await;

    db.set_current("img", "v1").await.unwrap();
    let previous = db.set_current("img", "v2").await.unwrap();

    assert_eq!(previous.as_deref(), Some("v1"));
    assert_eq!(db.get_current_image().await.unwrap(), Some(img("v2")));
    assert_eq!(db.get_rollback_image().await.unwrap(), Some(img("v1")));
    assert_eq!(
        db.get_deployments(1, None).await.unwrap()[0].notes.as_deref(),
        Some("Previous: v1")
    );
}

// === rollback tests ===

#[tokio::test]
async fn rollback_returns_none_when_no_history() {
    let db = test_db().await;

    assert_eq!(db.rollback().await.unwrap(), None);
    assert!(db.get_deployments(10, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn rollback_with_single_distinct_deployment_changes_nothing() {
    let db = test_db().await;
    deploy_live(&db, "v1").await;
    deploy(&db, "v1", Redeploy).await;
    // Failed and non-live actions do not count as distinct deployments.
    db.record_deployment(&NewDeployment::new("img", "v2", Deploy).failed())
        .await
        .unwrap();
    deploy(&db, "v3", Undeploy).await;

    assert_eq!(db.rollback().await.unwrap(), None);

    assert_eq!(db.get_current_image().await.unwrap(), Some(img("v1")));
    assert_eq!(db.get_rollback_image().await.unwrap(), None);
    assert_eq!(db.get_deployments(10, None).await.unwrap().len(), 4);
}

#[tokio::test]
async fn rollback_walks_to_second_most_recent_distinct_pair() {
    let db = test_db().await;
    deploy_live(&db, "v1").await;
    deploy_live(&db, "v2").await;
    deploy_live(&db, "v3").await;

    let result = db.rollback().await.unwrap();

    assert_eq!(result, Some(img("v2")));
    assert_eq!(db.get_current_image().await.unwrap(), Some(img("v2")));
    assert_eq!(db.get_rollback_image().await.unwrap(), Some(img("v3")));

    let record = &db.get_deployments(1, None).await.unwrap()[0];
    assert_eq!(record.action().unwrap(), Rollback);
    assert_eq!(record.image_ref(), img("v2"));
    assert_eq!(record.notes.as_deref(), Some("Rolled back from v3"));
}

#[tokio::test]
async fn rollback_collapses_repeated_redeploys_of_one_tag() {
    let db = test_db().await;
    deploy(&db, "v1", Deploy).await;
    deploy(&db, "v1", Redeploy).await;
    deploy(&db, "v1", Redeploy).await;
    deploy(&db, "v2", Deploy).await;

    assert_eq!(db.rollback().await.unwrap(), Some(img("v1")));
}

#[tokio::test]
async fn rollback_ranks_by_latest_occurrence() {
    let db = test_db().await;
    deploy(&db, "v1", Deploy).await;
    deploy(&db, "v2", Deploy).await;
    deploy(&db, "v3", Deploy).await;
    // v1 comes back after v3, so v3 is now the previous distinct artifact.
    deploy(&db, "v1", Redeploy).await;

    assert_eq!(db.rollback().await.unwrap(), Some(img("v3")));
}

#[tokio::test]
async fn rollback_scenario_from_two_deploys() {
    let db = test_db().await;
    db.record_deployment(&NewDeployment::new("img", "v1", Deploy).port(7043))
        .await
        .unwrap();
    db.set_alias("CURRENT", "img", "v1").await.unwrap();
    db.record_deployment(&NewDeployment::new("img", "v2", Deploy).port(7043))
        .await
        .unwrap();
    db.set_alias("CURRENT", "img", "v2").await.unwrap();
    db.set_alias("ROLLBACK", "img", "v1").await.unwrap();

    assert_eq!(db.rollback().await.unwrap(), Some(img("v1")));

    assert_eq!(db.get_current_image().await.unwrap(), Some(img("v1")));
    assert_eq!(db.get_rollback_image().await.unwrap(), Some(img("v2")));
}

#[tokio::test]
async fn rollback_records_are_not_ranked_as_deployments() {
    let db = test_db().await;
    deploy_live(&db, "v1").await;
    deploy_live(&db, "v2").await;
    deploy_live(&db, "v3").await;

    let first = db.rollback().await.unwrap();
    let second = db.rollback().await.unwrap();

    // Same history, same target: the rollback to v2 did not become a new
    // "most recent" entry.
    assert_eq!(first, Some(img("v2")));
    assert_eq!(second, Some(img("v2")));
    assert_eq!(db.get_current_image().await.unwrap(), Some(img("v2")));
    assert_eq!(db.get_rollback_image().await.unwrap(), Some(img("v2")));
}

#[tokio::test]
async fn rollback_after_redeploying_target_walks_further_back() {
    let db = test_db().await;
    deploy_live(&db, "v1").await;
    deploy_live(&db, "v2").await;
    deploy_live(&db, "v3").await;

    let first = db.rollback().await.unwrap().unwrap();
    // The orchestrator redeploys the new CURRENT, which puts it back on the timeline.
    deploy(&db, &first.tag, Redeploy).await;
    let second = db.rollback().await.unwrap();

    assert_eq!(first, img("v2"));
    assert_eq!(second, Some(img("v3")));
}

#[tokio::test]
async fn rollback_after_set_current_chain() {
    let db = test_db().await;
    db.set_current("img", "v1").await.unwrap();
    db.set_current("img", "v2").await.unwrap();

    assert_eq!(db.rollback().await.unwrap(), Some(img("v1")));
    assert_eq!(db.get_rollback_image().await.unwrap(), Some(img("v2")));
}

#[tokio::test]
async fn rollback_uses_history_even_when_current_alias_drifted() {
    let db = test_db().await;
    deploy(&db, "v1", Deploy).await;
    deploy(&db, "v2", Deploy).await;
    db.set_alias("CURRENT", "img", "hotfix").await.unwrap();

    let result = db.rollback().await.unwrap();

    assert_eq!(result, Some(img("v1")));
    assert_eq!(db.get_rollback_image().await.unwrap(), Some(img("hotfix")));
    assert_eq!(
        db.get_deployments(1, None).await.unwrap()[0].notes.as_deref(),
        Some("Rolled back from hotfix")
    );
}

#[tokio::test]
async fn rollback_without_current_alias_leaves_rollback_unset() {
    let db = test_db().await;
    deploy(&db, "v1", Deploy).await;
    deploy(&db, "v2", Deploy).await;

    assert_eq!(db.rollback().await.unwrap(), Some(img("v1")));
    assert_eq!(db.get_rollback_image().await.unwrap(), None);
    assert_eq!(
        db.get_deployments(1, None).await.unwrap()[0].notes.as_deref(),
        Some("Rolled back from unknown")
    );
}

#[tokio::test]
async fn rollback_distinguishes_images_with_the_same_tag() {
    let db = test_db().await;
    db.record_deployment(&NewDeployment::new("docker.io/app", "v1", Deploy))
        .await
        .unwrap();
    db.record_deployment(&NewDeployment::new("ghcr.io/app", "v1", Deploy))
        .await
        .unwrap();

    assert_eq!(
        db.rollback().await.unwrap(),
        Some(ImageRef::new("docker.io/app", "v1"))
    );
}

// === Previous tags tests ===

#[tokio::test]
async fn get_previous_tags_returns_distinct_pairs_most_recent_first() {
    let db = test_db().await;
    deploy(&db, "v1", Deploy).await;
    deploy(&db, "v1", Redeploy).await;
    deploy(&db, "v2", Deploy).await;
    deploy(&db, "v3", Rollback).await;

    let tags = db.get_previous_tags(10).await.unwrap();

    let refs: Vec<_> = tags.iter().map(super::models::PreviousTag::image_ref).collect();
    assert_eq!(refs, [img("v2"), img("v1")]);
    assert!(tags.iter().all(|t| !t.last_used.is_empty()));
}

#[tokio::test]
async fn get_previous_tags_respects_limit() {
    let db = test_db().await;
    for i in 0..5 {
        deploy(&db, &format!("v{i}"), Deploy).await;
    }

    let tags = db.get_previous_tags(3).await.unwrap();

    assert_eq!(tags.len(), 3);
    assert_eq!(tags[0].tag, "v4");
}

// === resolve tests ===

#[tokio::test]
async fn resolve_translates_alias_tags() {
    let db = test_db().await;
    db.set_current("ghcr.io/app", "v2").await.unwrap();
    db.set_current("ghcr.io/app", "v3").await.unwrap();

    assert_eq!(
        db.resolve_image("default", "current").await.unwrap(),
        Some(ImageRef::new("ghcr.io/app", "v3"))
    );
    assert_eq!(
        db.resolve_image("default", "ROLLBACK").await.unwrap(),
        Some(ImageRef::new("ghcr.io/app", "v2"))
    );
}

#[tokio::test]
async fn resolve_passes_concrete_tags_through() {
    let db = test_db().await;
    assert_eq!(
        db.resolve_image("ghcr.io/app", "v0.23.0").await.unwrap(),
        Some(ImageRef::new("ghcr.io/app", "v0.23.0"))
    );
}

#[tokio::test]
async fn resolve_unset_alias_is_none() {
    let db = test_db().await;
    assert_eq!(db.resolve_image("ghcr.io/app", "current").await.unwrap(), None);
    assert_eq!(db.resolve_image("ghcr.io/app", "rollback").await.unwrap(), None);
}

// === Persistence tests ===

#[tokio::test]
async fn timeline_persists_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("deployments.db");

    let db = TimelineDb::open(&path).await.unwrap();
    db.set_current("img", "v1").await.unwrap();
    db.close().await;

    let reopened = TimelineDb::open(&path).await.unwrap();
    assert_eq!(reopened.get_current_image().await.unwrap(), Some(img("v1")));
    assert_eq!(deploy(&reopened, "v2", Deploy).await, 2);
}

/// Every record appended by `set_current`/`rollback` names the new CURRENT,
/// and ROLLBACK names the CURRENT before it. If writers had interleaved, the
/// aliases would disagree with the two newest records.
async fn assert_aliases_follow_log(db: &TimelineDb, expected_records: usize) {
    let records = db.get_deployments(1000, None).await.unwrap();
    assert_eq!(records.len(), expected_records);
    assert_eq!(db.get_current_image().await.unwrap(), Some(records[0].image_ref()));
    assert_eq!(db.get_rollback_image().await.unwrap(), Some(records[1].image_ref()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_set_current_calls_all_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deployments.db");
    let first = TimelineDb::open(&path).await.unwrap();
    let second = TimelineDb::open(&path).await.unwrap();

    let mut handles = Vec::new();
    for task in 0..4 {
        let db = if task % 2 == 0 { first.clone() } else { second.clone() };
        handles.push(tokio::spawn(async move {
            for n in 0..25 {
                db.set_current("img", &format!("w{task}-{n}")).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_aliases_follow_log(&first, 100).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rollback_racing_set_current_all_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deployments.db");
    let first = TimelineDb::open(&path).await.unwrap();
    let second = TimelineDb::open(&path).await.unwrap();
    first.set_current("img", "v1").await.unwrap();
    first.set_current("img", "v2").await.unwrap();

    let mut handles = Vec::new();
    for task in 0..4 {
        let db = if task % 2 == 0 { first.clone() } else { second.clone() };
        handles.push(tokio::spawn(async move {
            for n in 0..20 {
                if task < 2 {
                    db.set_current("img", &format!("w{task}-{n}")).await.unwrap();
                } else {
                    assert!(db.rollback().await.unwrap().is_some());
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_aliases_follow_log(&second, 2 + 80).await;
}

// === Service registry tests ===

fn valkey(instance: &str, port: Option<u16>) -> ServiceInstanceParams<'_> {
    ServiceInstanceParams {
        package: "valkey",
        instance,
        config_file: "/etc/valkey/instances/6379.conf",
        data_dir: "/var/lib/valkey/6379",
        port,
        notes: None,
    }
}

#[tokio::test]
async fn record_service_instance_upserts_by_package_and_instance() {
    let db = test_db().await;

    let id = db.record_service_instance(&valkey("6379", Some(6379))).await.unwrap();
    let again = db
        .record_service_instance(&ServiceInstanceParams {
            notes: Some("moved"),
            ..valkey("6379", Some(6380))
        })
        .await
        .unwrap();

    assert_eq!(id, again);
    let instance = db.get_service_instance("valkey", "6379").await.unwrap().unwrap();
    assert_eq!(instance.port, Some(6380));
    assert_eq!(instance.notes.as_deref(), Some("moved"));
    assert_eq!(db.get_service_instances(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn get_service_instances_filters_and_orders() {
    let db = test_db().await;
    db.record_service_instance(&valkey("6380", None)).await.unwrap();
    db.record_service_instance(&valkey("6379", None)).await.unwrap();
    db.record_service_instance(&ServiceInstanceParams {
        package: "redis",
        ..valkey("6379", None)
    })
    .await
    .unwrap();

    let all: Vec<_> = db
        .get_service_instances(None)
        .await
        .unwrap()
        .into_iter()
        .map(|s| format!("{}@{}", s.package, s.instance))
        .collect();
    assert_eq!(all, ["redis@6379", "valkey@6379", "valkey@6380"]);

    assert_eq!(db.get_service_instances(Some("valkey")).await.unwrap().len(), 2);
    assert!(db.get_service_instances(Some("memcached")).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_service_instance_keeps_audit_trail() {
    let db = test_db().await;
    db.record_service_instance(&valkey("6379", None)).await.unwrap();
    db.record_service_action("valkey", "6379", "start", true, None)
        .await
        .unwrap();

    assert!(db.delete_service_instance("valkey", "6379").await.unwrap());
    assert!(!db.delete_service_instance("valkey", "6379").await.unwrap());

    assert!(db.get_service_instance("valkey", "6379").await.unwrap().is_none());
    assert_eq!(db.get_service_actions(None, None, 50).await.unwrap().len(), 1);
}

#[tokio::test]
async fn get_service_actions_filters_newest_first() {
    let db = test_db().await;
    db.record_service_action("valkey", "6379", "init", true, None)
        .await
        .unwrap();
    db.record_service_action("valkey", "6380", "init", true, None)
        .await
        .unwrap();
    db.record_service_action("valkey", "6379", "start", false, Some("port in use"))
        .await
        .unwrap();
    db.record_service_action("redis", "6379", "init", true, None)
        .await
        .unwrap();

    let for_instance = db
        .get_service_actions(Some("valkey"), Some("6379"), 50)
        .await
        .unwrap();
    let actions: Vec<_> = for_instance.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, ["start", "init"]);
    assert!(!for_instance[0].success);
    assert_eq!(for_instance[0].notes.as_deref(), Some("port in use"));

    assert_eq!(db.get_service_actions(Some("valkey"), None, 50).await.unwrap().len(), 3);
    // An instance filter without a package is ignored.
    assert_eq!(db.get_service_actions(None, Some("6379"), 50).await.unwrap().len(), 4);
    assert_eq!(db.get_service_actions(None, None, 2).await.unwrap().len(), 2);
}
