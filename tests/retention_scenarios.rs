//! End-to-end retention scenarios.
//!
//! Drives the engine through the public API and runs the GC command against
//! both registry backends.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use registry_gc::cli::GcCommand;
use registry_gc::gc::{Classification, RetentionPolicy, images_to_delete, plan};
use registry_gc::models::Image;
use registry_gc::registry::{InMemoryRegistry, InventoryProvider, SnapshotRegistry};
use std::fs;
use tempfile::TempDir;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2009, 11, 10, 23, 0, 0)
        .single()
        .expect("valid epoch")
}

fn img(offset_hours: i64, digest: &str, tags: &[&str]) -> Image {
    Image::new(
        digest,
        epoch() + Duration::hours(offset_hours),
        tags.iter().copied(),
    )
}

fn digests(images: &[Image]) -> Vec<&str> {
    images.iter().map(|i| i.digest.as_str()).collect()
}

fn mixed_inventory() -> Vec<Image> {
    vec![
        img(0, "a", &["foo-1"]),      // expired foo
        img(1, "b", &["foo-2"]),      // expired foo
        img(2, "c", &["foo-3"]),      // recent foo
        img(3, "d", &["foo-4"]),      // recent foo
        img(4, "e", &["bar"]),        // expired bar
        img(5, "f", &[]),             // untagged
        img(6, "g", &["bar"]),        // expired bar
        img(7, "h", &["bar-a"]),      // expired bar
        img(8, "i", &["bar-b"]),      // recent bar
        img(8, "j", &["bar-c"]),      // recent bar
        img(9, "k", &["baz"]),        // unmanaged
        img(10, "l", &["baz-other"]), // unmanaged
        img(11, "m", &[]),            // untagged
    ]
}

fn mixed_policy() -> RetentionPolicy {
    RetentionPolicy::new()
        .with_keep("foo", 2)
        .with_keep("bar", 2)
        .with_delete_untagged(true)
}

#[test]
fn test_mixed_inventory_deletion_order() {
    let result = images_to_delete(&mixed_inventory(), &mixed_policy());
    assert_eq!(digests(&result), vec!["m", "h", "g", "f", "e", "b", "a"]);
}

#[test]
fn test_mixed_inventory_classifications() {
    let plan = plan(&mixed_inventory(), &mixed_policy());

    assert_eq!(plan.count(Classification::Untagged), 2);
    assert_eq!(plan.count(Classification::Unmanaged), 2);
    assert_eq!(plan.count(Classification::Recent), 4);
    assert_eq!(plan.count(Classification::Expired), 5);
    assert_eq!(plan.count(Classification::Unmatched), 0);

    let retained: Vec<&str> = plan.retained().map(|i| i.digest.as_str()).collect();
    assert_eq!(retained, vec!["l", "k", "i", "j", "d", "c"]);
}

#[test]
fn test_shuffled_input_gives_same_result() {
    let mut shuffled = mixed_inventory();
    shuffled.rotate_left(5);
    shuffled.swap(0, 7);

    let expected = images_to_delete(&mixed_inventory(), &mixed_policy());
    let actual = images_to_delete(&shuffled, &mixed_policy());
    assert_eq!(digests(&actual), digests(&expected));
}

#[test]
fn test_untagged_flag_off_keeps_untagged() {
    let policy = mixed_policy().with_delete_untagged(false);
    let result = images_to_delete(&mixed_inventory(), &policy);
    assert_eq!(digests(&result), vec!["h", "g", "e", "b", "a"]);
}

#[test]
fn test_inventory_untouched() {
    let inventory = mixed_inventory();
    let before = inventory.clone();
    let _ = images_to_delete(&inventory, &mixed_policy());
    assert_eq!(inventory, before);
}

#[test]
fn test_gc_command_against_memory_registry() {
    let registry = InMemoryRegistry::new().with_repository("web", mixed_inventory());
    let mut out = Vec::new();

    let outcome = GcCommand::new("web", mixed_policy())
        .execute(&registry, &registry, &mut out)
        .expect("gc succeeds");

    let result = outcome.result.expect("deletions ran");
    assert_eq!(result.deletions.len(), 7);
    assert!(result.failures.is_empty());

    let mut remaining: Vec<String> = registry
        .images("web")
        .expect("list")
        .into_iter()
        .map(|i| i.digest)
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec!["c", "d", "i", "j", "k", "l"]);

    // A second pass over the survivors finds nothing left to delete.
    let mut out = Vec::new();
    let outcome = GcCommand::new("web", mixed_policy())
        .execute(&registry, &registry, &mut out)
        .expect("gc succeeds");
    assert_eq!(outcome.plan.deletion_count(), 0);
}

#[test]
fn test_gc_command_against_snapshot() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("images.json");
    fs::write(
        &path,
        r#"{
  "imageDetails": [
    {"repositoryName": "web", "imageDigest": "sha256:1111111111111111aaaa",
     "imageTags": ["release-1"], "imagePushedAt": "2024-01-01T00:00:00Z"},
    {"repositoryName": "web", "imageDigest": "sha256:2222222222222222bbbb",
     "imageTags": ["release-2"], "imagePushedAt": "2024-01-02T00:00:00Z"},
    {"repositoryName": "web", "imageDigest": "sha256:3333333333333333cccc",
     "imageTags": ["release-3", "latest"], "imagePushedAt": "2023-12-01T00:00:00Z"},
    {"repositoryName": "web", "imageDigest": "sha256:4444444444444444dddd",
     "imagePushedAt": "2023-11-01T00:00:00Z"}
  ]
}"#,
    )
    .expect("write snapshot");

    let registry = SnapshotRegistry::open(&path).expect("open");
    let policy = RetentionPolicy::new()
        .with_keep("release", 1)
        .with_delete_untagged(true);

    let mut out = Vec::new();
    let outcome = GcCommand::new("web", policy.clone())
        .with_dry_run(true)
        .execute(&registry, &registry, &mut out)
        .expect("plan succeeds");
    assert_eq!(outcome.plan.deletion_count(), 2);
    assert_eq!(registry.images("web").expect("list").len(), 4);

    let report = String::from_utf8(out).expect("utf8");
    assert!(report.contains("Images to delete (2)"));
    assert!(report.contains("2024-01-01 00:00:00: sha256:111111111... [release-1]"));
    assert!(report.contains("2023-11-01 00:00:00: sha256:444444444... []"));

    let mut out = Vec::new();
    GcCommand::new("web", policy)
        .execute(&registry, &registry, &mut out)
        .expect("apply succeeds");

    let mut remaining: Vec<String> = registry
        .images("web")
        .expect("list")
        .into_iter()
        .map(|i| i.digest)
        .collect();
    remaining.sort();
    assert_eq!(
        remaining,
        vec!["sha256:2222222222222222bbbb", "sha256:3333333333333333cccc"]
    );

    let report = String::from_utf8(out).expect("utf8");
    assert!(report.contains("Deleted (2)"));
    assert!(report.contains("sha256:111111111... (release-1)"));
    assert!(report.contains("sha256:444444444... (untagged)"));
}

#[test]
fn test_gc_command_unknown_repository_in_snapshot() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("images.json");
    fs::write(
        &path,
        r#"{"imageDetails":[{"repositoryName":"web","imageDigest":"sha256:aaaa",
            "imageTags":["release-1"],"imagePushedAt":"2024-01-01T00:00:00Z"}]}"#,
    )
    .expect("write snapshot");
    let registry = SnapshotRegistry::open(&path).expect("open");

    let mut out = Vec::new();
    let err = GcCommand::new("wbe", RetentionPolicy::new().with_keep("release", 1))
        .execute(&registry, &registry, &mut out)
        .expect_err("unknown repository");

    assert!(matches!(err, registry_gc::Error::NotFound(_)));
    assert!(out.is_empty());
    assert!(fs::read_to_string(&path).expect("read").contains("sha256:aaaa"));
}

#[test]
fn test_gc_command_against_cli_v1_snapshot() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("images.json");
    fs::write(
        &path,
        r#"{"imageDetails":[
            {"repositoryName":"web","imageDigest":"old","imageTags":["release-1"],"imagePushedAt":1704067200.0},
            {"repositoryName":"web","imageDigest":"new","imageTags":["release-2"],"imagePushedAt":1704153600.25}
        ]}"#,
    )
    .expect("write snapshot");
    let registry = SnapshotRegistry::open(&path).expect("open");

    let mut out = Vec::new();
    let outcome = GcCommand::new("web", RetentionPolicy::new().with_keep("release", 1))
        .with_dry_run(true)
        .execute(&registry, &registry, &mut out)
        .expect("plan succeeds");

    let deletions: Vec<&str> = outcome.plan.deletions().map(|i| i.digest.as_str()).collect();
    assert_eq!(deletions, vec!["old"]);
    let report = String::from_utf8(out).expect("utf8");
    assert!(report.contains("2024-01-01 00:00:00: old... [release-1]"));
}
