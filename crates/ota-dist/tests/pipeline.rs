//! # Publish Pipeline Tests
//!
//! Drives `Distributor` end to end against temporary directories: full and
//! delta artifacts, frozen manifests, update resolution, idempotence, lock
//! contention, hostile uploads, and failure cleanup.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ota_core::{sha256_bytes, AppId, Manifest, VersionName};
use ota_dist::fsutil::walk_files;
use ota_dist::{
    ArchiveCodec, ArchiveError, DistConfig, DistError, Distributor, JsonPointerStore,
    PointerStore, PublishReport, PublishRequest, ZipCodec,
};

fn app() -> AppId {
    AppId::new("test-ota").unwrap()
}

fn v(name: &str) -> VersionName {
    VersionName::new(name).unwrap()
}

fn distributor(base: &Path) -> Distributor {
    let mut config = DistConfig::rooted_at(base);
    config.lock_wait = Duration::from_millis(50);
    Distributor::open(config).unwrap()
}

/// Build a zip archive in memory from `(path, content)` pairs.
fn bundle(files: &[(&str, &str)]) -> Vec<u8> {
    let src = tempfile::tempdir().unwrap();
    for (rel, content) in files {
        let p = src.path().join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, content).unwrap();
    }
    let out = tempfile::tempdir().unwrap();
    let archive = out.path().join("bundle.zip");
    ZipCodec.compress(src.path(), &archive).unwrap();
    fs::read(&archive).unwrap()
}

async fn publish(
    dist: &Distributor,
    version: &str,
    files: &[(&str, &str)],
) -> Result<PublishReport, DistError> {
    let permit = dist.acquire(&app()).await?;
    dist.publish(
        permit,
        PublishRequest {
            version: v(version),
            archive: bundle(files),
        },
    )
    .await
}

fn artifact_files(dist: &Distributor, version: &str) -> Vec<(String, String)> {
    let out = tempfile::tempdir().unwrap();
    ZipCodec
        .decompress(&dist.tree().bundle_path(&app(), &v(version)), out.path())
        .unwrap();
    walk_files(out.path())
        .unwrap()
        .into_iter()
        .map(|rel| {
            let content = fs::read_to_string(out.path().join(&rel)).unwrap();
            (rel, content)
        })
        .collect()
}

fn frozen_manifest(dist: &Distributor, version: &str) -> Manifest {
    Manifest::load(&dist.tree().manifest_path(&app(), &v(version))).unwrap()
}

fn workspaces_left(base: &Path) -> usize {
    fs::read_dir(base.join("temp")).unwrap().count()
}

#[tokio::test]
async fn concrete_two_version_scenario() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());

    publish(&dist, "v1", &[("a", "1"), ("b", "2")]).await.unwrap();
    let report = publish(&dist, "v2", &[("a", "1"), ("b", "99"), ("c", "3")])
        .await
        .unwrap();
    assert_eq!(report.previous_latest, Some(v("v1")));
    assert_eq!(report.files, 3);

    assert_eq!(dist.latest(&app()).unwrap(), Some(v("v2")));
    assert_eq!(
        artifact_files(&dist, "v2"),
        vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "99".to_string()),
            ("c".to_string(), "3".to_string()),
        ]
    );
    assert_eq!(
        artifact_files(&dist, "v1"),
        vec![
            ("b".to_string(), "99".to_string()),
            ("c".to_string(), "3".to_string()),
        ]
    );

    let v1 = frozen_manifest(&dist, "v1");
    assert_eq!(v1.len(), 2);
    assert_eq!(v1.get("b"), Some(&sha256_bytes(b"2")));

    assert_eq!(
        dist.resolve(&app(), "v1", "http://localhost:3000").asset_bundle.as_deref(),
        Some("http://localhost:3000/public/test-ota/v1/bundle.zip")
    );
    assert!(!dist.resolve(&app(), "v2", "http://localhost:3000").has_update());
    assert_eq!(workspaces_left(base.path()), 0);
}

#[tokio::test]
async fn deltas_use_each_versions_original_manifest() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());

    publish(&dist, "v1", &[("a", "1"), ("b", "1")]).await.unwrap();
    publish(&dist, "v2", &[("a", "2"), ("b", "1")]).await.unwrap();
    let report = publish(&dist, "v3", &[("a", "2"), ("b", "3"), ("d", "4")])
        .await
        .unwrap();
    assert_eq!(report.deltas.len(), 2);

    let names = |files: Vec<(String, String)>| files.into_iter().map(|(p, _)| p).collect::<Vec<_>>();
    assert_eq!(names(artifact_files(&dist, "v1")), vec!["a", "b", "d"]);
    assert_eq!(names(artifact_files(&dist, "v2")), vec!["b", "d"]);
    assert_eq!(names(artifact_files(&dist, "v3")), vec!["a", "b", "d"]);

    assert_eq!(frozen_manifest(&dist, "v1").get("a"), Some(&sha256_bytes(b"1")));
    assert_eq!(frozen_manifest(&dist, "v2").get("a"), Some(&sha256_bytes(b"2")));
    assert!(!frozen_manifest(&dist, "v2").contains("d"));
}

#[tokio::test]
async fn identical_content_gives_empty_delta() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());

    publish(&dist, "v1", &[("a", "1")]).await.unwrap();
    let report = publish(&dist, "v2", &[("a", "1")]).await.unwrap();
    assert_eq!(report.deltas[0].files, 0);
    assert!(artifact_files(&dist, "v1").is_empty());
}

#[tokio::test]
async fn republishing_latest_version_changes_nothing() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());

    publish(&dist, "v1", &[("a", "1")]).await.unwrap();
    publish(&dist, "v2", &[("a", "2")]).await.unwrap();
    let before = artifact_files(&dist, "v1");

    let report = publish(&dist, "v2", &[("a", "2")]).await.unwrap();
    assert!(!report.changed);
    assert!(report.deltas.is_empty());
    assert_eq!(dist.latest(&app()).unwrap(), Some(v("v2")));
    assert_eq!(artifact_files(&dist, "v1"), before);
}

#[tokio::test]
async fn republishing_older_version_makes_it_latest() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());

    publish(&dist, "v1", &[("a", "1")]).await.unwrap();
    publish(&dist, "v2", &[("a", "2"), ("b", "2")]).await.unwrap();
    let report = publish(&dist, "v1", &[("a", "1")]).await.unwrap();

    assert!(report.changed);
    assert_eq!(report.previous_latest, Some(v("v2")));
    assert_eq!(dist.latest(&app()).unwrap(), Some(v("v1")));
    assert_eq!(
        dist.tree().read_marker(&app()).unwrap(),
        Some(v("v1"))
    );
    assert_eq!(
        artifact_files(&dist, "v1"),
        vec![("a".to_string(), "1".to_string())]
    );
    assert_eq!(
        artifact_files(&dist, "v2"),
        vec![("a".to_string(), "1".to_string())]
    );
    assert_eq!(frozen_manifest(&dist, "v2").get("b"), Some(&sha256_bytes(b"2")));
    assert!(!dist.resolve(&app(), "v1", "http://h").has_update());
    assert_eq!(workspaces_left(base.path()), 0);
}

#[tokio::test]
async fn republishing_version_with_new_content_conflicts() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());

    publish(&dist, "v1", &[("a", "1")]).await.unwrap();
    let err = publish(&dist, "v1", &[("a", "changed")]).await.unwrap_err();
    assert!(matches!(err, DistError::VersionConflict { .. }), "got {err:?}");
    assert_eq!(workspaces_left(base.path()), 0);
}

#[tokio::test]
async fn app_without_versions_has_no_update() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());
    assert!(!dist.resolve(&app(), "v1", "http://h").has_update());
    assert_eq!(dist.latest(&app()).unwrap(), None);
}

#[tokio::test]
async fn concurrent_publish_for_same_app_is_busy() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());

    let _held = dist.acquire(&app()).await.unwrap();
    let err = dist.acquire(&app()).await.unwrap_err();
    assert!(matches!(err, DistError::Busy { .. }));

    let other = AppId::new("other-app").unwrap();
    assert!(dist.acquire(&other).await.is_ok());
}

/// Zip codec whose extraction blocks until the test releases it.
#[derive(Debug)]
struct GatedCodec {
    gate: Mutex<Receiver<()>>,
}

impl ArchiveCodec for GatedCodec {
    fn compress_files(
        &self,
        source_dir: &Path,
        files: &[&str],
        archive_path: &Path,
    ) -> Result<usize, ArchiveError> {
        ZipCodec.compress_files(source_dir, files, archive_path)
    }

    fn decompress(&self, archive_path: &Path, dest_dir: &Path) -> Result<usize, ArchiveError> {
        let _ = self.gate.lock().unwrap().recv();
        ZipCodec.decompress(archive_path, dest_dir)
    }
}

#[tokio::test]
async fn overlapping_publishes_for_same_app_serialize() {
    let base = tempfile::tempdir().unwrap();
    let (release, gate) = channel();
    let mut config = DistConfig::rooted_at(base.path());
    config.lock_wait = Duration::from_millis(50);
    let data_dir = config.data_dir.clone();
    let dist = Distributor::with_parts(
        config,
        Arc::new(JsonPointerStore::in_dir(&data_dir)),
        Arc::new(GatedCodec {
            gate: Mutex::new(gate),
        }),
    )
    .unwrap();

    let permit = dist.acquire(&app()).await.unwrap();
    let first = tokio::spawn({
        let dist = dist.clone();
        async move {
            dist.publish(
                permit,
                PublishRequest {
                    version: v("v1"),
                    archive: bundle(&[("a", "1")]),
                },
            )
            .await
        }
    });

    let err = publish(&dist, "v2", &[("a", "2")]).await.unwrap_err();
    assert!(matches!(err, DistError::Busy { .. }), "got {err:?}");

    release.send(()).unwrap();
    let report = first.await.unwrap().unwrap();
    assert!(report.changed);
    assert_eq!(dist.latest(&app()).unwrap(), Some(v("v1")));
    assert!(!dist.tree().has_version(&app(), &v("v2")));
    assert_eq!(workspaces_left(base.path()), 0);
}

#[tokio::test]
async fn corrupt_upload_is_rejected_and_cleaned_up() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());
    publish(&dist, "v1", &[("a", "1")]).await.unwrap();

    let permit = dist.acquire(&app()).await.unwrap();
    let err = dist
        .publish(
            permit,
            PublishRequest {
                version: v("v2"),
                archive: b"PK\x03\x04 definitely not a zip".to_vec(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DistError::Archive(_)), "got {err:?}");
    assert_eq!(dist.latest(&app()).unwrap(), Some(v("v1")));
    assert_eq!(workspaces_left(base.path()), 0);
}

/// Zip bytes with entry names taken literally, bypassing directory walks.
fn raw_bundle(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        for (name, content) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

async fn publish_raw(
    dist: &Distributor,
    version: &str,
    archive: Vec<u8>,
) -> Result<PublishReport, DistError> {
    let permit = dist.acquire(&app()).await?;
    dist.publish(
        permit,
        PublishRequest {
            version: v(version),
            archive,
        },
    )
    .await
}

#[tokio::test]
async fn backslash_entry_is_an_archive_error() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());

    let err = publish_raw(&dist, "v1", raw_bundle(&[("dir\\file.txt", "x")]))
        .await
        .unwrap_err();
    assert!(
        matches!(err, DistError::Archive(ArchiveError::UnsafeEntry { .. })),
        "got {err:?}"
    );
    assert!(!dist.tree().app_dir(&app()).exists());
    assert_eq!(workspaces_left(base.path()), 0);
}

#[tokio::test]
async fn file_and_directory_with_same_name_is_an_archive_error() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());
    publish(&dist, "v1", &[("a", "1")]).await.unwrap();

    let err = publish_raw(&dist, "v2", raw_bundle(&[("a", "1"), ("a/b", "2")]))
        .await
        .unwrap_err();
    assert!(
        matches!(err, DistError::Archive(ArchiveError::ClashingEntry { .. })),
        "got {err:?}"
    );
    assert_eq!(dist.latest(&app()).unwrap(), Some(v("v1")));
    assert_eq!(workspaces_left(base.path()), 0);
}

#[tokio::test]
async fn traversal_upload_is_rejected() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file("../../escape", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"x").unwrap();
        writer.finish().unwrap();
    }
    let permit = dist.acquire(&app()).await.unwrap();
    let err = dist
        .publish(
            permit,
            PublishRequest {
                version: v("v1"),
                archive: cursor.into_inner(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DistError::Archive(_)), "got {err:?}");
    assert!(!base.path().join("escape").exists());
    assert!(!dist.tree().app_dir(&app()).exists());
}

#[tokio::test]
async fn empty_upload_is_a_validation_error() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());
    let permit = dist.acquire(&app()).await.unwrap();
    let err = dist
        .publish(
            permit,
            PublishRequest {
                version: v("v1"),
                archive: Vec::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DistError::Validation(_)));
}

#[derive(Debug)]
struct RejectingPointers(JsonPointerStore);

impl PointerStore for RejectingPointers {
    fn get(&self, app: &AppId) -> Result<Option<VersionName>, DistError> {
        self.0.get(app)
    }

    fn set(&self, _app: &AppId, _version: &VersionName) -> Result<(), DistError> {
        Err(DistError::PointerStore("read-only".into()))
    }
}

#[tokio::test]
async fn failed_commit_leaves_tree_and_pointer_unchanged() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());
    publish(&dist, "v1", &[("a", "1")]).await.unwrap();
    let before: Vec<(String, Vec<u8>)> = {
        let root = dist.tree().app_dir(&app());
        walk_files(&root)
            .unwrap()
            .into_iter()
            .map(|rel| {
                let bytes = fs::read(root.join(&rel)).unwrap();
                (rel, bytes)
            })
            .collect()
    };

    let mut config = DistConfig::rooted_at(base.path());
    config.lock_wait = Duration::from_millis(50);
    let pointers = Arc::new(RejectingPointers(JsonPointerStore::in_dir(&config.data_dir)));
    let failing = Distributor::with_parts(config, pointers, Arc::new(ZipCodec)).unwrap();

    let err = {
        let permit = failing.acquire(&app()).await.unwrap();
        failing
            .publish(
                permit,
                PublishRequest {
                    version: v("v2"),
                    archive: bundle(&[("a", "2")]),
                },
            )
            .await
            .unwrap_err()
    };
    assert!(matches!(err, DistError::PointerStore(_)), "got {err:?}");

    let root = dist.tree().app_dir(&app());
    let after: Vec<(String, Vec<u8>)> = walk_files(&root)
        .unwrap()
        .into_iter()
        .map(|rel| {
            let bytes = fs::read(root.join(&rel)).unwrap();
            (rel, bytes)
        })
        .collect();
    assert_eq!(after, before);
    assert_eq!(dist.latest(&app()).unwrap(), Some(v("v1")));
    assert_eq!(workspaces_left(base.path()), 0);
}

#[tokio::test]
async fn reconcile_on_clean_state_is_a_no_op() {
    let base = tempfile::tempdir().unwrap();
    let dist = distributor(base.path());
    publish(&dist, "v1", &[("a", "1")]).await.unwrap();
    assert!(dist.reconcile().unwrap().is_clean());
}
