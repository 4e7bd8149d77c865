use std::fs;
use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use keeper_core::{ArchiveFormat, NewLink};
use keeper_engine::{ArtifactStore, FsArtifactStore, LinkStore, SqliteLinkStore, StoreError};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

#[test]
fn write_replaces_existing_content() {
    let temp = TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp.path());

    store.write("archives/1/2.html", b"old").unwrap();
    store.write("archives/1/2.html", b"new").unwrap();

    assert_eq!(store.read("archives/1/2.html").unwrap(), b"new");
    assert_eq!(
        fs::read(temp.path().join("archives/1/2.html")).unwrap(),
        b"new"
    );
    assert_eq!(store.list().unwrap(), vec!["archives/1/2.html".to_string()]);
}

#[test]
fn concurrent_reader_never_sees_a_partial_file() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FsArtifactStore::new(temp.path()));
    let old = vec![b'a'; 256 * 1024];
    let new = vec![b'b'; 256 * 1024];
    store.write("archives/1/1.pdf", &old).unwrap();

    let writer = {
        let store = store.clone();
        let (old, new) = (old.clone(), new.clone());
        thread::spawn(move || {
            for round in 0..20 {
                let bytes = if round % 2 == 0 { &new } else { &old };
                store.write("archives/1/1.pdf", bytes).unwrap();
            }
        })
    };
    for _ in 0..200 {
        let seen = store.read("archives/1/1.pdf").unwrap();
        assert!(seen == old || seen == new, "partial read of {} bytes", seen.len());
    }
    writer.join().unwrap();
}

#[test]
fn failed_write_leaves_no_file() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("archives"), b"not a directory").unwrap();
    let store = FsArtifactStore::new(temp.path());

    let err = store.write("archives/1/1.pdf", b"data").unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
    assert_eq!(store.list().unwrap(), vec!["archives".to_string()]);
}

#[test]
fn read_of_missing_artifact_is_not_found() {
    let temp = TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp.path());
    assert!(matches!(
        store.read("archives/9/9.png"),
        Err(StoreError::NotFound(path)) if path == "archives/9/9.png"
    ));
}

#[tokio::test]
async fn insert_and_get_round_trip() {
    let links = SqliteLinkStore::in_memory().await.unwrap();
    let created = links
        .insert(NewLink::new(3, "https://example.test/a").with_name("A"))
        .await
        .unwrap();

    let loaded = links.get(created.id).await.unwrap().unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.collection_id, 3);
    assert_eq!(loaded.name, "A");
    assert_eq!(loaded.artifact_paths(), Vec::<&str>::new());
    assert_eq!(links.get(created.id + 1).await.unwrap(), None);
}

#[tokio::test]
async fn set_artifact_touches_only_its_column() {
    let links = SqliteLinkStore::in_memory().await.unwrap();
    let link = links.insert(NewLink::new(1, "https://e.test")).await.unwrap();

    assert!(links
        .set_artifact(link.id, ArchiveFormat::Monolith, Some("archives/1/1.html"))
        .await
        .unwrap());
    assert!(links
        .set_artifact(link.id, ArchiveFormat::Readability, Some("archives/1/1.json"))
        .await
        .unwrap());
    assert!(links
        .set_artifact(link.id, ArchiveFormat::Monolith, None)
        .await
        .unwrap());

    let loaded = links.get(link.id).await.unwrap().unwrap();
    assert_eq!(loaded.monolith, None);
    assert_eq!(loaded.readable.as_deref(), Some("archives/1/1.json"));
    assert_eq!(loaded.pdf, None);
    assert_eq!(loaded.screenshot, None);
    assert_eq!(loaded.url, "https://e.test");
}

#[tokio::test]
async fn set_artifact_on_deleted_link_reports_missing_row() {
    let links = SqliteLinkStore::in_memory().await.unwrap();
    let link = links.insert(NewLink::new(1, "https://e.test")).await.unwrap();
    links
        .set_artifact(link.id, ArchiveFormat::Pdf, Some("archives/1/1.pdf"))
        .await
        .unwrap();

    let deleted = links.delete(link.id).await.unwrap().unwrap();
    assert_eq!(deleted.pdf.as_deref(), Some("archives/1/1.pdf"));
    assert!(!links
        .set_artifact(link.id, ArchiveFormat::Pdf, Some("archives/1/1.pdf"))
        .await
        .unwrap());
    assert_eq!(links.delete(link.id).await.unwrap(), None);
}

#[tokio::test]
async fn unpreserved_lists_links_until_marked() {
    let links = SqliteLinkStore::in_memory().await.unwrap();
    let first = links.insert(NewLink::new(1, "https://e.test/1")).await.unwrap();
    let second = links.insert(NewLink::new(1, "https://e.test/2")).await.unwrap();

    let ids: Vec<_> = links
        .unpreserved(10)
        .await
        .unwrap()
        .into_iter()
        .map(|link| link.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);

    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    assert!(links
        .mark_preserved(first.id, first.archive_generation, at)
        .await
        .unwrap());
    let remaining = links.unpreserved(10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second.id);
    assert_eq!(
        links.get(first.id).await.unwrap().unwrap().preserved_at,
        Some(at)
    );

    assert!(links.reset_preserved(first.id).await.unwrap());
    assert_eq!(links.unpreserved(1).await.unwrap().len(), 1);
    assert_eq!(links.unpreserved(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn mark_from_before_a_reset_is_ignored() {
    let links = SqliteLinkStore::in_memory().await.unwrap();
    let link = links.insert(NewLink::new(1, "https://e.test/1")).await.unwrap();
    let started_at = link.archive_generation;

    assert!(links.reset_preserved(link.id).await.unwrap());
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    assert!(!links.mark_preserved(link.id, started_at, at).await.unwrap());

    let stored = links.get(link.id).await.unwrap().unwrap();
    assert_eq!(stored.preserved_at, None);
    assert_eq!(stored.archive_generation, started_at + 1);
    assert_eq!(links.unpreserved_ids().await.unwrap(), vec![link.id]);

    assert!(links
        .mark_preserved(link.id, stored.archive_generation, at)
        .await
        .unwrap());
    assert!(links.unpreserved_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn referenced_paths_cover_every_column() {
    let links = SqliteLinkStore::in_memory().await.unwrap();
    let a = links.insert(NewLink::new(1, "https://e.test/a")).await.unwrap();
    let b = links.insert(NewLink::new(2, "https://e.test/b")).await.unwrap();
    links
        .set_artifact(a.id, ArchiveFormat::Pdf, Some("archives/1/1.pdf"))
        .await
        .unwrap();
    links
        .set_artifact(b.id, ArchiveFormat::Screenshot, Some("archives/2/2.png"))
        .await
        .unwrap();
    links
        .set_artifact(b.id, ArchiveFormat::Readability, Some("archives/2/2.json"))
        .await
        .unwrap();

    let mut paths = links.referenced_paths().await.unwrap();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            "archives/1/1.pdf".to_string(),
            "archives/2/2.json".to_string(),
            "archives/2/2.png".to_string(),
        ]
    );
}
