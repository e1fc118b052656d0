use chrono::Duration;

use super::*;
use crate::{links::SortOrder, store::MAX_BATCH_WRITES};

fn link_at(id: &str, title: &str, minutes: i64) -> Link {
    let meta = PageMetadata::from_fields(Provider::Generic, Some(title.to_string()), None, None);
    let created_at = Utc::now() - Duration::minutes(100 - minutes);
    let mut link = Link::new(
        Eid::new(),
        format!("https://example.com/{id}"),
        meta,
        created_at,
    );
    link.id = id.to_string();
    link
}

fn seeded() -> BackendJson {
    let store = BackendJson::default();
    let ops: Vec<WriteOp> = [
        ("l1", "Rust book", 1),
        ("l2", "Go tour", 2),
        ("l3", "Rust async", 3),
        ("l4", "rustacean station", 4),
        ("l5", "Zig", 5),
    ]
    .into_iter()
    .map(|(id, title, minutes)| WriteOp::CreateLink(link_at(id, title, minutes)))
    .chain(std::iter::once(WriteOp::IncrementInbox(5)))
    .collect();
    store.commit(UID, ops.into()).unwrap();
    store
}

fn ids(links: &[Link]) -> Vec<&str> {
    links.iter().map(|l| l.id.as_str()).collect()
}

#[test]
fn test_batch_limit() {
    let store = BackendJson::default();

    let too_many: WriteBatch = vec![WriteOp::IncrementInbox(1); MAX_BATCH_WRITES + 1].into();
    assert!(matches!(
        store.commit(UID, too_many),
        Err(StoreError::BatchTooLarge(501))
    ));
    assert_eq!(store.counts(UID).unwrap().inbox_count, 0);

    let at_limit: WriteBatch = vec![WriteOp::IncrementInbox(1); MAX_BATCH_WRITES].into();
    store.commit(UID, at_limit).unwrap();
    assert_eq!(store.counts(UID).unwrap().inbox_count, 500);
}

#[test]
fn test_preconditions_do_not_count_as_writes() {
    let mut batch = WriteBatch::new();
    batch
        .push(WriteOp::ExpectLinkCategory {
            link_id: "l1".to_string(),
            category_id: None,
        })
        .push(WriteOp::IncrementInbox(1));
    assert_eq!(batch.writes(), 1);
}

#[test]
fn test_failing_op_rolls_back_the_batch() {
    let store = seeded();

    let batch: WriteBatch = vec![
        WriteOp::IncrementInbox(10),
        WriteOp::SetLinkCategory {
            link_id: "l1".to_string(),
            category_id: Some("c".to_string()),
        },
        WriteOp::IncrementLinkCount {
            category_id: "missing".to_string(),
            delta: 1,
        },
    ]
    .into();

    assert!(matches!(
        store.commit(UID, batch),
        Err(StoreError::NotFound { kind: "category", .. })
    ));
    assert_eq!(store.counts(UID).unwrap().inbox_count, 5);
    assert!(store.get_link(UID, "l1").unwrap().unwrap().is_inbox());
}

#[test]
fn test_duplicate_links_are_rejected() {
    let store = seeded();

    let same_id = link_at("l1", "Other", 9);
    assert!(matches!(
        store.commit(UID, vec![WriteOp::CreateLink(same_id)].into()),
        Err(StoreError::AlreadyExists { kind: "link", .. })
    ));

    let mut same_url = link_at("l9", "Other", 9);
    same_url.url = "https://example.com/l2".to_string();
    assert!(matches!(
        store.commit(UID, vec![WriteOp::CreateLink(same_url)].into()),
        Err(StoreError::AlreadyExists { .. })
    ));

    // another user may save the same url
    store
        .commit("bob", vec![WriteOp::CreateLink(link_at("l1", "Rust book", 1))].into())
        .unwrap();
}

#[test]
fn test_list_sort_and_pages() {
    let store = seeded();

    let newest = store
        .list_links(UID, &ListOptions::default().with_limit(2))
        .unwrap();
    assert_eq!(ids(&newest), vec!["l5", "l4"]);

    let next = store
        .list_links(
            UID,
            &ListOptions {
                cursor: Some("l4".to_string()),
                limit: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(ids(&next), vec!["l3", "l2"]);

    let oldest = store
        .list_links(
            UID,
            &ListOptions {
                sort: SortOrder::Asc,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(ids(&oldest), vec!["l1", "l2", "l3", "l4", "l5"]);

    let unknown_cursor = store
        .list_links(
            UID,
            &ListOptions {
                cursor: Some("nope".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(unknown_cursor.len(), 5);
}

#[test]
fn test_list_filters() {
    let store = seeded();
    let tech = add_category(&store, UID, "Tech");
    store
        .commit(
            UID,
            crate::counters::CounterManager::move_ops("l2", None, Some(&tech)),
        )
        .unwrap();

    let members = store.list_links(UID, &ListOptions::in_category(&tech)).unwrap();
    assert_eq!(ids(&members), vec!["l2"]);

    let inbox = store.list_links(UID, &ListOptions::inbox()).unwrap();
    assert_eq!(inbox.len(), 4);
    assert!(inbox.iter().all(Link::is_inbox));
}

#[test]
fn test_title_prefix_search() {
    let store = seeded();

    let found = store.search_links_by_title_prefix(UID, "Rust", 10, None).unwrap();
    assert_eq!(ids(&found), vec!["l3", "l1"]);

    let page = store
        .search_links_by_title_prefix(UID, "Rust", 10, Some("l3"))
        .unwrap();
    assert_eq!(ids(&page), vec!["l1"]);

    let lower = store.search_links_by_title_prefix(UID, "rust", 10, None).unwrap();
    assert_eq!(ids(&lower), vec!["l4"]);

    assert!(store
        .search_links_by_title_prefix("bob", "Rust", 10, None)
        .unwrap()
        .is_empty());
}

#[test]
fn test_category_names_are_unique_per_user() {
    let store = BackendJson::default();
    add_category(&store, UID, "Tech");

    let clash = Category::new(normalize_category_name("  TECH "), None, Utc::now());
    assert!(matches!(
        store.create_category(UID, clash),
        Err(StoreError::AlreadyExists { kind: "category", .. })
    ));

    add_category(&store, "bob", "Tech");
    assert_eq!(store.list_categories(UID).unwrap().len(), 1);
}

#[test]
fn test_data_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap();

    let tech = {
        let store = BackendJson::load(path).unwrap();
        let tech = add_category(&store, UID, "Tech");
        insert_link(&store, UID, "https://example.com/a", "A", Some(&tech));
        store
            .set_category_embedding(UID, &tech, vec![0.5, 0.5], "m", Utc::now())
            .unwrap();
        insert_link(&store, "bob", "https://example.com/b", "B", None);
        tech
    };

    let store = BackendJson::load(path).unwrap();
    assert_eq!(store.users().unwrap(), vec!["alice", "bob"]);

    let category = store.get_category(UID, &tech).unwrap().unwrap();
    assert_eq!(category.link_count, 1);
    assert_eq!(category.embedding, Some(vec![0.5, 0.5]));
    assert_eq!(store.counts("bob").unwrap().inbox_count, 1);
    assert_counters_consistent(&store, UID);

    // no leftover temp files next to the datasets
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|n| n.ends_with(".json")));
}

#[test]
fn test_audit_on_missing_link() {
    let store = BackendJson::default();
    let audit = crate::classifier::Decision::none().audit(Utc::now());
    assert!(matches!(
        store.set_link_audit(UID, "nope", audit),
        Err(StoreError::NotFound { kind: "link", .. })
    ));
}
