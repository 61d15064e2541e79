use twinlens::{
    config::{ConfigPatch, TransformConfig},
    persist::{reconcile, sqlite::SqliteRecordStore, PersistError, ReconcileError, RecordStore},
    record::{PersistedImageRecord, VersionImage},
    session::TransformSession,
    types::{AspectRatio, AssetRef, EditField, TransformKind, VersionTag},
};

fn asset(public_id: &str) -> AssetRef {
    AssetRef {
        public_id: public_id.to_string(),
        width: 1200,
        height: 800,
        secure_url: format!("https://cdn.example/{public_id}.jpg"),
    }
}

fn sample_record(title: &str) -> PersistedImageRecord {
    let config =
        TransformConfig::new().apply(&ConfigPatch::field(TransformKind::Recolor, "to", "#fff"));
    PersistedImageRecord {
        id: None,
        title: title.to_string(),
        transformation_type: TransformKind::Recolor,
        public_id: "demo/car".to_string(),
        secure_url: "https://cdn.example/demo/car.jpg".to_string(),
        width: 1200,
        height: 800,
        config: Some(config.clone()),
        transformation_url: Some("https://cdn.example/t/demo/car".to_string()),
        aspect_ratio: Some("1:1".to_string()),
        color: Some("#fff".to_string()),
        prompt: Some("car".to_string()),
        author: 7,
        created_ms: 1_000,
        updated_ms: 1_000,
        version1_image: Some(VersionImage {
            title: title.to_string(),
            transformation_type: TransformKind::Recolor,
            public_id: "demo/car".to_string(),
            secure_url: "https://cdn.example/demo/car.jpg".to_string(),
            width: 1200,
            height: 800,
            transformation_url: Some("https://cdn.example/t/demo/car".to_string()),
            aspect_ratio: Some("1:1".to_string()),
            config: Some(config),
            prompt: Some("car".to_string()),
            color: Some("#fff".to_string()),
        }),
        version2_image: None,
    }
}

#[test]
fn create_then_get_round_trips() {
    let mut store = SqliteRecordStore::open_in_memory().expect("open");
    let record = sample_record("Red car");

    let id = store.create(&record).expect("create");
    let loaded = store.get(id).expect("get").expect("record exists");

    assert_eq!(loaded.id, Some(id));
    assert_eq!(loaded.title, "Red car");
    assert_eq!(loaded.transformation_type, TransformKind::Recolor);
    assert_eq!(loaded.config, record.config);
    assert_eq!(loaded.version1_image, record.version1_image);
    assert_eq!(loaded.version2_image, None);
    assert_eq!(loaded.created_ms, 1_000);
}

#[test]
fn get_missing_id_is_none() {
    let store = SqliteRecordStore::open_in_memory().expect("open");
    assert!(store.get(42).expect("get").is_none());
}

#[test]
fn update_replaces_fields_but_preserves_created_ms() {
    let mut store = SqliteRecordStore::open_in_memory().expect("open");
    let id = store.create(&sample_record("First")).expect("create");

    let mut updated = sample_record("Second");
    updated.updated_ms = 5_000;
    updated.created_ms = 9_999; // must be ignored by update
    store.update(id, &updated).expect("update");

    let loaded = store.get(id).expect("get").expect("record");
    assert_eq!(loaded.title, "Second");
    assert_eq!(loaded.updated_ms, 5_000);
    assert_eq!(loaded.created_ms, 1_000);
}

#[test]
fn update_of_missing_record_fails() {
    let mut store = SqliteRecordStore::open_in_memory().expect("open");
    let err = store
        .update(99, &sample_record("ghost"))
        .expect_err("missing id");
    assert!(matches!(err, PersistError::MissingRecord(99)));
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("records.db");

    let id = {
        let mut store = SqliteRecordStore::open(&path).expect("open");
        store.create(&sample_record("Durable")).expect("create")
    };

    let store = SqliteRecordStore::open(&path).expect("reopen");
    let loaded = store.get(id).expect("get").expect("record");
    assert_eq!(loaded.title, "Durable");
    assert_eq!(loaded.version1_image, sample_record("Durable").version1_image);
}

fn resolved_session() -> TransformSession {
    let mut session = TransformSession::new(TransformKind::Recolor);
    session.set_base_image(asset("car"));
    session.set_title("Red car");
    session.set_aspect(AspectRatio::Square);
    session.queue_edit(TransformKind::Recolor, EditField::Color, "#ff0000");
    session.queue_edit(TransformKind::Recolor, EditField::Prompt, "car");
    session.begin_version1(100).expect("apply");
    session
        .complete_version1("https://cdn.example/render".to_string(), 200)
        .expect("load");
    session.begin_version2(300).expect("dispatch");
    session
        .complete_version2(asset("car-ai"), 700, 350)
        .expect("chain");
    session
}

#[test]
fn reconcile_version1_nulls_the_other_side() {
    let mut session = resolved_session();
    session.select_version(VersionTag::Version1).expect("select");

    let record = reconcile(&session, 7, Some("https://cdn.example/save-t".to_string()), 1_000)
        .expect("reconcile");

    let v1 = record.version1_image.as_ref().expect("winning side");
    assert!(record.version2_image.is_none());
    assert_eq!(v1.transformation_url.as_deref(), Some("https://cdn.example/render"));
    assert!(v1.config.is_some());
    assert_eq!(v1.prompt.as_deref(), Some("car"));
    assert_eq!(v1.color.as_deref(), Some("#ff0000"));
    // Base dimensions follow the square preset applied before save.
    assert_eq!((record.width, record.height), (1000, 1000));
    assert_eq!(record.aspect_ratio.as_deref(), Some("1:1"));
    assert_eq!(record.author, 7);
}

#[test]
fn reconcile_version2_discards_descriptor_fields() {
    let session = resolved_session(); // current is Version2 after the chain

    let record = reconcile(&session, 7, Some("https://cdn.example/save-t".to_string()), 1_000)
        .expect("reconcile");

    assert!(record.version1_image.is_none());
    let v2 = record.version2_image.as_ref().expect("winning side");
    assert_eq!(v2.public_id, "car-ai");
    assert!(v2.config.is_none());
    assert!(v2.prompt.is_none());
    assert!(v2.color.is_none());
    // The chain result carries no descriptor URL; the save-time one is used.
    assert_eq!(v2.transformation_url.as_deref(), Some("https://cdn.example/save-t"));
    // The record root still keeps the committed descriptor.
    assert!(record.config.is_some());
}

#[test]
fn reconcile_requires_a_base_image() {
    let session = TransformSession::new(TransformKind::Recolor);
    assert_eq!(
        reconcile(&session, 7, None, 0).expect_err("no base"),
        ReconcileError::NoBaseImage
    );
}

#[test]
fn reconcile_requires_a_current_version() {
    let mut session = TransformSession::new(TransformKind::Recolor);
    session.set_base_image(asset("car"));
    assert_eq!(
        reconcile(&session, 7, None, 0).expect_err("nothing dispatched"),
        ReconcileError::NoVersionSelected
    );
}

#[test]
fn reconcile_rejects_an_empty_current_slot() {
    let mut session = TransformSession::new(TransformKind::Recolor);
    session.set_base_image(asset("car"));
    session.queue_edit(TransformKind::Recolor, EditField::Color, "#fff");
    session.begin_version1(0).expect("apply");
    // Still running: the slot has no result yet.
    assert_eq!(
        reconcile(&session, 7, None, 10).expect_err("empty slot"),
        ReconcileError::SlotEmpty(VersionTag::Version1)
    );
}

#[test]
fn reconciled_record_round_trips_through_sqlite() {
    let mut session = resolved_session();
    session.select_version(VersionTag::Version1).expect("select");
    let record = reconcile(&session, 7, None, 2_000).expect("reconcile");

    let mut store = SqliteRecordStore::open_in_memory().expect("open");
    let id = store.create(&record).expect("create");
    let loaded = store.get(id).expect("get").expect("record");

    assert_eq!(loaded.version1_image, record.version1_image);
    assert_eq!(loaded.version2_image, None);
    assert_eq!(loaded.config, record.config);
    assert_eq!(loaded.prompt, record.prompt);
}
