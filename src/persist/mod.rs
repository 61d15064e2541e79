//! Persistence: record store abstraction, reconciler, and SQLite backend.

/// SQLite-backed record store.
pub mod sqlite;

use thiserror::Error;

use crate::{
    record::{PersistedImageRecord, VersionImage},
    session::TransformSession,
    types::{RecordId, UserId, VersionTag},
};

/// Persistence-layer failure.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Underlying SQLite failure.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Payload (de)serialization failure.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Update targeted a record that does not exist.
    #[error("no record with id {0}")]
    MissingRecord(RecordId),
    /// Catch-all with context.
    #[error("{0}")]
    Message(String),
}

/// Result alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Durable store for [`PersistedImageRecord`]s.
pub trait RecordStore: Send {
    /// Creates a new record, returning its identity.
    fn create(&mut self, record: &PersistedImageRecord) -> PersistResult<RecordId>;

    /// Replaces the record at `id`. The prior record is left untouched on
    /// failure; a missing id is [`PersistError::MissingRecord`].
    fn update(&mut self, id: RecordId, record: &PersistedImageRecord) -> PersistResult<RecordId>;

    /// Loads a record by identity.
    fn get(&self, id: RecordId) -> PersistResult<Option<PersistedImageRecord>>;
}

/// Why a session could not be reconciled into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// No source asset was ever uploaded.
    #[error("no base image to persist")]
    NoBaseImage,
    /// No version was picked as current.
    #[error("no current version selected")]
    NoVersionSelected,
    /// The current version's result slot is empty.
    #[error("{0:?} selected but its result slot is empty")]
    SlotEmpty(VersionTag),
}

/// Maps a resolved session into the persisted record shape.
///
/// Strictly by the session's current version — not by which slots happen to be
/// populated — exactly one of the version sub-records is written and the other
/// is nulled. The non-selected pipeline's output is not retained.
pub fn reconcile(
    session: &TransformSession,
    author: UserId,
    transformation_url: Option<String>,
    now_ms: u64,
) -> Result<PersistedImageRecord, ReconcileError> {
    let base = session
        .base_image()
        .cloned()
        .ok_or(ReconcileError::NoBaseImage)?;
    let current = session
        .current_version()
        .ok_or(ReconcileError::NoVersionSelected)?;

    let meta = session.meta();
    let aspect_label = meta.aspect_ratio.map(|a| a.label().to_string());

    let slot = match current {
        VersionTag::Version1 => session.version1(),
        VersionTag::Version2 => session.version2(),
    };
    let result = slot
        .result
        .as_ref()
        .ok_or(ReconcileError::SlotEmpty(current))?;

    let winning = VersionImage {
        title: meta.title.clone(),
        transformation_type: session.kind(),
        public_id: result.asset.public_id.clone(),
        secure_url: result.asset.secure_url.clone(),
        width: result.asset.width,
        height: result.asset.height,
        transformation_url: result
            .transform_url
            .clone()
            .or_else(|| transformation_url.clone()),
        aspect_ratio: aspect_label.clone(),
        config: match current {
            VersionTag::Version1 => result.applied_config.clone(),
            VersionTag::Version2 => None,
        },
        prompt: match current {
            VersionTag::Version1 => meta.prompt.clone(),
            VersionTag::Version2 => None,
        },
        color: match current {
            VersionTag::Version1 => meta.color.clone(),
            VersionTag::Version2 => None,
        },
    };

    let (version1_image, version2_image) = match current {
        VersionTag::Version1 => (Some(winning), None),
        VersionTag::Version2 => (None, Some(winning)),
    };

    Ok(PersistedImageRecord {
        id: session.record_id(),
        title: meta.title.clone(),
        transformation_type: session.kind(),
        public_id: base.public_id,
        secure_url: base.secure_url,
        width: base.width,
        height: base.height,
        config: session.committed().cloned(),
        transformation_url,
        aspect_ratio: aspect_label,
        color: meta.color.clone(),
        prompt: meta.prompt.clone(),
        author,
        created_ms: now_ms,
        updated_ms: now_ms,
        version1_image,
        version2_image,
    })
}
