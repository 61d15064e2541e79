//! SQLite-backed image record store.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{
    config::TransformConfig,
    record::{PersistedImageRecord, VersionImage, VersionImageEnvelope, RECORD_FORMAT_VERSION},
    types::{RecordId, TransformKind},
};

use super::{PersistError, PersistResult, RecordStore};

/// SQLite implementation of [`RecordStore`].
pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    /// Opens or creates a record store at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory record store.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }
}

impl RecordStore for SqliteRecordStore {
    fn create(&mut self, record: &PersistedImageRecord) -> PersistResult<RecordId> {
        let config = encode_config(record.config.as_ref())?;
        let v1 = encode_version(record.version1_image.as_ref())?;
        let v2 = encode_version(record.version2_image.as_ref())?;

        self.conn.execute(
            "INSERT INTO images(title, transformation_type, public_id, secure_url, width, height, \
             config, transformation_url, aspect_ratio, color, prompt, author, created_ms, \
             updated_ms, version1_image, version2_image) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                record.title,
                record.transformation_type.as_key(),
                record.public_id,
                record.secure_url,
                record.width as i64,
                record.height as i64,
                config,
                record.transformation_url,
                record.aspect_ratio,
                record.color,
                record.prompt,
                record.author as i64,
                record.created_ms as i64,
                record.updated_ms as i64,
                v1,
                v2,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update(&mut self, id: RecordId, record: &PersistedImageRecord) -> PersistResult<RecordId> {
        let config = encode_config(record.config.as_ref())?;
        let v1 = encode_version(record.version1_image.as_ref())?;
        let v2 = encode_version(record.version2_image.as_ref())?;

        // created_ms is deliberately left alone on update.
        let changed = self.conn.execute(
            "UPDATE images SET title = ?2, transformation_type = ?3, public_id = ?4, \
             secure_url = ?5, width = ?6, height = ?7, config = ?8, transformation_url = ?9, \
             aspect_ratio = ?10, color = ?11, prompt = ?12, author = ?13, updated_ms = ?14, \
             version1_image = ?15, version2_image = ?16 WHERE id = ?1",
            params![
                id,
                record.title,
                record.transformation_type.as_key(),
                record.public_id,
                record.secure_url,
                record.width as i64,
                record.height as i64,
                config,
                record.transformation_url,
                record.aspect_ratio,
                record.color,
                record.prompt,
                record.author as i64,
                record.updated_ms as i64,
                v1,
                v2,
            ],
        )?;
        if changed == 0 {
            return Err(PersistError::MissingRecord(id));
        }
        Ok(id)
    }

    fn get(&self, id: RecordId) -> PersistResult<Option<PersistedImageRecord>> {
        self.conn
            .query_row(
                "SELECT id, title, transformation_type, public_id, secure_url, width, height, \
                 config, transformation_url, aspect_ratio, color, prompt, author, created_ms, \
                 updated_ms, version1_image, version2_image FROM images WHERE id = ?1",
                params![id],
                decode_row,
            )
            .optional()
            .map_err(PersistError::from)
    }
}

fn encode_config(config: Option<&TransformConfig>) -> PersistResult<Option<String>> {
    config
        .map(|c| serde_json::to_string(c).map_err(PersistError::from))
        .transpose()
}

fn encode_version(image: Option<&VersionImage>) -> PersistResult<Option<String>> {
    image
        .map(|img| {
            serde_json::to_string(&VersionImageEnvelope::new(img.clone()))
                .map_err(PersistError::from)
        })
        .transpose()
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<PersistedImageRecord> {
    let id: i64 = row.get(0)?;
    let kind_key: String = row.get(2)?;
    let width: i64 = row.get(5)?;
    let height: i64 = row.get(6)?;
    let config: Option<String> = row.get(7)?;
    let author: i64 = row.get(12)?;
    let created_ms: i64 = row.get(13)?;
    let updated_ms: i64 = row.get(14)?;
    let v1: Option<String> = row.get(15)?;
    let v2: Option<String> = row.get(16)?;

    Ok(PersistedImageRecord {
        id: Some(id),
        title: row.get(1)?,
        transformation_type: kind_from_key(&kind_key)
            .map_err(|err| conversion_error(2, err))?,
        public_id: row.get(3)?,
        secure_url: row.get(4)?,
        width: width as u32,
        height: height as u32,
        config: config
            .map(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
            .transpose()
            .map_err(|err| conversion_error(7, err))?,
        transformation_url: row.get(8)?,
        aspect_ratio: row.get(9)?,
        color: row.get(10)?,
        prompt: row.get(11)?,
        author: author as u64,
        created_ms: created_ms as u64,
        updated_ms: updated_ms as u64,
        version1_image: v1
            .map(|raw| decode_version_payload(&raw))
            .transpose()
            .map_err(|err| conversion_error(15, err))?,
        version2_image: v2
            .map(|raw| decode_version_payload(&raw))
            .transpose()
            .map_err(|err| conversion_error(16, err))?,
    })
}

fn decode_version_payload(raw: &str) -> Result<VersionImage, String> {
    let envelope: VersionImageEnvelope =
        serde_json::from_str(raw).map_err(|e| format!("version payload decode failed: {e}"))?;
    if envelope.format_version != RECORD_FORMAT_VERSION {
        return Err(format!(
            "unsupported version payload format: {}",
            envelope.format_version
        ));
    }
    Ok(envelope.image)
}

fn kind_from_key(key: &str) -> Result<TransformKind, String> {
    match key {
        "restore" => Ok(TransformKind::Restore),
        "removeBackground" => Ok(TransformKind::RemoveBackground),
        "fill" => Ok(TransformKind::Fill),
        "remove" => Ok(TransformKind::Remove),
        "recolor" => Ok(TransformKind::Recolor),
        other => Err(format!("unknown transformation type: {other}")),
    }
}

fn conversion_error(column: usize, err: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::other(err)),
    )
}
