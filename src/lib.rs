//! Dual-pipeline image transformation sessions with side-by-side comparison.
//!
//! A [`session::TransformSession`] accumulates per-kind transform parameters,
//! tracks two independently timed production pipelines (a declarative render
//! and a chained AI service), and resolves a user's choice into exactly one
//! persisted winning version. The [`runtime`] module wraps a session in a
//! single-writer async loop that debounces edits, times out unresponsive
//! renders, and drives blocking providers off-thread.
//!
//! # Examples
//!
//! In-memory usage with [`session::TransformSession`]:
//! ```
//! use twinlens::{
//!     session::TransformSession,
//!     types::{AssetRef, EditField, TransformKind},
//! };
//!
//! let mut session = TransformSession::new(TransformKind::Recolor);
//! session.set_base_image(AssetRef {
//!     public_id: "demo/car".to_string(),
//!     width: 1200,
//!     height: 800,
//!     secure_url: "https://cdn.example/demo/car.jpg".to_string(),
//! });
//! session.queue_edit(TransformKind::Recolor, EditField::Color, "#ff0000");
//! session.queue_edit(TransformKind::Recolor, EditField::Prompt, "car");
//!
//! let committed = session.begin_version1(1_000).expect("apply");
//! assert_eq!(committed.param_str(TransformKind::Recolor, "to"), Some("#ff0000"));
//! assert_eq!(committed.param_str(TransformKind::Recolor, "prompt"), Some("car"));
//!
//! session
//!     .complete_version1("https://cdn.example/render".to_string(), 1_250)
//!     .expect("render load");
//! let result = session.version1().result.as_ref().expect("slot");
//! assert_eq!(result.fetch_duration_ms, 250);
//! ```
//!
//! Persisting the winning version:
//! ```
//! use twinlens::{
//!     persist::{reconcile, sqlite::SqliteRecordStore, RecordStore},
//!     session::TransformSession,
//!     types::{AssetRef, TransformKind},
//! };
//!
//! let mut session = TransformSession::new(TransformKind::Restore);
//! session.set_base_image(AssetRef {
//!     public_id: "demo/old-photo".to_string(),
//!     width: 800,
//!     height: 600,
//!     secure_url: "https://cdn.example/demo/old-photo.jpg".to_string(),
//! });
//! session.set_title("Grandma, restored");
//! session.begin_version1(10).expect("apply");
//! session
//!     .complete_version1("https://cdn.example/render".to_string(), 60)
//!     .expect("render load");
//!
//! let record = reconcile(&session, 7, None, 100).expect("reconcile");
//! let mut store = SqliteRecordStore::open_in_memory().expect("open");
//! let id = store.create(&record).expect("create");
//! let loaded = store.get(id).expect("get").expect("record");
//! assert!(loaded.version1_image.is_some());
//! assert!(loaded.version2_image.is_none());
//! ```
#![deny(missing_docs)]

/// Transform descriptor model and deep-merge engine.
pub mod config;
/// Persistence abstraction, reconciler, and SQLite implementation.
pub mod persist;
/// Provider interfaces and pipeline runners.
pub mod pipeline;
/// Durable record shapes.
pub mod record;
/// Authoritative in-memory session state machine.
pub mod session;
/// Single-writer async runtime, events, and timer primitives.
pub mod runtime;
/// Shared primitive types and enums.
pub mod types;
