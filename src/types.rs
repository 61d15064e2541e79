//! Shared primitive IDs, transformation enums, and the asset reference type.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Account identifier charged by the credit ledger.
pub type UserId = u64;
/// Durable image record identifier (SQLite rowid).
pub type RecordId = i64;

/// Kind of transformation a session produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransformKind {
    /// Old-photo restoration / smart enhancement.
    Restore,
    /// Background removal.
    RemoveBackground,
    /// Generative fill to a target aspect ratio.
    Fill,
    /// Object removal by prompt.
    Remove,
    /// Object recoloring by prompt and target color.
    Recolor,
}

impl TransformKind {
    /// Key used for this kind inside a transform descriptor.
    pub fn as_key(self) -> &'static str {
        match self {
            Self::Restore => "restore",
            Self::RemoveBackground => "removeBackground",
            Self::Fill => "fill",
            Self::Remove => "remove",
            Self::Recolor => "recolor",
        }
    }
}

/// One of the two independent production pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionTag {
    /// Declarative render-provider pipeline.
    Version1,
    /// Chained AI-service pipeline.
    Version2,
}

/// Per-pipeline lifecycle status.
///
/// Replaces the single shared in-progress boolean so concurrent pipelines
/// cannot mask each other's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PipelineStatus {
    /// Never dispatched, or reset.
    #[default]
    Idle,
    /// Dispatched and awaiting completion.
    Running,
    /// Completed with a populated result slot.
    Succeeded,
    /// Completed without a result (error or timeout).
    Failed,
}

/// Save mode for the persistence reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Create a new durable record.
    Add,
    /// Mutate an existing record by identity.
    Update,
}

/// Aspect ratio presets offered for generative fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1:1 square, 1000x1000.
    Square,
    /// 3:4 portrait, 1000x1334.
    Portrait,
    /// 9:16 phone, 1000x1778.
    Phone,
}

impl AspectRatio {
    /// Ratio label stored in records and descriptors.
    pub fn label(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait => "3:4",
            Self::Phone => "9:16",
        }
    }

    /// Target pixel dimensions for this preset.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Square => (1000, 1000),
            Self::Portrait => (1000, 1334),
            Self::Phone => (1000, 1778),
        }
    }
}

/// Debounced form field identity within a transform kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditField {
    /// Free-text prompt (object to remove/recolor).
    Prompt,
    /// Replacement color.
    Color,
}

impl EditField {
    /// Parameter name this field maps to inside a descriptor patch.
    pub fn param_key(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Color => "to",
        }
    }
}

/// Reference to an asset held by the media storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    /// Provider-side public identifier.
    pub public_id: String,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// HTTPS delivery URL.
    pub secure_url: String,
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
