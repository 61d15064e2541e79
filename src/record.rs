//! Durable image record shapes and versioned payload envelopes.

use serde::{Deserialize, Serialize};

use crate::{
    config::TransformConfig,
    types::{RecordId, TransformKind, UserId},
};

/// Version number for serialized [`VersionImageEnvelope`] payloads.
pub const RECORD_FORMAT_VERSION: u16 = 1;

/// One pipeline's output as persisted inside a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionImage {
    /// Title copied from the form at save time.
    pub title: String,
    /// Transformation kind that produced this image.
    pub transformation_type: TransformKind,
    /// Provider-side public identifier of the winning asset.
    pub public_id: String,
    /// HTTPS delivery URL of the winning asset.
    pub secure_url: String,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Render descriptor URL, when one was built.
    pub transformation_url: Option<String>,
    /// Fill aspect ratio label, if any.
    pub aspect_ratio: Option<String>,
    /// Applied descriptor (Version 1 only).
    pub config: Option<TransformConfig>,
    /// Removal/recolor prompt (Version 1 only).
    pub prompt: Option<String>,
    /// Replacement color (Version 1 only).
    pub color: Option<String>,
}

/// Versioned wrapper for stable on-disk version-image decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionImageEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped version image.
    pub image: VersionImage,
}

impl VersionImageEnvelope {
    /// Constructs an envelope using [`RECORD_FORMAT_VERSION`].
    pub fn new(image: VersionImage) -> Self {
        Self {
            format_version: RECORD_FORMAT_VERSION,
            image,
        }
    }
}

/// Complete durable record for one saved transformation.
///
/// Invariant: at most one of `version1_image` / `version2_image` is populated,
/// matching the current version at save time. A save either produces a
/// complete record or leaves the prior record untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedImageRecord {
    /// Durable identity; `None` until first saved.
    pub id: Option<RecordId>,
    /// User-facing title.
    pub title: String,
    /// Transformation kind.
    pub transformation_type: TransformKind,
    /// Public identifier of the base image.
    pub public_id: String,
    /// HTTPS delivery URL of the base image.
    pub secure_url: String,
    /// Base image pixel width.
    pub width: u32,
    /// Base image pixel height.
    pub height: u32,
    /// Committed transform descriptor, if Version 1 ever ran.
    pub config: Option<TransformConfig>,
    /// Render descriptor URL built at save time.
    pub transformation_url: Option<String>,
    /// Fill aspect ratio label, if any.
    pub aspect_ratio: Option<String>,
    /// Replacement color, if any.
    pub color: Option<String>,
    /// Removal/recolor prompt, if any.
    pub prompt: Option<String>,
    /// Owning account.
    pub author: UserId,
    /// Creation timestamp, milliseconds since epoch.
    pub created_ms: u64,
    /// Last-update timestamp, milliseconds since epoch.
    pub updated_ms: u64,
    /// Winning Version-1 output, mutually exclusive with `version2_image`.
    pub version1_image: Option<VersionImage>,
    /// Winning Version-2 output, mutually exclusive with `version1_image`.
    pub version2_image: Option<VersionImage>,
}
