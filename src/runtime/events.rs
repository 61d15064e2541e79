//! Event stream payloads emitted by the studio loop.

use crate::types::{EditField, RecordId, TransformKind, VersionTag};

/// Events emitted from the single-writer studio loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioEvent {
    /// A source asset was uploaded or replaced.
    BaseImageSet,
    /// A coalesced field edit was folded into the pending descriptor.
    EditApplied {
        /// Field whose last value was applied.
        field: EditField,
    },
    /// One ledger debit was issued.
    CreditDebited {
        /// Credits debited.
        amount: u32,
    },
    /// Version 1 was dispatched to the render provider.
    Version1Started,
    /// The render provider signaled a successful load.
    Version1Completed {
        /// Dispatch-to-load duration.
        fetch_duration_ms: u64,
    },
    /// The fallback deadline force-failed an unresponsive render.
    Version1TimedOut,
    /// The AI chain was dispatched.
    Version2Started {
        /// Kind being transformed.
        kind: TransformKind,
    },
    /// The AI chain completed and its asset was stored.
    Version2Completed {
        /// Submission-to-receipt duration (re-upload excluded).
        fetch_duration_ms: u64,
    },
    /// The AI chain failed; its slot stays empty.
    Version2Failed {
        /// Whether a re-trigger could plausibly succeed.
        retryable: bool,
    },
    /// The active version changed.
    VersionSelected {
        /// Newly active version.
        version: VersionTag,
    },
    /// The side-by-side comparison opened.
    ComparisonOpened,
    /// A comparison selection was confirmed.
    ComparisonResolved {
        /// Winning version.
        version: VersionTag,
    },
    /// The comparison closed without a selection.
    ComparisonCancelled,
    /// A save produced a complete durable record.
    Saved {
        /// Durable record identity.
        id: RecordId,
    },
    /// A save failed; the prior record is untouched.
    SaveFailed,
}
