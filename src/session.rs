//! Authoritative in-memory state for one image being edited.
//!
//! A [`TransformSession`] spans from upload to save or discard. It owns the
//! accumulated transform descriptor, one result slot per pipeline, and the
//! comparison/selection state machine. All mutation happens through the
//! methods here; the runtime loop calls them between suspension points, so no
//! locking is needed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::{ConfigPatch, TransformConfig},
    types::{AspectRatio, AssetRef, EditField, PipelineStatus, RecordId, TransformKind, VersionTag},
};

/// Session-level precondition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No source asset has been uploaded yet.
    #[error("no base image uploaded")]
    NoBaseImage,
    /// Apply was triggered with nothing accumulated to apply.
    #[error("no pending or committed transformation to apply")]
    NothingToApply,
    /// The pipeline is already in flight.
    #[error("{0:?} pipeline is already running")]
    PipelineBusy(VersionTag),
    /// A completion signal arrived for a pipeline that is not running.
    #[error("{0:?} pipeline is not running")]
    NotRunning(VersionTag),
    /// The targeted result slot is empty.
    #[error("{0:?} result slot is empty")]
    SlotEmpty(VersionTag),
    /// A Version-2 result already exists; re-dispatch is refused.
    #[error("version 2 result already produced")]
    Version2AlreadyProduced,
    /// Recolor on the AI chain needs both a prompt and a target color.
    #[error("recolor requires a prompt and a replacement color")]
    MissingRecolorParams,
    /// This kind has no AI-chain route.
    #[error("{0:?} is not supported by the version 2 pipeline")]
    UnsupportedVersion2(TransformKind),
    /// Comparison requires both result slots populated.
    #[error("comparison requires both versions")]
    ComparisonUnavailable,
    /// A comparison operation arrived while no comparison was open.
    #[error("comparison view is not open")]
    ComparisonNotOpen,
}

/// Comparison state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonPhase {
    /// Fewer than two populated result slots.
    Unavailable,
    /// Both slots populated; comparison may be opened.
    Available,
    /// Side-by-side view open, selection pending.
    ComparisonOpen,
    /// A selection was confirmed into the current version.
    Resolved,
}

/// Form metadata captured alongside the transformation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormMeta {
    /// User-facing title.
    pub title: String,
    /// Selected fill aspect ratio, if any.
    pub aspect_ratio: Option<AspectRatio>,
    /// Replacement color for recolor, if any.
    pub color: Option<String>,
    /// Removal/recolor prompt, if any.
    pub prompt: Option<String>,
}

/// A populated pipeline output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionResult {
    /// Asset produced (or rendered from) by the pipeline.
    pub asset: AssetRef,
    /// Render-provider descriptor URL, when one was built.
    pub transform_url: Option<String>,
    /// Descriptor that produced this result (Version 1 only).
    pub applied_config: Option<TransformConfig>,
    /// Dispatch timestamp, milliseconds since epoch.
    pub started_ms: u64,
    /// Completion timestamp, milliseconds since epoch.
    pub completed_ms: u64,
    /// `completed_ms - started_ms` for Version 1; submission-to-receipt for
    /// Version 2 (the re-upload step is excluded).
    pub fetch_duration_ms: u64,
}

/// One pipeline's status plus its (possibly empty) result slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineSlot {
    /// Lifecycle status.
    pub status: PipelineStatus,
    /// Populated output, if the pipeline has succeeded.
    pub result: Option<VersionResult>,
    started_ms: Option<u64>,
}

impl PipelineSlot {
    /// True when a result is populated.
    pub fn is_populated(&self) -> bool {
        self.result.is_some()
    }
}

/// In-memory working state for one edited image.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSession {
    kind: TransformKind,
    meta: FormMeta,
    base_image: Option<AssetRef>,
    pending: ConfigPatch,
    committed: Option<TransformConfig>,
    v1: PipelineSlot,
    v2: PipelineSlot,
    current: Option<VersionTag>,
    comparison_open: bool,
    comparison_selection: VersionTag,
    resolved: bool,
    credits_charged: u32,
    record_id: Option<RecordId>,
}

impl TransformSession {
    /// Creates a fresh session for one transformation kind.
    pub fn new(kind: TransformKind) -> Self {
        Self {
            kind,
            meta: FormMeta::default(),
            base_image: None,
            pending: ConfigPatch::new(),
            committed: None,
            v1: PipelineSlot::default(),
            v2: PipelineSlot::default(),
            current: None,
            comparison_open: false,
            comparison_selection: VersionTag::Version1,
            resolved: false,
            credits_charged: 0,
            record_id: None,
        }
    }

    /// Session transformation kind.
    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    /// Form metadata.
    pub fn meta(&self) -> &FormMeta {
        &self.meta
    }

    /// Uploaded source asset, if any.
    pub fn base_image(&self) -> Option<&AssetRef> {
        self.base_image.as_ref()
    }

    /// Accumulated, not-yet-applied patch.
    pub fn pending(&self) -> &ConfigPatch {
        &self.pending
    }

    /// Descriptor applied on the most recent Version-1 dispatch.
    pub fn committed(&self) -> Option<&TransformConfig> {
        self.committed.as_ref()
    }

    /// Version-1 slot.
    pub fn version1(&self) -> &PipelineSlot {
        &self.v1
    }

    /// Version-2 slot.
    pub fn version2(&self) -> &PipelineSlot {
        &self.v2
    }

    /// Which result is active for display and eventual persistence.
    pub fn current_version(&self) -> Option<VersionTag> {
        self.current
    }

    /// Ledger debits issued this session.
    pub fn credits_charged(&self) -> u32 {
        self.credits_charged
    }

    /// Durable record identity once the session has been saved.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    /// Remembers the durable identity after an Add save.
    pub fn bind_record(&mut self, id: RecordId) {
        self.record_id = Some(id);
    }

    /// True when either pipeline is in flight.
    pub fn any_running(&self) -> bool {
        self.v1.status == PipelineStatus::Running || self.v2.status == PipelineStatus::Running
    }

    /// Replaces the source asset wholesale.
    ///
    /// Restore and background removal need no further form input, so their
    /// flag patch is queued as soon as an image exists.
    pub fn set_base_image(&mut self, asset: AssetRef) {
        self.base_image = Some(asset);
        if matches!(
            self.kind,
            TransformKind::Restore | TransformKind::RemoveBackground
        ) {
            self.queue_patch(ConfigPatch::kind_flag(self.kind));
        }
    }

    /// Sets the user-facing title.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.meta.title = title.into();
    }

    /// Applies an aspect-ratio selection immediately (not debounced): the base
    /// dimensions follow the preset and a fill patch is queued.
    pub fn set_aspect(&mut self, aspect: AspectRatio) {
        self.meta.aspect_ratio = Some(aspect);
        if let Some(asset) = self.base_image.as_mut() {
            let (w, h) = aspect.dimensions();
            asset.width = w;
            asset.height = h;
        }
        self.queue_patch(ConfigPatch::fill_aspect(aspect));
    }

    /// Folds a coalesced field edit into the pending patch and mirrors it into
    /// the form metadata used at save time.
    pub fn queue_edit(&mut self, kind: TransformKind, field: EditField, value: impl Into<String>) {
        let value = value.into();
        match field {
            EditField::Prompt => self.meta.prompt = Some(value.clone()),
            EditField::Color => self.meta.color = Some(value.clone()),
        }
        self.queue_patch(ConfigPatch::field(kind, field.param_key(), value));
    }

    /// Folds an arbitrary patch into the pending descriptor.
    pub fn queue_patch(&mut self, patch: ConfigPatch) {
        self.pending = self.pending.merge(&patch);
    }

    /// Looks a string parameter up in pending first, then committed.
    pub fn effective_param(&self, kind: TransformKind, name: &str) -> Option<&str> {
        self.pending
            .param_str(kind, name)
            .or_else(|| self.committed.as_ref()?.param_str(kind, name))
    }

    /// Prompt and replacement color for the AI recolor route, when both exist.
    pub fn recolor_params(&self) -> Option<(String, String)> {
        let prompt = self.effective_param(TransformKind::Recolor, "prompt")?;
        let to = self.effective_param(TransformKind::Recolor, "to")?;
        Some((prompt.to_string(), to.to_string()))
    }

    /// Folds pending into committed and marks Version 1 in flight.
    ///
    /// Returns the committed descriptor to hand to the render provider. The
    /// pending patch is cleared; the descriptor is immutable until the next
    /// apply cycle replaces it.
    pub fn begin_version1(&mut self, now_ms: u64) -> Result<TransformConfig, SessionError> {
        if self.base_image.is_none() {
            return Err(SessionError::NoBaseImage);
        }
        if self.v1.status == PipelineStatus::Running {
            return Err(SessionError::PipelineBusy(VersionTag::Version1));
        }
        if self.pending.is_empty() && self.committed.is_none() {
            return Err(SessionError::NothingToApply);
        }

        let base = self.committed.take().unwrap_or_default();
        let committed = base.apply(&self.pending);
        self.pending = ConfigPatch::new();
        self.committed = Some(committed.clone());

        self.v1.status = PipelineStatus::Running;
        self.v1.started_ms = Some(now_ms);
        self.current = Some(VersionTag::Version1);
        Ok(committed)
    }

    /// Consumes the render provider's load signal, stamping timing and
    /// populating the Version-1 slot from the base image plus descriptor.
    pub fn complete_version1(
        &mut self,
        transform_url: String,
        now_ms: u64,
    ) -> Result<(), SessionError> {
        if self.v1.status != PipelineStatus::Running {
            return Err(SessionError::NotRunning(VersionTag::Version1));
        }
        let asset = self
            .base_image
            .clone()
            .ok_or(SessionError::NoBaseImage)?;
        let started = self.v1.started_ms.take().unwrap_or(now_ms);
        self.v1.result = Some(VersionResult {
            asset,
            transform_url: Some(transform_url),
            applied_config: self.committed.clone(),
            started_ms: started,
            completed_ms: now_ms,
            fetch_duration_ms: now_ms.saturating_sub(started),
        });
        self.v1.status = PipelineStatus::Succeeded;
        Ok(())
    }

    /// Force-fails an in-flight Version 1 (render error fallback or timeout).
    pub fn fail_version1(&mut self) -> Result<(), SessionError> {
        if self.v1.status != PipelineStatus::Running {
            return Err(SessionError::NotRunning(VersionTag::Version1));
        }
        self.v1.status = PipelineStatus::Failed;
        self.v1.started_ms = None;
        Ok(())
    }

    /// Marks the AI chain in flight and returns the source URL to submit.
    pub fn begin_version2(&mut self, now_ms: u64) -> Result<String, SessionError> {
        let Some(asset) = self.base_image.as_ref() else {
            return Err(SessionError::NoBaseImage);
        };
        if self.v2.status == PipelineStatus::Running {
            return Err(SessionError::PipelineBusy(VersionTag::Version2));
        }
        if self.v2.is_populated() {
            return Err(SessionError::Version2AlreadyProduced);
        }
        let source_url = asset.secure_url.clone();
        self.v2.status = PipelineStatus::Running;
        self.v2.started_ms = Some(now_ms);
        self.current = Some(VersionTag::Version2);
        Ok(source_url)
    }

    /// Populates the Version-2 slot from a completed chain.
    ///
    /// `fetch_duration_ms` covers submission to receipt of the processed
    /// asset; the re-upload step is excluded by contract.
    pub fn complete_version2(
        &mut self,
        asset: AssetRef,
        completed_ms: u64,
        fetch_duration_ms: u64,
    ) -> Result<(), SessionError> {
        if self.v2.status != PipelineStatus::Running {
            return Err(SessionError::NotRunning(VersionTag::Version2));
        }
        let started = self.v2.started_ms.take().unwrap_or(completed_ms);
        self.v2.result = Some(VersionResult {
            asset,
            transform_url: None,
            applied_config: None,
            started_ms: started,
            completed_ms,
            fetch_duration_ms,
        });
        self.v2.status = PipelineStatus::Succeeded;
        Ok(())
    }

    /// Marks an in-flight AI chain as failed. The slot stays empty and no
    /// other session state is touched.
    pub fn fail_version2(&mut self) -> Result<(), SessionError> {
        if self.v2.status != PipelineStatus::Running {
            return Err(SessionError::NotRunning(VersionTag::Version2));
        }
        self.v2.status = PipelineStatus::Failed;
        self.v2.started_ms = None;
        Ok(())
    }

    /// Switches the active version directly, outside a comparison. Only legal
    /// when the target slot is populated.
    pub fn select_version(&mut self, tag: VersionTag) -> Result<(), SessionError> {
        if !self.slot(tag).is_populated() {
            return Err(SessionError::SlotEmpty(tag));
        }
        self.current = Some(tag);
        Ok(())
    }

    /// Current comparison phase.
    pub fn phase(&self) -> ComparisonPhase {
        if self.comparison_open {
            ComparisonPhase::ComparisonOpen
        } else if self.resolved {
            ComparisonPhase::Resolved
        } else if self.v1.is_populated() && self.v2.is_populated() {
            ComparisonPhase::Available
        } else {
            ComparisonPhase::Unavailable
        }
    }

    /// True while the side-by-side view is open.
    pub fn comparison_open(&self) -> bool {
        self.comparison_open
    }

    /// Highlighted side while a comparison is open.
    pub fn comparison_selection(&self) -> VersionTag {
        self.comparison_selection
    }

    /// Opens the side-by-side view. Gated on both slots being populated.
    pub fn open_comparison(&mut self) -> Result<(), SessionError> {
        if !(self.v1.is_populated() && self.v2.is_populated()) {
            return Err(SessionError::ComparisonUnavailable);
        }
        self.comparison_open = true;
        self.resolved = false;
        self.comparison_selection = self.current.unwrap_or(VersionTag::Version1);
        Ok(())
    }

    /// Moves the highlight while the comparison is open.
    pub fn set_comparison_selection(&mut self, tag: VersionTag) -> Result<(), SessionError> {
        if !self.comparison_open {
            return Err(SessionError::ComparisonNotOpen);
        }
        self.comparison_selection = tag;
        Ok(())
    }

    /// Confirms the highlighted side as the current version and closes the
    /// comparison.
    pub fn resolve_comparison(&mut self) -> Result<VersionTag, SessionError> {
        if !self.comparison_open {
            return Err(SessionError::ComparisonNotOpen);
        }
        let tag = self.comparison_selection;
        self.current = Some(tag);
        self.comparison_open = false;
        self.resolved = true;
        Ok(tag)
    }

    /// Closes the comparison without touching the current version.
    pub fn cancel_comparison(&mut self) -> Result<(), SessionError> {
        if !self.comparison_open {
            return Err(SessionError::ComparisonNotOpen);
        }
        self.comparison_open = false;
        Ok(())
    }

    /// Records one ledger debit issued on behalf of this session.
    pub fn note_credit_debit(&mut self) {
        self.credits_charged += 1;
    }

    fn slot(&self, tag: VersionTag) -> &PipelineSlot {
        match tag {
            VersionTag::Version1 => &self.v1,
            VersionTag::Version2 => &self.v2,
        }
    }
}
