//! Version-2 pipeline: a strictly sequential chain of external AI calls.
//!
//! Each transformation kind has its own route. Background removal and
//! restoration submit the source URL, receive a processed payload, and
//! re-upload it to the media store; recolor delegates wholesale to a remote
//! action. Failure at any step aborts the chain with a typed error and no
//! partial result.

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    pipeline::traits::{AiProvider, MediaStore, ProviderError, UploadSource},
    types::{now_ms, AssetRef, TransformKind},
};

/// Upscale directive sent with restoration submissions.
pub const RESTORE_UPSCALE: &str = "smart_enhance";

/// Which chain step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStep {
    /// The AI submission itself.
    Submit,
    /// The re-upload of the processed payload to storage.
    Upload,
}

/// Typed failure of an AI-chain attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// A provider call failed at the named step.
    #[error("{step:?} step failed for {kind:?}: {source}")]
    Step {
        /// Kind being transformed.
        kind: TransformKind,
        /// Failed step.
        step: ChainStep,
        /// Underlying provider failure.
        source: ProviderError,
    },
    /// The kind has no AI-chain route.
    #[error("{0:?} has no version 2 route")]
    Unsupported(TransformKind),
}

impl ChainError {
    /// Whether re-triggering the chain could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Step { source, .. } => source.is_retryable(),
            Self::Unsupported(_) => false,
        }
    }
}

/// Route selector plus any per-kind directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainRequest {
    /// Background removal route.
    RemoveBackground,
    /// Restoration route with the standard upscale directive.
    Restore,
    /// Recolor route; carries the prompt and replacement color.
    Recolor {
        /// Object to recolor.
        prompt: String,
        /// Replacement color.
        to: String,
    },
}

impl ChainRequest {
    /// Kind this request routes for.
    pub fn kind(&self) -> TransformKind {
        match self {
            Self::RemoveBackground => TransformKind::RemoveBackground,
            Self::Restore => TransformKind::Restore,
            Self::Recolor { .. } => TransformKind::Recolor,
        }
    }
}

/// Result of a completed chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutcome {
    /// Final stored asset.
    pub asset: AssetRef,
    /// Submission timestamp, milliseconds since epoch.
    pub started_ms: u64,
    /// Receipt of the processed payload, milliseconds since epoch.
    pub received_ms: u64,
    /// Submission-to-receipt duration; the re-upload step is excluded.
    pub ai_duration_ms: u64,
}

/// Runs one chain attempt to completion.
///
/// Blocking; the runtime calls this inside `spawn_blocking`. Timing covers
/// submission to receipt of the processed asset only.
pub fn run(
    request: &ChainRequest,
    source_url: &str,
    ai: &mut dyn AiProvider,
    media: &mut dyn MediaStore,
) -> Result<ChainOutcome, ChainError> {
    let kind = request.kind();
    let started_ms = now_ms();
    debug!(kind = kind.as_key(), source_url, "submitting ai chain");

    let outcome = match request {
        ChainRequest::RemoveBackground => {
            let base64 = ai
                .remove_background(source_url)
                .map_err(|source| step_err(kind, ChainStep::Submit, source))?;
            let received_ms = now_ms();
            let asset = media
                .upload(UploadSource::DataUrl(format!(
                    "data:image/jpeg;base64,{base64}"
                )))
                .map_err(|source| step_err(kind, ChainStep::Upload, source))?;
            ChainOutcome {
                asset,
                started_ms,
                received_ms,
                ai_duration_ms: received_ms.saturating_sub(started_ms),
            }
        }
        ChainRequest::Restore => {
            let tmp_url = ai
                .restore(source_url, RESTORE_UPSCALE)
                .map_err(|source| step_err(kind, ChainStep::Submit, source))?;
            let received_ms = now_ms();
            let asset = media
                .upload(UploadSource::RemoteUrl(tmp_url))
                .map_err(|source| step_err(kind, ChainStep::Upload, source))?;
            ChainOutcome {
                asset,
                started_ms,
                received_ms,
                ai_duration_ms: received_ms.saturating_sub(started_ms),
            }
        }
        ChainRequest::Recolor { prompt, to } => {
            let asset = ai
                .recolor(source_url, prompt, to)
                .map_err(|source| step_err(kind, ChainStep::Submit, source))?;
            let received_ms = now_ms();
            ChainOutcome {
                asset,
                started_ms,
                received_ms,
                ai_duration_ms: received_ms.saturating_sub(started_ms),
            }
        }
    };

    debug!(
        kind = kind.as_key(),
        ai_duration_ms = outcome.ai_duration_ms,
        "ai chain completed"
    );
    Ok(outcome)
}

fn step_err(kind: TransformKind, step: ChainStep, source: ProviderError) -> ChainError {
    warn!(kind = kind.as_key(), ?step, %source, "ai chain step failed");
    ChainError::Step { kind, step, source }
}
