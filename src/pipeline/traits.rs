//! External collaborator interfaces.
//!
//! All providers are blocking, dyn-compatible traits; the runtime drives them
//! through `spawn_blocking` behind a shared mutex, so implementations may do
//! synchronous HTTP without stalling the command loop.

use thiserror::Error;

use crate::{
    config::TransformConfig,
    types::{AssetRef, UserId},
};

/// Failure of a single provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// HTTP-level failure from a provider endpoint.
    #[error("provider returned http {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Provider-supplied message, if any.
        message: String,
    },
    /// Response arrived but could not be decoded.
    #[error("provider payload decode failed: {0}")]
    Decode(String),
    /// The call exceeded the provider's own deadline.
    #[error("provider call timed out")]
    Timeout,
    /// Connection-level failure before any response.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Whether a retry of the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
            Self::Timeout | Self::Unavailable(_) => true,
        }
    }
}

/// Result alias for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Payload accepted by [`MediaStore::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    /// Base64 data URL (`data:image/jpeg;base64,...`).
    DataUrl(String),
    /// Remote URL the store should fetch itself.
    RemoteUrl(String),
    /// Raw image bytes.
    Bytes(Vec<u8>),
}

/// Media render provider: turns a base asset plus descriptor into a
/// deliverable URL. Completion of the actual fetch is signaled asynchronously
/// by the host shell via the runtime's render-loaded/render-failed inputs.
pub trait RenderProvider: Send {
    /// Builds the derived-image URL for `asset` under `config`.
    fn descriptor_url(&self, asset: &AssetRef, config: &TransformConfig) -> String;
}

/// Remote AI transformation endpoints, one method per route.
pub trait AiProvider: Send {
    /// Submits `source_url` for background removal; returns a base64 data URL.
    fn remove_background(&mut self, source_url: &str) -> ProviderResult<String>;

    /// Submits `source_url` for restoration with an upscale directive; returns
    /// a temporary result URL.
    fn restore(&mut self, source_url: &str, upscale: &str) -> ProviderResult<String>;

    /// Delegates recoloring wholesale; the provider re-hosts the result and
    /// returns the final asset.
    fn recolor(&mut self, source_url: &str, prompt: &str, to: &str) -> ProviderResult<AssetRef>;
}

/// Media storage provider (upload half).
pub trait MediaStore: Send {
    /// Uploads a payload and returns the stored asset reference.
    fn upload(&mut self, source: UploadSource) -> ProviderResult<AssetRef>;
}

/// Credit ledger service.
pub trait CreditLedger: Send {
    /// Debits `amount` credits from `user`.
    fn debit(&mut self, user: UserId, amount: u32) -> ProviderResult<()>;
}

/// The full set of collaborators one studio runtime needs.
pub struct ProviderSet {
    /// Render descriptor builder.
    pub render: Box<dyn RenderProvider>,
    /// AI transformation endpoints.
    pub ai: Box<dyn AiProvider>,
    /// Storage upload endpoint.
    pub media: Box<dyn MediaStore>,
    /// Credit ledger.
    pub ledger: Box<dyn CreditLedger>,
}
