//! Version-1 pipeline: declarative render against the media provider.
//!
//! Dispatch is synchronous from the orchestrator's perspective: the committed
//! descriptor is folded, the descriptor URL built, and the slot marked
//! running. Completion arrives later through the render provider's own
//! load/error signal, which the runtime feeds into [`complete`] /
//! [`observe_render_error`].

use tracing::warn;

use crate::{
    pipeline::traits::{CreditLedger, RenderProvider},
    session::{SessionError, TransformSession},
    types::UserId,
};

/// When the credit debit for a Version-1 apply is issued.
///
/// The debit is an explicit policy, not a side effect of dispatch. There is no
/// refund path in either mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreditPolicy {
    /// Debit once before dispatch; kept even if the render later fails.
    #[default]
    DebitOnDispatch,
    /// Debit only when the render provider signals a successful load.
    DebitOnSuccess,
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Descriptor URL handed to the host shell for display.
    pub transform_url: String,
    /// Whether a ledger debit was issued during dispatch.
    pub debited: bool,
}

/// Folds the accumulated config, debits per policy, and marks Version 1 in
/// flight. Exactly one debit is issued per apply trigger; a ledger failure is
/// logged and otherwise ignored.
pub fn dispatch(
    session: &mut TransformSession,
    render: &dyn RenderProvider,
    ledger: &mut dyn CreditLedger,
    user: UserId,
    fee: u32,
    policy: CreditPolicy,
    now_ms: u64,
) -> Result<ApplyOutcome, SessionError> {
    let committed = session.begin_version1(now_ms)?;
    let asset = session
        .base_image()
        .cloned()
        .ok_or(SessionError::NoBaseImage)?;
    let transform_url = render.descriptor_url(&asset, &committed);

    let debited = if policy == CreditPolicy::DebitOnDispatch {
        debit_ignoring_failure(session, ledger, user, fee);
        true
    } else {
        false
    };

    Ok(ApplyOutcome {
        transform_url,
        debited,
    })
}

/// Consumes the render provider's load signal and stamps timing. Under
/// [`CreditPolicy::DebitOnSuccess`] the debit happens here instead.
pub fn complete(
    session: &mut TransformSession,
    ledger: &mut dyn CreditLedger,
    user: UserId,
    fee: u32,
    policy: CreditPolicy,
    transform_url: String,
    now_ms: u64,
) -> Result<(), SessionError> {
    session.complete_version1(transform_url, now_ms)?;
    if policy == CreditPolicy::DebitOnSuccess {
        debit_ignoring_failure(session, ledger, user, fee);
    }
    Ok(())
}

/// Consumes the render provider's error signal.
///
/// No retry and no immediate state change; force-clearing the in-progress
/// status is left to the runtime's fallback deadline, mirroring the render
/// provider's slow error surface.
pub fn observe_render_error(session: &TransformSession) {
    warn!(
        kind = session.kind().as_key(),
        "render provider signaled an error; awaiting fallback deadline"
    );
}

fn debit_ignoring_failure(
    session: &mut TransformSession,
    ledger: &mut dyn CreditLedger,
    user: UserId,
    fee: u32,
) {
    if let Err(err) = ledger.debit(user, fee) {
        warn!(user, fee, %err, "credit debit failed; transformation proceeds");
    }
    session.note_credit_debit();
}
