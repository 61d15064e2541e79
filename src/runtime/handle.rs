//! Studio handle and single-writer command loop.
//!
//! One task owns the [`TransformSession`] and applies every mutation between
//! suspension points. Commands arrive over an mpsc channel with oneshot
//! replies; Version-2 chain completions come back over their own channel so
//! both pipelines can be in flight at once; the debounce queue and the render
//! fallback deadline share one timer arm of the `select!`.

use std::sync::Arc;

use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot, Mutex},
    time::{sleep_until, Duration, Instant},
};
use tracing::warn;

use crate::{
    persist::{reconcile, PersistError, ReconcileError, RecordStore},
    pipeline::{
        traits::{
            AiProvider, CreditLedger, MediaStore, ProviderError, ProviderSet, RenderProvider,
        },
        version1::{self, ApplyOutcome, CreditPolicy},
        version2::{self, ChainError, ChainOutcome, ChainRequest, ChainStep},
    },
    session::{SessionError, TransformSession},
    types::{
        now_ms, AspectRatio, AssetRef, EditField, PipelineStatus, RecordId, SaveMode,
        TransformKind, UserId, VersionTag,
    },
};

use super::{events::StudioEvent, timers::{Deadline, DebounceQueue}};

/// Failure surfaced through the studio handle.
#[derive(Debug, Error)]
pub enum StudioError {
    /// Session precondition failure.
    #[error("session: {0}")]
    Session(#[from] SessionError),
    /// AI chain failure.
    #[error("chain: {0}")]
    Chain(#[from] ChainError),
    /// Reconciliation failure at save time.
    #[error("reconcile: {0}")]
    Reconcile(#[from] ReconcileError),
    /// Record store failure.
    #[error("persist: {0}")]
    Persist(#[from] PersistError),
    /// Save was requested but no record store is configured.
    #[error("no record store configured")]
    NoStore,
    /// Update save was requested before any record exists.
    #[error("update requested before any record exists")]
    NoRecordIdentity,
    /// The runtime loop is gone.
    #[error("runtime channel closed")]
    ChannelClosed,
}

/// Tunables for one studio runtime.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// Quiet window for field-edit coalescing, milliseconds.
    pub debounce_ms: u64,
    /// Fallback deadline for an unresponsive render, milliseconds.
    pub render_timeout_ms: u64,
    /// Credits debited per Version-1 apply.
    pub credit_fee: u32,
    /// When the debit is issued.
    pub credit_policy: CreditPolicy,
    /// Account charged and recorded as record author.
    pub author: UserId,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            render_timeout_ms: 8000,
            credit_fee: 1,
            credit_policy: CreditPolicy::default(),
            author: 1,
        }
    }
}

/// Cloneable handle to a spawned studio loop.
pub struct StudioHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<StudioEvent>,
}

impl Clone for StudioHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    SetBaseImage {
        asset: AssetRef,
        resp: oneshot::Sender<()>,
    },
    SetTitle {
        title: String,
        resp: oneshot::Sender<()>,
    },
    SetAspect {
        aspect: AspectRatio,
        resp: oneshot::Sender<()>,
    },
    Edit {
        field: EditField,
        value: String,
    },
    ApplyVersion1 {
        resp: oneshot::Sender<Result<ApplyOutcome, StudioError>>,
    },
    RunVersion2 {
        resp: oneshot::Sender<Result<(), StudioError>>,
    },
    RenderLoaded {
        resp: oneshot::Sender<Result<(), StudioError>>,
    },
    RenderFailed {
        resp: oneshot::Sender<()>,
    },
    SelectVersion {
        tag: VersionTag,
        resp: oneshot::Sender<Result<(), StudioError>>,
    },
    OpenComparison {
        resp: oneshot::Sender<Result<(), StudioError>>,
    },
    SetComparisonSelection {
        tag: VersionTag,
        resp: oneshot::Sender<Result<(), StudioError>>,
    },
    ResolveComparison {
        resp: oneshot::Sender<Result<VersionTag, StudioError>>,
    },
    CancelComparison {
        resp: oneshot::Sender<Result<(), StudioError>>,
    },
    Snapshot {
        resp: oneshot::Sender<TransformSession>,
    },
    Save {
        mode: SaveMode,
        resp: oneshot::Sender<Result<RecordId, StudioError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

struct ChainProviders {
    ai: Box<dyn AiProvider>,
    media: Box<dyn MediaStore>,
}

struct StudioLoop {
    session: TransformSession,
    config: StudioConfig,
    events_tx: broadcast::Sender<StudioEvent>,
    render: Box<dyn RenderProvider>,
    ledger: Box<dyn CreditLedger>,
    chain: Arc<Mutex<ChainProviders>>,
    chain_tx: mpsc::UnboundedSender<Result<ChainOutcome, ChainError>>,
    store: Option<Arc<Mutex<Box<dyn RecordStore>>>>,
    debounce: DebounceQueue<EditField, String>,
    render_deadline: Deadline,
    inflight_render_url: Option<String>,
}

/// Spawns the studio loop for one session and returns its handle.
pub fn spawn_studio(
    session: TransformSession,
    providers: ProviderSet,
    store: Option<Box<dyn RecordStore>>,
    config: StudioConfig,
) -> StudioHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<StudioEvent>(1024);
    let (chain_tx, mut chain_rx) = mpsc::unbounded_channel::<Result<ChainOutcome, ChainError>>();

    let ProviderSet {
        render,
        ai,
        media,
        ledger,
    } = providers;

    let debounce_window = Duration::from_millis(config.debounce_ms);
    let mut studio = StudioLoop {
        session,
        config,
        events_tx: events_tx.clone(),
        render,
        ledger,
        chain: Arc::new(Mutex::new(ChainProviders { ai, media })),
        chain_tx,
        store: store.map(|s| Arc::new(Mutex::new(s))),
        debounce: DebounceQueue::new(debounce_window),
        render_deadline: Deadline::new(),
        inflight_render_url: None,
    };

    tokio::spawn(async move {
        loop {
            let wake = earliest(studio.debounce.next_deadline(), studio.render_deadline.at());
            let wake_at = wake.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    if studio.handle_command(cmd).await {
                        break;
                    }
                }
                chained = chain_rx.recv() => {
                    if let Some(result) = chained {
                        studio.on_chain_result(result);
                    }
                }
                _ = sleep_until(wake_at), if wake.is_some() => {
                    studio.on_timer(Instant::now());
                }
            }
        }
    });

    StudioHandle { cmd_tx, events_tx }
}

impl StudioLoop {
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::SetBaseImage { asset, resp } => {
                self.session.set_base_image(asset);
                self.emit(StudioEvent::BaseImageSet);
                let _ = resp.send(());
            }
            Command::SetTitle { title, resp } => {
                self.session.set_title(title);
                let _ = resp.send(());
            }
            Command::SetAspect { aspect, resp } => {
                self.session.set_aspect(aspect);
                let _ = resp.send(());
            }
            Command::Edit { field, value } => {
                self.debounce.push(field, value, Instant::now());
            }
            Command::ApplyVersion1 { resp } => {
                let res = version1::dispatch(
                    &mut self.session,
                    self.render.as_ref(),
                    self.ledger.as_mut(),
                    self.config.author,
                    self.config.credit_fee,
                    self.config.credit_policy,
                    now_ms(),
                );
                let out = match res {
                    Ok(outcome) => {
                        self.inflight_render_url = Some(outcome.transform_url.clone());
                        self.render_deadline
                            .arm(Instant::now() + Duration::from_millis(self.config.render_timeout_ms));
                        if outcome.debited {
                            self.emit(StudioEvent::CreditDebited {
                                amount: self.config.credit_fee,
                            });
                        }
                        self.emit(StudioEvent::Version1Started);
                        Ok(outcome)
                    }
                    Err(err) => Err(StudioError::from(err)),
                };
                let _ = resp.send(out);
            }
            Command::RunVersion2 { resp } => {
                let _ = resp.send(self.dispatch_version2());
            }
            Command::RenderLoaded { resp } => {
                let url = self.inflight_render_url.take().unwrap_or_default();
                let res = version1::complete(
                    &mut self.session,
                    self.ledger.as_mut(),
                    self.config.author,
                    self.config.credit_fee,
                    self.config.credit_policy,
                    url,
                    now_ms(),
                );
                let out = match res {
                    Ok(()) => {
                        self.render_deadline.clear();
                        if self.config.credit_policy == CreditPolicy::DebitOnSuccess {
                            self.emit(StudioEvent::CreditDebited {
                                amount: self.config.credit_fee,
                            });
                        }
                        let fetch_duration_ms = self
                            .session
                            .version1()
                            .result
                            .as_ref()
                            .map(|r| r.fetch_duration_ms)
                            .unwrap_or(0);
                        self.emit(StudioEvent::Version1Completed { fetch_duration_ms });
                        Ok(())
                    }
                    Err(err) => Err(StudioError::from(err)),
                };
                let _ = resp.send(out);
            }
            Command::RenderFailed { resp } => {
                version1::observe_render_error(&self.session);
                if self.session.version1().status == PipelineStatus::Running {
                    self.render_deadline
                        .arm(Instant::now() + Duration::from_millis(self.config.render_timeout_ms));
                }
                let _ = resp.send(());
            }
            Command::SelectVersion { tag, resp } => {
                let out = self
                    .session
                    .select_version(tag)
                    .map(|()| self.emit(StudioEvent::VersionSelected { version: tag }))
                    .map_err(StudioError::from);
                let _ = resp.send(out);
            }
            Command::OpenComparison { resp } => {
                let out = self
                    .session
                    .open_comparison()
                    .map(|()| self.emit(StudioEvent::ComparisonOpened))
                    .map_err(StudioError::from);
                let _ = resp.send(out);
            }
            Command::SetComparisonSelection { tag, resp } => {
                let _ = resp.send(
                    self.session
                        .set_comparison_selection(tag)
                        .map_err(StudioError::from),
                );
            }
            Command::ResolveComparison { resp } => {
                let out = self
                    .session
                    .resolve_comparison()
                    .map(|version| {
                        self.emit(StudioEvent::ComparisonResolved { version });
                        version
                    })
                    .map_err(StudioError::from);
                let _ = resp.send(out);
            }
            Command::CancelComparison { resp } => {
                let out = self
                    .session
                    .cancel_comparison()
                    .map(|()| self.emit(StudioEvent::ComparisonCancelled))
                    .map_err(StudioError::from);
                let _ = resp.send(out);
            }
            Command::Snapshot { resp } => {
                let _ = resp.send(self.session.clone());
            }
            Command::Save { mode, resp } => {
                let out = self.save(mode).await;
                match &out {
                    Ok(id) => self.emit(StudioEvent::Saved { id: *id }),
                    Err(err) => {
                        warn!(%err, "save failed; prior record untouched");
                        self.emit(StudioEvent::SaveFailed);
                    }
                }
                let _ = resp.send(out);
            }
            Command::Shutdown { resp } => {
                let _ = resp.send(());
                return true;
            }
        }
        false
    }

    fn dispatch_version2(&mut self) -> Result<(), StudioError> {
        let request = self.build_chain_request()?;
        let source_url = self.session.begin_version2(now_ms())?;
        self.emit(StudioEvent::Version2Started {
            kind: request.kind(),
        });

        let chain = Arc::clone(&self.chain);
        let tx = self.chain_tx.clone();
        let kind = request.kind();
        tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(move || {
                let mut guard = chain.blocking_lock();
                let providers = &mut *guard;
                version2::run(
                    &request,
                    &source_url,
                    providers.ai.as_mut(),
                    providers.media.as_mut(),
                )
            })
            .await
            {
                Ok(res) => res,
                Err(err) => Err(ChainError::Step {
                    kind,
                    step: ChainStep::Submit,
                    source: ProviderError::Unavailable(format!("join error: {err}")),
                }),
            };
            let _ = tx.send(result);
        });
        Ok(())
    }

    fn build_chain_request(&self) -> Result<ChainRequest, SessionError> {
        match self.session.kind() {
            TransformKind::RemoveBackground => Ok(ChainRequest::RemoveBackground),
            TransformKind::Restore => Ok(ChainRequest::Restore),
            TransformKind::Recolor => self
                .session
                .recolor_params()
                .map(|(prompt, to)| ChainRequest::Recolor { prompt, to })
                .ok_or(SessionError::MissingRecolorParams),
            other => Err(SessionError::UnsupportedVersion2(other)),
        }
    }

    fn on_chain_result(&mut self, result: Result<ChainOutcome, ChainError>) {
        match result {
            Ok(outcome) => {
                match self.session.complete_version2(
                    outcome.asset,
                    outcome.received_ms,
                    outcome.ai_duration_ms,
                ) {
                    Ok(()) => self.emit(StudioEvent::Version2Completed {
                        fetch_duration_ms: outcome.ai_duration_ms,
                    }),
                    Err(err) => warn!(%err, "late chain completion dropped"),
                }
            }
            Err(err) => {
                let retryable = err.is_retryable();
                warn!(%err, retryable, "version 2 chain failed");
                if self.session.fail_version2().is_ok() {
                    self.emit(StudioEvent::Version2Failed { retryable });
                }
            }
        }
    }

    fn on_timer(&mut self, now: Instant) {
        let kind = self.session.kind();
        for (field, value) in self.debounce.take_due(now) {
            self.session.queue_edit(kind, field, value);
            self.emit(StudioEvent::EditApplied { field });
        }

        if self.render_deadline.is_due(now) {
            self.render_deadline.clear();
            self.inflight_render_url = None;
            if self.session.fail_version1().is_ok() {
                self.emit(StudioEvent::Version1TimedOut);
            }
        }
    }

    async fn save(&mut self, mode: SaveMode) -> Result<RecordId, StudioError> {
        let Some(store) = self.store.as_ref() else {
            return Err(StudioError::NoStore);
        };

        let transformation_url = match (self.session.base_image(), self.session.committed()) {
            (Some(base), Some(config)) => Some(self.render.descriptor_url(base, config)),
            _ => None,
        };
        let record = reconcile(&self.session, self.config.author, transformation_url, now_ms())?;

        let target = match mode {
            SaveMode::Add => None,
            SaveMode::Update => Some(
                self.session
                    .record_id()
                    .ok_or(StudioError::NoRecordIdentity)?,
            ),
        };

        let store_ref = Arc::clone(store);
        let id = tokio::task::spawn_blocking(move || {
            let mut store = store_ref.blocking_lock();
            match target {
                None => store.create(&record),
                Some(id) => store.update(id, &record),
            }
        })
        .await
        .map_err(|e| StudioError::Persist(PersistError::Message(format!("join error: {e}"))))??;

        if mode == SaveMode::Add {
            self.session.bind_record(id);
        }
        Ok(id)
    }

    fn emit(&self, event: StudioEvent) {
        let _ = self.events_tx.send(event);
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

impl StudioHandle {
    /// Subscribes to the studio event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<StudioEvent> {
        self.events_tx.subscribe()
    }

    /// Replaces the session's source asset.
    pub async fn set_base_image(&self, asset: AssetRef) -> Result<(), StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetBaseImage { asset, resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)
    }

    /// Sets the form title.
    pub async fn set_title(&self, title: impl Into<String>) -> Result<(), StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetTitle {
                title: title.into(),
                resp: tx,
            })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)
    }

    /// Applies an aspect-ratio selection immediately.
    pub async fn set_aspect(&self, aspect: AspectRatio) -> Result<(), StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetAspect { aspect, resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)
    }

    /// Submits a field edit into the coalescer. Returns as soon as the edit is
    /// queued; the fold happens after the quiet window elapses.
    pub async fn edit(
        &self,
        field: EditField,
        value: impl Into<String>,
    ) -> Result<(), StudioError> {
        self.cmd_tx
            .send(Command::Edit {
                field,
                value: value.into(),
            })
            .await
            .map_err(|_| StudioError::ChannelClosed)
    }

    /// Triggers the Version-1 pipeline.
    pub async fn apply_version1(&self) -> Result<ApplyOutcome, StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ApplyVersion1 { resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)?
    }

    /// Triggers the Version-2 AI chain.
    pub async fn run_version2(&self) -> Result<(), StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::RunVersion2 { resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)?
    }

    /// Feeds the render provider's load signal into the loop.
    pub async fn render_loaded(&self) -> Result<(), StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::RenderLoaded { resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)?
    }

    /// Feeds the render provider's error signal into the loop.
    pub async fn render_failed(&self) -> Result<(), StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::RenderFailed { resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)
    }

    /// Switches the active version directly.
    pub async fn select_version(&self, tag: VersionTag) -> Result<(), StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SelectVersion { tag, resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)?
    }

    /// Opens the side-by-side comparison.
    pub async fn open_comparison(&self) -> Result<(), StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::OpenComparison { resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)?
    }

    /// Moves the comparison highlight.
    pub async fn set_comparison_selection(&self, tag: VersionTag) -> Result<(), StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetComparisonSelection { tag, resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)?
    }

    /// Confirms the highlighted side as the current version.
    pub async fn resolve_comparison(&self) -> Result<VersionTag, StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ResolveComparison { resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)?
    }

    /// Closes the comparison without a selection.
    pub async fn cancel_comparison(&self) -> Result<(), StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::CancelComparison { resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)?
    }

    /// Returns an owned copy of the current session state.
    pub async fn snapshot(&self) -> Result<TransformSession, StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Snapshot { resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)
    }

    /// Reconciles and persists the session.
    pub async fn save(&self, mode: SaveMode) -> Result<RecordId, StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Save { mode, resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)?
    }

    /// Stops the loop after the current command.
    pub async fn shutdown(&self) -> Result<(), StudioError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| StudioError::ChannelClosed)?;
        rx.await.map_err(|_| StudioError::ChannelClosed)
    }
}
