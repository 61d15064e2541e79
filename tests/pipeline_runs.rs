use std::sync::{Arc, Mutex};

use twinlens::{
    config::TransformConfig,
    pipeline::{
        traits::{
            AiProvider, CreditLedger, MediaStore, ProviderError, ProviderResult, RenderProvider,
            UploadSource,
        },
        version1::{self, CreditPolicy},
        version2::{self, ChainError, ChainRequest, ChainStep, RESTORE_UPSCALE},
    },
    session::TransformSession,
    types::{AssetRef, EditField, PipelineStatus, TransformKind, UserId, VersionTag},
};

fn asset(public_id: &str) -> AssetRef {
    AssetRef {
        public_id: public_id.to_string(),
        width: 1000,
        height: 1000,
        secure_url: format!("https://cdn.example/{public_id}.jpg"),
    }
}

struct FakeRender;

impl RenderProvider for FakeRender {
    fn descriptor_url(&self, asset: &AssetRef, config: &TransformConfig) -> String {
        format!(
            "https://cdn.example/t/{}?c={}",
            asset.public_id,
            config.as_value()
        )
    }
}

#[derive(Default)]
struct RecordingLedger {
    debits: Vec<(UserId, u32)>,
    fail: bool,
}

impl CreditLedger for RecordingLedger {
    fn debit(&mut self, user: UserId, amount: u32) -> ProviderResult<()> {
        if self.fail {
            return Err(ProviderError::Unavailable("ledger down".to_string()));
        }
        self.debits.push((user, amount));
        Ok(())
    }
}

#[derive(Default, Clone)]
struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    fn push(&self, entry: impl Into<String>) {
        self.calls.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

struct FakeAi {
    log: CallLog,
    fail_with: Option<ProviderError>,
}

impl FakeAi {
    fn ok(log: CallLog) -> Self {
        Self {
            log,
            fail_with: None,
        }
    }
}

impl AiProvider for FakeAi {
    fn remove_background(&mut self, source_url: &str) -> ProviderResult<String> {
        self.log.push(format!("remove_background {source_url}"));
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok("QkFTRTY0".to_string()),
        }
    }

    fn restore(&mut self, source_url: &str, upscale: &str) -> ProviderResult<String> {
        self.log.push(format!("restore {source_url} {upscale}"));
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok("https://tmp.example/restored.jpg".to_string()),
        }
    }

    fn recolor(&mut self, source_url: &str, prompt: &str, to: &str) -> ProviderResult<AssetRef> {
        self.log.push(format!("recolor {source_url} {prompt} {to}"));
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(asset("recolored")),
        }
    }
}

struct FakeMedia {
    log: CallLog,
    fail: bool,
    uploads: Arc<Mutex<Vec<UploadSource>>>,
}

impl FakeMedia {
    fn ok(log: CallLog) -> Self {
        Self {
            log,
            fail: false,
            uploads: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MediaStore for FakeMedia {
    fn upload(&mut self, source: UploadSource) -> ProviderResult<AssetRef> {
        self.log.push("upload");
        if self.fail {
            return Err(ProviderError::Http {
                status: 503,
                message: "storage busy".to_string(),
            });
        }
        self.uploads.lock().unwrap().push(source);
        Ok(asset("stored"))
    }
}

fn recolor_session() -> TransformSession {
    let mut session = TransformSession::new(TransformKind::Recolor);
    session.set_base_image(asset("car"));
    session.queue_edit(TransformKind::Recolor, EditField::Color, "#ff0000");
    session.queue_edit(TransformKind::Recolor, EditField::Prompt, "car");
    session
}

#[test]
fn dispatch_debits_exactly_once_up_front() {
    let mut session = recolor_session();
    let mut ledger = RecordingLedger::default();

    let outcome = version1::dispatch(
        &mut session,
        &FakeRender,
        &mut ledger,
        7,
        1,
        CreditPolicy::DebitOnDispatch,
        100,
    )
    .expect("dispatch");

    assert!(outcome.debited);
    assert!(outcome.transform_url.starts_with("https://cdn.example/t/car"));
    assert_eq!(ledger.debits, vec![(7, 1)]);
    assert_eq!(session.credits_charged(), 1);
    assert_eq!(session.version1().status, PipelineStatus::Running);

    // Completion under the dispatch policy does not debit again.
    version1::complete(
        &mut session,
        &mut ledger,
        7,
        1,
        CreditPolicy::DebitOnDispatch,
        outcome.transform_url,
        150,
    )
    .expect("complete");
    assert_eq!(ledger.debits.len(), 1);
    assert_eq!(session.credits_charged(), 1);
}

#[test]
fn ledger_failure_does_not_block_the_transformation() {
    let mut session = recolor_session();
    let mut ledger = RecordingLedger {
        fail: true,
        ..RecordingLedger::default()
    };

    let outcome = version1::dispatch(
        &mut session,
        &FakeRender,
        &mut ledger,
        7,
        1,
        CreditPolicy::DebitOnDispatch,
        100,
    )
    .expect("dispatch proceeds past a failed debit");

    assert!(outcome.debited);
    assert_eq!(session.version1().status, PipelineStatus::Running);
}

#[test]
fn debit_on_success_waits_for_the_load_signal() {
    let mut session = recolor_session();
    let mut ledger = RecordingLedger::default();

    let outcome = version1::dispatch(
        &mut session,
        &FakeRender,
        &mut ledger,
        7,
        2,
        CreditPolicy::DebitOnSuccess,
        100,
    )
    .expect("dispatch");
    assert!(!outcome.debited);
    assert!(ledger.debits.is_empty());

    version1::complete(
        &mut session,
        &mut ledger,
        7,
        2,
        CreditPolicy::DebitOnSuccess,
        outcome.transform_url,
        180,
    )
    .expect("complete");
    assert_eq!(ledger.debits, vec![(7, 2)]);
    assert_eq!(session.credits_charged(), 1);
}

#[test]
fn debit_on_success_never_charges_a_timed_out_render() {
    let mut session = recolor_session();
    let mut ledger = RecordingLedger::default();

    version1::dispatch(
        &mut session,
        &FakeRender,
        &mut ledger,
        7,
        1,
        CreditPolicy::DebitOnSuccess,
        100,
    )
    .expect("dispatch");
    session.fail_version1().expect("timeout");

    assert!(ledger.debits.is_empty());
    assert_eq!(session.credits_charged(), 0);
}

#[test]
fn remove_background_route_reuploads_a_data_url() {
    let log = CallLog::default();
    let mut ai = FakeAi::ok(log.clone());
    let mut media = FakeMedia::ok(log.clone());

    let outcome = version2::run(
        &ChainRequest::RemoveBackground,
        "https://cdn.example/car.jpg",
        &mut ai,
        &mut media,
    )
    .expect("chain");

    assert_eq!(outcome.asset.public_id, "stored");
    assert_eq!(
        log.entries(),
        vec![
            "remove_background https://cdn.example/car.jpg".to_string(),
            "upload".to_string(),
        ]
    );
    let uploads = media.uploads.lock().unwrap();
    assert_eq!(
        uploads[0],
        UploadSource::DataUrl("data:image/jpeg;base64,QkFTRTY0".to_string())
    );
}

#[test]
fn restore_route_reuploads_the_temporary_url() {
    let log = CallLog::default();
    let mut ai = FakeAi::ok(log.clone());
    let mut media = FakeMedia::ok(log.clone());

    let outcome = version2::run(
        &ChainRequest::Restore,
        "https://cdn.example/old.jpg",
        &mut ai,
        &mut media,
    )
    .expect("chain");

    assert_eq!(outcome.asset.public_id, "stored");
    assert_eq!(
        log.entries(),
        vec![
            format!("restore https://cdn.example/old.jpg {RESTORE_UPSCALE}"),
            "upload".to_string(),
        ]
    );
    let uploads = media.uploads.lock().unwrap();
    assert_eq!(
        uploads[0],
        UploadSource::RemoteUrl("https://tmp.example/restored.jpg".to_string())
    );
}

#[test]
fn recolor_route_delegates_without_reupload() {
    let log = CallLog::default();
    let mut ai = FakeAi::ok(log.clone());
    let mut media = FakeMedia::ok(log.clone());

    let outcome = version2::run(
        &ChainRequest::Recolor {
            prompt: "car".to_string(),
            to: "#00ff00".to_string(),
        },
        "https://cdn.example/car.jpg",
        &mut ai,
        &mut media,
    )
    .expect("chain");

    assert_eq!(outcome.asset.public_id, "recolored");
    assert_eq!(
        log.entries(),
        vec!["recolor https://cdn.example/car.jpg car #00ff00".to_string()]
    );
}

#[test]
fn submit_failure_aborts_before_upload() {
    let log = CallLog::default();
    let mut ai = FakeAi {
        log: log.clone(),
        fail_with: Some(ProviderError::Http {
            status: 500,
            message: "model overloaded".to_string(),
        }),
    };
    let mut media = FakeMedia::ok(log.clone());

    let err = version2::run(
        &ChainRequest::RemoveBackground,
        "https://cdn.example/car.jpg",
        &mut ai,
        &mut media,
    )
    .expect_err("chain fails");

    match &err {
        ChainError::Step { kind, step, .. } => {
            assert_eq!(*kind, TransformKind::RemoveBackground);
            assert_eq!(*step, ChainStep::Submit);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_retryable());
    assert!(media.uploads.lock().unwrap().is_empty());
}

#[test]
fn upload_failure_is_reported_as_the_upload_step() {
    let log = CallLog::default();
    let mut ai = FakeAi::ok(log.clone());
    let mut media = FakeMedia {
        fail: true,
        ..FakeMedia::ok(log.clone())
    };

    let err = version2::run(
        &ChainRequest::Restore,
        "https://cdn.example/old.jpg",
        &mut ai,
        &mut media,
    )
    .expect_err("upload fails");

    assert!(matches!(
        err,
        ChainError::Step {
            step: ChainStep::Upload,
            ..
        }
    ));
    assert!(err.is_retryable());
}

#[test]
fn chain_failure_leaves_the_session_slots_intact() {
    let mut session = recolor_session();
    let mut ledger = RecordingLedger::default();
    version1::dispatch(
        &mut session,
        &FakeRender,
        &mut ledger,
        7,
        1,
        CreditPolicy::DebitOnDispatch,
        0,
    )
    .expect("v1 dispatch");
    session
        .complete_version1("https://cdn.example/r".to_string(), 20)
        .expect("v1 load");

    session.begin_version2(30).expect("v2 dispatch");
    session.fail_version2().expect("v2 failure");

    assert_eq!(session.version1().status, PipelineStatus::Succeeded);
    assert!(session.version1().is_populated());
    assert_eq!(session.version2().status, PipelineStatus::Failed);
    assert!(!session.version2().is_populated());
    // The failed chain never rewinds the dispatch-time switch.
    assert_eq!(session.current_version(), Some(VersionTag::Version2));
}

#[test]
fn retryability_follows_the_provider_failure() {
    let decode = ProviderError::Decode("bad json".to_string());
    assert!(!decode.is_retryable());
    assert!(ProviderError::Timeout.is_retryable());
    assert!(
        ProviderError::Http {
            status: 429,
            message: String::new()
        }
        .is_retryable()
    );
    assert!(
        !ProviderError::Http {
            status: 422,
            message: String::new()
        }
        .is_retryable()
    );

    let err = ChainError::Step {
        kind: TransformKind::Restore,
        step: ChainStep::Submit,
        source: decode,
    };
    assert!(!err.is_retryable());
    assert!(!ChainError::Unsupported(TransformKind::Fill).is_retryable());
}
