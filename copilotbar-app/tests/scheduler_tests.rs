//! Refresh scheduler behaviour on a paused clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use copilotbar_app::{
    AuthServer, AuthServerError, AuthStatus, RecordingTray, RefreshScheduler, SchedulerDeps,
    SchedulerHandle,
};
use copilotbar_core::{Credential, UsagePayload};
use copilotbar_fetch::{
    AccessTokenResponse, DeviceCodeResponse, DeviceFlowApi, DeviceFlowError, FetchError,
    PollResponse, UsageClient,
};
use copilotbar_store::{CredentialBackend, CredentialStore, FileBackend, SettingsStore};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

// ============================================================================
// Fakes
// ============================================================================

enum Step {
    Ok { used: u64, limit: u64, delay: Duration },
    Err(FetchError),
}

/// Replays scripted answers, then reports 10 of 100.
#[derive(Default)]
struct FakeUsage {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl FakeUsage {
    fn then(self, step: Step) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    fn calls(&self) -> Vec<(Instant, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageClient for FakeUsage {
    async fn fetch_usage(&self, credential: &Credential) -> Result<UsagePayload, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), credential.expose().to_string()));
        let step = self.script.lock().unwrap().pop_front();
        match step.unwrap_or(Step::Ok {
            used: 10,
            limit: 100,
            delay: Duration::ZERO,
        }) {
            Step::Ok { used, limit, delay } => {
                sleep(delay).await;
                let end = Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap();
                Ok(UsagePayload::new(used, limit, end))
            }
            Step::Err(e) => Err(e),
        }
    }
}

/// Device endpoints that answer `Pending` once the script runs out.
///
/// Polls issued after the auth server was closed are counted separately.
#[derive(Default)]
struct FakeDeviceApi {
    answers: Mutex<VecDeque<PollResponse>>,
    starts: AtomicUsize,
    polls: AtomicUsize,
    auth_closes: Arc<AtomicUsize>,
    polls_after_close: AtomicUsize,
}

impl FakeDeviceApi {
    fn then(self, answer: PollResponse) -> Self {
        self.answers.lock().unwrap().push_back(answer);
        self
    }
}

#[async_trait]
impl DeviceFlowApi for FakeDeviceApi {
    async fn request_device_code(&self) -> Result<DeviceCodeResponse, DeviceFlowError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceCodeResponse {
            device_code: "dev-1".to_string(),
            user_code: "ABCD-1234".to_string(),
            verification_uri: "https://github.com/login/device".to_string(),
            expires_in: 900,
            interval: 5,
        })
    }

    async fn poll_access_token(&self, _device_code: &str) -> Result<PollResponse, DeviceFlowError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.auth_closes.load(Ordering::SeqCst) > 0 {
            self.polls_after_close.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PollResponse::Pending))
    }
}

#[derive(Clone, Default)]
struct CountingAuthServer(Arc<AtomicUsize>);

impl AuthServer for CountingAuthServer {
    fn close(&mut self) -> Result<(), AuthServerError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(AuthServerError::NotRunning)
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    handle: SchedulerHandle,
    task: JoinHandle<()>,
    usage: Arc<FakeUsage>,
    device: Arc<FakeDeviceApi>,
    tray: RecordingTray,
    settings: Arc<SettingsStore>,
    auth_closes: Arc<AtomicUsize>,
    dir: TempDir,
}

impl Harness {
    async fn start(token: Option<&str>, usage: FakeUsage, device: FakeDeviceApi) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("credentials.json"));
        if let Some(token) = token {
            backend.save(token).unwrap();
        }

        let auth = CountingAuthServer(Arc::clone(&device.auth_closes));
        let auth_closes = Arc::clone(&auth.0);
        let usage = Arc::new(usage);
        let device = Arc::new(device);
        let tray = RecordingTray::new();
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")));

        let deps = SchedulerDeps {
            usage_client: usage.clone(),
            device_flow: device.clone(),
            credentials: CredentialStore::with_backend(Box::new(backend)),
            settings: Arc::clone(&settings),
            tray: Box::new(tray.clone()),
            auth_server: Box::new(auth),
        };
        let (handle, task) = RefreshScheduler::spawn(deps).await;

        Self {
            handle,
            task,
            usage,
            device,
            tray,
            settings,
            auth_closes,
            dir,
        }
    }

    fn stored_token(&self) -> Option<String> {
        FileBackend::new(self.dir.path().join("credentials.json"))
            .load()
            .unwrap()
    }

    async fn stop(self) {
        self.handle.shutdown();
        self.task.await.unwrap();
    }
}

// ============================================================================
// Startup & Schedule
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_startup_fetch_then_every_five_minutes() {
    let h = Harness::start(Some("ghp_saved"), FakeUsage::default(), FakeDeviceApi::default()).await;

    let state = h.handle.wait_for(|s| s.usage.is_some()).await.unwrap();
    assert_eq!(state.display, " ▱▱▱▱▱ 10%");
    assert_eq!(h.tray.last_text().as_deref(), Some(" ▱▱▱▱▱ 10%"));

    let calls = h.usage.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, "ghp_saved");
    let started = calls[0].0;

    sleep(Duration::from_secs(299)).await;
    assert_eq!(h.usage.calls().len(), 1);

    sleep(Duration::from_secs(2)).await;
    let calls = h.usage.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].0 - started, Duration::from_secs(300));

    sleep(Duration::from_secs(300)).await;
    assert_eq!(h.usage.calls().len(), 3);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_credential_no_polling() {
    let h = Harness::start(None, FakeUsage::default(), FakeDeviceApi::default()).await;

    let state = h.handle.wait_for(|s| !s.display.is_empty()).await.unwrap();
    assert_eq!(state.display, " ▱▱▱▱▱ 0%");
    assert!(!state.has_credential);

    h.handle.refresh().unwrap();
    sleep(Duration::from_secs(900)).await;
    assert!(h.usage.calls().is_empty());

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failure_keeps_schedule() {
    let usage = FakeUsage::default().then(Step::Err(FetchError::Network("boom".to_string())));
    let h = Harness::start(Some("ghp_saved"), usage, FakeDeviceApi::default()).await;

    let state = h.handle.wait_for(|s| s.error.is_some()).await.unwrap();
    assert!(state.error.as_deref().unwrap().contains("boom"));
    assert!(!state.loading);
    assert_eq!(state.display, " ▱▱▱▱▱ 0%");

    sleep(Duration::from_secs(301)).await;
    let state = h.handle.state();
    assert!(state.error.is_none());
    assert_eq!(state.display, " ▱▱▱▱▱ 10%");
    assert_eq!(h.usage.calls().len(), 2);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_keeps_last_usage() {
    let usage = FakeUsage::default()
        .then(Step::Ok {
            used: 50,
            limit: 100,
            delay: Duration::ZERO,
        })
        .then(Step::Err(FetchError::Auth { status: 401 }));
    let h = Harness::start(Some("ghp_old"), usage, FakeDeviceApi::default()).await;

    h.handle.wait_for(|s| s.usage.is_some()).await.unwrap();
    h.handle.refresh().unwrap();

    let state = h.handle.wait_for(|s| s.error.is_some()).await.unwrap();
    assert!(state.error.as_deref().unwrap().contains("401"));
    assert_eq!(state.percentage(), 50);
    assert_eq!(state.display, " ▰▰▱▱▱ 50%");
    assert!(state.has_credential);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_last_completed_fetch_wins() {
    let usage = FakeUsage::default()
        .then(Step::Ok {
            used: 50,
            limit: 100,
            delay: Duration::from_secs(10),
        })
        .then(Step::Ok {
            used: 20,
            limit: 100,
            delay: Duration::from_secs(1),
        });
    let h = Harness::start(Some("ghp_saved"), usage, FakeDeviceApi::default()).await;
    h.handle.refresh().unwrap();

    let state = h.handle.wait_for(|s| s.usage.is_some()).await.unwrap();
    assert_eq!(state.percentage(), 20);
    assert!(state.loading);

    let state = h.handle.wait_for(|s| s.percentage() == 50).await.unwrap();
    assert_eq!(state.display, " ▰▰▱▱▱ 50%");
    assert!(!state.loading);

    h.stop().await;
}

// ============================================================================
// Display Toggles
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_toggle_bar_off_and_on_restores_text() {
    let h = Harness::start(Some("ghp_saved"), FakeUsage::default(), FakeDeviceApi::default()).await;
    h.handle.wait_for(|s| s.usage.is_some()).await.unwrap();

    h.handle.set_show_bar(false).unwrap();
    h.handle.wait_for(|s| s.display == " 10%").await.unwrap();
    assert!(!h.settings.get().await.show_bar);

    h.handle.set_show_bar(true).unwrap();
    h.handle.wait_for(|s| s.display == " ▱▱▱▱▱ 10%").await.unwrap();

    let reloaded = SettingsStore::load(h.dir.path().join("settings.json"))
        .await
        .unwrap();
    assert!(reloaded.get().await.show_bar);

    assert_eq!(
        h.tray.snapshot().texts,
        vec![
            " ▱▱▱▱▱ 0%".to_string(),
            " ▱▱▱▱▱ 10%".to_string(),
            " 10%".to_string(),
            " ▱▱▱▱▱ 10%".to_string(),
        ]
    );

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_toggles_persist_without_usage() {
    let h = Harness::start(None, FakeUsage::default(), FakeDeviceApi::default()).await;

    h.handle.set_show_percent(false).unwrap();
    let state = h.handle.wait_for(|s| s.display == " ▱▱▱▱▱").await.unwrap();
    assert!(state.usage.is_none());

    let reloaded = SettingsStore::load(h.dir.path().join("settings.json"))
        .await
        .unwrap();
    assert!(!reloaded.get().await.show_percent);
    assert!(reloaded.get().await.show_bar);

    h.stop().await;
}

// ============================================================================
// Tokens
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_save_token_fetches_and_closes_auth_server() {
    let h = Harness::start(None, FakeUsage::default(), FakeDeviceApi::default()).await;

    h.handle.save_token("   ").unwrap();
    h.handle.save_token("  ghp_new  ").unwrap();

    let state = h.handle.wait_for(|s| s.usage.is_some()).await.unwrap();
    assert!(state.has_credential);
    assert_eq!(state.display, " ▱▱▱▱▱ 10%");

    let calls = h.usage.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, "ghp_new");
    assert_eq!(h.auth_closes.load(Ordering::SeqCst), 1);
    assert_eq!(h.stored_token().as_deref(), Some("ghp_new"));

    sleep(Duration::from_secs(301)).await;
    assert_eq!(h.usage.calls().len(), 2);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_clear_token_stops_timer() {
    let h = Harness::start(Some("ghp_saved"), FakeUsage::default(), FakeDeviceApi::default()).await;
    h.handle.wait_for(|s| s.usage.is_some()).await.unwrap();

    h.handle.clear_token().unwrap();
    let state = h.handle.wait_for(|s| !s.has_credential).await.unwrap();
    assert!(state.usage.is_none());
    assert!(state.error.is_none());
    assert_eq!(state.display, " ▱▱▱▱▱ 0%");
    assert_eq!(h.stored_token(), None);

    sleep(Duration::from_secs(1200)).await;
    assert_eq!(h.usage.calls().len(), 1);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_result_for_cleared_credential_is_dropped() {
    let usage = FakeUsage::default().then(Step::Ok {
        used: 90,
        limit: 100,
        delay: Duration::from_secs(10),
    });
    let h = Harness::start(Some("ghp_saved"), usage, FakeDeviceApi::default()).await;

    h.handle.clear_token().unwrap();
    h.handle.wait_for(|s| !s.has_credential).await.unwrap();

    sleep(Duration::from_secs(20)).await;
    let state = h.handle.state();
    assert!(state.usage.is_none());
    assert!(!state.loading);
    assert_eq!(state.display, " ▱▱▱▱▱ 0%");

    h.stop().await;
}

// ============================================================================
// Login
// ============================================================================

fn authorized(token: &str) -> PollResponse {
    PollResponse::Authorized(AccessTokenResponse {
        access_token: token.to_string(),
        token_type: "bearer".to_string(),
        scope: "read:user".to_string(),
    })
}

#[tokio::test(start_paused = true)]
async fn test_login_stores_token_and_fetches() {
    let device = FakeDeviceApi::default()
        .then(PollResponse::Pending)
        .then(authorized("gho_device"));
    let h = Harness::start(None, FakeUsage::default(), device).await;

    h.handle.start_login().unwrap();
    let state = h
        .handle
        .wait_for(|s| matches!(s.auth, AuthStatus::AwaitingUser { .. }))
        .await
        .unwrap();
    assert_eq!(
        state.auth,
        AuthStatus::AwaitingUser {
            user_code: "ABCD-1234".to_string(),
            verification_uri: "https://github.com/login/device".to_string(),
        }
    );

    let state = h.handle.wait_for(|s| s.usage.is_some()).await.unwrap();
    assert_eq!(state.auth, AuthStatus::Idle);
    assert!(state.has_credential);
    assert_eq!(h.usage.calls()[0].1, "gho_device");
    assert_eq!(h.device.polls.load(Ordering::SeqCst), 2);
    assert_eq!(h.stored_token().as_deref(), Some("gho_device"));
    assert_eq!(h.auth_closes.load(Ordering::SeqCst), 0);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_second_login_while_pending_is_ignored() {
    let h = Harness::start(None, FakeUsage::default(), FakeDeviceApi::default()).await;

    h.handle.start_login().unwrap();
    h.handle.start_login().unwrap();
    h.handle
        .wait_for(|s| matches!(s.auth, AuthStatus::AwaitingUser { .. }))
        .await
        .unwrap();

    assert_eq!(h.device.starts.load(Ordering::SeqCst), 1);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_denied_login_reports_failure() {
    let device = FakeDeviceApi::default().then(PollResponse::Denied);
    let h = Harness::start(None, FakeUsage::default(), device).await;

    h.handle.start_login().unwrap();
    let state = h
        .handle
        .wait_for(|s| matches!(s.auth, AuthStatus::Failed { .. }))
        .await
        .unwrap();

    let AuthStatus::Failed { message } = state.auth else {
        unreachable!();
    };
    assert!(message.contains("denied"));
    assert!(!state.has_credential);

    // A new attempt is allowed after a failure.
    h.handle.start_login().unwrap();
    h.handle
        .wait_for(|s| matches!(s.auth, AuthStatus::AwaitingUser { .. }))
        .await
        .unwrap();
    assert_eq!(h.device.starts.load(Ordering::SeqCst), 2);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_token_cancels_pending_login() {
    let h = Harness::start(None, FakeUsage::default(), FakeDeviceApi::default()).await;

    h.handle.start_login().unwrap();
    h.handle
        .wait_for(|s| matches!(s.auth, AuthStatus::AwaitingUser { .. }))
        .await
        .unwrap();

    h.handle.save_token("ghp_manual").unwrap();
    let state = h.handle.wait_for(|s| s.usage.is_some()).await.unwrap();
    assert_eq!(state.auth, AuthStatus::Idle);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.device.polls.load(Ordering::SeqCst), 0);
    assert_eq!(h.handle.state().auth, AuthStatus::Idle);
    assert_eq!(h.stored_token().as_deref(), Some("ghp_manual"));

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_token_on_poll_boundary_stops_polling() {
    // 300 s is both a refresh tick and a poll boundary; 295 s is a poll only.
    for at in [295, 300, 305] {
        let h = Harness::start(Some("ghp_saved"), FakeUsage::default(), FakeDeviceApi::default())
            .await;
        let start = Instant::now();

        h.handle.start_login().unwrap();
        h.handle
            .wait_for(|s| matches!(s.auth, AuthStatus::AwaitingUser { .. }))
            .await
            .unwrap();

        tokio::time::sleep_until(start + Duration::from_secs(at)).await;
        h.handle.save_token("ghp_manual").unwrap();
        h.handle
            .wait_for(|s| s.auth == AuthStatus::Idle && s.has_credential)
            .await
            .unwrap();

        sleep(Duration::from_secs(60)).await;
        assert_eq!(h.auth_closes.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.device.polls_after_close.load(Ordering::SeqCst),
            0,
            "poll issued after saving a token at {at}s"
        );
        assert!(h.device.polls.load(Ordering::SeqCst) > 0);
        assert_eq!(h.stored_token().as_deref(), Some("ghp_manual"));

        h.stop().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handles_stops_scheduler() {
    let h = Harness::start(Some("ghp_saved"), FakeUsage::default(), FakeDeviceApi::default()).await;
    let Harness { handle, task, .. } = h;

    drop(handle);
    task.await.unwrap();
}
