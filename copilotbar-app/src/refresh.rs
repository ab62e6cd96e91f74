//! Background refresh engine.
//!
//! [`RefreshScheduler`] is a single task that owns the credential store,
//! the display options, and the observable [`UsageState`]. Everything else
//! talks to it through a [`SchedulerHandle`]:
//!
//! - commands (refresh, save/clear token, toggles, login) arrive on a channel
//! - network work runs on spawned tasks and reports back on a second channel
//! - a tick every refresh interval triggers a fetch while a credential exists
//!
//! Fetch results are applied in completion order; the last one to finish
//! wins. Results fetched with a credential that has since been replaced or
//! cleared are dropped.

use std::sync::Arc;
use std::time::Duration;

use copilotbar_core::{Credential, DisplayOptions, UsageLevel, UsagePayload, render};
use copilotbar_fetch::{DeviceAuthFlow, DeviceFlowApi, DeviceFlowError, FetchError, UsageClient};
use copilotbar_store::{CredentialStore, SettingsStore};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::auth_server::{AuthServer, AuthServerError};
use crate::state::{AuthStatus, UsageState};
use crate::tray::TraySurface;

// ============================================================================
// Commands & Handle
// ============================================================================

/// Requests accepted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Fetch now, if a credential exists.
    Refresh,
    /// Store a manually entered token and fetch.
    SaveToken(String),
    /// Forget the credential and stop polling.
    ClearToken,
    /// Show or hide the bar.
    SetShowBar(bool),
    /// Show or hide the percentage.
    SetShowPercent(bool),
    /// Start an interactive device-flow login.
    StartLogin,
    /// Stop the scheduler.
    Shutdown,
}

/// The scheduler task has stopped.
#[derive(Debug, Clone, Copy, Error)]
#[error("Refresh scheduler has stopped")]
pub struct SchedulerClosed;

/// Cloneable handle to a running [`RefreshScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
    state: watch::Receiver<UsageState>,
}

impl SchedulerHandle {
    /// Sends a command.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerClosed`] if the scheduler has exited.
    pub fn send(&self, command: SchedulerCommand) -> Result<(), SchedulerClosed> {
        self.commands.send(command).map_err(|_| SchedulerClosed)
    }

    /// Requests a fetch.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerClosed`] if the scheduler has exited.
    pub fn refresh(&self) -> Result<(), SchedulerClosed> {
        self.send(SchedulerCommand::Refresh)
    }

    /// Stores a manually entered token.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerClosed`] if the scheduler has exited.
    pub fn save_token(&self, token: impl Into<String>) -> Result<(), SchedulerClosed> {
        self.send(SchedulerCommand::SaveToken(token.into()))
    }

    /// Forgets the credential.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerClosed`] if the scheduler has exited.
    pub fn clear_token(&self) -> Result<(), SchedulerClosed> {
        self.send(SchedulerCommand::ClearToken)
    }

    /// Toggles the bar.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerClosed`] if the scheduler has exited.
    pub fn set_show_bar(&self, show: bool) -> Result<(), SchedulerClosed> {
        self.send(SchedulerCommand::SetShowBar(show))
    }

    /// Toggles the percentage.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerClosed`] if the scheduler has exited.
    pub fn set_show_percent(&self, show: bool) -> Result<(), SchedulerClosed> {
        self.send(SchedulerCommand::SetShowPercent(show))
    }

    /// Starts a device-flow login.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerClosed`] if the scheduler has exited.
    pub fn start_login(&self) -> Result<(), SchedulerClosed> {
        self.send(SchedulerCommand::StartLogin)
    }

    /// Asks the scheduler to stop. Stopping twice is fine.
    pub fn shutdown(&self) {
        let _ = self.send(SchedulerCommand::Shutdown);
    }

    /// Current state.
    pub fn state(&self) -> UsageState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<UsageState> {
        self.state.clone()
    }

    /// Waits until the state satisfies `predicate` and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerClosed`] if the scheduler exits first.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&UsageState) -> bool,
    ) -> Result<UsageState, SchedulerClosed> {
        let mut rx = self.state.clone();
        let state = rx.wait_for(predicate).await.map_err(|_| SchedulerClosed)?;
        Ok(state.clone())
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Collaborators the scheduler drives.
pub struct SchedulerDeps {
    /// Usage API.
    pub usage_client: Arc<dyn UsageClient>,
    /// Device flow endpoints.
    pub device_flow: Arc<dyn DeviceFlowApi>,
    /// The active credential.
    pub credentials: CredentialStore,
    /// Display toggles and refresh interval.
    pub settings: Arc<SettingsStore>,
    /// Where the usage text goes.
    pub tray: Box<dyn TraySurface>,
    /// Token callback listener to close after a manual save.
    pub auth_server: Box<dyn AuthServer>,
}

/// Work finished on a spawned task.
enum Completion {
    Fetched {
        epoch: u64,
        result: Result<UsagePayload, FetchError>,
    },
    LoginStarted {
        attempt: u64,
        result: Result<(String, String), DeviceFlowError>,
    },
    LoginFinished {
        attempt: u64,
        result: Result<Credential, DeviceFlowError>,
    },
}

struct LoginAttempt {
    id: u64,
    cancel: CancellationToken,
}

/// Owns the refresh loop and all mutable app state.
pub struct RefreshScheduler {
    usage_client: Arc<dyn UsageClient>,
    device_flow: Arc<dyn DeviceFlowApi>,
    credentials: CredentialStore,
    settings: Arc<SettingsStore>,
    tray: Box<dyn TraySurface>,
    auth_server: Box<dyn AuthServer>,

    options: DisplayOptions,
    interval: Duration,
    ticker: Option<Interval>,

    state: UsageState,
    state_tx: watch::Sender<UsageState>,
    last_text: Option<String>,
    last_level: Option<UsageLevel>,

    /// Bumped whenever the credential changes.
    epoch: u64,
    in_flight: usize,
    login: Option<LoginAttempt>,
    login_attempts: u64,

    commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
}

impl RefreshScheduler {
    /// Creates a scheduler and its handle. Nothing runs until [`run`](Self::run).
    pub async fn new(deps: SchedulerDeps) -> (Self, SchedulerHandle) {
        let settings = deps.settings.get().await;
        let options = settings.display_options();
        let interval = settings.refresh_interval();

        let state = UsageState {
            has_credential: deps.credentials.is_present(),
            ..UsageState::default()
        };
        let (state_tx, state_rx) = watch::channel(state.clone());
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();

        let scheduler = Self {
            usage_client: deps.usage_client,
            device_flow: deps.device_flow,
            credentials: deps.credentials,
            settings: deps.settings,
            tray: deps.tray,
            auth_server: deps.auth_server,
            options,
            interval,
            ticker: None,
            state,
            state_tx,
            last_text: None,
            last_level: None,
            epoch: 0,
            in_flight: 0,
            login: None,
            login_attempts: 0,
            commands,
            completions_tx,
            completions,
        };
        let handle = SchedulerHandle {
            commands: commands_tx,
            state: state_rx,
        };
        (scheduler, handle)
    }

    /// Creates a scheduler and runs it on a new task.
    pub async fn spawn(deps: SchedulerDeps) -> (SchedulerHandle, JoinHandle<()>) {
        let (scheduler, handle) = Self::new(deps).await;
        let task = tokio::spawn(scheduler.run());
        (handle, task)
    }

    /// Runs until shut down or every handle is dropped.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            has_credential = self.state.has_credential,
            "Refresh scheduler started"
        );

        self.publish();
        if self.credentials.is_present() {
            self.arm_timer();
            self.spawn_fetch();
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(SchedulerCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
                () = next_tick(&mut self.ticker) => {
                    debug!("Refresh tick");
                    self.spawn_fetch();
                }
            }
        }

        self.cancel_login();
        info!("Refresh scheduler stopped");
    }

    // ========================================================================
    // Commands
    // ========================================================================

    async fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::Refresh => {
                if self.credentials.is_present() {
                    self.spawn_fetch();
                } else {
                    debug!("Refresh ignored, no credential");
                }
            }
            SchedulerCommand::SaveToken(text) => self.save_token(&text),
            SchedulerCommand::ClearToken => self.clear_token(),
            SchedulerCommand::SetShowBar(show) => {
                self.options = self.options.with_bar(show);
                if let Err(e) = self.settings.set_show_bar(show).await {
                    warn!(error = %e, "Failed to persist bar toggle");
                }
                self.publish();
            }
            SchedulerCommand::SetShowPercent(show) => {
                self.options = self.options.with_percent(show);
                if let Err(e) = self.settings.set_show_percent(show).await {
                    warn!(error = %e, "Failed to persist percent toggle");
                }
                self.publish();
            }
            SchedulerCommand::StartLogin => self.start_login(),
            SchedulerCommand::Shutdown => {}
        }
    }

    fn save_token(&mut self, text: &str) {
        let Ok(credential) = Credential::new(text) else {
            debug!("Blank token ignored");
            return;
        };

        self.cancel_login();
        self.state.auth = AuthStatus::Idle;

        match self.auth_server.close() {
            Ok(()) | Err(AuthServerError::NotRunning) => {}
            Err(e) => warn!(error = %e, "Failed to close auth server"),
        }

        self.activate(credential);
    }

    fn clear_token(&mut self) {
        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "Failed to remove stored credential");
        }
        self.epoch += 1;
        self.in_flight = 0;
        self.ticker = None;

        self.state.has_credential = false;
        self.state.usage = None;
        self.state.error = None;
        self.state.loading = false;
        info!("Credential cleared, polling stopped");
        self.publish();
    }

    /// Stores a credential, restarts the schedule, and fetches at once.
    fn activate(&mut self, credential: Credential) {
        if let Err(e) = self.credentials.set(credential) {
            warn!(error = %e, "Credential kept for this session only");
        }
        self.epoch += 1;
        self.in_flight = 0;
        self.state.has_credential = true;
        self.arm_timer();
        self.spawn_fetch();
    }

    fn arm_timer(&mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    // ========================================================================
    // Fetching
    // ========================================================================

    fn spawn_fetch(&mut self) {
        let Some(credential) = self.credentials.get() else {
            return;
        };

        self.in_flight += 1;
        self.state.loading = true;
        self.state.error = None;
        self.publish();

        let client = Arc::clone(&self.usage_client);
        let tx = self.completions_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = client.fetch_usage(&credential).await;
            let _ = tx.send(Completion::Fetched { epoch, result });
        });
    }

    #[instrument(skip(self, result))]
    fn on_fetched(&mut self, epoch: u64, result: Result<UsagePayload, FetchError>) {
        if epoch != self.epoch {
            debug!("Dropping result for a replaced credential");
            return;
        }

        self.in_flight = self.in_flight.saturating_sub(1);
        self.state.loading = self.in_flight > 0;

        match result {
            Ok(usage) => {
                debug!(
                    used = usage.premium_requests_used,
                    limit = usage.premium_requests_limit,
                    "Usage updated"
                );
                self.state.usage = Some(usage);
            }
            Err(e) => {
                if e.is_auth() {
                    warn!(error = %e, "Credential rejected by usage API");
                } else {
                    warn!(error = %e, "Usage fetch failed");
                }
                self.state.error = Some(e.to_string());
            }
        }
        self.publish();
    }

    // ========================================================================
    // Login
    // ========================================================================

    fn start_login(&mut self) {
        if self.login.is_some() {
            debug!("Login already in progress");
            return;
        }

        self.login_attempts += 1;
        let attempt = self.login_attempts;
        let cancel = CancellationToken::new();
        self.login = Some(LoginAttempt {
            id: attempt,
            cancel: cancel.clone(),
        });
        self.state.auth = AuthStatus::Starting;
        self.publish();

        let flow = DeviceAuthFlow::from_arc(Arc::clone(&self.device_flow));
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let started = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(DeviceFlowError::Cancelled),
                started = flow.start_auth_flow() => started,
            };
            let session = match started {
                Ok(session) => session,
                Err(e) => {
                    let _ = tx.send(Completion::LoginStarted {
                        attempt,
                        result: Err(e),
                    });
                    return;
                }
            };
            let _ = tx.send(Completion::LoginStarted {
                attempt,
                result: Ok((session.user_code.clone(), session.verification_uri.clone())),
            });

            // Polling shares the attempt's token, so `cancel_login` stops it
            // before the scheduler handles anything else.
            let result = flow
                .complete_auth_flow_with(session, cancel.child_token())
                .wait()
                .await;
            let _ = tx.send(Completion::LoginFinished { attempt, result });
        });
    }

    fn cancel_login(&mut self) {
        if let Some(login) = self.login.take() {
            info!(attempt = login.id, "Cancelling device flow");
            login.cancel.cancel();
        }
    }

    fn is_current_login(&self, attempt: u64) -> bool {
        self.login.as_ref().is_some_and(|l| l.id == attempt)
    }

    fn on_login_started(&mut self, attempt: u64, result: Result<(String, String), DeviceFlowError>) {
        if !self.is_current_login(attempt) {
            return;
        }
        match result {
            Ok((user_code, verification_uri)) => {
                self.state.auth = AuthStatus::AwaitingUser {
                    user_code,
                    verification_uri,
                };
            }
            Err(e) => self.login_failed(&e),
        }
        self.publish();
    }

    fn on_login_finished(&mut self, attempt: u64, result: Result<Credential, DeviceFlowError>) {
        if !self.is_current_login(attempt) {
            return;
        }
        match result {
            Ok(credential) => {
                self.login = None;
                self.state.auth = AuthStatus::Idle;
                info!("Login completed");
                self.activate(credential);
            }
            Err(e) => {
                self.login_failed(&e);
                self.publish();
            }
        }
    }

    fn login_failed(&mut self, error: &DeviceFlowError) {
        self.login = None;
        if error.is_cancelled() {
            self.state.auth = AuthStatus::Idle;
        } else {
            warn!(error = %error, "Login failed");
            self.state.auth = AuthStatus::Failed {
                message: error.to_string(),
            };
        }
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Fetched { epoch, result } => self.on_fetched(epoch, result),
            Completion::LoginStarted { attempt, result } => self.on_login_started(attempt, result),
            Completion::LoginFinished { attempt, result } => {
                self.on_login_finished(attempt, result);
            }
        }
    }

    /// Re-renders and pushes anything that changed.
    fn publish(&mut self) {
        let percent = self.state.percentage();
        let level = UsageLevel::from_percent(percent);
        let text = render(percent, self.options);

        if self.last_level != Some(level) {
            self.tray.set_level(level);
            self.last_level = Some(level);
        }
        if self.last_text.as_deref() != Some(text.as_str()) {
            debug!(text = %text, "Tray text changed");
            self.tray.set_text(&text);
            self.last_text = Some(text.clone());
        }

        self.state.display = text;
        self.state_tx.send_if_modified(|current| {
            if *current == self.state {
                false
            } else {
                current.clone_from(&self.state);
                true
            }
        });
    }
}

/// Resolves on the next tick, or never when no timer is armed.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
