//! Owns the live session: starts it, watches its lifecycle and decides
//! whether and when to start the next one.

use crate::dispatcher::EventDispatcher;
use crate::error::SessionError;
use crate::prompt::Prompt;
use crate::session::{
    EmptyMessageLookup, MessageLookup, Session, SessionCell, SessionConfig, SessionFactory,
};
use crate::state::ProcessState;
use crate::store::MultiFileAuthState;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, watch};
use tokio::time::{Duration, sleep};
use wabot_core::types::events::{ConnectionState, DisconnectReason, Event};
use wabot_core::version::{DEFAULT_VERSION, ProtocolVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Open,
    /// Waiting out the backoff before the next attempt.
    ClosedRetry { attempt: u32, delay: Duration },
    /// Logged out; the credentials are no longer valid.
    ClosedTerminal,
    /// Too many consecutive failures.
    Exhausted,
    /// Stopped through [`ConnectionSupervisor::shutdown`].
    Stopped,
}

impl SupervisorState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SupervisorState::ClosedTerminal | SupervisorState::Exhausted | SupervisorState::Stopped
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    /// Consecutive failed sessions tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (1-based): doubles each time, capped at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1_u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SupervisorConfig {
    pub backoff: BackoffConfig,
    /// Link by phone-number code instead of QR.
    pub use_pairing_code: bool,
}

enum SessionEnd {
    Closed(DisconnectReason),
    Failed(SessionError),
    Shutdown,
}

pub struct ConnectionSupervisor {
    factory: Arc<dyn SessionFactory>,
    dispatcher: Arc<EventDispatcher>,
    auth: Arc<MultiFileAuthState>,
    process: ProcessState,
    lookup: Arc<dyn MessageLookup>,
    prompt: Option<Arc<dyn Prompt>>,
    config: SupervisorConfig,
    cell: SessionCell,
    state_tx: watch::Sender<SupervisorState>,
    is_running: AtomicBool,
    stopping: AtomicBool,
    shutdown_notifier: Notify,
}

impl ConnectionSupervisor {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        dispatcher: Arc<EventDispatcher>,
        auth: Arc<MultiFileAuthState>,
        process: ProcessState,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Starting);
        Self {
            factory,
            dispatcher,
            auth,
            process,
            lookup: Arc::new(EmptyMessageLookup),
            prompt: None,
            config: SupervisorConfig::default(),
            cell: SessionCell::new(),
            state_tx,
            is_running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            shutdown_notifier: Notify::new(),
        }
    }

    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_message_lookup(mut self, lookup: Arc<dyn MessageLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn Prompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    /// Handle to the current session; empty between sessions.
    pub fn session(&self) -> SessionCell {
        self.cell.clone()
    }

    fn publish(&self, state: SupervisorState) {
        debug!("Supervisor state -> {state:?}");
        self.state_tx.send_replace(state);
    }

    /// Starts sessions until logged out, exhausted or shut down. Returns the
    /// terminal state.
    pub async fn run(&self) -> SupervisorState {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("Supervisor `run` called while already running.");
            return self.state();
        }
        let _guard = scopeguard::guard((), |_| {
            self.is_running.store(false, Ordering::SeqCst);
        });

        let version = self.resolve_version().await;
        let mut failures: u32 = 0;

        let terminal = loop {
            if self.stopping.load(Ordering::SeqCst) {
                break SupervisorState::Stopped;
            }
            self.publish(SupervisorState::Starting);

            let (progressed, end) = self.run_session(version).await;
            if progressed {
                failures = 0;
            }

            match end {
                SessionEnd::Shutdown => break SupervisorState::Stopped,
                SessionEnd::Closed(reason) if reason.is_logged_out() => {
                    println!("Connection closed. You are logged out.");
                    info!("Logged out, not reconnecting.");
                    break SupervisorState::ClosedTerminal;
                }
                // Expected after linking; anything else counts as a failure.
                SessionEnd::Closed(reason) if reason.is_restart_required() && progressed => {
                    info!("Restart required, reconnecting immediately...");
                    continue;
                }
                SessionEnd::Closed(reason) => {
                    info!("Connection closed: {reason}");
                }
                SessionEnd::Failed(e) => {
                    error!("Failed to start session: {e}");
                }
            }

            failures += 1;
            if failures > self.config.backoff.max_attempts {
                error!("Giving up after {failures} consecutive failures");
                break SupervisorState::Exhausted;
            }

            let delay = self.config.backoff.delay_for(failures);
            info!("Will attempt to reconnect in {delay:?} (attempt {failures})");
            self.publish(SupervisorState::ClosedRetry {
                attempt: failures,
                delay,
            });
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown_notifier.notified() => {}
            }
        };

        self.publish(terminal);
        info!("Supervisor run loop has shut down ({terminal:?}).");
        terminal
    }

    /// Stops the run loop and closes the active session.
    pub async fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown_notifier.notify_one();
        if let Some(session) = self.cell.clear().await {
            session.close().await;
        }
    }

    async fn resolve_version(&self) -> ProtocolVersion {
        let info = match self.factory.latest_version().await {
            Ok(info) => info,
            Err(e) => {
                debug!("Latest version unavailable ({e}), using bundled default");
                wabot_core::version::VersionInfo {
                    version: DEFAULT_VERSION,
                    is_latest: false,
                }
            }
        };
        println!("using WA v{}, isLatest: {}", info.version, info.is_latest);
        info.version
    }

    /// Runs one session until it closes. Returns whether it opened or linked
    /// the device, and how it ended.
    async fn run_session(&self, version: ProtocolVersion) -> (bool, SessionEnd) {
        let credentials = self.auth.credentials().await;
        let needs_pairing = self.config.use_pairing_code && !credentials.registered;
        let config = SessionConfig {
            version,
            credentials,
            keys: self.auth.clone(),
            retry_counts: self.process.retry_counts.clone(),
            message_lookup: self.lookup.clone(),
            use_pairing_code: self.config.use_pairing_code,
        };

        let (session, mut events) = match self.factory.connect(config).await {
            Ok(pair) => pair,
            Err(e) => return (false, SessionEnd::Failed(e)),
        };
        self.cell.replace(session.clone()).await;

        let mut progressed = false;
        if needs_pairing {
            let paired = tokio::select! {
                _ = self.shutdown_notifier.notified() => None,
                result = self.pair(session.as_ref()) => Some(result),
            };
            match paired {
                Some(Ok(())) => progressed = true,
                Some(Err(e)) => {
                    self.retire(session).await;
                    return (false, SessionEnd::Failed(e));
                }
                None => {
                    info!("Shutdown requested while pairing");
                    self.retire(session).await;
                    return (false, SessionEnd::Shutdown);
                }
            }
        }

        let end = loop {
            let event = tokio::select! {
                _ = self.shutdown_notifier.notified() => break SessionEnd::Shutdown,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                if self.stopping.load(Ordering::SeqCst) {
                    break SessionEnd::Shutdown;
                }
                warn!("Session event stream ended without a close update");
                break SessionEnd::Closed(DisconnectReason::ConnectionLost);
            };

            if let Some(report) = self.dispatcher.dispatch(&session, &event).await
                && !report.is_clean()
            {
                warn!(
                    "{} of {} messages failed",
                    report.failures.len(),
                    report.processed + report.failures.len()
                );
            }

            if let Event::CredsUpdate(update) = &event
                && update.0.get("registered") == Some(&serde_json::Value::Bool(true))
            {
                progressed = true;
            }
            if let Event::ConnectionUpdate(update) = &event {
                if let Some(qr) = &update.qr
                    && !self.config.use_pairing_code
                {
                    println!("Scan this QR code to link the device:\n{qr}");
                }
                if update.connection == Some(ConnectionState::Open) {
                    progressed = true;
                    info!("Connection open");
                    self.publish(SupervisorState::Open);
                }
                if let Some(reason) = update.disconnect_reason() {
                    break SessionEnd::Closed(reason);
                }
            }
        };

        // Dropping the receiver unsubscribes from anything else the old
        // session still emits.
        drop(events);
        self.retire(session).await;
        (progressed, end)
    }

    async fn retire(&self, session: Arc<dyn Session>) {
        if let Some(current) = self.cell.get().await
            && Arc::ptr_eq(&current, &session)
        {
            self.cell.clear().await;
        }
        session.close().await;
    }

    async fn pair(&self, session: &dyn Session) -> Result<(), SessionError> {
        let prompt = self.prompt.as_ref().ok_or_else(|| {
            SessionError::Other(anyhow::anyhow!(
                "pairing code requested but no prompt is configured"
            ))
        })?;
        let phone_number = prompt.ask("Please enter your phone number:\n").await?;
        let code = session.request_pairing_code(phone_number.trim()).await?;
        println!("Pairing code: {code}");
        Ok(())
    }
}
