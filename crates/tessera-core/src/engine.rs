//! Credential presentation engine
//!
//! The connection-oriented state machine that finds a reader, authenticates
//! with a mutual challenge/response under the preshared device key, and
//! delivers the encrypted credential. The engine owns the retry policy and
//! every timeout; the transport only ever completes or fails the operation
//! it was asked to perform.
//!
//! All state transitions happen on the engine task. Timers are structured
//! `tokio::time` futures tied to the await they guard, so an expired timer
//! can never act on a state that has already moved on. There is exactly one
//! outstanding reply wait per send; stale notifications are drained before
//! each write and empty notification bodies are ignored. Every pipeline
//! step races the radio power watch, so a power drop at any phase is
//! terminal to the current attempt.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::{Result, TesseraError, TransportError};
use crate::transport::{PowerState, ReaderTransport};
use crate::types::CredentialResult;
use crate::wire;

/// Pause between subscribe confirmation and the first write. Some platform
/// stacks drop a write issued in the same tick as the subscribe completion.
pub const POST_SUBSCRIBE_DELAY: Duration = Duration::from_millis(100);

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Lifecycle of a presentation attempt. `Complete` and `Failed` are
/// terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    Subscribing,
    Authenticating,
    SendingCredential,
    Complete(CredentialResult),
    Failed(String),
}

impl SessionState {
    /// State name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Scanning => "Scanning",
            SessionState::Connecting => "Connecting",
            SessionState::DiscoveringServices => "DiscoveringServices",
            SessionState::DiscoveringCharacteristics => "DiscoveringCharacteristics",
            SessionState::Subscribing => "Subscribing",
            SessionState::Authenticating => "Authenticating",
            SessionState::SendingCredential => "SendingCredential",
            SessionState::Complete(_) => "Complete",
            SessionState::Failed(_) => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Complete(_) | SessionState::Failed(_))
    }
}

// ----------------------------------------------------------------------------
// Observable View
// ----------------------------------------------------------------------------

/// Published progression of the current attempt, for observers only.
///
/// Never used for control flow; readers tolerate stale snapshots.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub state: SessionState,
    pub reader_name: Option<String>,
    pub service_uuid: Option<Uuid>,
    pub characteristic_uuid: Option<Uuid>,
    pub last_result: Option<CredentialResult>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            reader_name: None,
            service_uuid: None,
            characteristic_uuid: None,
            last_result: None,
        }
    }
}

type CompletionHook = Arc<dyn Fn(CredentialResult) + Send + Sync>;

// ----------------------------------------------------------------------------
// Presentation Engine
// ----------------------------------------------------------------------------

/// Drives a single reader session to a terminal result.
///
/// At most one engine instance should be active per process; the region
/// trigger constructs exactly one and owns it. A presentation call that
/// arrives while another is in flight is ignored with a log.
pub struct PresentationEngine<T: ReaderTransport> {
    transport: Arc<T>,
    config: Arc<EngineConfig>,
    view_tx: watch::Sender<SessionView>,
    /// Cancellation generation; bumping it aborts the live attempt.
    cancel_tx: watch::Sender<u64>,
    in_flight: AtomicBool,
    on_complete: Option<CompletionHook>,
}

/// Per-attempt handles, cleared during cleanup.
struct Ephemera<T: ReaderTransport> {
    peripheral: Option<T::Peripheral>,
    characteristic: Option<T::Characteristic>,
}

impl<T: ReaderTransport> PresentationEngine<T> {
    pub fn new(transport: Arc<T>, config: EngineConfig) -> Self {
        let (view_tx, _) = watch::channel(SessionView::default());
        let (cancel_tx, _) = watch::channel(0);
        Self {
            transport,
            config: Arc::new(config),
            view_tx,
            cancel_tx,
            in_flight: AtomicBool::new(false),
            on_complete: None,
        }
    }

    /// Install the completion hook invoked on every terminal transition.
    pub fn with_completion(
        mut self,
        hook: impl Fn(CredentialResult) + Send + Sync + 'static,
    ) -> Self {
        self.on_complete = Some(Arc::new(hook));
        self
    }

    /// Subscribe to the published session view.
    pub fn subscribe_view(&self) -> watch::Receiver<SessionView> {
        self.view_tx.subscribe()
    }

    /// Snapshot of the current session state.
    pub fn state(&self) -> SessionState {
        self.view_tx.borrow().state.clone()
    }

    /// Cancel the live attempt, if any. Idempotent and legal from any
    /// state; pending retries are discarded and state returns to `Idle`.
    pub fn cancel(&self) {
        self.cancel_tx.send_modify(|generation| *generation += 1);
        if !self.in_flight.load(Ordering::Acquire) {
            self.view_tx.send_modify(|view| {
                view.state = SessionState::Idle;
                view.reader_name = None;
                view.service_uuid = None;
                view.characteristic_uuid = None;
            });
        }
    }

    /// Run the full presentation flow: scan, connect, authenticate, deliver.
    ///
    /// Returns `None` when the attempt was cancelled or when another call is
    /// already in flight; otherwise the terminal result, which has also been
    /// handed to the completion hook.
    pub async fn present_credential(&self) -> Option<CredentialResult> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!("presentation already in progress; ignoring trigger");
            return None;
        }
        let outcome = self.run_to_terminal().await;
        self.in_flight.store(false, Ordering::Release);
        outcome
    }

    // ------------------------------------------------------------------
    // Retry loop
    // ------------------------------------------------------------------

    async fn run_to_terminal(&self) -> Option<CredentialResult> {
        // Receivers created here see the current generation as read, so a
        // cancel issued before this call cannot abort it.
        let mut cancel = self.cancel_tx.subscribe();

        self.view_tx.send_modify(|view| {
            view.state = SessionState::Idle;
            view.reader_name = None;
            view.service_uuid = None;
            view.characteristic_uuid = None;
        });

        let mut last_error = TesseraError::ScanTimeout;
        for attempt in 1..=self.config.retry_max {
            if attempt > 1 {
                let backoff = self.config.retry_backoff;
                if self.with_cancel(&mut cancel, async {
                    sleep(backoff).await;
                    Ok(())
                })
                .await
                .is_err()
                {
                    return self.finish_cancelled();
                }
            }

            debug!(attempt, max = self.config.retry_max, "starting presentation attempt");
            match self.run_attempt(&mut cancel).await {
                Ok(result) => return Some(self.finish_complete(result)),
                Err(TesseraError::Cancelled) => return self.finish_cancelled(),
                Err(err) if err.is_fatal() => {
                    warn!(error = %err, "fatal failure; not retrying");
                    return Some(self.finish_failed(err));
                }
                Err(err) => {
                    warn!(error = %err, attempt, "presentation attempt failed");
                    last_error = err;
                }
            }
        }

        Some(self.finish_failed(last_error))
    }

    async fn run_attempt(&self, cancel: &mut watch::Receiver<u64>) -> Result<CredentialResult> {
        self.await_power_on(cancel).await?;

        let mut session = Ephemera::<T> {
            peripheral: None,
            characteristic: None,
        };
        let outcome = self.drive(cancel, &mut session).await;
        self.cleanup(&mut session).await;
        outcome
    }

    // ------------------------------------------------------------------
    // Attempt pipeline
    // ------------------------------------------------------------------

    async fn drive(
        &self,
        cancel: &mut watch::Receiver<u64>,
        session: &mut Ephemera<T>,
    ) -> Result<CredentialResult> {
        let config = &self.config;

        // Scanning. The scan timer, cancellation, and a radio power loss
        // all race the first discovery.
        self.publish_state(SessionState::Scanning);
        let mut discovered = self.transport.start_scan(config.service_uuid).await?;
        let found = self
            .attempt_step(cancel, async {
                match timeout(config.scan_timeout, discovered.recv()).await {
                    Err(_) => Err(TesseraError::ScanTimeout),
                    Ok(Some(peripheral)) => Ok(peripheral),
                    Ok(None) => Err(TesseraError::Transport(TransportError::ScanFailed(
                        "discovery stream closed".into(),
                    ))),
                }
            })
            .await;
        self.transport.stop_scan().await;
        let peripheral = found?;

        let name = self.transport.peripheral_name(&peripheral);
        if let Some(ref name) = name {
            info!(reader = %name, "reader discovered");
        }
        self.view_tx.send_modify(|view| view.reader_name = name);
        session.peripheral = Some(peripheral.clone());

        // Connecting.
        self.publish_state(SessionState::Connecting);
        self.attempt_step(cancel, async {
            match timeout(config.connection_timeout, self.transport.connect(&peripheral)).await {
                Err(_) => Err(TesseraError::ConnectTimeout),
                Ok(res) => res.map_err(Into::into),
            }
        })
        .await?;

        // Service discovery.
        self.publish_state(SessionState::DiscoveringServices);
        self.attempt_step(cancel, async {
            self.transport
                .discover_service(&peripheral, config.service_uuid)
                .await
                .map_err(Into::into)
        })
        .await?;
        self.view_tx
            .send_modify(|view| view.service_uuid = Some(config.service_uuid));

        // Characteristic discovery.
        self.publish_state(SessionState::DiscoveringCharacteristics);
        let characteristic = self
            .attempt_step(cancel, async {
                self.transport
                    .discover_characteristic(
                        &peripheral,
                        config.service_uuid,
                        config.characteristic_uuid,
                    )
                    .await
                    .map_err(Into::into)
            })
            .await?;
        session.characteristic = Some(characteristic.clone());
        self.view_tx
            .send_modify(|view| view.characteristic_uuid = Some(config.characteristic_uuid));

        // Subscribe, then let the platform settle before the first write.
        self.publish_state(SessionState::Subscribing);
        self.attempt_step(cancel, async {
            self.transport
                .subscribe(&peripheral, &characteristic)
                .await
                .map_err(Into::into)
        })
        .await?;
        let mut notifications = self
            .attempt_step(cancel, async {
                self.transport
                    .notifications(&peripheral, &characteristic)
                    .await
                    .map_err(Into::into)
            })
            .await?;
        self.attempt_step(cancel, async {
            sleep(POST_SUBSCRIBE_DELAY).await;
            Ok(())
        })
        .await?;

        // Mutual authentication. The challenge lives exactly as long as
        // this block; dropping it zeroizes nonce_M.
        self.publish_state(SessionState::Authenticating);
        {
            let auth = wire::build_auth_request(&config.device_id, &config.device_key)?;
            drain_stale(&mut notifications);
            self.attempt_step(cancel, async {
                self.transport
                    .write_without_response(&peripheral, &characteristic, &auth.frame)
                    .await
                    .map_err(Into::into)
            })
            .await?;
            let reply = self.await_reply(cancel, &mut notifications).await?;
            // The reader's own challenge has no further client-side use.
            let _reader_nonce =
                wire::parse_auth_response(&reply, &config.device_key, &auth.nonce)?;
        }
        debug!("reader authenticated");

        // Credential delivery.
        self.publish_state(SessionState::SendingCredential);
        let frame = wire::build_credential(&config.device_key, &config.credential)?;
        drain_stale(&mut notifications);
        self.attempt_step(cancel, async {
            self.transport
                .write_without_response(&peripheral, &characteristic, &frame)
                .await
                .map_err(Into::into)
        })
        .await?;
        let reply = self.await_reply(cancel, &mut notifications).await?;
        let result = wire::parse_credential_response(&reply)?;
        info!(success = result.success, "presentation complete");

        Ok(result)
    }

    /// Wait until the radio reports powered-on, deferring the start.
    ///
    /// Unauthorized/unsupported radios fail immediately; waiting on them
    /// would never complete.
    async fn await_power_on(&self, cancel: &mut watch::Receiver<u64>) -> Result<()> {
        let mut power = self.transport.power_changes();
        loop {
            let state = *power.borrow_and_update();
            if state.is_powered_on() {
                return Ok(());
            }
            if let Some(err) = state.permanent_failure() {
                return Err(err.into());
            }
            debug!(?state, "radio not ready; start pending");
            tokio::select! {
                biased;
                _ = cancel.changed() => return Err(TesseraError::Cancelled),
                changed = power.changed() => {
                    if changed.is_err() {
                        return Err(TransportError::AdapterUnavailable.into());
                    }
                }
            }
        }
    }

    /// Single-slot reply wait: the first non-empty notification within the
    /// response window resolves it.
    async fn await_reply(
        &self,
        cancel: &mut watch::Receiver<u64>,
        notifications: &mut mpsc::Receiver<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.config.response_timeout;
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.changed() => return Err(TesseraError::Cancelled),
                err = power_lost(self.transport.power_changes()) => return Err(err),
                res = timeout_at(deadline, notifications.recv()) => match res {
                    Err(_) => return Err(TesseraError::ResponseTimeout),
                    Ok(None) => return Err(TransportError::Disconnected.into()),
                    Ok(Some(frame)) => frame,
                },
            };
            if frame.is_empty() {
                debug!("ignoring empty notification");
                continue;
            }
            return Ok(frame);
        }
    }

    /// Race a pipeline step against cancellation and radio power loss.
    /// Cancellation wins ties; a power drop is terminal to the attempt.
    async fn attempt_step<F, O>(&self, cancel: &mut watch::Receiver<u64>, step: F) -> Result<O>
    where
        F: std::future::Future<Output = Result<O>>,
    {
        tokio::select! {
            biased;
            _ = cancel.changed() => Err(TesseraError::Cancelled),
            err = power_lost(self.transport.power_changes()) => Err(err),
            out = step => out,
        }
    }

    /// Race a wait against cancellation only. Used between attempts, where
    /// a power drop defers the next start instead of failing it.
    async fn with_cancel<F, O>(&self, cancel: &mut watch::Receiver<u64>, step: F) -> Result<O>
    where
        F: std::future::Future<Output = Result<O>>,
    {
        tokio::select! {
            biased;
            _ = cancel.changed() => Err(TesseraError::Cancelled),
            out = step => out,
        }
    }

    // ------------------------------------------------------------------
    // Terminal transitions and cleanup
    // ------------------------------------------------------------------

    /// Best-effort teardown, invoked on every terminal transition and
    /// every retry boundary.
    async fn cleanup(&self, session: &mut Ephemera<T>) {
        if let (Some(peripheral), Some(characteristic)) =
            (&session.peripheral, &session.characteristic)
        {
            self.transport.unsubscribe(peripheral, characteristic).await;
        }
        if let Some(peripheral) = &session.peripheral {
            self.transport.disconnect(peripheral).await;
        }
        session.characteristic = None;
        session.peripheral = None;
    }

    fn finish_complete(&self, result: CredentialResult) -> CredentialResult {
        self.view_tx.send_modify(|view| {
            view.state = SessionState::Complete(result.clone());
            view.last_result = Some(result.clone());
        });
        if let Some(hook) = &self.on_complete {
            hook(result.clone());
        }
        result
    }

    fn finish_failed(&self, error: TesseraError) -> CredentialResult {
        let result = CredentialResult::new(false, error.user_message());
        self.view_tx.send_modify(|view| {
            view.state = SessionState::Failed(result.message.clone());
            view.last_result = Some(result.clone());
        });
        if let Some(hook) = &self.on_complete {
            hook(result.clone());
        }
        result
    }

    fn finish_cancelled(&self) -> Option<CredentialResult> {
        info!("presentation cancelled");
        self.view_tx.send_modify(|view| {
            view.state = SessionState::Idle;
            view.reader_name = None;
            view.service_uuid = None;
            view.characteristic_uuid = None;
        });
        None
    }

    fn publish_state(&self, state: SessionState) {
        debug!(state = state.name(), "session state");
        self.view_tx.send_modify(|view| view.state = state);
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Resolve when the radio is not powered on.
///
/// Checks the current state before waiting, so a drop that happened
/// between two pipeline steps is caught immediately rather than on the
/// next transition.
async fn power_lost(mut power: watch::Receiver<PowerState>) -> TesseraError {
    loop {
        let state = *power.borrow_and_update();
        if !state.is_powered_on() {
            return state
                .permanent_failure()
                .unwrap_or(TransportError::PoweredOff)
                .into();
        }
        if power.changed().await.is_err() {
            // Transport gone; let the racing operation surface the failure.
            std::future::pending::<()>().await;
        }
    }
}

/// Drop notifications that arrived before the upcoming send; replies are
/// matched to the most recent write only.
fn drain_stale(notifications: &mut mpsc::Receiver<Vec<u8>>) {
    while notifications.try_recv().is_ok() {}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
