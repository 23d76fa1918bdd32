//! # Connection Manager
//!
//! Owns one printer link and keeps it alive.
//!
//! ## State Machine
//!
//! ```text
//!                connect()
//! Disconnected ────────────► Connecting ──ok──► Connected
//!      ▲                         │                  │
//!      └─────────── err ─────────┘                  │
//!      └──── disconnect() / heartbeat lost / link dropped
//! ```
//!
//! ## Background Tasks
//!
//! While connected, up to three tasks run for the link, each owning a
//! [`CancellationToken`] that is a child of the manager's root token:
//!
//! - **heartbeat**: probes [`LinkAdapter::is_healthy`] every interval
//! - **listener**: watches adapter state notifications for link loss
//! - **reconnect**: one bounded sequence after an unexpected disconnect
//!
//! Tasks hold a `Weak` reference, so dropping the last `Arc` to the
//! manager (or calling [`ConnectionManager::shutdown`]) stops them all.
//!
//! `connect`, `disconnect` and each reconnect attempt run under one async
//! operation lock, so two of them never interleave.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, ThermalinkError};
use crate::events::{EventBus, LinkEvent};
use crate::protocol::RenderedBuffer;
use crate::transport::{DeviceId, LinkAdapter, LinkState};

/// Link keep-alive policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub heartbeat_enabled: bool,
    pub heartbeat_interval_ms: u64,
    pub auto_reconnect: bool,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Per-attempt limit for an explicit connect
    pub connect_timeout_ms: u64,
    /// Extra attempts made by an explicit connect after the first fails
    pub connect_retries: u32,
    pub connect_retry_delay_ms: u64,
    /// Limit for a single chunk write
    pub write_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_enabled: true,
            heartbeat_interval_ms: 5_000,
            auto_reconnect: true,
            reconnect_interval_ms: 2_000,
            max_reconnect_attempts: 3,
            connect_timeout_ms: 10_000,
            connect_retries: 2,
            connect_retry_delay_ms: 1_000,
            write_timeout_ms: 5_000,
        }
    }
}

impl ConnectionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            retries: self.connect_retries,
            timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_enabled && self.heartbeat_interval_ms == 0 {
            return Err(ThermalinkError::Config(
                "connection.heartbeat_interval_ms must be non-zero".into(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(ThermalinkError::Config(
                "connection timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Parameters of an explicit connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    pub retries: u32,
    /// Limit for each attempt
    pub timeout: Duration,
}

/// Chunking and timing of one transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitOptions {
    pub mtu: usize,
    pub chunk_delay: Duration,
    pub write_timeout: Duration,
    /// Limit for the whole job, excluding time spent paused
    pub timeout: Duration,
    /// When the job's clock started; the deadline is `started_at + timeout`
    pub started_at: Instant,
}

/// Cancel and pause switches for an in-flight transmission.
///
/// Clones share the same switches, so the scheduler keeps one copy and
/// hands another to [`ConnectionManager::write`].
#[derive(Debug, Clone)]
pub struct TransmitControl {
    cancel: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
}

impl Default for TransmitControl {
    fn default() -> Self {
        Self::new()
    }
}

impl TransmitControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused: Arc::new(paused),
        }
    }

    /// Suppress every chunk not yet started.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Hold the transmission before its next chunk.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }
}

#[derive(Debug, Default)]
struct Tasks {
    heartbeat: Option<CancellationToken>,
    listener: Option<CancellationToken>,
    reconnect: Option<CancellationToken>,
}

/// Resets a half-finished `Connecting` state when dropped.
struct ConnectingGuard<'a> {
    state: &'a watch::Sender<LinkState>,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if *state == LinkState::Connecting {
                *state = LinkState::Disconnected;
                true
            } else {
                false
            }
        });
    }
}

fn stop(slot: &mut Option<CancellationToken>) {
    if let Some(token) = slot.take() {
        token.cancel();
    }
}

/// Resilient connection to one printer.
pub struct ConnectionManager {
    device_id: DeviceId,
    adapter: Arc<dyn LinkAdapter>,
    config: ConnectionConfig,
    events: EventBus,
    state: watch::Sender<LinkState>,
    op_lock: tokio::sync::Mutex<()>,
    tasks: Mutex<Tasks>,
    reconnect_attempts: AtomicU32,
    /// Bumped whenever a link is established or lost
    session: AtomicU64,
    /// Set by a successful connect, cleared by disconnect or reconnect exhaustion
    tracked: AtomicBool,
    root: CancellationToken,
    me: Weak<ConnectionManager>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("device_id", &self.device_id)
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl ConnectionManager {
    pub fn new(
        device_id: DeviceId,
        adapter: Arc<dyn LinkAdapter>,
        config: ConnectionConfig,
        events: EventBus,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(LinkState::Disconnected);
        Arc::new_cyclic(|me| Self {
            device_id,
            adapter,
            config,
            events,
            state,
            op_lock: tokio::sync::Mutex::new(()),
            tasks: Mutex::new(Tasks::default()),
            reconnect_attempts: AtomicU32::new(0),
            session: AtomicU64::new(0),
            tracked: AtomicBool::new(false),
            root: CancellationToken::new(),
            me: me.clone(),
        })
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Watch link state changes
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Attempt number of the running reconnect sequence (0 when idle)
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Whether the manager still tracks the device for reconnection
    pub fn is_tracked(&self) -> bool {
        self.tracked.load(Ordering::SeqCst)
    }

    pub fn is_reconnecting(&self) -> bool {
        self.with_tasks(|t| t.reconnect.as_ref().is_some_and(|tok| !tok.is_cancelled()))
    }

    fn with_tasks<T>(&self, f: impl FnOnce(&mut Tasks) -> T) -> T {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut tasks)
    }

    // ========================================================================
    // CONNECT / DISCONNECT
    // ========================================================================

    /// Connect with the configured retries and timeout.
    pub async fn connect(&self) -> Result<()> {
        self.connect_with(self.config.connect_options()).await
    }

    /// Connect, retrying `options.retries` times with a fixed delay.
    ///
    /// Any running reconnect sequence is cancelled first. Connecting an
    /// already connected link succeeds immediately.
    ///
    /// ## Errors
    ///
    /// The error of the last attempt: [`ThermalinkError::ConnectionTimeout`]
    /// or whatever the adapter reported.
    pub async fn connect_with(&self, options: ConnectOptions) -> Result<()> {
        self.with_tasks(|t| stop(&mut t.reconnect));
        let _guard = self.op_lock.lock().await;

        if self.is_connected() {
            return Ok(());
        }
        self.reconnect_attempts.store(0, Ordering::SeqCst);

        let mut last_error = None;
        for attempt in 0..=options.retries {
            if attempt > 0 {
                debug!(device = %self.device_id, attempt, "Retrying connect");
                tokio::time::sleep(self.config.connect_retry_delay()).await;
            }
            match self.establish(options.timeout).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(device = %self.device_id, attempt, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ThermalinkError::ConnectionFailed(self.device_id.to_string())))
    }

    /// One connect attempt. Caller holds the operation lock.
    async fn establish(&self, timeout: Duration) -> Result<()> {
        self.state.send_replace(LinkState::Connecting);
        self.events.emit(LinkEvent::Connecting {
            device_id: self.device_id.clone(),
        });
        // Falls back to Disconnected if the caller drops this future mid-connect
        let _connecting = ConnectingGuard { state: &self.state };

        let result = match tokio::time::timeout(timeout, self.adapter.connect(&self.device_id)).await {
            Ok(result) => result,
            Err(_) => Err(ThermalinkError::ConnectionTimeout(timeout)),
        };

        match result {
            Ok(()) => {
                self.session.fetch_add(1, Ordering::SeqCst);
                self.state.send_replace(LinkState::Connected);
                self.reconnect_attempts.store(0, Ordering::SeqCst);
                self.tracked.store(true, Ordering::SeqCst);
                self.start_listener();
                self.start_heartbeat();
                info!(device = %self.device_id, "Link connected");
                self.events.emit(LinkEvent::Connected {
                    device_id: self.device_id.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(LinkState::Disconnected);
                Err(e)
            }
        }
    }

    /// Close the link and stop all background work. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        self.with_tasks(|t| {
            stop(&mut t.reconnect);
            stop(&mut t.heartbeat);
            stop(&mut t.listener);
        });
        let _guard = self.op_lock.lock().await;

        self.tracked.store(false, Ordering::SeqCst);
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        if self.state.send_replace(LinkState::Disconnected) == LinkState::Disconnected {
            return Ok(());
        }
        self.session.fetch_add(1, Ordering::SeqCst);

        let result = self.adapter.disconnect(&self.device_id).await;
        info!(device = %self.device_id, "Link disconnected");
        self.events.emit(LinkEvent::Disconnected {
            device_id: self.device_id.clone(),
            unexpected: false,
        });
        result
    }

    /// Stop background tasks without touching the link
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    // ========================================================================
    // LINK LOSS AND RECONNECT
    // ========================================================================

    /// Unexpected disconnect path, shared by heartbeat and adapter notifications.
    async fn link_lost(&self, cause: &str) {
        let _guard = self.op_lock.lock().await;
        if !self.is_connected() {
            return;
        }

        self.with_tasks(|t| stop(&mut t.heartbeat));
        self.session.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(LinkState::Disconnected);
        warn!(device = %self.device_id, cause, "Link lost");
        self.events.emit(LinkEvent::Disconnected {
            device_id: self.device_id.clone(),
            unexpected: true,
        });
        if let Err(e) = self.adapter.disconnect(&self.device_id).await {
            debug!(device = %self.device_id, error = %e, "Adapter cleanup after link loss failed");
        }

        if self.config.auto_reconnect && self.is_tracked() && !self.root.is_cancelled() {
            self.start_reconnect();
        }
    }

    fn start_reconnect(&self) {
        let token = self.root.child_token();
        let started = self.with_tasks(|t| {
            if t.reconnect.as_ref().is_some_and(|tok| !tok.is_cancelled()) {
                return false;
            }
            t.reconnect = Some(token.clone());
            true
        });
        if !started {
            return;
        }

        let weak = self.me.clone();
        let max_attempts = self.config.max_reconnect_attempts;
        let interval = self.config.reconnect_interval();
        let timeout = self.config.connect_options().timeout;

        tokio::spawn(async move {
            for attempt in 1..=max_attempts {
                if attempt > 1 {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
                let Some(this) = weak.upgrade() else { return };

                this.reconnect_attempts.store(attempt, Ordering::SeqCst);
                info!(device = %this.device_id, attempt, max_attempts, "Reconnecting");
                this.events.emit(LinkEvent::Reconnecting {
                    device_id: this.device_id.clone(),
                    attempt,
                    max_attempts,
                });

                let result = tokio::select! {
                    _ = token.cancelled() => return,
                    result = async {
                        let _guard = this.op_lock.lock().await;
                        if this.is_connected() {
                            return Ok(());
                        }
                        this.establish(timeout).await
                    } => result,
                };

                match result {
                    Ok(()) => {
                        info!(device = %this.device_id, attempt, "Reconnected");
                        this.events.emit(LinkEvent::Reconnected {
                            device_id: this.device_id.clone(),
                            attempt,
                        });
                        this.with_tasks(|t| t.reconnect = None);
                        return;
                    }
                    Err(e) => warn!(device = %this.device_id, attempt, error = %e, "Reconnect attempt failed"),
                }
            }

            let Some(this) = weak.upgrade() else { return };
            warn!(device = %this.device_id, attempts = max_attempts, "Giving up on reconnect");
            this.tracked.store(false, Ordering::SeqCst);
            this.reconnect_attempts.store(0, Ordering::SeqCst);
            this.with_tasks(|t| {
                t.reconnect = None;
                stop(&mut t.listener);
            });
            this.events.emit(LinkEvent::ReconnectFailed {
                device_id: this.device_id.clone(),
                attempts: max_attempts,
            });
        });
    }

    fn start_heartbeat(&self) {
        if !self.config.heartbeat_enabled {
            return;
        }
        let token = self.root.child_token();
        self.with_tasks(|t| {
            stop(&mut t.heartbeat);
            t.heartbeat = Some(token.clone());
        });

        let weak = self.me.clone();
        let period = self.config.heartbeat_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let Some(this) = weak.upgrade() else { break };
                let healthy = tokio::select! {
                    _ = token.cancelled() => break,
                    healthy = this.adapter.is_healthy(&this.device_id) => healthy,
                };
                if !healthy {
                    warn!(device = %this.device_id, "Heartbeat lost");
                    this.events.emit(LinkEvent::HeartbeatLost {
                        device_id: this.device_id.clone(),
                    });
                    this.link_lost("heartbeat").await;
                    break;
                }
            }
        });
    }

    fn start_listener(&self) {
        let running = self.with_tasks(|t| t.listener.as_ref().is_some_and(|tok| !tok.is_cancelled()));
        if running {
            return;
        }
        let Some(mut changes) = self.adapter.subscribe_state() else {
            return;
        };
        let token = self.root.child_token();
        self.with_tasks(|t| t.listener = Some(token.clone()));

        let weak = self.me.clone();
        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    _ = token.cancelled() => break,
                    change = changes.recv() => change,
                };
                match change {
                    Ok(change) if change.state == LinkState::Disconnected => {
                        let Some(this) = weak.upgrade() else { break };
                        if change.device_id == this.device_id {
                            this.link_lost("adapter reported disconnect").await;
                        }
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ========================================================================
    // TRANSMIT
    // ========================================================================

    /// Send `buffer` in MTU-sized chunks.
    ///
    /// `on_progress(sent, total)` is called after every chunk. Before each
    /// chunk the loop honors `control`: a cancel ends the transmission with
    /// [`ThermalinkError::JobCancelled`], a pause holds it (and stops the
    /// timeout clock) until resumed.
    ///
    /// ## Errors
    ///
    /// - [`ThermalinkError::DeviceDisconnected`] when the link is or goes down
    /// - [`ThermalinkError::WriteTimeout`] when one chunk takes too long
    /// - [`ThermalinkError::JobTimeout`] when the whole transmission does
    /// - any error the adapter returns from `write_chunk`
    pub async fn write<F>(
        &self,
        buffer: &RenderedBuffer,
        options: &TransmitOptions,
        control: &TransmitControl,
        mut on_progress: F,
    ) -> Result<()>
    where
        F: FnMut(usize, usize) + Send,
    {
        if !self.is_connected() {
            return Err(ThermalinkError::DeviceDisconnected(self.device_id.to_string()));
        }

        let session = self.session.load(Ordering::SeqCst);
        let total = buffer.chunk_count(options.mtu);
        let mut deadline = options.started_at + options.timeout;
        let mut paused = control.paused.subscribe();
        debug!(device = %self.device_id, bytes = buffer.len(), chunks = total, "Transmitting");

        for (index, chunk) in buffer.chunks(options.mtu).enumerate() {
            if index > 0 && !options.chunk_delay.is_zero() {
                tokio::select! {
                    _ = control.cancel.cancelled() => return Err(ThermalinkError::JobCancelled),
                    _ = tokio::time::sleep(options.chunk_delay) => {}
                }
            }

            if *paused.borrow_and_update() {
                let paused_at = Instant::now();
                debug!(device = %self.device_id, chunk = index, "Transmission paused");
                while *paused.borrow_and_update() {
                    tokio::select! {
                        _ = control.cancel.cancelled() => return Err(ThermalinkError::JobCancelled),
                        changed = paused.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                deadline += paused_at.elapsed();
            }

            if control.is_cancelled() {
                return Err(ThermalinkError::JobCancelled);
            }
            self.ensure_session(session)?;

            let now = Instant::now();
            if now >= deadline {
                return Err(ThermalinkError::JobTimeout(options.timeout));
            }
            let limit = (now + options.write_timeout).min(deadline);
            let outcome = tokio::select! {
                _ = control.cancel.cancelled() => return Err(ThermalinkError::JobCancelled),
                outcome = tokio::time::timeout_at(limit, self.adapter.write_chunk(&self.device_id, chunk)) => outcome,
            };
            match outcome {
                Ok(result) => result?,
                Err(_) if limit == deadline => return Err(ThermalinkError::JobTimeout(options.timeout)),
                Err(_) => return Err(ThermalinkError::WriteTimeout(options.write_timeout)),
            }
            // A chunk that landed on a replacement link is part of a torn job
            self.ensure_session(session)?;

            on_progress(index + 1, total);
        }
        Ok(())
    }

    /// Fails unless the link that was up when `session` was read is still up.
    fn ensure_session(&self, session: u64) -> Result<()> {
        if !self.is_connected() || self.session.load(Ordering::SeqCst) != session {
            return Err(ThermalinkError::DeviceDisconnected(self.device_id.to_string()));
        }
        Ok(())
    }

    /// Write raw bytes in one best-effort burst, ignoring pause state.
    pub async fn send_raw(&self, bytes: &[u8], mtu: usize) -> Result<()> {
        if !self.is_connected() {
            return Err(ThermalinkError::DeviceDisconnected(self.device_id.to_string()));
        }
        for chunk in bytes.chunks(mtu.max(1)) {
            tokio::time::timeout(self.config.write_timeout(), self.adapter.write_chunk(&self.device_id, chunk))
                .await
                .map_err(|_| ThermalinkError::WriteTimeout(self.config.write_timeout()))??;
        }
        Ok(())
    }
}
