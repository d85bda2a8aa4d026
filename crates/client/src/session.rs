//! Session lifecycle management
//!
//! [`SessionMachine`] is the pure connection state machine: five states,
//! a constant reconnect delay, a bounded attempt counter, and idempotent
//! timer scheduling. [`SessionHandle::spawn`] wraps it in an async driver
//! that owns the transport, replays identity registration when the server
//! asks for it, and resubscribes with `since_sequence` after a reconnect so
//! the timeline backfills without gaps.
//!
//! Transport failures never surface as errors to the caller; they surface as
//! state transitions observable on the handle's watch channel.

use std::time::Duration;

use shoptalk_shared::{ClientEvent, ConversationId, ServerEvent};
use tokio::sync::{mpsc, watch};
use tokio_retry::strategy::FixedInterval;

use crate::transport::{Connector, Transport};

/// Delay between reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Attempts before the session gives up and waits for a user retry.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Connection lifecycle states as observed by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Why a live connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The user closed the chat; never triggers reconnection.
    Manual,
    /// The transport dropped or errored.
    Error,
}

/// Outcome of asking the machine to arm the reconnect timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Timer armed for the given delay.
    Armed(Duration),
    /// A timer is already pending; scheduling again is a no-op.
    AlreadyPending,
    /// Attempt budget exhausted; the machine moved to `Failed`.
    GaveUp,
}

/// Pure connection state machine. No timers, no IO; the driver feeds it
/// transport outcomes and timer firings and reads back the state.
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    attempts: u32,
    timer_pending: bool,
    open_requested: bool,
    max_attempts: u32,
    delays: FixedInterval,
    reconnect_delay: Duration,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::with_policy(RECONNECT_DELAY, MAX_RECONNECT_ATTEMPTS)
    }

    pub fn with_policy(reconnect_delay: Duration, max_attempts: u32) -> Self {
        Self {
            state: SessionState::Disconnected,
            attempts: 0,
            timer_pending: false,
            open_requested: false,
            max_attempts,
            delays: FixedInterval::new(reconnect_delay),
            reconnect_delay,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The user opened the chat.
    pub fn open(&mut self) -> bool {
        if self.state != SessionState::Disconnected {
            return false;
        }
        self.open_requested = true;
        self.state = SessionState::Connecting;
        true
    }

    /// The transport handshake completed.
    pub fn transport_open(&mut self) {
        debug_assert_eq!(self.state, SessionState::Connecting);
        self.state = SessionState::Connected;
        // Fresh budget for the next outage; any pending timer is moot.
        self.attempts = 0;
        self.timer_pending = false;
        self.delays = FixedInterval::new(self.reconnect_delay);
    }

    /// The connect attempt failed before the handshake completed.
    pub fn transport_error(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }
        self.state = if self.open_requested {
            SessionState::Reconnecting
        } else {
            SessionState::Disconnected
        };
    }

    /// The server refused the handshake (rejected credentials). Fatal per
    /// session: no reconnect is scheduled, only an explicit user retry.
    pub fn transport_rejected(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }
        self.timer_pending = false;
        self.state = if self.open_requested {
            SessionState::Failed
        } else {
            SessionState::Disconnected
        };
    }

    /// A live connection ended.
    pub fn transport_closed(&mut self, reason: CloseReason) {
        if self.state != SessionState::Connected {
            return;
        }
        self.state = match reason {
            CloseReason::Manual => {
                self.open_requested = false;
                SessionState::Disconnected
            }
            CloseReason::Error => SessionState::Reconnecting,
        };
    }

    /// Arm the reconnect timer. Idempotent while one is pending; moves to
    /// `Failed` once the attempt budget is spent.
    pub fn schedule_reconnect(&mut self) -> Schedule {
        debug_assert_eq!(self.state, SessionState::Reconnecting);
        if self.timer_pending {
            return Schedule::AlreadyPending;
        }
        if self.attempts >= self.max_attempts {
            self.state = SessionState::Failed;
            self.timer_pending = false;
            return Schedule::GaveUp;
        }
        self.timer_pending = true;
        let delay = self.delays.next().unwrap_or(self.reconnect_delay);
        Schedule::Armed(delay)
    }

    /// The pending reconnect timer fired.
    pub fn attempt(&mut self) {
        debug_assert_eq!(self.state, SessionState::Reconnecting);
        debug_assert!(self.timer_pending);
        self.timer_pending = false;
        self.attempts += 1;
        self.state = SessionState::Connecting;
    }

    /// Explicit retry from the `Failed` state.
    pub fn user_retry(&mut self) -> bool {
        if self.state != SessionState::Failed {
            return false;
        }
        self.attempts = 0;
        self.delays = FixedInterval::new(self.reconnect_delay);
        self.state = SessionState::Connecting;
        true
    }

    /// Manual close from any state. Cancels pending timers, never reconnects.
    pub fn close(&mut self) {
        self.open_requested = false;
        self.timer_pending = false;
        self.state = SessionState::Disconnected;
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconnect policy for a spawned session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub reconnect_delay: Duration,
    pub max_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: RECONNECT_DELAY,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

enum SessionCommand {
    Send(ClientEvent),
    Retry,
    Close,
}

/// Handle to a running session task.
///
/// `states` is a watch channel of [`SessionState`]; `events` carries every
/// server event for the UI layer to reduce.
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    pub states: watch::Receiver<SessionState>,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl SessionHandle {
    /// Spawn the session driver. Connecting begins immediately.
    pub fn spawn(connector: Box<dyn Connector>, config: SessionConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        let mut machine = SessionMachine::with_policy(config.reconnect_delay, config.max_attempts);
        machine.open();

        let driver = SessionDriver {
            connector,
            machine,
            event_tx,
            state_tx,
            registration: None,
            last_conversation: None,
            last_seen_sequence: 0,
            resubscribe_pending: false,
        };
        tokio::spawn(driver.run(cmd_rx));

        Self {
            cmd_tx,
            states: state_rx,
            events: event_rx,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.states.borrow()
    }

    /// Queue a client event for the live connection. Events queued while
    /// disconnected are dropped with a warning; callers should watch state.
    pub fn send(&self, event: ClientEvent) {
        let _ = self.cmd_tx.send(SessionCommand::Send(event));
    }

    /// Retry after the session entered `Failed`.
    pub fn retry(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Retry);
    }

    /// Close the chat. The session will not reconnect.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Close);
    }
}

struct SessionDriver {
    connector: Box<dyn Connector>,
    machine: SessionMachine,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    state_tx: watch::Sender<SessionState>,
    /// Last `register_identity` sent, replayed on `require_info`.
    registration: Option<ClientEvent>,
    /// Last subscribed conversation, resubscribed after reconnect.
    last_conversation: Option<ConversationId>,
    last_seen_sequence: u64,
    resubscribe_pending: bool,
}

impl SessionDriver {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>) {
        loop {
            self.publish_state();
            match self.machine.state() {
                SessionState::Disconnected => break,
                SessionState::Connecting => self.connect_once(&mut cmd_rx).await,
                SessionState::Reconnecting => self.await_reconnect(&mut cmd_rx).await,
                SessionState::Failed => self.await_retry(&mut cmd_rx).await,
                SessionState::Connected => unreachable!("handled inside connect_once"),
            }
        }
        self.publish_state();
        tracing::debug!("session driver stopped");
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.machine.state());
    }

    async fn connect_once(&mut self, cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>) {
        match self.connector.connect().await {
            Ok(transport) => {
                self.machine.transport_open();
                self.publish_state();
                tracing::info!("session connected");
                let reason = self.run_connected(transport, cmd_rx).await;
                self.machine.transport_closed(reason);
                if reason == CloseReason::Error {
                    tracing::warn!("connection lost, entering reconnect");
                }
            }
            Err(crate::error::ChatClientError::NotAuthorized) => {
                tracing::warn!("handshake rejected; not retrying");
                // The user may have closed the chat mid-handshake.
                self.drain_pending_close(cmd_rx);
                self.machine.transport_rejected();
            }
            Err(e) => {
                tracing::warn!(error = %e, "connect attempt failed");
                self.drain_pending_close(cmd_rx);
                self.machine.transport_error();
            }
        }
    }

    fn drain_pending_close(&mut self, cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>) {
        while let Ok(cmd) = cmd_rx.try_recv() {
            if matches!(cmd, SessionCommand::Close) {
                self.machine.close();
            }
        }
    }

    async fn await_reconnect(&mut self, cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>) {
        let delay = match self.machine.schedule_reconnect() {
            Schedule::Armed(delay) => delay,
            // Machine is now Failed; outer loop handles it.
            Schedule::GaveUp => {
                tracing::warn!(
                    attempts = self.machine.attempts(),
                    "reconnect budget exhausted"
                );
                return;
            }
            Schedule::AlreadyPending => return,
        };

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => {
                    self.machine.attempt();
                    return;
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Close) | None => {
                        self.machine.close();
                        return;
                    }
                    // Already scheduled; retry while pending is a no-op.
                    Some(SessionCommand::Retry) => {}
                    Some(SessionCommand::Send(_)) => {
                        tracing::warn!("dropping client event while reconnecting");
                    }
                },
            }
        }
    }

    async fn await_retry(&mut self, cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>) {
        loop {
            match cmd_rx.recv().await {
                Some(SessionCommand::Retry) => {
                    self.machine.user_retry();
                    return;
                }
                Some(SessionCommand::Close) | None => {
                    self.machine.close();
                    return;
                }
                Some(SessionCommand::Send(_)) => {
                    tracing::warn!("dropping client event while failed");
                }
            }
        }
    }

    async fn run_connected(
        &mut self,
        mut transport: Box<dyn Transport>,
        cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
    ) -> CloseReason {
        // Operators carry no registration, so their room subscription is
        // restored immediately. Customers resubscribe only after the server
        // acknowledges the replayed registration.
        self.resubscribe_pending = self.last_conversation.is_some();
        if self.resubscribe_pending && self.registration.is_none() {
            if transport.send(&self.resubscribe_event()).await.is_err() {
                return CloseReason::Error;
            }
            self.resubscribe_pending = false;
        }

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Close) | None => {
                        transport.close().await;
                        return CloseReason::Manual;
                    }
                    Some(SessionCommand::Retry) => {}
                    Some(SessionCommand::Send(event)) => {
                        self.track_outgoing(&event);
                        if transport.send(&event).await.is_err() {
                            return CloseReason::Error;
                        }
                    }
                },
                incoming = transport.recv() => match incoming {
                    Some(Ok(event)) => {
                        if self.handle_incoming(&event, transport.as_mut()).await.is_err() {
                            return CloseReason::Error;
                        }
                        let _ = self.event_tx.send(event);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "transport receive error");
                        return CloseReason::Error;
                    }
                    None => return CloseReason::Error,
                },
            }
        }
    }

    fn resubscribe_event(&self) -> ClientEvent {
        ClientEvent::SubscribeConversation {
            // Only built when last_conversation is set
            conversation_id: self.last_conversation.unwrap_or_default(),
            since_sequence: Some(self.last_seen_sequence),
        }
    }

    fn track_outgoing(&mut self, event: &ClientEvent) {
        match event {
            ClientEvent::RegisterIdentity { .. } => {
                self.registration = Some(event.clone());
            }
            ClientEvent::SubscribeConversation {
                conversation_id, ..
            } => {
                if self.last_conversation != Some(*conversation_id) {
                    self.last_conversation = Some(*conversation_id);
                    self.last_seen_sequence = 0;
                }
            }
            _ => {}
        }
    }

    async fn handle_incoming(
        &mut self,
        event: &ServerEvent,
        transport: &mut dyn Transport,
    ) -> Result<(), ()> {
        match event {
            ServerEvent::RequireInfo { .. } => {
                if let Some(registration) = self.registration.clone() {
                    tracing::debug!("replaying identity registration");
                    transport.send(&registration).await.map_err(|_| ())?;
                }
            }
            ServerEvent::RegistrationAck { .. } => {
                if self.resubscribe_pending {
                    let event = self.resubscribe_event();
                    transport.send(&event).await.map_err(|_| ())?;
                    self.resubscribe_pending = false;
                }
            }
            ServerEvent::Message {
                conversation_id,
                message,
                ..
            } => {
                if self.last_conversation == Some(*conversation_id) {
                    self.last_seen_sequence = self.last_seen_sequence.max(message.sequence);
                }
            }
            ServerEvent::History {
                conversation_id,
                messages,
                ..
            } => {
                if self.last_conversation == Some(*conversation_id) {
                    let newest = messages.iter().map(|m| m.sequence).max().unwrap_or(0);
                    self.last_seen_sequence = self.last_seen_sequence.max(newest);
                }
            }
            _ => {}
        }
        Ok(())
    }
}
