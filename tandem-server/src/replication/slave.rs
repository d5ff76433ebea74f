use super::backoff::ReconnectBackoff;
use super::config::{BackoffConfig, FailoverConfig, MasterAddress, ReplicationConfig};
use super::control::{ControlCommand, ControlInfo, ControlTable, FAILOVER_RESET, NEW_MASTER};
use super::failover::{
    FailoverController, FailoverState, RecoveryAction, ScriptRecoveryAction, ServingFlag,
};
use super::protocol::{Hello, Message};
use super::session::{Session, SessionEvent, SessionEventKind, StreamPhase};
use super::types::{
    CloseReason, ReplicationError, ReplicationResult, ReplicationStats, SlaveConnectionState,
};
use crate::core::error::Result as StoreResult;
use crate::core::{
    AppendPrependResult, CasUnique, DeleteResult, ExpTime, Flags, IncrDecrResult, Item,
    SetResult, Store, StoreError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CONTROL_CHANNEL_CAPACITY: usize = 32;
/// Decoded messages buffered between the session reader and the home task
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Range carried by the master's last `announce`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnnounceRange {
    pub from: u64,
    pub to: u64,
}

/// Administrative snapshot of a slave, published by its home task
#[derive(Debug, Clone, Serialize)]
pub struct SlaveStatus {
    pub slave_id: String,
    pub state: SlaveConnectionState,
    pub serving: bool,
    pub failover: FailoverState,
    /// Automatic reconnects suspended until `failover-reset`
    pub given_up: bool,
    pub master: String,
    pub current_timeout_ms: u64,
    pub reconnect_pending: bool,
    pub reconnects_in_window: usize,
    pub master_database_created: Option<u64>,
    pub last_announce: Option<AnnounceRange>,
    pub last_ack: Option<u64>,
    pub last_nop: Option<u64>,
    pub last_handshake_at: Option<DateTime<Utc>>,
    pub stats: ReplicationStats,
}

/// Requests marshaled onto the home task
enum ControlRequest {
    FailoverReset {
        reply: oneshot::Sender<String>,
    },
    NewMaster {
        master: MasterAddress,
        reply: oneshot::Sender<String>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// What the stream does after a message was applied
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Flow {
    Continue,
    /// Master said goodbye; close our side
    Close,
}

struct SlaveInner {
    store: Arc<dyn Store>,
    serving: ServingFlag,
    controls: ControlTable,
    control_tx: mpsc::Sender<ControlRequest>,
    status_rx: watch::Receiver<SlaveStatus>,
}

/// Replication slave - keeps a local store in sync with a master
///
/// Features:
/// - Connects to the master on start and reconnects with backoff
/// - Applies the master's stream to the local store in order
/// - Answers store operations only while in sync (otherwise `NotReady`)
/// - Runs the failover script when the master is lost or regained
/// - `failover-reset` and `new-master` controls
///
/// All state lives on one home task; this handle only reads the serving flag
/// and the published status, and sends control requests.
#[derive(Clone)]
pub struct ReplicationSlave {
    inner: Arc<SlaveInner>,
}

impl ReplicationSlave {
    /// Start a slave that runs the configured failover script
    pub fn start(
        store: Arc<dyn Store>,
        replication: ReplicationConfig,
        failover: FailoverConfig,
        backoff: BackoffConfig,
    ) -> ReplicationResult<Self> {
        let script: Arc<dyn RecoveryAction> = Arc::new(ScriptRecoveryAction::new(&failover));
        Self::start_with_actions(store, replication, backoff, vec![script])
    }

    /// Start a slave with explicit recovery actions
    pub fn start_with_actions(
        store: Arc<dyn Store>,
        replication: ReplicationConfig,
        backoff: BackoffConfig,
        actions: Vec<Arc<dyn RecoveryAction>>,
    ) -> ReplicationResult<Self> {
        replication.validate()?;
        backoff.validate()?;

        let serving = ServingFlag::default();
        let mut failover = FailoverController::new(serving.clone());
        for action in actions {
            failover.add_action(action);
        }

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let actor = SlaveActor::new(
            Arc::clone(&store),
            replication,
            failover,
            ReconnectBackoff::new(backoff),
            control_rx,
        );
        let status_rx = actor.status_tx.subscribe();

        info!(
            "Starting replication slave {} for master {}",
            actor.slave_id,
            actor.config.master()
        );
        tokio::spawn(actor.run());

        Ok(Self {
            inner: Arc::new(SlaveInner {
                store,
                serving,
                controls: ControlTable::slave_controls(),
                control_tx,
                status_rx,
            }),
        })
    }

    pub fn is_serving(&self) -> bool {
        self.inner.serving.is_serving()
    }

    /// Latest published status
    pub fn status(&self) -> SlaveStatus {
        self.inner.status_rx.borrow().clone()
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<SlaveStatus> {
        self.inner.status_rx.clone()
    }

    pub fn controls(&self) -> Vec<ControlInfo> {
        self.inner.controls.list()
    }

    /// Run a control by name; malformed input is rejected before anything changes
    pub async fn control(&self, name: &str, args: &str) -> ReplicationResult<String> {
        let command = self.inner.controls.parse(name, args)?;
        let (reply, response) = oneshot::channel();
        let request = match command {
            ControlCommand::FailoverReset => ControlRequest::FailoverReset { reply },
            ControlCommand::NewMaster(master) => ControlRequest::NewMaster { master, reply },
        };

        self.inner
            .control_tx
            .send(request)
            .await
            .map_err(|_| ReplicationError::SlaveStopped)?;
        response.await.map_err(|_| ReplicationError::SlaveStopped)
    }

    pub async fn failover_reset(&self) -> ReplicationResult<String> {
        self.control(FAILOVER_RESET, "").await
    }

    /// `args` is `"<host> <port>"`
    pub async fn new_master(&self, args: &str) -> ReplicationResult<String> {
        self.control(NEW_MASTER, args).await
    }

    /// Stop replicating. The local store stays usable through its own handle.
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self
            .inner
            .control_tx
            .send(ControlRequest::Shutdown { reply })
            .await
            .is_ok()
        {
            let _ = done.await;
        }
    }

    fn serving_store(&self) -> StoreResult<&dyn Store> {
        if self.inner.serving.is_serving() {
            Ok(self.inner.store.as_ref())
        } else {
            Err(StoreError::NotReady)
        }
    }
}

impl Store for ReplicationSlave {
    fn get(&self, key: &str) -> StoreResult<Option<Item>> {
        self.serving_store()?.get(key)
    }

    fn get_cas(&self, key: &str) -> StoreResult<Option<Item>> {
        self.serving_store()?.get_cas(key)
    }

    fn set(
        &self,
        key: &str,
        data: Vec<u8>,
        flags: Flags,
        exptime: ExpTime,
    ) -> StoreResult<SetResult> {
        self.serving_store()?.set(key, data, flags, exptime)
    }

    fn add(
        &self,
        key: &str,
        data: Vec<u8>,
        flags: Flags,
        exptime: ExpTime,
    ) -> StoreResult<SetResult> {
        self.serving_store()?.add(key, data, flags, exptime)
    }

    fn replace(
        &self,
        key: &str,
        data: Vec<u8>,
        flags: Flags,
        exptime: ExpTime,
    ) -> StoreResult<SetResult> {
        self.serving_store()?.replace(key, data, flags, exptime)
    }

    fn cas(
        &self,
        key: &str,
        data: Vec<u8>,
        flags: Flags,
        exptime: ExpTime,
        unique: CasUnique,
    ) -> StoreResult<SetResult> {
        self.serving_store()?.cas(key, data, flags, exptime, unique)
    }

    fn incr(&self, key: &str, amount: u64) -> StoreResult<IncrDecrResult> {
        self.serving_store()?.incr(key, amount)
    }

    fn decr(&self, key: &str, amount: u64) -> StoreResult<IncrDecrResult> {
        self.serving_store()?.decr(key, amount)
    }

    fn append(&self, key: &str, data: Vec<u8>) -> StoreResult<AppendPrependResult> {
        self.serving_store()?.append(key, data)
    }

    fn prepend(&self, key: &str, data: Vec<u8>) -> StoreResult<AppendPrependResult> {
        self.serving_store()?.prepend(key, data)
    }

    fn delete(&self, key: &str) -> StoreResult<DeleteResult> {
        self.serving_store()?.delete(key)
    }
}

/// Bookkeeping from informational messages
#[derive(Debug, Default)]
struct StreamBookkeeping {
    master_hello: Option<Hello>,
    last_announce: Option<AnnounceRange>,
    last_ack: Option<u64>,
    last_nop: Option<u64>,
    last_handshake_at: Option<DateTime<Utc>>,
}

/// The slave's home task. Owns every piece of mutable replication state.
pub(super) struct SlaveActor {
    slave_id: String,
    created_at: u64,
    store: Arc<dyn Store>,
    pub(super) config: ReplicationConfig,
    pub(super) failover: FailoverController,
    pub(super) backoff: ReconnectBackoff,
    pub(super) state: SlaveConnectionState,
    pub(super) session: Option<Session>,
    next_session_id: u64,
    pub(super) reconnect_at: Option<Instant>,
    pub(super) given_up: bool,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    control_rx: mpsc::Receiver<ControlRequest>,
    status_tx: watch::Sender<SlaveStatus>,
    pub(super) stats: ReplicationStats,
    bookkeeping: StreamBookkeeping,
}

impl SlaveActor {
    fn new(
        store: Arc<dyn Store>,
        config: ReplicationConfig,
        failover: FailoverController,
        backoff: ReconnectBackoff,
        control_rx: mpsc::Receiver<ControlRequest>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let slave_id = Uuid::new_v4().to_string();
        let initial = SlaveStatus {
            slave_id: slave_id.clone(),
            state: SlaveConnectionState::Disconnected,
            serving: false,
            failover: failover.state(),
            given_up: false,
            master: config.master().to_string(),
            current_timeout_ms: backoff.current_timeout().as_millis() as u64,
            reconnect_pending: false,
            reconnects_in_window: 0,
            master_database_created: None,
            last_announce: None,
            last_ack: None,
            last_nop: None,
            last_handshake_at: None,
            stats: ReplicationStats::default(),
        };
        let (status_tx, _) = watch::channel(initial);

        Self {
            slave_id,
            created_at: Utc::now().timestamp().max(0) as u64,
            store,
            config,
            failover,
            backoff,
            state: SlaveConnectionState::Disconnected,
            session: None,
            next_session_id: 0,
            reconnect_at: None,
            given_up: false,
            events_tx,
            events_rx,
            control_rx,
            status_tx,
            stats: ReplicationStats::default(),
            bookkeeping: StreamBookkeeping::default(),
        }
    }

    async fn run(mut self) {
        self.connect_now();

        loop {
            self.publish_status();

            let reconnect_at = self.reconnect_at;
            let inactivity_deadline = self.session.as_ref().and_then(|s| s.inactivity_deadline);

            tokio::select! {
                request = self.control_rx.recv() => match request {
                    Some(ControlRequest::Shutdown { reply }) => {
                        self.shut_down();
                        let _ = reply.send(());
                        break;
                    }
                    Some(request) => self.handle_control(request),
                    None => {
                        // Every handle is gone
                        self.shut_down();
                        break;
                    }
                },

                Some(event) = self.events_rx.recv() => self.handle_event(event),

                _ = sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.connect_now();
                }

                _ = sleep_until(inactivity_deadline.unwrap_or_else(Instant::now)), if inactivity_deadline.is_some() => {
                    let silent_ms = self.config.inactivity_timeout_ms.unwrap_or_default();
                    self.conn_closed(CloseReason::Failed(format!(
                        "no message from master for {}ms",
                        silent_ms
                    )));
                }
            }
        }

        info!("Replication slave {} stopped", self.slave_id);
    }

    /// Start a connection attempt now, replacing any pending timer or session
    pub(super) fn connect_now(&mut self) {
        if self.state == SlaveConnectionState::ShuttingDown {
            return;
        }

        self.reconnect_at = None;
        self.session = None;
        self.next_session_id += 1;

        let hello = Hello::new(self.created_at);
        self.session = Some(Session::spawn(
            self.next_session_id,
            self.config.clone(),
            hello,
            self.events_tx.clone(),
        ));
        self.state = SlaveConnectionState::Connecting;
        self.stats.connect_attempts += 1;

        info!(
            "Connecting to master at {} (attempt {})",
            self.config.master(),
            self.stats.connect_attempts
        );
    }

    pub(super) fn handle_event(&mut self, event: SessionEvent) {
        if self.session.as_ref().map(|s| s.id) != Some(event.session) {
            debug!("Dropping event from stale session {}", event.session);
            return;
        }

        match event.kind {
            SessionEventKind::Connected => {
                info!("Connected to master {}, waiting for hello", self.config.master());
                self.state = SlaveConnectionState::Handshaking;
                self.touch_session();
            }
            SessionEventKind::Message(message) => {
                self.touch_session();
                match self.apply_message(message) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Close) => self.conn_closed(CloseReason::Graceful),
                    Err(e) => {
                        self.stats.protocol_errors += 1;
                        error!("Dropping master connection: {}", e);
                        self.conn_closed(CloseReason::Failed(e.to_string()));
                    }
                }
            }
            SessionEventKind::Eof => {
                if self.session_phase() == Some(StreamPhase::MasterShuttingDown) {
                    self.conn_closed(CloseReason::Graceful);
                } else {
                    self.conn_closed(CloseReason::Failed(
                        "master closed the connection".to_string(),
                    ));
                }
            }
            SessionEventKind::Error(e) => {
                self.conn_closed(CloseReason::Failed(e.to_string()));
            }
        }
    }

    /// Apply one message from the master, enforcing handshake and ordering rules
    pub(super) fn apply_message(&mut self, message: Message) -> ReplicationResult<Flow> {
        let Some(phase) = self.session_phase() else {
            return Ok(Flow::Continue);
        };

        if phase == StreamPhase::AwaitingHello {
            return match message {
                Message::Hello(hello) => {
                    self.complete_handshake(hello)?;
                    Ok(Flow::Continue)
                }
                other => Err(ReplicationError::HandshakeFailed(format!(
                    "expected hello, got {}",
                    other.kind()
                ))),
            };
        }

        let kind = message.kind();
        debug!("Applying {} from master", kind);

        match message {
            Message::Hello(_) => {
                return Err(ReplicationError::Protocol(
                    "hello received after handshake".to_string(),
                ));
            }
            Message::Announce { from, to } => {
                self.bookkeeping.last_announce = Some(AnnounceRange { from, to });
            }
            Message::Backfill {
                key,
                value,
                flags,
                exptime,
            } => {
                match phase {
                    StreamPhase::Backfilling => {}
                    StreamPhase::MasterShuttingDown => {
                        return Err(ReplicationError::Protocol(format!(
                            "backfill for {:?} after master announced shutdown",
                            key
                        )));
                    }
                    _ => {
                        return Err(ReplicationError::Protocol(format!(
                            "backfill for {:?} arrived after live data",
                            key
                        )));
                    }
                }
                let result = self.store.set(&key, value, flags, exptime);
                self.check_set(kind, &key, result);
                self.stats.backfilled_keys += 1;
            }
            Message::Set {
                key,
                value,
                flags,
                exptime,
            } => {
                self.begin_live(phase, kind)?;
                let result = self.store.set(&key, value, flags, exptime);
                self.check_set(kind, &key, result);
            }
            Message::Append { key, value } => {
                self.begin_live(phase, kind)?;
                let result = self.store.append(&key, value);
                self.check_append_prepend(kind, &key, result);
            }
            Message::Prepend { key, value } => {
                self.begin_live(phase, kind)?;
                let result = self.store.prepend(&key, value);
                self.check_append_prepend(kind, &key, result);
            }
            Message::Nop { timestamp } => {
                self.bookkeeping.last_nop = Some(timestamp);
            }
            Message::Ack { timestamp } => {
                self.bookkeeping.last_ack = Some(timestamp);
            }
            Message::ShuttingDown => {
                info!("Master {} is shutting down", self.config.master());
                self.set_session_phase(StreamPhase::MasterShuttingDown);
            }
            Message::Goodbye => {
                info!("Master {} said goodbye", self.config.master());
                return Ok(Flow::Close);
            }
        }

        self.stats.messages_applied += 1;
        Ok(Flow::Continue)
    }

    fn complete_handshake(&mut self, hello: Hello) -> ReplicationResult<()> {
        hello.check_compatible()?;

        info!(
            "Handshake with master {} complete (database created {})",
            self.config.master(),
            hello.database_created
        );
        self.state = SlaveConnectionState::Streaming;
        self.set_session_phase(StreamPhase::Backfilling);
        self.given_up = false;
        self.failover.on_handshake(&mut self.backoff, Instant::now());
        self.stats.handshakes += 1;
        self.bookkeeping.master_hello = Some(hello);
        self.bookkeeping.last_handshake_at = Some(Utc::now());
        Ok(())
    }

    /// Live mutations close the backfill phase and are refused once the master retires
    fn begin_live(&mut self, phase: StreamPhase, kind: &str) -> ReplicationResult<()> {
        if phase == StreamPhase::MasterShuttingDown {
            return Err(ReplicationError::Protocol(format!(
                "{} after master announced shutdown",
                kind
            )));
        }
        self.set_session_phase(StreamPhase::Live);
        Ok(())
    }

    fn check_set(&mut self, kind: &str, key: &str, result: StoreResult<SetResult>) {
        match result {
            Ok(SetResult::Stored) => {}
            Ok(other) => self.store_failure(kind, key, &format!("{:?}", other)),
            Err(e) => self.store_failure(kind, key, &e.to_string()),
        }
    }

    fn check_append_prepend(
        &mut self,
        kind: &str,
        key: &str,
        result: StoreResult<AppendPrependResult>,
    ) {
        match result {
            Ok(AppendPrependResult::Success) => {}
            Ok(other) => self.store_failure(kind, key, &format!("{:?}", other)),
            Err(e) => self.store_failure(kind, key, &e.to_string()),
        }
    }

    /// Local store failures are logged and skipped; the master is not asked again
    fn store_failure(&mut self, kind: &str, key: &str, reason: &str) {
        self.stats.store_failures += 1;
        warn!(
            "Failed to apply {} for key {:?} to local store: {}",
            kind, key, reason
        );
    }

    /// End of the current connection attempt
    pub(super) fn conn_closed(&mut self, reason: CloseReason) {
        self.session = None;
        if self.state == SlaveConnectionState::ShuttingDown {
            return;
        }
        self.state = SlaveConnectionState::Disconnected;

        match reason {
            CloseReason::Graceful => {
                info!("Master {} closed the stream cleanly", self.config.master());
                self.stats.graceful_disconnects += 1;
                self.failover.suspend();
                self.backoff.reset_timeout();
                self.schedule_reconnect();
            }
            CloseReason::Forced => {
                debug!("Closed connection to {} on request", self.config.master());
                self.failover.suspend();
            }
            CloseReason::Failed(why) => {
                warn!("Lost connection to master {}: {}", self.config.master(), why);
                self.stats.failures += 1;
                self.failover.on_failure();

                if self.backoff.give_up(Instant::now()) {
                    error!(
                        "Master {} is flapping ({} reconnects in window), giving up until failover-reset",
                        self.config.master(),
                        self.backoff.reconnects_in_window()
                    );
                    self.given_up = true;
                    self.reconnect_at = None;
                    return;
                }
                self.schedule_reconnect();
            }
        }
    }

    /// Arm the single reconnect timer, replacing any earlier one
    fn schedule_reconnect(&mut self) {
        let delay: Duration = self.backoff.next_delay();
        info!(
            "Reconnecting to master {} in {}ms",
            self.config.master(),
            delay.as_millis()
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn handle_control(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::FailoverReset { reply } => {
                info!("failover-reset requested");
                self.backoff.reset();
                self.given_up = false;
                if self.session.is_some() {
                    self.conn_closed(CloseReason::Forced);
                }
                self.connect_now();
                self.publish_status();
                let _ = reply.send(format!(
                    "Failover module reset; reconnecting to {}",
                    self.config.master()
                ));
            }
            ControlRequest::NewMaster { master, reply } => {
                let previous = self.config.master();
                info!("new-master requested: {} -> {}", previous, master);
                self.config = self.config.with_master(master);
                self.backoff.reset();
                self.given_up = false;
                self.conn_closed(CloseReason::Forced);
                self.connect_now();
                self.publish_status();
                let _ = reply.send(format!(
                    "New master set to {} (was {}); reconnecting",
                    self.config.master(),
                    previous
                ));
            }
            ControlRequest::Shutdown { reply } => {
                self.shut_down();
                let _ = reply.send(());
            }
        }
    }

    fn shut_down(&mut self) {
        info!("Replication slave {} shutting down", self.slave_id);
        self.state = SlaveConnectionState::ShuttingDown;
        self.reconnect_at = None;
        self.session = None;
        self.failover.suspend();
        self.publish_status();
    }

    fn session_phase(&self) -> Option<StreamPhase> {
        self.session.as_ref().map(|s| s.phase)
    }

    fn set_session_phase(&mut self, phase: StreamPhase) {
        if let Some(session) = self.session.as_mut() {
            session.phase = phase;
        }
    }

    fn touch_session(&mut self) {
        let timeout = self.config.inactivity_timeout_ms;
        if let Some(session) = self.session.as_mut() {
            session.touch(timeout);
        }
    }

    pub(super) fn snapshot(&self) -> SlaveStatus {
        SlaveStatus {
            slave_id: self.slave_id.clone(),
            state: self.state,
            serving: self.failover.is_serving(),
            failover: self.failover.state(),
            given_up: self.given_up,
            master: self.config.master().to_string(),
            current_timeout_ms: self.backoff.current_timeout().as_millis() as u64,
            reconnect_pending: self.reconnect_at.is_some(),
            reconnects_in_window: self.backoff.reconnects_in_window(),
            master_database_created: self
                .bookkeeping
                .master_hello
                .as_ref()
                .map(|h| h.database_created),
            last_announce: self.bookkeeping.last_announce,
            last_ack: self.bookkeeping.last_ack,
            last_nop: self.bookkeeping.last_nop,
            last_handshake_at: self.bookkeeping.last_handshake_at,
            stats: self.stats.clone(),
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.snapshot());
    }
}

#[cfg(test)]
impl SlaveActor {
    /// Actor wired to `store` with no task running; sessions are attached by hand
    pub(super) fn for_test(store: Arc<dyn Store>, config: ReplicationConfig) -> Self {
        let (_control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        Self::new(
            store,
            config,
            FailoverController::new(ServingFlag::default()),
            ReconnectBackoff::new(BackoffConfig::default()),
            control_rx,
        )
    }

    /// Attach a session backed by an idle task, as if a connect just started
    pub(super) fn attach_session(&mut self) -> u64 {
        self.next_session_id += 1;
        let id = self.next_session_id;
        let task = tokio::spawn(std::future::pending::<()>());
        self.session = Some(Session::from_task(id, task));
        self.state = SlaveConnectionState::Connecting;
        id
    }

    pub(super) fn add_action(&mut self, action: Arc<dyn RecoveryAction>) {
        self.failover.add_action(action);
    }

    pub(super) fn failover_reset_for_test(&mut self) -> oneshot::Receiver<String> {
        let (reply, rx) = oneshot::channel();
        self.handle_control(ControlRequest::FailoverReset { reply });
        rx
    }

    pub(super) fn new_master_for_test(&mut self, master: MasterAddress) -> oneshot::Receiver<String> {
        let (reply, rx) = oneshot::channel();
        self.handle_control(ControlRequest::NewMaster { master, reply });
        rx
    }

    pub(super) fn session_phase_for_test(&self) -> Option<StreamPhase> {
        self.session_phase()
    }
}
