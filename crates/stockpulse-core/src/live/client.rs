//! Live sync client implementation
//!
//! Keeps one subscription to the inventory room open over a reconnecting
//! push transport. A background task owns the transport and is the only
//! writer of the inventory snapshot; consumers read published `Arc`s and
//! receive change events.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::message::{ClientMessage, ServerMessage};
use super::reconnect::ReconnectPolicy;
use super::state::{Applied, SyncState};
use super::transport::{Connector, PushChannel, WsConnector};
use crate::error::LiveError;
use crate::models::{InventoryDelta, InventorySnapshot, Notification, Severity};

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// First connection attempt in progress
    Connecting,
    /// Joined and holding a current snapshot
    Open,
    /// Transport lost; retrying
    Reconnecting,
    /// Not running (never started, disconnected, or retries exhausted)
    Closed,
}

/// Observable state of the push session
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub topic: String,
    pub status: ConnectionStatus,
    /// Session id assigned by the server (changes on every reconnect)
    pub identity: Option<String>,
    /// Consecutive failed attempts since the connection was last open
    pub retry_count: u32,
    pub last_open: Option<DateTime<Utc>>,
    /// Why the session closed, when it closed because of a failure
    pub close_reason: Option<String>,
}

impl Connection {
    fn closed(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            status: ConnectionStatus::Closed,
            identity: None,
            retry_count: 0,
            last_open: None,
            close_reason: None,
        }
    }
}

/// Events emitted by the live client
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// Connection status changed
    StatusChanged(ConnectionStatus),
    /// A canonical snapshot replaced local state
    SnapshotReplaced(Arc<InventorySnapshot>),
    /// An update replaced local state
    Delta(InventoryDelta),
    /// Something worth showing to a user
    Notification(Notification),
}

/// Configuration for the live client
#[derive(Debug, Clone)]
pub struct LiveSyncConfig {
    /// WebSocket URL of the push server
    pub url: String,
    pub reconnect: ReconnectPolicy,
    /// Limit for opening the transport
    pub connect_timeout: Duration,
    /// Limit between sending the join and receiving the snapshot
    pub join_timeout: Duration,
    /// Treat the connection as dropped after this long without frames
    pub idle_timeout: Option<Duration>,
    /// Visible lifetime of emitted notifications
    pub notification_lifetime: Duration,
    /// Updates held while waiting for a snapshot
    pub max_pending_updates: usize,
}

impl Default for LiveSyncConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(10),
            idle_timeout: None,
            notification_lifetime: Duration::from_secs(5),
            max_pending_updates: 256,
        }
    }
}

/// Commands sent to the connection task
#[derive(Debug)]
enum Command {
    RequestInventory,
    Shutdown,
}

/// Publishes state from the connection task to consumers
struct Publisher {
    connection: watch::Sender<Connection>,
    snapshot: watch::Sender<Arc<InventorySnapshot>>,
    /// Installed by `take_events`; events are discarded until then
    events: Mutex<Option<mpsc::UnboundedSender<LiveEvent>>>,
    notification_lifetime: Duration,
}

impl Publisher {
    fn update_connection(&self, f: impl FnOnce(&mut Connection)) {
        let mut changed_to = None;
        self.connection.send_modify(|conn| {
            let before = conn.status;
            f(conn);
            if conn.status != before {
                changed_to = Some(conn.status);
            }
        });
        if let Some(status) = changed_to {
            self.emit(LiveEvent::StatusChanged(status));
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.update_connection(|conn| conn.status = status);
    }

    fn status(&self) -> ConnectionStatus {
        self.connection.borrow().status
    }

    /// Swap in a new snapshot; readers never see a partial update
    fn publish_snapshot(&self, snapshot: Arc<InventorySnapshot>) {
        self.snapshot.send_replace(snapshot);
    }

    fn notify(&self, severity: Severity, message: impl Into<String>) {
        self.emit(LiveEvent::Notification(Notification::new(
            severity,
            message,
            self.notification_lifetime,
        )));
    }

    fn emit(&self, event: LiveEvent) {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = events.as_ref() {
            let _ = tx.send(event);
        }
    }
}

/// Everything the connection task needs
struct SessionContext {
    topic: String,
    client_id: String,
    config: LiveSyncConfig,
    connector: Arc<dyn Connector>,
    publisher: Arc<Publisher>,
}

/// Running session owned by the client
struct Session {
    command_tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

/// How a single connection ended
enum ConnectionEnd {
    Shutdown,
    Lost { error: LiveError, was_open: bool },
}

/// Live inventory sync client
///
/// ```ignore
/// let mut client = LiveSyncClient::new(config);
/// let mut events = client.take_events().unwrap();
/// client.connect("inventory")?;
/// while let Some(event) = events.recv().await { /* ... */ }
/// client.disconnect().await;
/// ```
pub struct LiveSyncClient {
    config: LiveSyncConfig,
    connector: Arc<dyn Connector>,
    client_id: String,
    publisher: Arc<Publisher>,
    connection_rx: watch::Receiver<Connection>,
    snapshot_rx: watch::Receiver<Arc<InventorySnapshot>>,
    session: Option<Session>,
}

impl LiveSyncClient {
    /// Create a client that connects over WebSocket to `config.url`
    pub fn new(config: LiveSyncConfig) -> Self {
        let connector = WsConnector::new(&config.url, config.connect_timeout);
        Self::with_connector(config, Arc::new(connector))
    }

    /// Create a client using a custom transport
    pub fn with_connector(config: LiveSyncConfig, connector: Arc<dyn Connector>) -> Self {
        let (connection_tx, connection_rx) = watch::channel(Connection::closed(""));
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(InventorySnapshot::new()));

        let client_id = format!("stockpulse-{}", &uuid::Uuid::new_v4().to_string()[..8]);

        let publisher = Arc::new(Publisher {
            connection: connection_tx,
            snapshot: snapshot_tx,
            events: Mutex::new(None),
            notification_lifetime: config.notification_lifetime,
        });

        Self {
            config,
            connector,
            client_id,
            publisher,
            connection_rx,
            snapshot_rx,
            session: None,
        }
    }

    /// Our client ID, sent with every join
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Current connection state
    pub fn connection(&self) -> Connection {
        self.connection_rx.borrow().clone()
    }

    /// Watch connection state changes
    pub fn subscribe_connection(&self) -> watch::Receiver<Connection> {
        self.connection_rx.clone()
    }

    /// Latest published inventory
    pub fn snapshot(&self) -> Arc<InventorySnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Watch inventory replacements
    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<InventorySnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Take the event receiver (can only be called once)
    ///
    /// Events are only produced from this point on; a client that never
    /// takes them keeps nothing queued.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<LiveEvent>> {
        let mut events = self
            .publisher
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if events.is_some() {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *events = Some(tx);
        Some(rx)
    }

    /// Whether a session task is running
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
    }

    /// Start the session for `topic`
    ///
    /// Returns immediately; progress is reported through the connection
    /// watch. Transport failures are retried per the reconnect policy.
    pub fn connect(&mut self, topic: &str) -> Result<watch::Receiver<Connection>, LiveError> {
        if self.is_running() {
            return Err(LiveError::AlreadyConnected(self.connection().topic));
        }

        info!("Connecting to {} (topic '{}')", self.config.url, topic);
        self.publisher.update_connection(|conn| {
            *conn = Connection {
                status: ConnectionStatus::Connecting,
                ..Connection::closed(topic)
            };
        });

        let (command_tx, command_rx) = mpsc::channel(16);
        let ctx = SessionContext {
            topic: topic.to_string(),
            client_id: self.client_id.clone(),
            config: self.config.clone(),
            connector: Arc::clone(&self.connector),
            publisher: Arc::clone(&self.publisher),
        };
        let task = tokio::spawn(session_loop(ctx, command_rx));

        self.session = Some(Session { command_tx, task });
        Ok(self.subscribe_connection())
    }

    /// Ask the server to re-send the full inventory
    pub async fn request_inventory(&self) -> Result<(), LiveError> {
        let session = self.session.as_ref().ok_or(LiveError::NotConnected)?;
        session
            .command_tx
            .send(Command::RequestInventory)
            .await
            .map_err(|_| LiveError::NotConnected)
    }

    /// Stop the session and wait for the task to release the transport
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let _ = session.command_tx.send(Command::Shutdown).await;
        if let Err(e) = session.task.await {
            warn!("Live sync task ended abnormally: {}", e);
        }

        if self.publisher.status() != ConnectionStatus::Closed {
            self.publisher.set_status(ConnectionStatus::Closed);
        }
        info!("Disconnected from {}", self.config.url);
    }
}

impl Drop for LiveSyncClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
        }
    }
}

/// Connection task: connect, run, back off, repeat
async fn session_loop(ctx: SessionContext, mut command_rx: mpsc::Receiver<Command>) {
    let policy = &ctx.config.reconnect;
    let mut state = SyncState::new(ctx.config.max_pending_updates);
    let mut failures: u32 = 0;

    loop {
        let (error, was_open) = match run_connection(&ctx, &mut state, &mut command_rx).await {
            ConnectionEnd::Shutdown => {
                ctx.publisher.set_status(ConnectionStatus::Closed);
                return;
            }
            ConnectionEnd::Lost { error, was_open } => (error, was_open),
        };

        if was_open {
            failures = 0;
        }
        failures += 1;

        if policy.is_exhausted(failures) {
            let reason = LiveError::RetriesExhausted {
                attempts: failures,
                last_error: error.to_string(),
            }
            .to_string();
            warn!("{}", reason);
            ctx.publisher.update_connection(|conn| {
                conn.status = ConnectionStatus::Closed;
                conn.retry_count = failures;
                conn.close_reason = Some(reason.clone());
            });
            ctx.publisher.notify(Severity::Error, reason);
            return;
        }

        let delay = policy.delay_for(failures);
        warn!("Push connection lost ({}), retrying in {:?}", error, delay);
        ctx.publisher.update_connection(|conn| {
            conn.status = ConnectionStatus::Reconnecting;
            conn.retry_count = failures;
            conn.identity = None;
        });

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = command_rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => {
                        ctx.publisher.set_status(ConnectionStatus::Closed);
                        return;
                    }
                    // A fresh snapshot follows the rejoin anyway
                    Some(Command::RequestInventory) => {}
                },
            }
        }
    }
}

/// Open one connection, join, and pump frames until it ends
async fn run_connection(
    ctx: &SessionContext,
    state: &mut SyncState,
    command_rx: &mut mpsc::Receiver<Command>,
) -> ConnectionEnd {
    state.reset_for_connection();

    let mut connecting = ctx.connector.connect();
    let PushChannel {
        mut sink,
        mut stream,
    } = loop {
        tokio::select! {
            result = &mut connecting => match result {
                Ok(channel) => break channel,
                Err(error) => return ConnectionEnd::Lost { error, was_open: false },
            },
            cmd = command_rx.recv() => match cmd {
                Some(Command::Shutdown) | None => return ConnectionEnd::Shutdown,
                // The snapshot sent after the join covers it
                Some(Command::RequestInventory) => {}
            },
        }
    };

    // The server forgets rooms across reconnects, so join every time
    let join = ClientMessage::join(&ctx.topic, &ctx.client_id);
    if let Err(error) = sink.send(join.encode()).await {
        return ConnectionEnd::Lost {
            error,
            was_open: false,
        };
    }
    debug!("Sent join for topic '{}'", ctx.topic);

    // A timeout too large to represent as an instant means no deadline
    let join_deadline = Instant::now().checked_add(ctx.config.join_timeout);
    let mut last_frame = Instant::now();

    loop {
        let (deadline, timeout_error) = if !state.is_ready() {
            (join_deadline, LiveError::JoinTimeout(ctx.config.join_timeout))
        } else if let Some(idle) = ctx.config.idle_timeout {
            (last_frame.checked_add(idle), LiveError::IdleTimeout(idle))
        } else {
            (None, LiveError::ConnectionClosed)
        };

        tokio::select! {
            cmd = command_rx.recv() => match cmd {
                Some(Command::Shutdown) | None => {
                    let _ = sink.send(ClientMessage::leave(&ctx.topic).encode()).await;
                    let _ = sink.close().await;
                    return ConnectionEnd::Shutdown;
                }
                Some(Command::RequestInventory) => {
                    let request = ClientMessage::RequestInventory { timestamp: Utc::now() };
                    if let Err(error) = sink.send(request.encode()).await {
                        return ConnectionEnd::Lost { error, was_open: state.is_ready() };
                    }
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(text)) => {
                    last_frame = Instant::now();
                    handle_frame(ctx, state, &text);
                }
                Some(Err(error)) => {
                    return ConnectionEnd::Lost { error, was_open: state.is_ready() };
                }
                None => {
                    return ConnectionEnd::Lost {
                        error: LiveError::ConnectionClosed,
                        was_open: state.is_ready(),
                    };
                }
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                return ConnectionEnd::Lost { error: timeout_error, was_open: state.is_ready() };
            }
        }
    }
}

/// Decode, reduce and publish one inbound frame
fn handle_frame(ctx: &SessionContext, state: &mut SyncState, text: &str) {
    let message = match ServerMessage::decode(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping malformed frame: {}", e);
            return;
        }
    };

    let publisher = &ctx.publisher;
    match state.apply(message) {
        Applied::Identity(sid) => {
            debug!("Server assigned session id {}", sid);
            publisher.update_connection(|conn| conn.identity = Some(sid));
        }
        Applied::Joined => debug!("Join acknowledged for '{}'", ctx.topic),
        Applied::Snapshot { snapshot, released } => {
            info!("Inventory snapshot received ({} products)", snapshot.len());
            publisher.publish_snapshot(Arc::clone(&snapshot));
            publisher.emit(LiveEvent::SnapshotReplaced(snapshot));

            if publisher.status() != ConnectionStatus::Open {
                publisher.update_connection(|conn| {
                    conn.status = ConnectionStatus::Open;
                    conn.retry_count = 0;
                    conn.last_open = Some(Utc::now());
                    conn.close_reason = None;
                });
            }

            for update in released {
                publisher.notify(Severity::for_action(&update.action), update.message);
            }
        }
        Applied::Delta(delta) => {
            debug!(
                "Inventory update '{}' affecting {:?}",
                delta.action, delta.affected
            );
            publisher.publish_snapshot(Arc::clone(&delta.snapshot));
            let notification = Notification::for_delta(&delta, publisher.notification_lifetime);
            publisher.emit(LiveEvent::Delta(delta));
            publisher.emit(LiveEvent::Notification(notification));
        }
        Applied::Buffered => debug!("Update buffered until snapshot arrives"),
        Applied::Ignored => {}
    }
}

#[cfg(test)]
mod tests {
    use super::super::transport::testing::{ScriptedConnector, ServerEnd};
    use super::*;
    use crate::models::StockAction;

    const WAIT: Duration = Duration::from_secs(5);

    fn test_config() -> LiveSyncConfig {
        LiveSyncConfig {
            url: "ws://test".to_string(),
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                max_retries: None,
            },
            ..LiveSyncConfig::default()
        }
    }

    fn snapshot_frame(items: &[(&str, u64)]) -> String {
        serde_json::json!({
            "event": "initial_inventory",
            "data": { "inventory": rows(items) }
        })
        .to_string()
    }

    fn update_frame(items: &[(&str, u64)], action: &str, message: &str) -> String {
        serde_json::json!({
            "event": "inventory_update",
            "data": { "inventory": rows(items), "action": action, "message": message }
        })
        .to_string()
    }

    fn rows(items: &[(&str, u64)]) -> serde_json::Value {
        items
            .iter()
            .map(|(id, q)| serde_json::json!({ "ProductID": id, "Quantity": q }))
            .collect()
    }

    async fn accepted(rx: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("connection not attempted")
            .expect("connector dropped")
    }

    async fn next_client_frame(server: &mut ServerEnd) -> serde_json::Value {
        let text = tokio::time::timeout(WAIT, server.next_from_client())
            .await
            .expect("no frame from client")
            .expect("client hung up");
        serde_json::from_str(&text).unwrap()
    }

    async fn wait_status(rx: &mut watch::Receiver<Connection>, status: ConnectionStatus) -> Connection {
        tokio::time::timeout(WAIT, rx.wait_for(|c| c.status == status))
            .await
            .expect("status not reached")
            .expect("watch closed")
            .clone()
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<LiveEvent>) -> LiveEvent {
        tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("no event")
            .expect("event channel closed")
    }

    async fn next_notification(events: &mut mpsc::UnboundedReceiver<LiveEvent>) -> Notification {
        loop {
            if let LiveEvent::Notification(n) = next_event(events).await {
                return n;
            }
        }
    }

    #[tokio::test]
    async fn test_snapshot_then_sell_update() {
        let connector = ScriptedConnector::new();
        let mut sessions = connector.accept();
        let mut client = LiveSyncClient::with_connector(test_config(), Arc::new(connector));
        let mut events = client.take_events().unwrap();
        let mut conn_rx = client.connect("inventory").unwrap();

        let mut server = accepted(&mut sessions).await;
        let join = next_client_frame(&mut server).await;
        assert_eq!(join["event"], "join_inventory_room");

        server.push(&snapshot_frame(&[("P001", 50)]));
        let conn = wait_status(&mut conn_rx, ConnectionStatus::Open).await;
        assert!(conn.last_open.is_some());

        server.push(&update_frame(&[("P001", 40)], "sell", "Sold 10 units of P001"));
        let notification = next_notification(&mut events).await;
        assert_eq!(notification.severity, Severity::Warning);
        assert_eq!(notification.message, "Sold 10 units of P001");

        assert_eq!(client.snapshot().quantity("P001"), Some(40));
        assert_eq!(client.snapshot().len(), 1);

        // Exactly one notification for the whole exchange
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, LiveEvent::Notification(_)));
        }

        client.disconnect().await;
        assert_eq!(client.connection().status, ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn test_each_update_replaces_snapshot() {
        let connector = ScriptedConnector::new();
        let mut sessions = connector.accept();
        let mut client = LiveSyncClient::with_connector(test_config(), Arc::new(connector));
        let mut events = client.take_events().unwrap();
        client.connect("inventory").unwrap();

        let mut server = accepted(&mut sessions).await;
        next_client_frame(&mut server).await;
        server.push(&snapshot_frame(&[("P001", 50), ("P002", 8)]));

        let frames: Vec<Vec<(&str, u64)>> = vec![
            vec![("P001", 45)],
            vec![("P003", 1), ("P001", 45)],
            vec![],
        ];
        for items in &frames {
            server.push(&update_frame(items, "add", "changed"));
            loop {
                if let LiveEvent::Delta(delta) = next_event(&mut events).await {
                    let mut expected: Vec<(String, u64)> =
                        items.iter().map(|(id, q)| (id.to_string(), *q)).collect();
                    expected.sort();
                    let actual: Vec<(String, u64)> = delta
                        .snapshot
                        .iter()
                        .map(|(id, q)| (id.to_string(), q))
                        .collect();
                    assert_eq!(actual, expected);
                    assert_eq!(*client.snapshot(), *delta.snapshot);
                    break;
                }
            }
        }

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_rejoin_after_reconnect() {
        let connector = ScriptedConnector::new();
        let mut first = connector.accept();
        let mut second = connector.accept();
        let mut client = LiveSyncClient::with_connector(test_config(), Arc::new(connector.clone()));
        let mut events = client.take_events().unwrap();
        let mut conn_rx = client.connect("inventory").unwrap();

        let mut server = accepted(&mut first).await;
        next_client_frame(&mut server).await;
        server.push(r#"{"event":"connection_response","data":{"status":"connected","sid":"sid-1"}}"#);
        server.push(&snapshot_frame(&[("P001", 50)]));
        let conn = wait_status(&mut conn_rx, ConnectionStatus::Open).await;
        assert_eq!(conn.identity.as_deref(), Some("sid-1"));

        server.drop_connection();
        let conn = wait_status(&mut conn_rx, ConnectionStatus::Reconnecting).await;
        assert_eq!(conn.retry_count, 1);

        let mut server = accepted(&mut second).await;
        // Join comes first on the new connection
        let join = next_client_frame(&mut server).await;
        assert_eq!(join["event"], "join_inventory_room");

        // A delta before the snapshot must not be applied
        server.push(&update_frame(&[("P001", 1)], "sell", "stale"));
        server.push(&snapshot_frame(&[("P001", 30), ("P002", 5)]));

        let mut first_state = None;
        while first_state.is_none() {
            match next_event(&mut events).await {
                LiveEvent::Delta(delta) => panic!("delta applied before snapshot: {:?}", delta),
                LiveEvent::SnapshotReplaced(s) if s.len() == 2 => first_state = Some(s),
                _ => {}
            }
        }
        let first_state = first_state.unwrap();
        assert_eq!(first_state.quantity("P001"), Some(30));

        let conn = wait_status(&mut conn_rx, ConnectionStatus::Open).await;
        assert_eq!(conn.retry_count, 0);
        assert_eq!(client.snapshot().quantity("P001"), Some(30));

        // Deltas apply again once the snapshot is in
        server.push(&update_frame(&[("P001", 31), ("P002", 5)], "add", "Added 1"));
        loop {
            if let LiveEvent::Delta(delta) = next_event(&mut events).await {
                assert_eq!(delta.action, StockAction::Add);
                assert_eq!(delta.snapshot.quantity("P001"), Some(31));
                break;
            }
        }

        assert_eq!(connector.attempts(), 2);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let connector = ScriptedConnector::new();
        let mut config = test_config();
        config.reconnect.max_retries = Some(2);

        let mut client = LiveSyncClient::with_connector(config, Arc::new(connector.clone()));
        let mut events = client.take_events().unwrap();
        let mut conn_rx = client.connect("inventory").unwrap();

        let conn = wait_status(&mut conn_rx, ConnectionStatus::Closed).await;
        assert_eq!(conn.retry_count, 3);
        assert!(conn.close_reason.unwrap().contains("3 connection attempts"));
        assert_eq!(connector.attempts(), 3);

        let notification = next_notification(&mut events).await;
        assert_eq!(notification.severity, Severity::Error);

        // Closed is terminal until the caller connects again
        client.disconnect().await;
        let conn = client.connection();
        assert_eq!(conn.status, ConnectionStatus::Closed);
        assert!(conn.close_reason.is_some());
    }

    #[tokio::test]
    async fn test_disconnect_cancels_pending_reconnect() {
        let connector = ScriptedConnector::new();
        connector.refuse();
        let mut config = test_config();
        config.reconnect.base_delay = Duration::from_secs(600);
        config.reconnect.max_delay = Duration::from_secs(600);

        let mut client = LiveSyncClient::with_connector(config, Arc::new(connector.clone()));
        let mut conn_rx = client.connect("inventory").unwrap();
        wait_status(&mut conn_rx, ConnectionStatus::Reconnecting).await;

        tokio::time::timeout(Duration::from_secs(2), client.disconnect())
            .await
            .expect("disconnect waited for the backoff timer");
        assert_eq!(client.connection().status, ConnectionStatus::Closed);
        assert!(client.connection().close_reason.is_none());
        assert!(!client.is_running());
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped() {
        let connector = ScriptedConnector::new();
        let mut sessions = connector.accept();
        let mut client = LiveSyncClient::with_connector(test_config(), Arc::new(connector));
        let mut events = client.take_events().unwrap();
        let mut conn_rx = client.connect("inventory").unwrap();

        let mut server = accepted(&mut sessions).await;
        next_client_frame(&mut server).await;
        server.push(&snapshot_frame(&[("P001", 50)]));
        wait_status(&mut conn_rx, ConnectionStatus::Open).await;

        server.push("{not json");
        server.push(r#"{"event":"inventory_update","data":{"inventory":[{"ProductID":"","Quantity":1}]}}"#);
        server.push(&update_frame(&[("P001", 49)], "weird", "Adjusted P001"));

        let notification = next_notification(&mut events).await;
        assert_eq!(notification.severity, Severity::Info);
        assert_eq!(client.snapshot().quantity("P001"), Some(49));
        assert_eq!(client.connection().status, ConnectionStatus::Open);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_join_timeout_triggers_reconnect() {
        let connector = ScriptedConnector::new();
        let mut first = connector.accept();
        let mut second = connector.accept();
        let mut config = test_config();
        config.join_timeout = Duration::from_millis(50);

        let mut client = LiveSyncClient::with_connector(config, Arc::new(connector));
        let mut conn_rx = client.connect("inventory").unwrap();

        // First server never sends a snapshot
        let mut silent = accepted(&mut first).await;
        next_client_frame(&mut silent).await;

        let mut server = accepted(&mut second).await;
        next_client_frame(&mut server).await;
        server.push(&snapshot_frame(&[("P009", 3)]));
        wait_status(&mut conn_rx, ConnectionStatus::Open).await;
        assert_eq!(client.snapshot().quantity("P009"), Some(3));

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_request_inventory_and_leave() {
        let connector = ScriptedConnector::new();
        let mut sessions = connector.accept();
        let mut client = LiveSyncClient::with_connector(test_config(), Arc::new(connector));
        assert!(matches!(
            client.request_inventory().await,
            Err(LiveError::NotConnected)
        ));
        let mut conn_rx = client.connect("inventory").unwrap();

        let mut server = accepted(&mut sessions).await;
        next_client_frame(&mut server).await;
        server.push(&snapshot_frame(&[]));
        wait_status(&mut conn_rx, ConnectionStatus::Open).await;

        client.request_inventory().await.unwrap();
        let request = next_client_frame(&mut server).await;
        assert_eq!(request["event"], "request_inventory");

        client.disconnect().await;
        let leave = next_client_frame(&mut server).await;
        assert_eq!(leave["event"], "leave_inventory_room");
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let connector = ScriptedConnector::new();
        let _sessions = connector.accept();
        let mut client = LiveSyncClient::with_connector(test_config(), Arc::new(connector));
        client.connect("inventory").unwrap();

        assert!(matches!(
            client.connect("inventory"),
            Err(LiveError::AlreadyConnected(topic)) if topic == "inventory"
        ));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_events_not_queued_until_taken() {
        let connector = ScriptedConnector::new();
        let mut sessions = connector.accept();
        let mut client = LiveSyncClient::with_connector(test_config(), Arc::new(connector));
        let mut conn_rx = client.connect("inventory").unwrap();
        let mut snapshot_rx = client.subscribe_snapshot();

        let mut server = accepted(&mut sessions).await;
        next_client_frame(&mut server).await;
        server.push(&snapshot_frame(&[("P001", 50)]));
        wait_status(&mut conn_rx, ConnectionStatus::Open).await;
        for qty in [49, 48, 47] {
            server.push(&update_frame(&[("P001", qty)], "sell", "Sold 1 unit of P001"));
        }
        tokio::time::timeout(WAIT, snapshot_rx.wait_for(|s| s.quantity("P001") == Some(47)))
            .await
            .expect("updates not applied")
            .expect("watch closed");

        let mut events = client.take_events().unwrap();
        assert!(events.try_recv().is_err());
        assert!(client.take_events().is_none());

        server.push(&update_frame(&[("P001", 46)], "sell", "Sold 1 unit of P001"));
        match next_event(&mut events).await {
            LiveEvent::Delta(delta) => assert_eq!(delta.snapshot.quantity("P001"), Some(46)),
            other => panic!("Expected delta, got {:?}", other),
        }

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_unrepresentable_timeouts_mean_no_deadline() {
        let connector = ScriptedConnector::new();
        let mut sessions = connector.accept();
        let mut config = test_config();
        config.join_timeout = Duration::from_secs(u64::MAX);
        config.idle_timeout = Some(Duration::MAX);

        let mut client = LiveSyncClient::with_connector(config, Arc::new(connector));
        let mut conn_rx = client.connect("inventory").unwrap();

        let mut server = accepted(&mut sessions).await;
        next_client_frame(&mut server).await;
        server.push(&snapshot_frame(&[("P002", 5)]));
        wait_status(&mut conn_rx, ConnectionStatus::Open).await;

        server.push(&update_frame(&[("P002", 8)], "add", "Added 3 units to P002"));
        let mut snapshot_rx = client.subscribe_snapshot();
        tokio::time::timeout(WAIT, snapshot_rx.wait_for(|s| s.quantity("P002") == Some(8)))
            .await
            .expect("update not applied")
            .expect("watch closed");
        assert!(client.is_running());

        client.disconnect().await;
        assert_eq!(client.connection().status, ConnectionStatus::Closed);
    }
}
