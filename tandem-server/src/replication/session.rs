//! One connection attempt to the master
//!
//! The session task connects, sends our hello and forwards every decoded
//! message to the slave's home task. It never touches slave state; aborting
//! its task handle cancels the connection.

use super::config::ReplicationConfig;
use super::protocol::{Hello, Message, read_message, write_message};
use super::types::{ReplicationError, ReplicationResult};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Where a session is in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Connected (or connecting); the master's hello has not arrived
    AwaitingHello,
    /// Handshake done, only backfill seen so far
    Backfilling,
    /// Live mutations have started; backfill is over
    Live,
    /// Master announced it is shutting down
    MasterShuttingDown,
}

/// Events a session task reports to the home task
#[derive(Debug)]
pub enum SessionEventKind {
    Connected,
    Message(Message),
    /// Master closed the stream at a frame boundary
    Eof,
    Error(ReplicationError),
}

#[derive(Debug)]
pub struct SessionEvent {
    pub session: u64,
    pub kind: SessionEventKind,
}

/// Home-task view of the current connection attempt
///
/// Dropping it aborts the reader task.
pub struct Session {
    pub id: u64,
    pub phase: StreamPhase,
    pub inactivity_deadline: Option<Instant>,
    task: JoinHandle<()>,
}

impl Session {
    pub fn spawn(
        id: u64,
        config: ReplicationConfig,
        hello: Hello,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let task = tokio::spawn(run(id, config, hello, events));
        Self::from_task(id, task)
    }

    pub(crate) fn from_task(id: u64, task: JoinHandle<()>) -> Self {
        Self {
            id,
            phase: StreamPhase::AwaitingHello,
            inactivity_deadline: None,
            task,
        }
    }

    /// Push the inactivity deadline out after traffic from the master
    pub fn touch(&mut self, inactivity_timeout_ms: Option<u64>) {
        self.inactivity_deadline =
            inactivity_timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    id: u64,
    config: ReplicationConfig,
    hello: Hello,
    events: mpsc::Sender<SessionEvent>,
) {
    let kind = match stream_from_master(id, &config, hello, &events).await {
        Ok(()) => SessionEventKind::Eof,
        Err(e) => SessionEventKind::Error(e),
    };
    // The home task may already have moved on
    let _ = events.send(SessionEvent { session: id, kind }).await;
}

async fn stream_from_master(
    id: u64,
    config: &ReplicationConfig,
    hello: Hello,
    events: &mpsc::Sender<SessionEvent>,
) -> ReplicationResult<()> {
    let address = config.master();
    debug!("Session {} connecting to {}", id, address);

    let connect = TcpStream::connect((config.master_host.as_str(), config.master_port));
    let stream = tokio::time::timeout(Duration::from_millis(config.connect_timeout_ms), connect)
        .await
        .map_err(|_| ReplicationError::ConnectTimeout(config.connect_timeout_ms))?
        .map_err(|e| ReplicationError::ConnectionFailed(format!("{}: {}", address, e)))?;
    stream.set_nodelay(true)?;

    // Keep the write half alive for the whole session so the master does not
    // see a half-close.
    let (read_half, mut write_half) = stream.into_split();
    write_message(&mut write_half, &Message::Hello(hello)).await?;

    if events
        .send(SessionEvent {
            session: id,
            kind: SessionEventKind::Connected,
        })
        .await
        .is_err()
    {
        return Ok(());
    }

    // A full event queue stops us reading, which pushes back on the master
    let mut reader = BufReader::new(read_half);
    while let Some(message) = read_message(&mut reader).await? {
        let event = SessionEvent {
            session: id,
            kind: SessionEventKind::Message(message),
        };
        if events.send(event).await.is_err() {
            break;
        }
    }

    debug!("Session {} reached end of stream", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::protocol::Hello;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_session_reports_connect_messages_and_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = ReplicationConfig {
            master_host: "127.0.0.1".to_string(),
            master_port: port,
            ..Default::default()
        };
        let (tx, mut rx) = mpsc::channel(16);
        let _session = Session::spawn(7, config, Hello::new(1), tx);

        let (mut socket, _) = listener.accept().await.unwrap();
        let greeting = read_message(&mut socket).await.unwrap();
        assert!(matches!(greeting, Some(Message::Hello(_))));

        write_message(&mut socket, &Message::Nop { timestamp: 3 })
            .await
            .unwrap();
        drop(socket);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.session, 7);
        assert!(matches!(first.kind, SessionEventKind::Connected));

        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second.kind,
            SessionEventKind::Message(Message::Nop { timestamp: 3 })
        ));

        let third = rx.recv().await.unwrap();
        assert!(matches!(third.kind, SessionEventKind::Eof));
    }

    #[tokio::test]
    async fn test_full_event_queue_holds_back_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = ReplicationConfig {
            master_host: "127.0.0.1".to_string(),
            master_port: port,
            ..Default::default()
        };
        let (tx, mut rx) = mpsc::channel(2);
        let _session = Session::spawn(3, config, Hello::new(1), tx);

        let (mut socket, _) = listener.accept().await.unwrap();
        read_message(&mut socket).await.unwrap();
        for timestamp in 0..20 {
            write_message(&mut socket, &Message::Nop { timestamp })
                .await
                .unwrap();
        }
        drop(socket);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.len() <= 2);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.kind, SessionEventKind::Connected));
        for expected in 0..20 {
            let event = rx.recv().await.unwrap();
            match event.kind {
                SessionEventKind::Message(Message::Nop { timestamp }) => {
                    assert_eq!(timestamp, expected)
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        let last = rx.recv().await.unwrap();
        assert!(matches!(last.kind, SessionEventKind::Eof));
    }

    #[tokio::test]
    async fn test_session_reports_connect_failure() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let config = ReplicationConfig {
            master_host: "127.0.0.1".to_string(),
            master_port: port,
            ..Default::default()
        };
        let (tx, mut rx) = mpsc::channel(16);
        let _session = Session::spawn(1, config, Hello::new(1), tx);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, SessionEventKind::Error(_)));
    }
}
