//! Integration tests for the replication slave
//!
//! A fake master speaks the wire protocol over real TCP connections.
//! These tests cover:
//! - Handshake, backfill and live stream end to end
//! - Graceful goodbye
//! - Give-up on a flapping master and `failover-reset`
//! - `new-master` with valid and malformed arguments
//! - Shutdown

use std::sync::Arc;
use std::time::Duration;
use tandem_server::replication::protocol::{Hello, Message, read_message, write_message};
use tandem_server::replication::{
    BackoffConfig, RecoveryAction, ReplicationConfig, ReplicationError, ReplicationSlave,
    SlaveConnectionState, SlaveStatus,
};
use tandem_server::{KVConfig, KVStore, Store, StoreError};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

async fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn start_slave(port: u16, backoff: BackoffConfig) -> (ReplicationSlave, Arc<KVStore>) {
    let kv = Arc::new(KVStore::new(KVConfig::default()));
    let replication = ReplicationConfig {
        master_host: "127.0.0.1".to_string(),
        master_port: port,
        ..Default::default()
    };
    let actions: Vec<Arc<dyn RecoveryAction>> = Vec::new();
    let slave =
        ReplicationSlave::start_with_actions(kv.clone(), replication, backoff, actions).unwrap();
    (slave, kv)
}

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_timeout_ms: 10,
        ..Default::default()
    }
}

/// Accept the next slave and consume its hello
async fn accept_slave(listener: &TcpListener) -> TcpStream {
    let (mut socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let greeting = read_message(&mut socket).await.unwrap();
    assert!(matches!(greeting, Some(Message::Hello(_))));
    socket
}

async fn send_all(socket: &mut TcpStream, messages: Vec<Message>) {
    for message in messages {
        write_message(socket, &message).await.unwrap();
    }
}

async fn wait_until<F>(slave: &ReplicationSlave, mut condition: F) -> SlaveStatus
where
    F: FnMut(&SlaveStatus) -> bool,
{
    let mut rx = slave.subscribe();
    let status = timeout(WAIT, rx.wait_for(|s| condition(s)))
        .await
        .expect("timed out waiting for slave status")
        .unwrap();
    status.clone()
}

#[tokio::test]
async fn test_stream_then_goodbye() {
    let (listener, port) = listen().await;
    let (slave, _kv) = start_slave(port, BackoffConfig::default());

    let mut master = accept_slave(&listener).await;
    send_all(
        &mut master,
        vec![
            Message::Hello(Hello::new(1_700_000_000)),
            Message::Backfill {
                key: "A".to_string(),
                value: b"1".to_vec(),
                flags: 0,
                exptime: 0,
            },
            Message::Set {
                key: "A".to_string(),
                value: b"2".to_vec(),
                flags: 7,
                exptime: 0,
            },
        ],
    )
    .await;

    wait_until(&slave, |s| s.serving && s.stats.messages_applied == 2).await;
    let item = slave.get("A").unwrap().unwrap();
    assert_eq!(item.value, b"2");
    assert_eq!(item.flags, 7);

    send_all(&mut master, vec![Message::Goodbye]).await;

    let status = wait_until(&slave, |s| s.stats.graceful_disconnects == 1).await;
    assert!(!status.serving);
    assert!(matches!(slave.get("A"), Err(StoreError::NotReady)));
    assert_eq!(status.stats.failures, 0);
    assert_eq!(status.reconnects_in_window, 0);
    assert!(!status.given_up);
}

#[tokio::test]
async fn test_flapping_master_gives_up_until_reset() {
    let (listener, port) = listen().await;
    let (slave, _kv) = start_slave(port, fast_backoff());

    // Initial connect plus six recoveries, each dropped right after the handshake
    for _ in 0..7 {
        let mut master = accept_slave(&listener).await;
        send_all(&mut master, vec![Message::Hello(Hello::new(1))]).await;
        // Let the slave see the hello before the close
        wait_until(&slave, |s| s.serving).await;
        drop(master);
    }

    let status = wait_until(&slave, |s| s.given_up).await;
    assert!(!status.serving);
    assert!(!status.reconnect_pending);
    assert_eq!(status.stats.handshakes, 7);

    // Nothing reconnects while given up
    let attempts = status.stats.connect_attempts;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(slave.status().stats.connect_attempts, attempts);

    let reply = slave.failover_reset().await.unwrap();
    assert!(reply.contains(&format!("127.0.0.1:{}", port)));

    let mut master = accept_slave(&listener).await;
    send_all(&mut master, vec![Message::Hello(Hello::new(1))]).await;

    // Counted as a recovery from the failure that preceded the give-up
    let status = wait_until(&slave, |s| s.serving && s.stats.handshakes == 8).await;
    assert!(!status.given_up);
    assert_eq!(status.reconnects_in_window, 1);
}

#[tokio::test]
async fn test_new_master() {
    let (first, first_port) = listen().await;
    let (second, second_port) = listen().await;
    let (slave, _kv) = start_slave(first_port, fast_backoff());

    let mut old_master = accept_slave(&first).await;
    send_all(&mut old_master, vec![Message::Hello(Hello::new(1))]).await;
    wait_until(&slave, |s| s.serving).await;

    let err = slave.new_master("127.0.0.1").await.unwrap_err();
    assert!(matches!(err, ReplicationError::InvalidControlArgs(_)));
    let err = slave.new_master("127.0.0.1 notaport").await.unwrap_err();
    assert!(matches!(err, ReplicationError::InvalidControlArgs(_)));
    assert_eq!(slave.status().master, format!("127.0.0.1:{}", first_port));
    assert!(slave.is_serving());

    let reply = slave
        .new_master(&format!("127.0.0.1 {}", second_port))
        .await
        .unwrap();
    assert!(reply.contains(&format!("127.0.0.1:{}", second_port)));

    let mut new_master = accept_slave(&second).await;
    send_all(
        &mut new_master,
        vec![
            Message::Hello(Hello::new(2)),
            Message::Backfill {
                key: "moved".to_string(),
                value: b"yes".to_vec(),
                flags: 0,
                exptime: 0,
            },
        ],
    )
    .await;

    let status = wait_until(&slave, |s| s.serving && s.stats.backfilled_keys == 1).await;
    assert_eq!(status.master, format!("127.0.0.1:{}", second_port));
    assert_eq!(status.master_database_created, Some(2));
    assert_eq!(status.stats.failures, 0);
    assert_eq!(slave.get("moved").unwrap().unwrap().value, b"yes");
}

#[tokio::test]
async fn test_unreachable_master_is_retried() {
    // Bind then drop so nothing listens on the port
    let port = {
        let (listener, port) = listen().await;
        drop(listener);
        port
    };
    let (slave, _kv) = start_slave(port, fast_backoff());

    let status = wait_until(&slave, |s| s.stats.connect_attempts >= 3).await;
    assert!(!status.serving);
    assert!(!status.given_up);
    assert!(matches!(slave.get("any"), Err(StoreError::NotReady)));
}

#[tokio::test]
async fn test_store_untouched_while_not_serving() {
    let port = {
        let (listener, port) = listen().await;
        drop(listener);
        port
    };
    let (slave, kv) = start_slave(port, fast_backoff());
    kv.set("n", b"5".to_vec(), 3, 0).unwrap();
    let cas = kv.get_cas("n").unwrap().unwrap().cas.unwrap();
    let before = kv.stats();

    assert!(!slave.is_serving());
    assert!(matches!(slave.get("n"), Err(StoreError::NotReady)));
    assert!(matches!(slave.get_cas("n"), Err(StoreError::NotReady)));
    assert!(matches!(
        slave.set("new", b"x".to_vec(), 0, 0),
        Err(StoreError::NotReady)
    ));
    assert!(matches!(
        slave.add("new", b"x".to_vec(), 0, 0),
        Err(StoreError::NotReady)
    ));
    assert!(matches!(
        slave.replace("n", b"x".to_vec(), 0, 0),
        Err(StoreError::NotReady)
    ));
    assert!(matches!(
        slave.cas("n", b"x".to_vec(), 0, 0, cas),
        Err(StoreError::NotReady)
    ));
    assert!(matches!(slave.incr("n", 1), Err(StoreError::NotReady)));
    assert!(matches!(slave.decr("n", 1), Err(StoreError::NotReady)));
    assert!(matches!(
        slave.append("n", b"0".to_vec()),
        Err(StoreError::NotReady)
    ));
    assert!(matches!(
        slave.prepend("n", b"1".to_vec()),
        Err(StoreError::NotReady)
    ));
    assert!(matches!(slave.delete("n"), Err(StoreError::NotReady)));

    // None of the calls reached the local store
    let after = kv.stats();
    assert_eq!(after.gets, before.gets);
    assert_eq!(after.sets, before.sets);
    assert_eq!(after.dels, before.dels);

    let item = kv.get_cas("n").unwrap().unwrap();
    assert_eq!(item.value, b"5");
    assert_eq!(item.flags, 3);
    assert_eq!(item.cas, Some(cas));
    assert!(kv.get("new").unwrap().is_none());
}

#[tokio::test]
async fn test_shutdown() {
    let (listener, port) = listen().await;
    let (slave, kv) = start_slave(port, BackoffConfig::default());

    let mut master = accept_slave(&listener).await;
    send_all(
        &mut master,
        vec![
            Message::Hello(Hello::new(1)),
            Message::Set {
                key: "k".to_string(),
                value: b"v".to_vec(),
                flags: 0,
                exptime: 0,
            },
        ],
    )
    .await;
    wait_until(&slave, |s| s.stats.messages_applied == 1).await;

    slave.shutdown().await;

    let status = slave.status();
    assert_eq!(status.state, SlaveConnectionState::ShuttingDown);
    assert!(!status.serving);
    assert!(!status.reconnect_pending);
    assert!(matches!(slave.get("k"), Err(StoreError::NotReady)));
    assert!(matches!(
        slave.failover_reset().await,
        Err(ReplicationError::SlaveStopped)
    ));

    // The local store stays readable through its own handle
    assert_eq!(kv.get("k").unwrap().unwrap().value, b"v");
}
