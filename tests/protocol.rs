//! Wire-protocol scenarios driven over a real loopback TCP socket, end to
//! end through `session::run_session`.

use std::sync::Arc;

use rq_broker::metrics::MetricsSink;
use rq_broker::session;
use rq_broker::store::QueueStore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_server(dir: &std::path::Path) -> std::net::SocketAddr {
    let store = Arc::new(QueueStore::load(dir).await.unwrap());
    let metrics = Arc::new(MetricsSink::new());
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let store = store.clone();
            let metrics = metrics.clone();
            tokio::spawn(session::run_session(socket, store, metrics));
        }
    });

    addr
}

async fn send(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).await.unwrap();
}

/// Reads until the connection has produced at least `min_lines` `\n`-terminated
/// lines, then returns everything read so far as a string.
async fn read_lines(stream: &mut TcpStream, min_lines: usize) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while buf.iter().filter(|&&b| b == b'\n').count() < min_lines {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before expected output arrived");
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8(buf).unwrap()
}

#[tokio::test]
async fn client_view_scenario_from_spec() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Echo is on, so every line sent is reflected back before the OK/ERR
    // status line. Each helper call below accounts for that.
    send(&mut stream, "USE q1 NEW\n").await;
    assert_eq!(read_lines(&mut stream, 2).await, "USE q1 NEW\nOK\n");

    send(&mut stream, "PUSH hello world\n").await;
    assert_eq!(read_lines(&mut stream, 2).await, "PUSH hello world\nOK\n");

    send(&mut stream, "LIST\n").await;
    assert_eq!(read_lines(&mut stream, 3).await, "LIST\nq1\t0\t1\nOK\n");

    send(&mut stream, "USE q1 FIRST\n").await;
    assert_eq!(read_lines(&mut stream, 2).await, "USE q1 FIRST\nOK\n");

    send(&mut stream, "POP\n").await;
    assert_eq!(read_lines(&mut stream, 3).await, "POP\n0\thello\nOK\n");

    send(&mut stream, "POP\n").await;
    assert_eq!(read_lines(&mut stream, 3).await, "POP\n1\tworld\nOK\n");

    send(&mut stream, "POP\n").await;
    assert_eq!(read_lines(&mut stream, 2).await, "POP\nERR no new data\n");

    send(&mut stream, "USE bad!name\n").await;
    assert_eq!(read_lines(&mut stream, 2).await, "USE bad!name\nERR invalid queue name\n");
}

#[tokio::test]
async fn push_before_use_is_rejected_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(&mut stream, "PUSH x\n").await;
    assert_eq!(read_lines(&mut stream, 2).await, "PUSH x\nERR queue not selected\n");
}

#[tokio::test]
async fn two_sessions_both_see_every_pushed_record() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(dir.path()).await;

    let mut writer = TcpStream::connect(addr).await.unwrap();
    send(&mut writer, "USE shared NEW\n").await;
    read_lines(&mut writer, 2).await;
    send(&mut writer, "PUSH only\n").await;
    read_lines(&mut writer, 2).await;

    // The cursor lives in the session, not the queue: two independent
    // readers both observe the same record from the start.
    for _ in 0..2 {
        let mut reader = TcpStream::connect(addr).await.unwrap();
        send(&mut reader, "USE shared FIRST\n").await;
        read_lines(&mut reader, 2).await;
        send(&mut reader, "POP\n").await;
        assert_eq!(read_lines(&mut reader, 3).await, "POP\n0\tonly\nOK\n");
    }
}
