//! Byte-stream framing: accumulates reads into a line buffer, tokenizes
//! complete `\n`-terminated lines, and drives a `CommandEngine`.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::metrics::MetricsSink;
use crate::session::engine::CommandEngine;
use crate::store::QueueStore;

/// Whether a session echoes each received line back to the client before
/// acting on it. Fixed at `true`; there is no CLI surface to toggle it.
const ECHO_ENABLED: bool = true;

const READ_CHUNK: usize = 8192;

/// Drives one client connection to completion: reads until EOF/reset (quiet
/// termination) or another I/O error (logged termination), feeding each
/// complete line to a fresh `CommandEngine`.
pub async fn run_session<S>(mut stream: S, store: Arc<QueueStore>, metrics: Arc<MetricsSink>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    metrics.increment("session.count", 1);

    let mut engine = CommandEngine::new(store, metrics.clone());
    let mut read_buf = vec![0u8; READ_CHUNK];
    let mut pending = Vec::new();

    loop {
        let n = match stream.read(&mut read_buf).await {
            Ok(0) => break, // EOF
            Ok(n) => n,
            Err(error) => {
                if is_quiet_disconnect(&error) {
                    tracing::debug!(%error, "session ended");
                } else {
                    tracing::warn!(%error, "session read error");
                }
                break;
            }
        };

        metrics.increment("session.reads", 1);
        pending.extend_from_slice(&read_buf[..n]);

        if let Err(error) = process_buffered_lines(&mut pending, &mut engine, &mut stream, &metrics).await {
            tracing::warn!(%error, "session write error");
            break;
        }
    }
}

async fn process_buffered_lines<S>(
    pending: &mut Vec<u8>,
    engine: &mut CommandEngine,
    stream: &mut S,
    metrics: &MetricsSink,
) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut start = 0;
    while let Some(rel_newline) = pending[start..].iter().position(|&b| b == b'\n') {
        let end = start + rel_newline + 1; // include the newline itself
        let line = &pending[start..end];

        metrics.increment("session.lines", 1);

        if ECHO_ENABLED {
            stream.write_all(line).await?;
        }

        let tokens = tokenize(line);
        engine.run_line(&tokens, stream).await?;

        start = end;
    }

    pending.drain(..start);
    Ok(())
}

/// Splits on ASCII space and newline, matching
/// `boost::tokenizer` with `char_separator<char>{" \n"}` in `session.h`:
/// runs of separators collapse and no empty tokens are produced.
fn tokenize(line: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(line)
        .split(|c: char| c == ' ' || c == '\n')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_quiet_disconnect(error: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        error.kind(),
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn tokenize_collapses_separators() {
        let tokens = tokenize(b"USE   q1  NEW\n");
        assert_eq!(tokens, vec!["USE", "q1", "NEW"]);
    }

    #[test]
    fn tokenize_empty_line_yields_no_tokens() {
        assert!(tokenize(b"\n").is_empty());
        assert!(tokenize(b"   \n").is_empty());
    }

    #[tokio::test]
    async fn echoes_and_responds_over_a_duplex_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(QueueStore::new(dir.path()));
        let metrics = Arc::new(MetricsSink::new());

        let (mut client, server) = duplex(8192);
        let session = tokio::spawn(run_session(server, store, metrics));

        client.write_all(b"USE q1 NEW\n").await.unwrap();

        let mut buf = vec![0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"USE q1 NEW\nOK\n");

        drop(client);
        session.await.unwrap();
    }
}
