//! Per-session command state machine: a validate phase that turns raw
//! tokens into a tagged `Command`, and an execute phase that runs it
//! against the selected queue.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::metrics::MetricsSink;
use crate::queue::Queue;
use crate::store::QueueStore;

const KNOWN_COMMANDS: &[&str] = &["USE", "LIST", "QUEUE", "PUSH", "POP", "DUMP", "HELP"];

const HELP_TEXT: &str = "\
USE queue_name [pos] - switch to named queue and set specified position to continue after, pos may be number, 'FIRST', 'LAST' or 'NEW'\n\
LIST - respond with names, sizes, 1st and last positions of queues\n\
QUEUE - respond with current queue and first, last, current positions\n\
PUSH data - add data after last record. do not move cursor\n\
POP - respond with data at cursor position. move cursor forward. error if it was last position\n\
DUMP - respond with every queue's full contents\n\
HELP - print this text\n\
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UsePosition {
    First,
    Last,
    New,
    Explicit(u64),
}

#[derive(Debug)]
enum Command {
    Use { name: String, pos: Option<UsePosition> },
    List,
    Queue,
    Push { items: Vec<String> },
    Pop,
    Dump,
    Help,
}

/// Per-session state: the metrics sink, a handle to the store, the
/// currently selected queue (if any), and the cursor position within it.
pub struct CommandEngine {
    store: Arc<QueueStore>,
    metrics: Arc<MetricsSink>,
    selected: Option<(String, Arc<Mutex<Queue>>)>,
    cursor: u64,
}

impl CommandEngine {
    pub fn new(store: Arc<QueueStore>, metrics: Arc<MetricsSink>) -> Self {
        Self {
            store,
            metrics,
            selected: None,
            cursor: 0,
        }
    }

    /// Tokenizes and runs one already-tokenized command line, writing its
    /// response (including the trailing `OK`/`ERR ...` status line) to
    /// `writer`. A returned `Err` means the transport itself failed and the
    /// session must terminate without attempting to notify the peer.
    pub async fn run_line(
        &mut self,
        tokens: &[String],
        writer: &mut (impl AsyncWrite + Unpin),
    ) -> io::Result<()> {
        if tokens.is_empty() {
            self.metrics.increment("session.errors.empty", 1);
            return write_line(writer, "ERR no command").await;
        }

        let cmd_name = tokens[0].to_ascii_uppercase();
        let args = &tokens[1..];

        if !KNOWN_COMMANDS.contains(&cmd_name.as_str()) {
            self.metrics.increment("session.errors.unknown", 1);
            return write_line(writer, "ERR unknown command").await;
        }

        match self.parse(&cmd_name, args) {
            Err(message) => {
                self.metrics.increment(format!("session.errors.{cmd_name}"), 1);
                write_line(writer, &format!("ERR {message}")).await
            }
            Ok(command) => {
                let outcome = self.execute(command, writer).await?;
                if outcome.is_empty() {
                    self.metrics.increment(format!("session.successes.{cmd_name}"), 1);
                    write_line(writer, "OK").await
                } else {
                    self.metrics.increment(format!("session.errors.{cmd_name}"), 1);
                    write_line(writer, &format!("ERR {outcome}")).await
                }
            }
        }
    }

    fn parse(&self, cmd_name: &str, args: &[String]) -> Result<Command, String> {
        match cmd_name {
            "USE" => parse_use(args),
            "LIST" => Ok(Command::List),
            "QUEUE" => self.require_selected().map(|()| Command::Queue),
            "PUSH" => self
                .require_selected()
                .map(|()| Command::Push { items: args.to_vec() }),
            "POP" => self.require_selected().map(|()| Command::Pop),
            "DUMP" => Ok(Command::Dump),
            "HELP" => Ok(Command::Help),
            _ => unreachable!("caller already rejected unknown commands"),
        }
    }

    fn require_selected(&self) -> Result<(), String> {
        if self.selected.is_none() {
            Err("queue not selected".to_string())
        } else {
            Ok(())
        }
    }

    async fn execute(
        &mut self,
        command: Command,
        writer: &mut (impl AsyncWrite + Unpin),
    ) -> io::Result<String> {
        match command {
            Command::Use { name, pos } => Ok(self.exec_use(name, pos).await),
            Command::List => self.exec_list(writer).await,
            Command::Queue => self.exec_queue(writer).await,
            Command::Push { items } => Ok(self.exec_push(items).await),
            Command::Pop => self.exec_pop(writer).await,
            Command::Dump => self.exec_dump(writer).await,
            Command::Help => {
                write_all(writer, HELP_TEXT).await?;
                Ok(String::new())
            }
        }
    }

    async fn exec_use(&mut self, name: String, pos: Option<UsePosition>) -> String {
        let handle = self.store.queue(&name);
        let cursor = {
            let queue = handle.lock().await;
            if queue.empty() {
                0
            } else {
                match pos {
                    None | Some(UsePosition::First) => queue.first(),
                    Some(UsePosition::Last) => queue.last(),
                    Some(UsePosition::New) => queue.last() + 1,
                    Some(UsePosition::Explicit(v)) => v,
                }
            }
        };

        self.selected = Some((name, handle));
        self.cursor = cursor;
        String::new()
    }

    async fn exec_list(&self, writer: &mut (impl AsyncWrite + Unpin)) -> io::Result<String> {
        for name in self.store.queue_names() {
            let handle = self.store.queue(&name);
            let queue = handle.lock().await;
            write_all(writer, &queue_summary_line(&name, &queue)).await?;
        }
        Ok(String::new())
    }

    async fn exec_queue(&self, writer: &mut (impl AsyncWrite + Unpin)) -> io::Result<String> {
        let (name, handle) = {
            let selected = self.selected.as_ref().expect("validated by require_selected");
            (selected.0.clone(), selected.1.clone())
        };
        let queue = handle.lock().await;

        let line = if queue.empty() {
            format!("{name}\t\t\n")
        } else {
            format!("{name}\t{}\t{}\t{}\n", queue.first(), queue.last(), self.cursor)
        };
        write_all(writer, &line).await?;
        Ok(String::new())
    }

    async fn exec_push(&mut self, items: Vec<String>) -> String {
        let handle = self
            .selected
            .as_ref()
            .expect("validated by require_selected")
            .1
            .clone();
        let mut queue = handle.lock().await;

        for (idx, item) in items.iter().enumerate() {
            if queue.push(item).await.is_err() {
                return format!("can't store data part {}", idx + 1);
            }
            tokio::task::yield_now().await;
        }
        String::new()
    }

    async fn exec_pop(&mut self, writer: &mut (impl AsyncWrite + Unpin)) -> io::Result<String> {
        let handle = self
            .selected
            .as_ref()
            .expect("validated by require_selected")
            .1
            .clone();
        let mut queue = handle.lock().await;

        if queue.empty() {
            return Ok("queue empty".to_string());
        }
        if self.cursor > queue.last() {
            return Ok("no new data".to_string());
        }
        if self.cursor < queue.first() {
            return Ok("data lost in cursor position".to_string());
        }

        let record = queue
            .at(self.cursor)
            .await
            .expect("cursor bounds already checked against first()/last()");
        drop(queue);

        write_all(writer, &format!("{}\t{}\n", record.pos, record.data)).await?;
        self.cursor += 1;
        Ok(String::new())
    }

    async fn exec_dump(&self, writer: &mut (impl AsyncWrite + Unpin)) -> io::Result<String> {
        let names = self.store.queue_names();
        for (idx, name) in names.iter().enumerate() {
            if idx > 0 {
                write_all(writer, "\n").await?;
            }

            let handle = self.store.queue(name);
            let mut queue = handle.lock().await;
            write_all(writer, &queue_summary_line(name, &queue)).await?;

            if !queue.empty() {
                let (first, last) = (queue.first(), queue.last());
                for pos in first..=last {
                    let record = queue.at(pos).await.expect("pos within [first(), last()]");
                    write_all(writer, &format!("{}\t{}\n", record.pos, record.data)).await?;
                }
            }
        }
        write_all(writer, "\n").await?;
        Ok(String::new())
    }
}

fn queue_summary_line(name: &str, queue: &Queue) -> String {
    if queue.empty() {
        format!("{name}\t\t\n")
    } else {
        format!("{name}\t{}\t{}\n", queue.first(), queue.last())
    }
}

fn parse_use(args: &[String]) -> Result<Command, String> {
    if args.is_empty() {
        return Err("not enough argument".to_string());
    }

    let name = &args[0];
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("invalid queue name".to_string());
    }

    let pos = match args.get(1) {
        None => None,
        Some(token) => {
            if let Ok(value) = token.parse::<u64>() {
                Some(UsePosition::Explicit(value))
            } else {
                match token.to_ascii_uppercase().as_str() {
                    "FIRST" => Some(UsePosition::First),
                    "LAST" => Some(UsePosition::Last),
                    "NEW" => Some(UsePosition::New),
                    _ => {
                        return Err(
                            "queue pos must have positive integer, 'NEW', 'LAST' or 'FIRST' value"
                                .to_string(),
                        )
                    }
                }
            }
        }
    };

    Ok(Command::Use {
        name: name.clone(),
        pos,
    })
}

async fn write_all(writer: &mut (impl AsyncWrite + Unpin), s: &str) -> io::Result<()> {
    writer.write_all(s.as_bytes()).await
}

async fn write_line(writer: &mut (impl AsyncWrite + Unpin), s: &str) -> io::Result<()> {
    writer.write_all(s.as_bytes()).await?;
    writer.write_all(b"\n").await
}
