// src/protocol/codec.rs
// Framed newline-delimited JSON-RPC 2.0 codec (spec §4.1)
//
// Reads/writes one JSON message per line. The reader enforces MaxMessageSize
// *before* allocating unbounded memory for a single line, using the same
// fill_buf/consume pattern as the teacher's bounded IPC line reader
// (ipc/handler.rs) rather than `read_line`, which would buffer an entire
// oversized line before we could reject it.

use crate::error::CkbError;
use crate::protocol::message::Message;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Outcome of a single `read_message` call.
pub enum ReadOutcome {
    /// A well-formed message.
    Message(Message),
    /// The line was not valid JSON-RPC; carries the raw line for logging.
    Parse { line: String, error: String },
    /// End of stream: no more input will arrive.
    Eof,
}

/// Reads one newline-terminated JSON message at a time from `R`.
pub struct FramedReader<R> {
    inner: BufReader<R>,
    max_message_size: usize,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(reader: R, max_message_size: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max_message_size,
        }
    }

    /// Read and parse the next line. Returns `Eof` once the stream is
    /// exhausted. A line exceeding `max_message_size` is drained and reported
    /// as a [`ReadOutcome::Parse`] with a `ParseError`-shaped message, the
    /// connection stays usable for subsequent lines.
    pub async fn read_message(&mut self) -> std::io::Result<ReadOutcome> {
        let mut buf = String::new();
        let mut too_large = false;

        loop {
            let available = match self.inner.fill_buf().await {
                Ok([]) => return Ok(ReadOutcome::Eof),
                Ok(b) => b,
                Err(e) => return Err(e),
            };
            let newline_pos = available.iter().position(|&b| b == b'\n');
            let end = newline_pos.map(|p| p + 1).unwrap_or(available.len());

            if buf.len() + end > self.max_message_size {
                too_large = true;
                self.inner.consume(end);
                if newline_pos.is_some() {
                    break;
                }
                continue;
            }

            buf.push_str(&String::from_utf8_lossy(&available[..end]));
            self.inner.consume(end);
            if newline_pos.is_some() {
                break;
            }
        }

        if too_large {
            return Ok(ReadOutcome::Parse {
                line: String::new(),
                error: format!(
                    "message exceeds max size of {} bytes",
                    self.max_message_size
                ),
            });
        }

        let trimmed = buf.trim();
        if trimmed.is_empty() {
            // Blank lines between messages are tolerated; read the next one.
            return Box::pin(self.read_message()).await;
        }

        match serde_json::from_str::<Message>(trimmed) {
            Ok(m) => Ok(ReadOutcome::Message(m)),
            Err(e) => Ok(ReadOutcome::Parse {
                line: trimmed.to_string(),
                error: e.to_string(),
            }),
        }
    }
}

/// Single serialization point for outbound messages. Cloning shares the same
/// underlying writer and lock, so the main session loop and concurrent
/// streaming producer tasks can all hold a handle without ever interleaving
/// two messages on one line (spec §4.1, §4.9, §5).
#[derive(Clone)]
pub struct FramedWriter<W> {
    inner: Arc<Mutex<W>>,
}

impl<W: AsyncWrite + Unpin> FramedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub async fn write_message(&self, message: &Message) -> Result<(), CkbError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        let mut guard = self.inner.lock().await;
        guard.write_all(line.as_bytes()).await?;
        guard.flush().await?;
        Ok(())
    }
}

/// Type-erased handle to the single outbound serialization point. Lets the
/// dispatcher, streaming controller, and roots manager all hold a cheaply
/// cloneable sink without propagating the concrete stream type (`Stdout`,
/// `tokio::io::duplex` half, ...) through every module.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), CkbError>;
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> Outbound for FramedWriter<W> {
    async fn send(&self, message: &Message) -> Result<(), CkbError> {
        self.write_message(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::MessageId;

    #[tokio::test]
    async fn reads_one_message_per_line() {
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n".to_vec();
        let mut reader = FramedReader::new(std::io::Cursor::new(input), 1024);

        match reader.read_message().await.unwrap() {
            ReadOutcome::Message(m) => assert_eq!(m.method.as_deref(), Some("tools/list")),
            _ => panic!("expected message"),
        }
        match reader.read_message().await.unwrap() {
            ReadOutcome::Message(m) => assert_eq!(m.method.as_deref(), Some("ping")),
            _ => panic!("expected message"),
        }
        match reader.read_message().await.unwrap() {
            ReadOutcome::Eof => {}
            _ => panic!("expected eof"),
        }
    }

    #[tokio::test]
    async fn oversized_line_reports_parse_without_killing_stream() {
        let mut big = "x".repeat(100);
        big.push('\n');
        let good = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
        let input = format!("{big}{good}").into_bytes();
        let mut reader = FramedReader::new(std::io::Cursor::new(input), 32);

        match reader.read_message().await.unwrap() {
            ReadOutcome::Parse { error, .. } => assert!(error.contains("exceeds max size")),
            _ => panic!("expected parse failure"),
        }
        match reader.read_message().await.unwrap() {
            ReadOutcome::Message(m) => assert_eq!(m.method.as_deref(), Some("ping")),
            _ => panic!("expected message after recovering from oversized line"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_reported_as_parse() {
        let input = b"not json\n".to_vec();
        let mut reader = FramedReader::new(std::io::Cursor::new(input), 1024);
        match reader.read_message().await.unwrap() {
            ReadOutcome::Parse { line, .. } => assert_eq!(line, "not json"),
            _ => panic!("expected parse failure"),
        }
    }

    #[tokio::test]
    async fn writer_appends_single_trailing_newline() {
        let cursor = std::io::Cursor::new(Vec::<u8>::new());
        let writer = FramedWriter::new(cursor);
        let msg = Message::result_response(MessageId::Number(1), serde_json::json!({"a": 1}));
        writer.write_message(&msg).await.unwrap();
        let guard = writer.inner.lock().await;
        let written = guard.get_ref();
        assert_eq!(written.iter().filter(|&&b| b == b'\n').count(), 1);
        assert!(written.ends_with(b"\n"));
    }
}
