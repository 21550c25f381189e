//! Append-only capture buffer for a child's combined output.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// One captured line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub stream: LogStream,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Lines are only ever appended; a cursor is an index into the buffer.
///
/// Shared between the capture tasks and the supervisor, and kept alive by
/// the handle after the process is gone.
#[derive(Debug, Default)]
pub struct LogBuffer {
    lines: Mutex<Vec<LogLine>>,
    appended: Notify,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lines(&self) -> MutexGuard<'_, Vec<LogLine>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, stream: LogStream, text: impl Into<String>) {
        self.lines().push(LogLine {
            stream,
            text: text.into(),
            at: Utc::now(),
        });
        self.appended.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.lines().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines().is_empty()
    }

    /// Search lines at or after `cursor` for `needle`.
    ///
    /// Returns the index just past the first matching line, if any.
    pub fn find_from(&self, cursor: usize, needle: &str) -> Option<usize> {
        self.lines()
            .iter()
            .enumerate()
            .skip(cursor)
            .find(|(_, line)| line.text.contains(needle))
            .map(|(index, _)| index + 1)
    }

    pub fn lines_from(&self, cursor: usize) -> Vec<LogLine> {
        self.lines().iter().skip(cursor).cloned().collect()
    }

    /// Whole log as text, one line per entry, stderr lines tagged.
    pub fn snapshot(&self) -> String {
        let lines = self.lines();
        let mut out = String::new();
        for line in lines.iter() {
            if line.stream == LogStream::Stderr {
                out.push_str("[stderr] ");
            }
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }

    /// Wait until another line is appended.
    pub async fn appended(&self) {
        self.appended.notified().await;
    }
}

/// Spawn a task copying `reader` line by line into `buffer`.
///
/// Lines are decoded lossily so binary output cannot end the capture. If a
/// read fails the rest of the pipe is drained unrecorded, keeping the writer
/// from seeing a closed pipe.
pub(crate) fn capture<R>(
    reader: R,
    stream: LogStream,
    buffer: std::sync::Arc<LogBuffer>,
    label: String,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&raw);
                    tracing::trace!(source = %label, ?stream, line = %line, "captured");
                    buffer.push(stream, line);
                }
                Err(err) => {
                    tracing::debug!(source = %label, error = %err, "log capture failed, draining");
                    let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                    break;
                }
            }
        }
    })
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
