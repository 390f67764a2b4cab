use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::BufReader;
use tokio::sync::Mutex;
use tracing::warn;

/// Receives every line a process writes, stamped with its capture time.
#[async_trait]
pub trait LineConsumer: Send + Sync {
    async fn on_stdout(&self, line: &str, time: DateTime<Utc>);

    async fn on_stderr(&self, line: &str, time: DateTime<Utc>);

    /// Called once, after both streams reached EOF.
    async fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn label(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Reads a process's stdout and stderr concurrently, line by line, and
/// hands each line to the registered consumers in registration order.
pub struct OutputPumper<O, E> {
    stdout: O,
    stderr: E,
    consumers: Vec<Arc<dyn LineConsumer>>,
    gate: Arc<Mutex<()>>,
}

impl<O, E> OutputPumper<O, E>
where
    O: AsyncRead + Unpin + Send,
    E: AsyncRead + Unpin + Send,
{
    pub fn new(stdout: O, stderr: E) -> Self {
        Self {
            stdout,
            stderr,
            consumers: Vec::new(),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Shares the lock held while a line is stamped and dispatched. Whoever
    /// else holds it knows no line is in flight.
    pub fn with_gate(mut self, gate: Arc<Mutex<()>>) -> Self {
        self.gate = gate;
        self
    }

    pub fn add_consumer(&mut self, consumer: Arc<dyn LineConsumer>) {
        self.consumers.push(consumer);
    }

    pub fn with_consumer(mut self, consumer: Arc<dyn LineConsumer>) -> Self {
        self.add_consumer(consumer);
        self
    }

    /// Pumps until both streams close, then closes every consumer.
    pub async fn pump(self) {
        let Self {
            stdout,
            stderr,
            consumers,
            gate,
        } = self;

        // Both readers stamp and dispatch under the gate, so consumers see
        // non-decreasing timestamps across streams.
        tokio::join!(
            read_lines(stdout, Stream::Stdout, &consumers, &gate),
            read_lines(stderr, Stream::Stderr, &consumers, &gate),
        );

        for consumer in &consumers {
            consumer.close().await;
        }
    }
}

async fn read_lines<R>(
    reader: R,
    stream: Stream,
    consumers: &[Arc<dyn LineConsumer>],
    gate: &Mutex<()>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = decode_line(&buf);
                let _guard = gate.lock().await;
                let time = Utc::now();
                for consumer in consumers {
                    match stream {
                        Stream::Stdout => consumer.on_stdout(&line, time).await,
                        Stream::Stderr => consumer.on_stderr(&line, time).await,
                    }
                }
            }
            Err(err) => {
                warn!(stream = stream.label(), "failed to read process output: {err}");
                break;
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let trimmed = raw.strip_suffix(b"\n").unwrap_or(raw);
    let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
    String::from_utf8_lossy(trimmed).into_owned()
}
