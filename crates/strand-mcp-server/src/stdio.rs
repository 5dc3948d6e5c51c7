//! Line-delimited JSON-RPC over a process's standard streams.
//!
//! The transport reads newline-terminated messages from the peer, runs each
//! through the strict validator and the message processor, and writes the
//! reply back as one line. The peer's stderr is collected into a bounded
//! diagnostic log and is never part of the protocol.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use strand_mcp_json_rpc::validator::DEFAULT_MAX_MESSAGE_SIZE;
use strand_mcp_json_rpc::{MessageValidator, Strictness, ValidationError};

use crate::metadata::TransportMetadata;
use crate::processor::MessageProcessor;
use crate::transport::{McpTransport, StateCell, TransportError, TransportState, malformed_reply};

const TRANSPORT: &str = "stdio";
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct StdioConfig {
    /// Budget for one `run` loop read before liveness is re-checked.
    pub read_timeout: Duration,
    /// Budget for writing and flushing one message.
    pub write_timeout: Duration,
    /// Pause between write attempts that made no progress.
    pub write_retry_delay: Duration,
    /// Diagnostic lines kept from the peer's stderr.
    pub max_stderr_entries: usize,
    pub max_message_size: usize,
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(5),
            write_retry_delay: Duration::from_millis(10),
            max_stderr_entries: 100,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl StdioConfig {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_max_stderr_entries(mut self, entries: usize) -> Self {
        self.max_stderr_entries = entries;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The peer's streams as seen from the transport.
pub struct StdioPipes {
    /// Where replies go (the child's stdin).
    pub writer: BoxedWriter,
    /// Where messages come from (the child's stdout).
    pub reader: BoxedReader,
    /// The child's stderr, if captured.
    pub diagnostics: Option<BoxedReader>,
}

/// A process whose standard streams carry the protocol. Spawning and
/// reaping the process is the owner's business.
pub trait ProcessHandle: Send {
    /// Hand over the pipes. Called once, on start.
    fn take_pipes(&mut self) -> io::Result<StdioPipes>;

    fn is_running(&mut self) -> bool;
}

impl ProcessHandle for tokio::process::Child {
    fn take_pipes(&mut self) -> io::Result<StdioPipes> {
        let not_piped = |stream: &str| {
            io::Error::new(io::ErrorKind::BrokenPipe, format!("child {} is not piped", stream))
        };
        let writer = self.stdin.take().ok_or_else(|| not_piped("stdin"))?;
        let reader = self.stdout.take().ok_or_else(|| not_piped("stdout"))?;
        let diagnostics = self.stderr.take().map(|s| Box::new(s) as BoxedReader);
        Ok(StdioPipes {
            writer: Box::new(writer),
            reader: Box::new(reader),
            diagnostics,
        })
    }

    fn is_running(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }
}

/// This process's own stdin and stdout, for serving as a child.
#[derive(Debug, Default)]
pub struct CurrentProcess {
    taken: bool,
}

impl ProcessHandle for CurrentProcess {
    fn take_pipes(&mut self) -> io::Result<StdioPipes> {
        if self.taken {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "stdio already taken"));
        }
        self.taken = true;
        Ok(StdioPipes {
            writer: Box::new(tokio::io::stdout()),
            reader: Box::new(tokio::io::stdin()),
            diagnostics: None,
        })
    }

    fn is_running(&mut self) -> bool {
        true
    }
}

struct LineReader {
    reader: BoxedReader,
    buffer: Vec<u8>,
    eof: bool,
    /// Skipping the rest of an oversized line.
    discarding: bool,
}

impl LineReader {
    fn new(reader: BoxedReader) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            eof: false,
            discarding: false,
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        Some(self.buffer.drain(..=pos).collect())
    }
}

struct DiagnosticsReader {
    reader: BoxedReader,
    partial: Vec<u8>,
}

pub struct StdioTransport<P: ProcessHandle> {
    process: Mutex<P>,
    reader: tokio::sync::Mutex<Option<LineReader>>,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    diagnostics: tokio::sync::Mutex<Option<DiagnosticsReader>>,
    stderr_log: Mutex<VecDeque<String>>,
    state: StateCell,
    validator: MessageValidator,
    processor: MessageProcessor,
    metadata: TransportMetadata,
    config: StdioConfig,
}

impl<P: ProcessHandle> StdioTransport<P> {
    pub fn new(process: P, processor: MessageProcessor, metadata: TransportMetadata) -> Self {
        Self::with_config(process, processor, metadata, StdioConfig::default())
    }

    pub fn with_config(
        process: P,
        processor: MessageProcessor,
        metadata: TransportMetadata,
        config: StdioConfig,
    ) -> Self {
        Self {
            process: Mutex::new(process),
            reader: tokio::sync::Mutex::new(None),
            writer: tokio::sync::Mutex::new(None),
            diagnostics: tokio::sync::Mutex::new(None),
            stderr_log: Mutex::new(VecDeque::new()),
            state: StateCell::new(TRANSPORT),
            validator: MessageValidator::default().with_max_message_size(config.max_message_size),
            processor,
            metadata,
            config,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state.get()
    }

    pub fn config(&self) -> &StdioConfig {
        &self.config
    }

    /// Next complete line, without its `\n` or trailing `\r`.
    ///
    /// Returns `Ok(None)` when no complete line arrives within `timeout`;
    /// partial input stays buffered. At end of stream any unterminated rest
    /// is returned as a line, after which [`TransportError::Closed`] is
    /// raised.
    pub async fn read_line(&self, timeout: Duration) -> Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        let limit = self.config.max_message_size + 2;

        let mut guard = self.reader.lock().await;
        let line = guard
            .as_mut()
            .ok_or(TransportError::NotRunning { transport: TRANSPORT })?;

        loop {
            if line.discarding {
                match line.take_line() {
                    Some(_) => line.discarding = false,
                    None => line.buffer.clear(),
                }
            }
            if !line.discarding {
                if let Some(bytes) = line.take_line() {
                    return decode_line(bytes).map(Some);
                }
                if line.buffer.len() > limit {
                    let size = line.buffer.len();
                    line.buffer.clear();
                    line.discarding = true;
                    return Err(TransportError::MalformedMessage {
                        transport: TRANSPORT,
                        source: ValidationError::TooLarge {
                            size,
                            limit: self.config.max_message_size,
                        },
                    });
                }
            }
            if line.eof {
                if line.buffer.is_empty() {
                    return Err(TransportError::Closed { transport: TRANSPORT });
                }
                let rest = std::mem::take(&mut line.buffer);
                return decode_line(rest).map(Some);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let mut chunk = [0u8; READ_CHUNK];
            match tokio::time::timeout(remaining, line.reader.read(&mut chunk)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => line.eof = true,
                Ok(Ok(n)) => line.buffer.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(source)) => {
                    return Err(TransportError::Io {
                        transport: TRANSPORT,
                        source,
                    });
                }
            }
        }
    }

    /// Write `message` as one line and flush it within the write timeout.
    pub async fn write_line(&self, message: &str) -> Result<(), TransportError> {
        let mut payload = message.as_bytes().to_vec();
        if payload.last() != Some(&b'\n') {
            payload.push(b'\n');
        }

        let write_timeout = self.config.write_timeout;
        let deadline = Instant::now() + write_timeout;
        let timed_out = |operation| TransportError::Timeout {
            transport: TRANSPORT,
            operation,
            after: write_timeout,
        };

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or(TransportError::NotRunning { transport: TRANSPORT })?;

        let mut offset = 0;
        while offset < payload.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out("write"));
            }
            match tokio::time::timeout(remaining, writer.write(&payload[offset..])).await {
                Err(_) => return Err(timed_out("write")),
                Ok(Ok(0)) => tokio::time::sleep(self.config.write_retry_delay.min(remaining)).await,
                Ok(Ok(n)) => offset += n,
                Ok(Err(e))
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) =>
                {
                    tokio::time::sleep(self.config.write_retry_delay.min(remaining)).await
                }
                Ok(Err(source)) => {
                    return Err(TransportError::Io {
                        transport: TRANSPORT,
                        source,
                    });
                }
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, writer.flush()).await {
            Err(_) => Err(timed_out("flush")),
            Ok(Err(source)) => Err(TransportError::Io {
                transport: TRANSPORT,
                source,
            }),
            Ok(Ok(())) => Ok(()),
        }
    }

    /// Move whatever stderr output is ready into the diagnostic log without
    /// waiting for more.
    pub fn drain_stderr(&self) {
        let Ok(mut guard) = self.diagnostics.try_lock() else {
            return;
        };
        let Some(diagnostics) = guard.as_mut() else {
            return;
        };

        let mut lines = Vec::new();
        let mut closed = false;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match diagnostics.reader.read(&mut chunk).now_or_never() {
                None => break,
                Some(Ok(0)) => {
                    closed = true;
                    break;
                }
                Some(Ok(n)) => {
                    diagnostics.partial.extend_from_slice(&chunk[..n]);
                    while let Some(pos) = diagnostics.partial.iter().position(|b| *b == b'\n') {
                        let bytes: Vec<u8> = diagnostics.partial.drain(..=pos).collect();
                        lines.push(String::from_utf8_lossy(&bytes).trim_end().to_string());
                    }
                }
                Some(Err(e)) => {
                    debug!(transport = TRANSPORT, error = %e, "stderr read failed");
                    closed = true;
                    break;
                }
            }
        }

        if closed {
            if !diagnostics.partial.is_empty() {
                lines.push(String::from_utf8_lossy(&diagnostics.partial).trim_end().to_string());
            }
            *guard = None;
        }
        for line in lines {
            self.record_stderr(line);
        }
    }

    fn record_stderr(&self, line: String) {
        debug!(transport = TRANSPORT, stderr = %line, "peer stderr");
        let mut log = self.stderr_log.lock();
        log.push_back(line);
        while log.len() > self.config.max_stderr_entries {
            log.pop_front();
        }
    }

    /// Snapshot of the collected stderr lines, oldest first.
    pub fn stderr_log(&self) -> Vec<String> {
        self.stderr_log.lock().iter().cloned().collect()
    }

    /// Serve until the peer closes its output, the process dies or an I/O
    /// error occurs. Starts the transport if needed and stops it on exit.
    pub async fn run(&self) -> Result<(), TransportError> {
        if self.state.get() == TransportState::Stopped {
            self.start().await?;
        }
        let outcome = self.serve().await;
        if self.state.get() == TransportState::Running {
            self.stop().await?;
        }
        outcome
    }

    async fn serve(&self) -> Result<(), TransportError> {
        loop {
            self.drain_stderr();
            if self.state.get() != TransportState::Running {
                return Ok(());
            }

            match self.read_line(self.config.read_timeout).await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Some(reply) = self.handle_message(&line).await? {
                        self.write_line(&reply).await?;
                    }
                }
                Ok(None) => {
                    let alive = self.process.lock().is_running();
                    if !alive {
                        warn!(transport = TRANSPORT, "Process exited, stopping");
                        return Err(TransportError::Closed { transport: TRANSPORT });
                    }
                }
                Err(TransportError::Closed { .. }) => {
                    info!(transport = TRANSPORT, "Peer closed its output");
                    return Ok(());
                }
                Err(TransportError::MalformedMessage { source, .. }) => {
                    let reply = malformed_reply(TRANSPORT, source);
                    self.write_line(&reply).await?;
                }
                Err(e) => {
                    error!(transport = TRANSPORT, error = %e, "Stdio transport failed");
                    return Err(e);
                }
            }
        }
    }
}

fn decode_line(mut bytes: Vec<u8>) -> Result<String, TransportError> {
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8(bytes).map_err(|e| TransportError::MalformedMessage {
        transport: TRANSPORT,
        source: ValidationError::InvalidUtf8(e.utf8_error()),
    })
}

#[async_trait]
impl<P: ProcessHandle> McpTransport for StdioTransport<P> {
    fn transport_name(&self) -> &'static str {
        TRANSPORT
    }

    async fn start(&self) -> Result<(), TransportError> {
        self.state.transition(TransportState::Starting)?;

        let taken = self.process.lock().take_pipes();
        let pipes = match taken {
            Ok(pipes) => pipes,
            Err(source) => {
                self.state.transition(TransportState::Stopped)?;
                return Err(TransportError::Io {
                    transport: TRANSPORT,
                    source,
                });
            }
        };

        *self.reader.lock().await = Some(LineReader::new(pipes.reader));
        *self.writer.lock().await = Some(pipes.writer);
        *self.diagnostics.lock().await = pipes.diagnostics.map(|reader| DiagnosticsReader {
            reader,
            partial: Vec::new(),
        });

        self.state.transition(TransportState::Running)?;
        info!(transport = TRANSPORT, "Transport started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.state.transition(TransportState::Stopping)?;

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(transport = TRANSPORT, error = %e, "Closing writer failed");
            }
        }
        self.reader.lock().await.take();
        self.drain_stderr();
        self.diagnostics.lock().await.take();

        self.state.transition(TransportState::Stopped)?;
        info!(transport = TRANSPORT, "Transport stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.get() == TransportState::Running && self.process.lock().is_running()
    }

    async fn handle_message(&self, raw: &str) -> Result<Option<String>, TransportError> {
        if let Err(e) = self.validator.validate(raw.as_bytes(), Strictness::Strict) {
            return Ok(Some(malformed_reply(TRANSPORT, e)));
        }
        Ok(self.processor.process(raw, &self.metadata).await)
    }

    async fn send_message(&self, raw: &str) -> Result<(), TransportError> {
        self.state.require_running()?;
        self.write_line(raw).await
    }
}
