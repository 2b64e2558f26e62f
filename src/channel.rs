//! Duplex text channel to one peer process.
//!
//! A channel is a reader/writer pair attached to either two named files
//! (usually FIFOs created by the peer) or a TCP stream. Opening retries at a
//! fixed interval until the peer side exists. When the link drops mid-run the
//! channel reopens itself with exponential backoff and reports
//! [`MatsyaError::Disconnected`] so the caller can skip the exchange.
//!
//! The peer protocol is whitespace-separated text. Readers pull single
//! characters, tokens or raw byte blocks; writers emit lines.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MatsyaError, Result};
use crate::shutdown::Shutdown;

/// Longest token accepted before the stream is considered garbage.
const MAX_TOKEN_LEN: usize = 64;

/// Where a channel connects to.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Endpoint {
    /// Pair of named files: we read `input` and write `output`.
    Pipes { input: PathBuf, output: PathBuf },
    /// TCP peer, used for both directions.
    Tcp { tcp: String },
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Pipes { input, output } => {
                write!(f, "{} / {}", input.display(), output.display())
            }
            Endpoint::Tcp { tcp } => write!(f, "tcp://{}", tcp),
        }
    }
}

/// Retry timing for open and reconnect.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Fixed interval between open attempts
    pub open_interval: Duration,
    /// First reconnect delay after a mid-run failure
    pub reconnect_initial: Duration,
    /// Upper bound for the reconnect delay
    pub reconnect_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            open_interval: Duration::from_millis(10),
            reconnect_initial: Duration::from_millis(10),
            reconnect_max: Duration::from_secs(1),
        }
    }
}

type BoxedReader = BufReader<Box<dyn Read + Send>>;
type BoxedWriter = BufWriter<Box<dyn Write + Send>>;

/// Text channel to a single peer.
pub struct Channel {
    name: String,
    /// `None` for in-memory channels, which cannot be reopened
    endpoint: Option<Endpoint>,
    retry: RetryPolicy,
    shutdown: Shutdown,
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl Channel {
    /// Open a channel, blocking until the peer is available.
    ///
    /// Retries indefinitely at `retry.open_interval`; only a shutdown signal
    /// ends the wait early.
    pub fn open(
        name: &str,
        endpoint: Endpoint,
        retry: RetryPolicy,
        shutdown: Shutdown,
    ) -> Result<Self> {
        tracing::info!("[{}] Opening channel {}", name, endpoint);
        let (reader, writer) = connect_with_retry(name, &endpoint, retry.open_interval, None, &shutdown)?;
        tracing::info!("[{}] Channel ready", name);

        Ok(Self {
            name: name.to_string(),
            endpoint: Some(endpoint),
            retry,
            shutdown,
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        })
    }

    /// Channel over arbitrary in-process streams. Never reconnects.
    pub fn in_memory(
        name: &str,
        input: impl Read + Send + 'static,
        output: impl Write + Send + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            endpoint: None,
            retry: RetryPolicy::default(),
            shutdown: Shutdown::new(),
            reader: BufReader::new(Box::new(input)),
            writer: BufWriter::new(Box::new(output)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the next non-whitespace character.
    pub fn read_char(&mut self) -> Result<char> {
        loop {
            let b = self.next_byte()?;
            if !b.is_ascii_whitespace() {
                return Ok(b as char);
            }
        }
    }

    /// Read the next whitespace-delimited token.
    ///
    /// The single delimiter following the token is consumed, so a raw byte
    /// block written right after a `"...\n"` header starts at the next read.
    pub fn read_token(&mut self) -> Result<String> {
        let mut token = String::new();
        token.push(self.read_char()?);
        loop {
            let b = self.next_byte()?;
            if b.is_ascii_whitespace() {
                return Ok(token);
            }
            if token.len() >= MAX_TOKEN_LEN {
                return Err(MatsyaError::Protocol(format!(
                    "token longer than {} bytes",
                    MAX_TOKEN_LEN
                )));
            }
            token.push(b as char);
        }
    }

    /// Read and parse the next token.
    pub fn read_value<T: FromStr>(&mut self) -> Result<T> {
        let token = self.read_token()?;
        token.parse().map_err(|_| {
            MatsyaError::Protocol(format!(
                "cannot parse {:?} as {}",
                token,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Read exactly `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut data = vec![0u8; len];
        if let Err(e) = self.reader.read_exact(&mut data) {
            return Err(self.link_failed(e));
        }
        Ok(data)
    }

    /// Write one line (a newline is appended). Buffered until [`flush`](Self::flush).
    pub fn send(&mut self, line: &str) -> Result<()> {
        let result = self
            .writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"));
        result.map_err(|e| self.link_failed(e))
    }

    /// Write a raw byte block.
    pub fn send_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data).map_err(|e| self.link_failed(e))
    }

    /// Flush buffered writes so the peer observes them immediately.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| self.link_failed(e))
    }

    fn next_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => {
                    let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed");
                    return Err(self.link_failed(eof));
                }
                Ok(_) => return Ok(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.link_failed(e)),
            }
        }
    }

    /// Handle a broken link: reopen it if possible and report what happened.
    fn link_failed(&mut self, error: io::Error) -> MatsyaError {
        let Some(endpoint) = self.endpoint.clone() else {
            return MatsyaError::Closed(format!("{}: {}", self.name, error));
        };

        tracing::warn!("[{}] Link lost ({}), reconnecting", self.name, error);
        match connect_with_retry(
            &self.name,
            &endpoint,
            self.retry.reconnect_initial,
            Some(self.retry.reconnect_max),
            &self.shutdown,
        ) {
            Ok((reader, writer)) => {
                self.reader = BufReader::new(reader);
                self.writer = BufWriter::new(writer);
                tracing::info!("[{}] Channel re-established", self.name);
                MatsyaError::Disconnected(format!("{}: {}", self.name, error))
            }
            Err(e) => e,
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Attempt to connect until success or shutdown.
///
/// With `max_delay == None` the delay stays fixed; otherwise it doubles per
/// attempt up to `max_delay`.
fn connect_with_retry(
    name: &str,
    endpoint: &Endpoint,
    initial_delay: Duration,
    max_delay: Option<Duration>,
    shutdown: &Shutdown,
) -> Result<(Box<dyn Read + Send>, Box<dyn Write + Send>)> {
    let mut delay = initial_delay;
    let mut attempts: u64 = 0;

    loop {
        if shutdown.is_signaled() {
            return Err(MatsyaError::Shutdown);
        }

        match connect(endpoint) {
            Ok(pair) => return Ok(pair),
            Err(e) => {
                attempts += 1;
                // Peers routinely start late; only mention it occasionally.
                if attempts == 1 || attempts % 500 == 0 {
                    tracing::debug!("[{}] Peer not ready after {} attempts: {}", name, attempts, e);
                }
            }
        }

        thread::sleep(delay);
        if let Some(max) = max_delay {
            delay = (delay * 2).min(max);
        }
    }
}

fn connect(endpoint: &Endpoint) -> io::Result<(Box<dyn Read + Send>, Box<dyn Write + Send>)> {
    match endpoint {
        Endpoint::Pipes { input, output } => {
            let reader = File::open(input)?;
            let writer = OpenOptions::new().write(true).open(output)?;
            Ok((Box::new(reader), Box::new(writer)))
        }
        Endpoint::Tcp { tcp } => {
            let stream = TcpStream::connect(tcp.as_str())?;
            stream.set_nodelay(true)?;
            let reader = stream.try_clone()?;
            Ok((Box::new(reader), Box::new(stream)))
        }
    }
}

/// Writer that appends into a shared buffer, for inspecting what a channel sent.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, as text.
    pub fn contents(&self) -> String {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&guard).into_owned()
    }

    /// Drop everything written so far.
    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
