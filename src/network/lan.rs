//! Direct TCP file transfer for the LAN
//!
//! [`LanSender`] pushes one file to a [`LanReceiver`] using the framing in
//! [`crate::network::frame`]. No encryption, no retry: trusted networks only.

use crate::error::{IoResultExt, Result, TransferError};
use crate::network::connect_with_timeout;
use crate::network::frame::{read_header, write_header, FrameStyle, CHUNK_SIZE};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Default LAN transfer port
pub const DEFAULT_LAN_PORT: u16 = 5001;

/// Poll interval of the cancellable accept loop
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Client half of a LAN transfer
#[derive(Debug, Clone)]
pub struct LanSender {
    port: u16,
    style: FrameStyle,
    connect_timeout: Option<Duration>,
}

impl Default for LanSender {
    fn default() -> Self {
        Self {
            port: DEFAULT_LAN_PORT,
            style: FrameStyle::default(),
            connect_timeout: None,
        }
    }
}

impl LanSender {
    /// Sender targeting the default port
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the receiver port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the header style
    pub fn with_frame_style(mut self, style: FrameStyle) -> Self {
        self.style = style;
        self
    }

    /// Receiver port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bound the connect attempt
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Send `source` to the receiver at `peer`, returning the bytes sent
    pub fn send(&self, source: &Path, peer: &str) -> Result<u64> {
        let metadata = match std::fs::metadata(source) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::SourceNotFound(source.to_path_buf()));
            }
            Err(e) => return Err(TransferError::io(source, e)),
        };

        if metadata.is_dir() {
            return Err(TransferError::UnsupportedSource {
                path: source.to_path_buf(),
                reason: "network mode sends single files only".to_string(),
            });
        }

        let filename = wire_filename(source)?;
        let size = metadata.len();
        let file = File::open(source).with_path(source)?;

        let stream = self.connect(peer)?;
        tracing::info!("Sending {} ({} bytes) to {}:{}", filename, size, peer, self.port);

        let lost = |sent: u64, e: std::io::Error| {
            TransferError::connectivity(peer, format!("connection lost after {} bytes: {}", sent, e))
        };

        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, &stream);
        write_header(&mut writer, &filename, size, self.style).map_err(|e| lost(0, e))?;
        // Header goes out whole before any body byte
        writer.flush().map_err(|e| lost(0, e))?;

        let mut reader = BufReader::with_capacity(CHUNK_SIZE, file).take(size);
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut sent = 0u64;

        loop {
            let bytes_read = reader.read(&mut buffer).with_path(source)?;
            if bytes_read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| lost(sent, e))?;
            sent += bytes_read as u64;
        }

        writer.flush().map_err(|e| lost(sent, e))?;
        drop(writer);
        let _ = stream.shutdown(Shutdown::Write);

        if sent < size {
            return Err(TransferError::TruncatedTransfer {
                path: source.to_path_buf(),
                expected: size,
                received: sent,
            });
        }

        tracing::info!("Sent {} bytes to {}", sent, peer);
        Ok(sent)
    }

    fn connect(&self, peer: &str) -> Result<TcpStream> {
        let connected = match self.connect_timeout {
            Some(timeout) => connect_with_timeout(peer, self.port, timeout),
            None => TcpStream::connect((peer, self.port)),
        };

        connected.map_err(|e| {
            TransferError::connectivity(format!("{}:{}", peer, self.port), e.to_string())
        })
    }
}

/// File name as it travels in the header
fn wire_filename(source: &Path) -> Result<String> {
    let unsupported = |reason: &str| TransferError::UnsupportedSource {
        path: source.to_path_buf(),
        reason: reason.to_string(),
    };

    let name = source
        .file_name()
        .ok_or_else(|| unsupported("source has no file name"))?
        .to_str()
        .ok_or_else(|| unsupported("file name is not valid UTF-8"))?;

    crate::network::frame::validate_filename(name)
        .map_err(|_| unsupported("file name must not contain ':' or a newline"))?;

    Ok(name.to_string())
}

/// A file written by [`LanReceiver::receive`]
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    /// Where the file was written
    pub path: PathBuf,
    /// Size declared in the header
    pub declared_size: u64,
    /// Bytes actually written
    pub bytes_received: u64,
    /// Address of the sender
    pub peer: SocketAddr,
}

impl ReceivedFile {
    /// Whether every declared byte arrived
    pub fn is_complete(&self) -> bool {
        self.bytes_received == self.declared_size
    }

    /// Fail with `TruncatedTransfer` if the sender closed early
    pub fn ensure_complete(self) -> Result<PathBuf> {
        if self.is_complete() {
            Ok(self.path)
        } else {
            Err(TransferError::TruncatedTransfer {
                path: self.path,
                expected: self.declared_size,
                received: self.bytes_received,
            })
        }
    }
}

/// Single-shot server half of a LAN transfer
///
/// Accepts exactly one connection, stores the file, and drops the listener.
pub struct LanReceiver {
    listener: TcpListener,
    style: FrameStyle,
    accept_timeout: Option<Duration>,
    shutdown: Arc<AtomicBool>,
}

impl LanReceiver {
    /// Bind the listening socket
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| TransferError::connectivity(addr, e.to_string()))?;

        Ok(Self {
            listener,
            style: FrameStyle::default(),
            accept_timeout: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Set the expected header style
    pub fn with_frame_style(mut self, style: FrameStyle) -> Self {
        self.style = style;
        self
    }

    /// Give up waiting for a sender after `timeout`
    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = Some(timeout);
        self
    }

    /// Get shutdown flag for external cancellation of the wait
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Receive one file into `save_dir`
    ///
    /// A sender that closes before the declared size arrives leaves a
    /// truncated file; that is reported through [`ReceivedFile`], not as an
    /// error.
    pub fn receive(self, save_dir: &Path) -> Result<ReceivedFile> {
        let (stream, peer) = self.accept()?;
        drop(self.listener);

        tracing::info!("Accepted connection from {}", peer);
        let host = peer.to_string();

        let (header, leftover) = read_header(&mut &stream, self.style)?;
        let name = Path::new(&header.filename)
            .file_name()
            .ok_or_else(|| {
                TransferError::Protocol(format!("unusable filename '{}'", header.filename))
            })?
            .to_os_string();

        let path = save_dir.join(name);
        let file = File::create(&path).not_writable(&path)?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);

        let head = leftover.len().min(usize::try_from(header.size).unwrap_or(usize::MAX));
        writer.write_all(&leftover[..head]).with_path(&path)?;
        let mut received = head as u64;

        let mut reader = &stream;
        let mut buffer = vec![0u8; CHUNK_SIZE];

        while received < header.size {
            let want = (header.size - received).min(CHUNK_SIZE as u64) as usize;
            let n = match reader.read(&mut buffer[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransferError::connectivity(&host, e.to_string())),
            };
            writer.write_all(&buffer[..n]).with_path(&path)?;
            received += n as u64;
        }

        writer.flush().with_path(&path)?;

        if received < header.size {
            tracing::warn!(
                "Sender closed early: {} of {} bytes for {}",
                received,
                header.size,
                path.display()
            );
        } else {
            tracing::info!("Received {} ({} bytes)", path.display(), received);
        }

        Ok(ReceivedFile {
            path,
            declared_size: header.size,
            bytes_received: received,
            peer,
        })
    }

    fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        self.listener
            .set_nonblocking(true)
            .map_err(|e| TransferError::connectivity("listener", e.to_string()))?;

        let started = Instant::now();

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(TransferError::Cancelled);
            }

            match self.listener.accept() {
                Ok((stream, addr)) => {
                    stream
                        .set_nonblocking(false)
                        .map_err(|e| TransferError::connectivity(addr.to_string(), e.to_string()))?;
                    return Ok((stream, addr));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if let Some(timeout) = self.accept_timeout {
                        if started.elapsed() >= timeout {
                            return Err(TransferError::Timeout(timeout.as_secs()));
                        }
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(TransferError::connectivity("listener", e.to_string()));
                }
            }
        }
    }
}

/// Bind `0.0.0.0:port`, receive one file into `save_dir`, return its path
pub fn receive_file(save_dir: &Path, port: u16) -> Result<PathBuf> {
    let receiver = LanReceiver::bind(&format!("0.0.0.0:{}", port))?;
    Ok(receiver.receive(save_dir)?.path)
}
