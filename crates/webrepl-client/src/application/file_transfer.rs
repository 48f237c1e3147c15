//! Uploading and downloading files with the WebREPL binary protocol.
//!
//! # PUT, step by step (for beginners)
//!
//! ```text
//! client                                   device
//!   │  (drain anything left on the wire)      │
//!   │── "WA" request frame, 82 bytes ────────▶│
//!   │◀──────────────────── "WB" + code 0 ─────│  ready
//!   │── content[0..1024] ────────────────────▶│
//!   │── content[1024..2048] ─────────────────▶│
//!   │── ...                                   │
//!   │◀──────────────────── "WB" + code 0 ─────│  written
//! ```
//!
//! The device may send leftover REPL text before an acknowledgement, so
//! acknowledgements are read with an [`AckScanner`] that skips anything
//! before the `"WB"` signature.
//!
//! Device-side writes are not atomic: a transfer that fails halfway can
//! leave a truncated file on the board.
//!
//! GET mirrors PUT: after the first acknowledgement the client sends a
//! single `0x00` byte per chunk and the device answers with a little-endian
//! `u16` length followed by that many bytes.  A zero length ends the file.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use webrepl_core::protocol::{CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE};
use webrepl_core::{AckScanner, ResponseCode, TransferFrame};

use crate::error::{DeviceError, ProtocolFailure, TransferStage};
use crate::infrastructure::transport::Session;

/// Reads allowed while hunting for an acknowledgement.
pub const MAX_ACK_READS: u32 = 10;

/// One upload: which local file, where it goes, and the size limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub local_path: PathBuf,
    /// Remote path.  `/` separators are allowed; the device creates the
    /// directories.
    pub remote_name: String,
    pub max_size: u64,
}

impl TransferRequest {
    pub fn new(local_path: impl Into<PathBuf>, remote_name: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_name: remote_name.into(),
            max_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Checks that the local file exists, is a regular file and fits the
    /// limit.  Returns its size.
    ///
    /// # Errors
    ///
    /// [`DeviceError::LocalFile`] or [`DeviceError::SizeLimit`].
    pub async fn validate(&self) -> Result<u64, DeviceError> {
        let meta = tokio::fs::metadata(&self.local_path)
            .await
            .map_err(|e| DeviceError::local_file(&self.local_path, e))?;
        if !meta.is_file() {
            return Err(DeviceError::local_file(
                &self.local_path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        self.check_size(meta.len())?;
        Ok(meta.len())
    }

    /// Reads the file and checks the limit against what was actually read,
    /// since the file may have grown after [`TransferRequest::validate`].
    ///
    /// # Errors
    ///
    /// [`DeviceError::LocalFile`] or [`DeviceError::SizeLimit`].
    pub async fn read_content(&self) -> Result<Vec<u8>, DeviceError> {
        let content = tokio::fs::read(&self.local_path)
            .await
            .map_err(|e| DeviceError::local_file(&self.local_path, e))?;
        self.check_size(content.len() as u64)?;
        Ok(content)
    }

    fn check_size(&self, size: u64) -> Result<(), DeviceError> {
        if size > self.max_size {
            return Err(DeviceError::SizeLimit {
                path: self.local_path.clone(),
                size,
                limit: self.max_size,
            });
        }
        Ok(())
    }
}

// ── Binary reader ─────────────────────────────────────────────────────────────

/// Byte buffer over a session's binary messages.  Bytes that arrive in the
/// same message as an acknowledgement are kept for the next read.
#[derive(Default)]
struct BinaryReader {
    buf: Vec<u8>,
}

impl BinaryReader {
    async fn ack(
        &mut self,
        session: &mut Session,
        stage: TransferStage,
    ) -> Result<ResponseCode, DeviceError> {
        let mut scanner = AckScanner::new();
        let buffered = std::mem::take(&mut self.buf);
        if let Some(code) = scanner.push(&buffered) {
            self.buf = scanner.take_remaining();
            return Ok(code);
        }

        let wait = session.timeouts().ack;
        for _ in 0..MAX_ACK_READS {
            let Some(bytes) = session.recv(wait).await? else {
                continue;
            };
            if let Some(code) = scanner.push(&bytes) {
                if scanner.discarded() > 0 {
                    debug!(
                        session = %session.id(),
                        skipped = scanner.discarded(),
                        "resynchronized on ack"
                    );
                }
                self.buf = scanner.take_remaining();
                return Ok(code);
            }
        }
        Err(DeviceError::protocol(
            stage,
            ProtocolFailure::SignatureNotFound(MAX_ACK_READS),
        ))
    }

    async fn exact(
        &mut self,
        session: &mut Session,
        n: usize,
        stage: TransferStage,
    ) -> Result<Vec<u8>, DeviceError> {
        let wait = session.timeouts().ack;
        while self.buf.len() < n {
            match session.recv(wait).await? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => return Err(DeviceError::protocol(stage, ProtocolFailure::UnexpectedEnd)),
            }
        }
        Ok(self.buf.drain(..n).collect())
    }
}

fn require_success(code: ResponseCode, stage: TransferStage) -> Result<(), DeviceError> {
    if code.is_success() {
        Ok(())
    } else {
        Err(DeviceError::protocol(stage, ProtocolFailure::Rejected(code.0)))
    }
}

/// Reads one acknowledgement, skipping any noise before `"WB"`.
///
/// At most [`MAX_ACK_READS`] messages (or silent waits) are consumed.
///
/// # Errors
///
/// [`ProtocolFailure::SignatureNotFound`] when no acknowledgement turns up,
/// or a connectivity error from the session.
pub async fn read_ack(
    session: &mut Session,
    stage: TransferStage,
) -> Result<ResponseCode, DeviceError> {
    BinaryReader::default().ack(session, stage).await
}

// ── PUT ───────────────────────────────────────────────────────────────────────

/// Uploads a file.  There is no retry on failure.
///
/// # Errors
///
/// - [`DeviceError::SizeLimit`] / [`DeviceError::LocalFile`] before any
///   network I/O.
/// - [`DeviceError::Protocol`] when an acknowledgement is missing or
///   nonzero.
/// - [`DeviceError::Connectivity`] / [`DeviceError::NotConnected`] from the
///   session.
pub async fn send_file(
    session: &mut Session,
    request: &TransferRequest,
) -> Result<(), DeviceError> {
    request.validate().await?;
    let content = request.read_content().await?;
    let declared = u32::try_from(content.len()).map_err(|_| DeviceError::SizeLimit {
        path: request.local_path.clone(),
        size: content.len() as u64,
        limit: u64::from(u32::MAX),
    })?;

    info!(
        session = %session.id(),
        "uploading {} -> {} ({declared} bytes)",
        request.local_path.display(),
        request.remote_name
    );

    session.begin_binary_exchange().await?;
    let frame = TransferFrame::put(request.remote_name.as_str(), declared);
    session.send_binary(&frame.encode()).await?;

    let mut reader = BinaryReader::default();
    let code = reader.ack(session, TransferStage::Request).await?;
    require_success(code, TransferStage::Request)?;

    for chunk in content.chunks(CHUNK_SIZE) {
        session.send_binary(chunk).await?;
    }
    debug!(session = %session.id(), chunks = content.len().div_ceil(CHUNK_SIZE), "payload sent");

    let code = reader.ack(session, TransferStage::Completion).await?;
    require_success(code, TransferStage::Completion)?;

    info!(session = %session.id(), "uploaded {}", request.remote_name);
    Ok(())
}

// ── GET ───────────────────────────────────────────────────────────────────────

/// Downloads `remote_name` into `local_path`, creating parent directories.
/// Returns the number of bytes written.
///
/// # Errors
///
/// As for [`send_file`], plus [`ProtocolFailure::UnexpectedEnd`] when the
/// device stops mid-chunk.
pub async fn receive_file(
    session: &mut Session,
    remote_name: &str,
    local_path: &Path,
) -> Result<u64, DeviceError> {
    info!(session = %session.id(), "downloading {remote_name} -> {}", local_path.display());

    session.begin_binary_exchange().await?;
    session
        .send_binary(&TransferFrame::get(remote_name).encode())
        .await?;

    let mut reader = BinaryReader::default();
    let code = reader.ack(session, TransferStage::Request).await?;
    require_success(code, TransferStage::Request)?;

    let mut content = Vec::new();
    loop {
        session.send_binary(&[0]).await?;
        let header = reader.exact(session, 2, TransferStage::Payload).await?;
        let len = usize::from(u16::from_le_bytes([header[0], header[1]]));
        if len == 0 {
            break;
        }
        let chunk = reader.exact(session, len, TransferStage::Payload).await?;
        content.extend_from_slice(&chunk);
    }

    let code = reader.ack(session, TransferStage::Completion).await?;
    require_success(code, TransferStage::Completion)?;

    if let Some(dir) = local_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DeviceError::local_file(dir, e))?;
    }
    tokio::fs::write(local_path, &content)
        .await
        .map_err(|e| DeviceError::local_file(local_path, e))?;

    info!(session = %session.id(), "downloaded {} bytes", content.len());
    Ok(content.len() as u64)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
