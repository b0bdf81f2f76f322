//! Chunked transfer of a binary artifact over a JSON message channel.
//!
//! The sender slices the payload, base64-encodes each slice and emits the
//! envelopes back-to-back in index order. The receiver collects them into
//! indexed slots and hands back the artifact once every slot is filled.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use crate::port::Outbox;
use crate::protocol::DownloadResponse;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEnvelope {
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Base64 of this slice.
    pub data: String,
    pub filename: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransportError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("transfer of {0} declares zero chunks")]
    EmptyTransfer(String),

    #[error("chunk {index} is outside a transfer of {total} chunks")]
    IndexOutOfRange { index: usize, total: usize },

    #[error("chunk for {got} ({got_total} chunks) does not match transfer {expected} ({expected_total} chunks)")]
    Mismatch {
        expected: String,
        expected_total: usize,
        got: String,
        got_total: usize,
    },

    #[error("chunk {index} could not be decoded: {reason}")]
    Decode { index: usize, reason: String },

    #[error("missing chunk at index {0}")]
    MissingChunk(usize),

    #[error("transfer {0} already finished")]
    AlreadyFinished(String),

    #[error("transfer ended after {received} of {total} chunks")]
    Incomplete { received: usize, total: usize },

    #[error("channel closed during transfer")]
    ChannelClosed,
}

/// Splits `bytes` into `ceil(len / chunk_size)` envelopes.
///
/// An empty payload still produces one (empty) envelope so the receiver has
/// something to complete on.
pub fn split_into_chunks<'a>(
    bytes: &'a [u8],
    filename: &'a str,
    chunk_size: usize,
) -> Result<impl Iterator<Item = ChunkEnvelope> + 'a, TransportError> {
    if chunk_size == 0 {
        return Err(TransportError::ZeroChunkSize);
    }

    let total = bytes.len().div_ceil(chunk_size).max(1);

    Ok((0..total).map(move |index| {
        let start = index * chunk_size;
        let end = (start + chunk_size).min(bytes.len());
        ChunkEnvelope {
            chunk_index: index,
            total_chunks: total,
            data: STANDARD.encode(&bytes[start..end]),
            filename: filename.to_string(),
        }
    }))
}

/// Emits every envelope of `bytes` on the download port. Returns the number of
/// chunks sent.
pub async fn send_chunks(
    outbox: &Outbox<DownloadResponse>,
    bytes: &[u8],
    filename: &str,
    chunk_size: usize,
) -> Result<usize, TransportError> {
    let mut sent = 0;
    for envelope in split_into_chunks(bytes, filename, chunk_size)? {
        let total = envelope.total_chunks;
        if !outbox.send(DownloadResponse::ZipChunk(envelope)).await {
            return Err(TransportError::ChannelClosed);
        }
        sent += 1;
        debug!(chunk = sent, total, "chunk sent");
    }
    Ok(sent)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferPhase {
    AwaitingFirstChunk,
    Receiving,
    Delivered,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ChunkProgress {
    Receiving {
        received: usize,
        total: usize,
        percent: u8,
    },
    Complete(Artifact),
}

/// Receiver side of one transfer at a time.
#[derive(Debug)]
pub struct ChunkAssembler {
    phase: TransferPhase,
    filename: Option<String>,
    slots: Vec<Option<Vec<u8>>>,
    filled: usize,
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self {
            phase: TransferPhase::AwaitingFirstChunk,
            filename: None,
            slots: Vec::new(),
            filled: 0,
        }
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    pub fn accept(&mut self, env: ChunkEnvelope) -> Result<ChunkProgress, TransportError> {
        match self.phase {
            TransferPhase::Delivered | TransferPhase::Failed => {
                if self.filename.as_deref() == Some(env.filename.as_str()) {
                    return Err(TransportError::AlreadyFinished(env.filename));
                }
                *self = Self::new();
            }
            TransferPhase::Receiving => {
                let same_file = self.filename.as_deref() == Some(env.filename.as_str());
                if !same_file || env.total_chunks != self.slots.len() {
                    let err = TransportError::Mismatch {
                        expected: self.filename.clone().unwrap_or_default(),
                        expected_total: self.slots.len(),
                        got: env.filename,
                        got_total: env.total_chunks,
                    };
                    return Err(self.fail(err));
                }
            }
            TransferPhase::AwaitingFirstChunk => {}
        }

        if self.phase == TransferPhase::AwaitingFirstChunk {
            self.filename = Some(env.filename.clone());
            if env.total_chunks == 0 {
                return Err(self.fail(TransportError::EmptyTransfer(env.filename)));
            }
            self.slots = vec![None; env.total_chunks];
            self.phase = TransferPhase::Receiving;
        }

        let total = self.slots.len();
        let index = env.chunk_index;
        if index >= total {
            return Err(self.fail(TransportError::IndexOutOfRange { index, total }));
        }

        let bytes = match STANDARD.decode(env.data.as_bytes()) {
            Ok(b) => b,
            Err(e) => {
                let reason = e.to_string();
                return Err(self.fail(TransportError::Decode { index, reason }));
            }
        };

        if self.slots[index].replace(bytes).is_none() {
            self.filled += 1;
        }

        if index + 1 == total || self.filled == total {
            return self.assemble().map(ChunkProgress::Complete);
        }

        Ok(ChunkProgress::Receiving {
            received: self.filled,
            total,
            percent: percent(index, total),
        })
    }

    /// Call when the channel ends; an unfinished transfer becomes a failure.
    pub fn finish(&mut self) -> Result<(), TransportError> {
        if self.phase == TransferPhase::Receiving {
            let err = TransportError::Incomplete {
                received: self.filled,
                total: self.slots.len(),
            };
            return Err(self.fail(err));
        }
        Ok(())
    }

    fn assemble(&mut self) -> Result<Artifact, TransportError> {
        if let Some(missing) = self.slots.iter().position(Option::is_none) {
            return Err(self.fail(TransportError::MissingChunk(missing)));
        }

        let size: usize = self.slots.iter().flatten().map(Vec::len).sum();
        let mut bytes = Vec::with_capacity(size);
        for slot in self.slots.drain(..).flatten() {
            bytes.extend_from_slice(&slot);
        }
        self.filled = 0;
        self.phase = TransferPhase::Delivered;

        Ok(Artifact {
            filename: self.filename.clone().unwrap_or_default(),
            bytes,
        })
    }

    fn fail(&mut self, err: TransportError) -> TransportError {
        warn!(component = "transport", error = %err, "transfer failed");
        self.phase = TransferPhase::Failed;
        self.slots.clear();
        self.filled = 0;
        err
    }
}

fn percent(index: usize, total: usize) -> u8 {
    ((100 * (index + 1)) as f64 / total as f64).round() as u8
}

/// Outcome of a download as seen by a connected client.
#[derive(Debug)]
pub struct SavedArchive {
    pub path: PathBuf,
    pub message: String,
}

/// Client side of the download port: assembles the archive, saves it under
/// `dir` and waits for the final status.
///
/// Nothing is written unless every chunk arrived intact.
pub async fn receive_archive(
    inbound: &mut Receiver<Value>,
    dir: &Path,
) -> anyhow::Result<SavedArchive> {
    let mut assembler = ChunkAssembler::new();
    let mut saved: Option<PathBuf> = None;

    while let Some(raw) = inbound.recv().await {
        let msg: DownloadResponse = match serde_json::from_value(raw) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "ignoring unrecognised download message");
                continue;
            }
        };

        match msg {
            DownloadResponse::DownloadProgress { message, .. } => {
                debug!(%message, "download progress");
            }
            DownloadResponse::ZipChunk(env) => match assembler.accept(env)? {
                ChunkProgress::Receiving { percent, .. } => {
                    debug!(percent, "receiving archive");
                }
                ChunkProgress::Complete(artifact) => {
                    let path = save_artifact(dir, &artifact).await?;
                    info!(path = %path.display(), size = artifact.bytes.len(), "archive saved");
                    saved = Some(path);
                }
            },
            DownloadResponse::DownloadComplete {
                success: true,
                message,
                ..
            } => {
                let path = saved
                    .ok_or_else(|| anyhow!("download reported success but no archive arrived"))?;
                return Ok(SavedArchive { path, message });
            }
            DownloadResponse::DownloadComplete {
                success: false,
                message,
                ..
            } => bail!(message),
        }
    }

    assembler.finish()?;
    bail!("download port closed before the download completed")
}

async fn save_artifact(dir: &Path, artifact: &Artifact) -> anyhow::Result<PathBuf> {
    // Only the final path component of a peer-supplied name is trusted.
    let name = Path::new(&artifact.filename)
        .file_name()
        .ok_or_else(|| anyhow!("invalid archive filename {:?}", artifact.filename))?;
    let path = dir.join(name);

    tokio::fs::write(&path, &artifact.bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
