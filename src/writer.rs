//! Dedicated writer task: the link's single write gate.
//!
//! Every outbound byte, whether a data frame from a function call or a
//! bare Ack/Nack from the read loop, is queued on one mpsc channel. The
//! writer task is the only code that touches the write half of the serial
//! stream, so frames never interleave.
//!
//! # Architecture
//!
//! ```text
//! FunctionCall ─┐
//! Read loop   ──┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Serial port
//! Inclusion   ──┘
//! ```

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, ZWaveError};
use crate::protocol::{DataFrame, Frame, Preamble};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 16;

/// Encoded bytes ready to be written to the port.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    bytes: Bytes,
}

impl OutboundFrame {
    /// A data frame.
    #[inline]
    pub fn data(frame: &DataFrame) -> Self {
        Self {
            bytes: frame.encode(),
        }
    }

    /// A bare control byte.
    #[inline]
    pub fn control(preamble: Preamble) -> Self {
        Self {
            bytes: Frame::Control(preamble).encode(),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and shared by every caller of the link.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    pending: Arc<AtomicUsize>,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<OutboundFrame>, pending: Arc<AtomicUsize>) -> Self {
        Self { tx, pending }
    }

    /// Queue a frame, waiting for channel capacity.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            ZWaveError::ConnectionClosed
        })
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends cleanly once every handle has been dropped, or with an
/// error if the stream fails.
pub fn spawn_writer_task<W>(writer: W, channel_capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(tx, pending.clone());
    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(f) => f,
            None => return Ok(()),
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        for frame in &batch {
            tracing::trace!(bytes = %hex::encode_upper(frame.as_bytes()), ">> serial");
        }

        let batch_size = batch.len();
        let result = write_batch(&mut writer, &batch).await;
        pending.fetch_sub(batch_size, Ordering::Release);

        if let Err(e) = result {
            tracing::error!("Serial write failed: {}", e);
            return Err(e);
        }
    }
}

/// Write a batch of frames with vectored I/O, then flush.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(ZWaveError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices covering everything after the first `skip_bytes` bytes.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.size();
        if skip_bytes < end {
            let start_in_frame = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.as_bytes()[start_in_frame..]));
        }
        offset = end;
    }

    slices
}
