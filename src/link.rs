//! Serial link: owns the byte stream, reassembles frames, answers data
//! frames with Ack/Nack and publishes typed events.
//!
//! The link spawns two tasks:
//! 1. A writer task (see [`crate::writer`]), the single write gate
//! 2. A read loop, the sole reader, which never exits except on shutdown,
//!    end-of-stream or an I/O error
//!
//! Valid data frames are acknowledged before they are published. Frames
//! with a bad checksum are answered with exactly one Nack and dropped.
//!
//! # Example
//!
//! ```ignore
//! use zwave_serial::link::{LinkEvent, SerialLink};
//! use zwave_serial::config::LinkConfig;
//! use zwave_serial::protocol::FrameType;
//!
//! let link = SerialLink::spawn(stream, &LinkConfig::default());
//! let mut events = link.subscribe();
//! link.send_frame(FrameType::Request, &[0x20]).await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::LinkConfig;
use crate::error::{Result, ZWaveError};
use crate::protocol::{DataFrame, Frame, FrameBuffer, FrameType, Parsed, Preamble};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle};

/// Something the controller sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Ack, Nack or Cancel.
    Control(Preamble),
    /// A checksum-valid data frame (already acknowledged).
    Data(DataFrame),
    /// A stray byte outside any frame.
    Unexpected(u8),
}

/// Handle to a running serial link.
pub struct SerialLink {
    writer: WriterHandle,
    events: broadcast::Sender<LinkEvent>,
    closed: CancellationToken,
    reader_task: Option<JoinHandle<()>>,
    writer_task: Option<JoinHandle<Result<()>>>,
}

impl SerialLink {
    /// Start a link over a bidirectional stream.
    pub fn spawn<S>(stream: S, config: &LinkConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::spawn_split(reader, writer, config)
    }

    /// Start a link over separate read and write halves.
    pub fn spawn_split<R, W>(reader: R, writer: W, config: &LinkConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer, writer_task) = spawn_writer_task(writer, config.channel_capacity);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let closed = CancellationToken::new();

        let reader_task = tokio::spawn(read_loop(
            reader,
            writer.clone(),
            events.clone(),
            closed.clone(),
            config.inter_byte_timeout,
            config.read_buffer_size.max(1),
        ));

        Self {
            writer,
            events,
            closed,
            reader_task: Some(reader_task),
            writer_task: Some(writer_task),
        }
    }

    /// Subscribe to inbound events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Queue a data frame for writing.
    pub async fn send_data_frame(&self, frame: &DataFrame) -> Result<()> {
        self.ensure_open()?;
        tracing::debug!(payload = %hex::encode_upper(frame.payload()), "Sending {:?}", frame.frame_type());
        self.writer.send(OutboundFrame::data(frame)).await
    }

    /// Encode `args` as a data frame of `frame_type` and queue it.
    pub async fn send_frame(&self, frame_type: FrameType, args: &[u8]) -> Result<()> {
        let frame = DataFrame::new(frame_type, bytes::Bytes::copy_from_slice(args))?;
        self.send_data_frame(&frame).await
    }

    /// Queue a bare control byte.
    pub async fn send_control(&self, preamble: Preamble) -> Result<()> {
        self.ensure_open()?;
        self.writer.send(OutboundFrame::control(preamble)).await
    }

    /// Whether the read loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.writer.is_closed()
    }

    /// Token cancelled when the link stops.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Stop the read loop and wait for both tasks to finish.
    pub async fn shutdown(mut self) {
        self.closed.cancel();
        if let Some(reader_task) = self.reader_task.take() {
            let _ = reader_task.await;
        }
        let writer_task = self.writer_task.take();
        // The writer task ends once every handle is gone.
        drop(self);
        if let Some(writer_task) = writer_task {
            match writer_task.await {
                Ok(Err(e)) => tracing::warn!("Writer task ended with error: {}", e),
                Err(e) => tracing::warn!("Writer task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ZWaveError::ConnectionClosed);
        }
        Ok(())
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// Wait for the next data frame `filter` accepts, skipping everything else.
pub async fn next_frame<T>(
    events: &mut broadcast::Receiver<LinkEvent>,
    mut filter: impl FnMut(&DataFrame) -> Option<T>,
) -> Result<T> {
    loop {
        match events.recv().await {
            Ok(LinkEvent::Data(frame)) => {
                if let Some(value) = filter(&frame) {
                    return Ok(value);
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Subscriber lagged, {} link events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return Err(ZWaveError::ConnectionClosed),
        }
    }
}

/// Main read loop - reads bytes, reassembles frames and acknowledges them.
async fn read_loop<R>(
    mut reader: R,
    writer: WriterHandle,
    events: broadcast::Sender<LinkEvent>,
    closed: CancellationToken,
    inter_byte_timeout: Duration,
    read_buffer_size: usize,
) where
    R: AsyncRead + Unpin,
{
    let _closed_on_exit = closed.clone().drop_guard();
    let mut frame_buffer = FrameBuffer::new();
    let mut buf = vec![0u8; read_buffer_size];

    loop {
        let mid_frame = frame_buffer.is_mid_frame();
        let read = async {
            if mid_frame {
                tokio::time::timeout(inter_byte_timeout, reader.read(&mut buf)).await
            } else {
                Ok(reader.read(&mut buf).await)
            }
        };

        let n = tokio::select! {
            _ = closed.cancelled() => {
                tracing::debug!("Read loop shutting down");
                return;
            }
            result = read => match result {
                Err(_) => {
                    tracing::warn!(
                        "Discarding {} byte(s) of partial frame after {:?} of silence",
                        frame_buffer.len(),
                        inter_byte_timeout
                    );
                    frame_buffer.clear();
                    continue;
                }
                Ok(Ok(0)) => {
                    tracing::debug!("Serial stream closed");
                    return;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    tracing::error!("Read loop error: {}", e);
                    return;
                }
            }
        };

        tracing::trace!(bytes = %hex::encode_upper(&buf[..n]), "<< serial");

        for parsed in frame_buffer.push(&buf[..n]) {
            if let Err(e) = handle_parsed(parsed, &writer, &events).await {
                tracing::error!("Read loop error: {}", e);
                return;
            }
        }
    }
}

/// Acknowledge and publish one parsed item. Only a dead writer is fatal.
async fn handle_parsed(
    parsed: Parsed,
    writer: &WriterHandle,
    events: &broadcast::Sender<LinkEvent>,
) -> Result<()> {
    match parsed {
        Parsed::Frame(Frame::Control(preamble)) => {
            tracing::debug!("{:?} received", preamble);
            let _ = events.send(LinkEvent::Control(preamble));
        }
        Parsed::Frame(Frame::Data(frame)) if frame.is_checksum_valid() => {
            writer.send(OutboundFrame::control(Preamble::Ack)).await?;
            tracing::debug!(
                payload = %hex::encode_upper(frame.payload()),
                "{:?} received",
                frame.frame_type()
            );
            let _ = events.send(LinkEvent::Data(frame));
        }
        Parsed::Frame(Frame::Data(frame)) => {
            let expected = crate::protocol::frame_checksum(
                frame.length(),
                frame.frame_type() as u8,
                frame.payload(),
            );
            tracing::warn!(
                "Dropping frame: {}",
                ZWaveError::Checksum {
                    expected,
                    actual: frame.checksum()
                }
            );
            writer.send(OutboundFrame::control(Preamble::Nack)).await?;
        }
        Parsed::Malformed { length, frame_type } => {
            tracing::warn!(
                "Dropping frame with length {} and invalid type {:#04X}",
                length,
                frame_type
            );
            writer.send(OutboundFrame::control(Preamble::Nack)).await?;
        }
        Parsed::Unexpected(byte) => {
            tracing::debug!("Unexpected byte {:#04X}", byte);
            let _ = events.send(LinkEvent::Unexpected(byte));
        }
    }
    Ok(())
}
