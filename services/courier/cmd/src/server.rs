//! TCP front end for the dispatcher.
//!
//! Each frame on the socket is a VLQ length followed by one envelope.
//! Responses go back on the same connection in the order handlers finish.

use anyhow::{bail, Context, Result};
use bytes::{Bytes, BytesMut};
use courier_buffer::{
    encode_vlq, BufferSegment, ReaderError, SegmentedReader, TextEncoding, VlqError,
};
use courier_dispatch::{Consumer, Dispatcher, PacketCallback};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::{component_debug, component_error, component_info, component_warn};

const READ_CHUNK: usize = 8 * 1024;

/// Cuts length-prefixed frames out of received chunks without joining them
pub struct FrameDecoder {
    chunks: VecDeque<Bytes>,
    max_frame: usize,
}

impl FrameDecoder {
    /// Decoder rejecting frames larger than `max_frame` bytes
    pub fn new(max_frame: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            max_frame,
        }
    }

    /// Queue received bytes
    pub fn push(&mut self, chunk: Bytes) {
        if !chunk.is_empty() {
            self.chunks.push_back(chunk);
        }
    }

    /// Bytes queued but not yet returned as frames
    pub fn buffered(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    /// Next complete frame, or `None` until more bytes arrive
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.chunks.is_empty() {
            return Ok(None);
        }

        let (frame, consumed) = {
            let segments = self.chunks.iter().map(|c| BufferSegment::new(c)).collect();
            let mut reader = SegmentedReader::with_segments(segments, TextEncoding::Utf8)?;

            let len = match reader.read_vlq() {
                Ok(len) => len as usize,
                Err(ReaderError::Vlq(VlqError::Truncated)) => return Ok(None),
                Err(e) => return Err(e).context("invalid frame length"),
            };
            if len > self.max_frame {
                bail!("frame of {} bytes exceeds limit of {}", len, self.max_frame);
            }
            if reader.remaining() < len {
                return Ok(None);
            }

            let frame = reader.read_bytes(len)?;
            (frame, reader.position())
        };

        self.discard(consumed);
        Ok(Some(Bytes::from(frame)))
    }

    fn discard(&mut self, mut count: usize) {
        while count > 0 {
            let Some(front) = self.chunks.front_mut() else {
                return;
            };
            if front.len() <= count {
                count -= front.len();
                self.chunks.pop_front();
            } else {
                let _ = front.split_to(count);
                count = 0;
            }
        }
    }
}

/// Prefix `envelope` with its VLQ length
pub fn encode_frame(envelope: &[u8]) -> Result<Bytes> {
    let len = u32::try_from(envelope.len()).context("envelope length exceeds u32")?;
    let mut out = BytesMut::with_capacity(envelope.len() + 4);
    encode_vlq(len, &mut out)?;
    out.extend_from_slice(envelope);
    Ok(out.freeze())
}

/// Read one frame from `stream` into `decoder`, `None` on clean close
pub async fn read_frame(
    stream: &mut TcpStream,
    decoder: &mut FrameDecoder,
) -> Result<Option<Bytes>> {
    loop {
        if let Some(frame) = decoder.next_frame()? {
            return Ok(Some(frame));
        }

        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            if decoder.buffered() > 0 {
                bail!("connection closed with {} bytes of partial frame", decoder.buffered());
            }
            return Ok(None);
        }
        decoder.push(buf.freeze());
    }
}

/// Accept connections until the listener fails
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    max_frame: usize,
) -> Result<()> {
    component_info!("server", "Listening on {}", listener.local_addr()?);

    loop {
        let (socket, peer) = listener.accept().await?;
        let _ = socket.set_nodelay(true);
        component_debug!("server", "Accepted connection from {}", peer);

        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, peer, dispatcher, max_frame).await {
                component_warn!("server", "Connection {} closed: {:#}", peer, e);
            }
        });
    }
}

async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    max_frame: usize,
) -> Result<()> {
    let (mut reader, mut writer) = socket.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<PacketCallback>();

    let write_task = tokio::spawn(async move {
        while let Some(callback) = rx.recv().await {
            let frame = match encode_frame(&callback.response) {
                Ok(frame) => frame,
                Err(e) => {
                    component_error!(
                        "server",
                        "Cannot frame {} response: {:#}",
                        callback.endpoint,
                        e
                    );
                    continue;
                }
            };
            if let Err(e) = writer.write_all(&frame).await {
                component_warn!("server", "Write to {} failed: {}", peer, e);
                break;
            }
        }
    });

    let consumer: Arc<dyn Consumer> = Arc::new(tx);
    let mut decoder = FrameDecoder::new(max_frame);
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    let result = loop {
        match decoder.next_frame() {
            Ok(Some(frame)) => {
                match dispatcher.dispatch(&frame, consumer.clone()) {
                    Ok(true) => {}
                    Ok(false) => component_debug!("server", "Dropped frame from {}", peer),
                    Err(e) => component_warn!("server", "Rejected frame from {}: {}", peer, e),
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => break Err(e),
        }

        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(_) => decoder.push(buf.split().freeze()),
            Err(e) => break Err(e.into()),
        }
    };

    // Let in-flight handlers finish replying before the writer stops.
    drop(consumer);
    let _ = write_task.await;
    component_debug!("server", "Connection from {} finished", peer);
    result
}
