//! In-memory frame transport
//!
//! Produces a `FrameSink`/`FrameStream` pair wired to a `MemoryPeer` that the
//! caller drives by hand. Used to exercise sessions and the connection pool
//! without opening sockets.

use super::frame::{Frame, FrameSink, FrameStream};
use crate::error::TransportError;
use futures_util::{StreamExt, sink, stream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// The far end of an in-memory connection.
pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    stalled: Arc<AtomicBool>,
}

/// Create a connected transport and the peer that controls it.
pub fn pair() -> (MemoryPeer, FrameSink, FrameStream) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let stalled = Arc::new(AtomicBool::new(false));

    let sink_stalled = Arc::clone(&stalled);
    let frame_sink = sink::unfold(
        (outbound_tx, sink_stalled),
        |(tx, stalled): (mpsc::UnboundedSender<Frame>, Arc<AtomicBool>), frame: Frame| async move {
            if stalled.load(Ordering::Acquire) {
                // A peer that stopped reading: the write never completes.
                std::future::pending::<()>().await;
            }
            tx.send(frame).map_err(|_| TransportError::AlreadyClosed)?;
            Ok::<_, TransportError>((tx, stalled))
        },
    );

    let frame_stream = stream::unfold(inbound_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    let peer = MemoryPeer {
        inbound: inbound_tx,
        outbound: outbound_rx,
        stalled,
    };
    (peer, Box::pin(frame_sink), frame_stream.boxed())
}

impl MemoryPeer {
    /// Deliver a frame to the session.
    pub fn send(&self, frame: Frame) -> bool {
        self.inbound.send(Ok(frame)).is_ok()
    }

    /// Make the session's next read fail.
    pub fn fail(&self, error: TransportError) -> bool {
        self.inbound.send(Err(error)).is_ok()
    }

    /// Block every subsequent write from the session.
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::Release);
    }

    /// Next frame the session wrote, waiting if none is queued.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Frames the session has written so far.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Drop the connection without a closing handshake.
    pub fn hang_up(self) {}
}
