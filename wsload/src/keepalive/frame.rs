//! Transport-neutral websocket frames
//!
//! The server speaks through axum's `WebSocket` and the client through
//! `tokio-tungstenite`. Both are adapted into the same boxed sink/stream pair
//! so the keep-alive session logic is written once.

use crate::error::TransportError;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Sink, SinkExt, StreamExt, future};
use std::borrow::Cow;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, error::ProtocolError, protocol::frame::coding::CloseCode};

/// Close code for a normal, expected closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code for an endpoint that is going away (shutdown, navigation).
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Outbound half of a websocket.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
/// Inbound half of a websocket.
pub type FrameStream = BoxStream<'static, Result<Frame, TransportError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn going_away() -> Self {
        Self {
            code: CLOSE_GOING_AWAY,
            reason: "going away".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseFrame>),
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close(_) => "close",
        }
    }

    fn into_axum(self) -> axum::extract::ws::Message {
        use axum::extract::ws::{CloseFrame as AxumCloseFrame, Message};
        match self {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data.to_vec()),
            Frame::Ping(data) => Message::Ping(data.to_vec()),
            Frame::Pong(data) => Message::Pong(data.to_vec()),
            Frame::Close(close) => Message::Close(close.map(|c| AxumCloseFrame {
                code: c.code,
                reason: Cow::Owned(c.reason),
            })),
        }
    }

    fn from_axum(msg: axum::extract::ws::Message) -> Self {
        use axum::extract::ws::Message;
        match msg {
            Message::Text(text) => Frame::Text(text),
            Message::Binary(data) => Frame::Binary(Bytes::from(data)),
            Message::Ping(data) => Frame::Ping(Bytes::from(data)),
            Message::Pong(data) => Frame::Pong(Bytes::from(data)),
            Message::Close(close) => Frame::Close(close.map(|c| CloseFrame {
                code: c.code,
                reason: c.reason.into_owned(),
            })),
        }
    }

    fn into_tungstenite(self) -> tungstenite::Message {
        use tungstenite::Message;
        match self {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Ping(data) => Message::Ping(data),
            Frame::Pong(data) => Message::Pong(data),
            Frame::Close(close) => {
                Message::Close(close.map(|c| tungstenite::protocol::CloseFrame {
                    code: CloseCode::from(c.code),
                    reason: c.reason.into(),
                }))
            }
        }
    }

    fn from_tungstenite(msg: tungstenite::Message) -> Self {
        use tungstenite::Message;
        match msg {
            Message::Text(text) => Frame::Text(text.to_string()),
            Message::Binary(data) => Frame::Binary(data),
            Message::Ping(data) => Frame::Ping(data),
            Message::Pong(data) => Frame::Pong(data),
            Message::Close(close) => Frame::Close(close.map(|c| CloseFrame {
                code: u16::from(c.code),
                reason: c.reason.to_string(),
            })),
            // Raw frames are only surfaced when writing, never on read.
            Message::Frame(_) => Frame::Binary(Bytes::new()),
        }
    }
}

fn tungstenite_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::AlreadyClosed
        }
        tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::Reset
        }
        other => TransportError::Socket(other.to_string()),
    }
}

/// Split an upgraded axum socket into a frame sink and stream.
pub fn from_axum(socket: axum::extract::ws::WebSocket) -> (FrameSink, FrameStream) {
    let (tx, rx) = socket.split();
    let sink = tx
        .sink_map_err(|e| TransportError::Socket(e.to_string()))
        .with(|frame: Frame| future::ready(Ok::<_, TransportError>(frame.into_axum())));
    let stream = rx.map(|result| {
        result
            .map(Frame::from_axum)
            .map_err(|e| TransportError::Socket(e.to_string()))
    });
    (Box::pin(sink), stream.boxed())
}

/// Split a dialed tungstenite socket into a frame sink and stream.
pub fn from_tungstenite<S>(ws: WebSocketStream<S>) -> (FrameSink, FrameStream)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = ws.split();
    let sink = tx
        .sink_map_err(tungstenite_error)
        .with(|frame: Frame| future::ready(Ok::<_, TransportError>(frame.into_tungstenite())));
    let stream = rx.map(|result| result.map(Frame::from_tungstenite).map_err(tungstenite_error));
    (Box::pin(sink), stream.boxed())
}
