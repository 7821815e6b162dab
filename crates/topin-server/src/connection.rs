//! Per-connection task: read frames off a socket, drive them through the
//! engine, write replies back as they are generated.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;
use topin_core::{Engine, EngineError, Geolocator, LogSink, ReplyWriter, Session, SessionState};
use topin_proto::{Frame, FrameDecoder, Reply};

use crate::config::{IO_TIMEOUT, RECEIVE_BUFFER_SIZE};

/// Encodes and writes each [`Reply`] to the socket as soon as the engine
/// produces it, bounded by [`IO_TIMEOUT`] like every other suspension point.
struct SocketReplyWriter<'a> {
    stream: &'a mut TcpStream,
}

#[async_trait]
impl ReplyWriter for SocketReplyWriter<'_> {
    async fn write_reply(&mut self, reply: Reply) -> Result<(), EngineError> {
        let wire = Frame::encode(reply.opcode, &reply.payload, reply.policy);
        timeout(IO_TIMEOUT, self.stream.write_all(&wire))
            .await
            .map_err(|_| EngineError::Write("timed out writing reply".to_string()))?
            .map_err(|err| EngineError::Write(err.to_string()))
    }
}

/// Drives one accepted socket to completion: decodes frames, dispatches
/// them through `engine`, and exits on peer disconnect, a fatal engine
/// error, an I/O timeout, or a shutdown broadcast.
pub async fn handle_connection<G, L>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    engine: Arc<Engine<G, L>>,
    mut shutdown: broadcast::Receiver<()>,
) where
    G: Geolocator,
    L: LogSink,
{
    let mut session = Session::new(peer_addr);
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];

    loop {
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => {
                    let mut writer = SocketReplyWriter { stream: &mut stream };
                    if let Err(err) = engine.handle_frame(&mut session, &frame, &mut writer).await {
                        if err.is_fatal() {
                            tracing::warn!(peer = %peer_addr, error = %err, "closing connection on fatal engine error");
                            return;
                        }
                        tracing::debug!(peer = %peer_addr, error = %err, "non-fatal engine error");
                    }
                    if session.state == SessionState::Closing {
                        tracing::debug!(peer = %peer_addr, "closing connection on session transition");
                        return;
                    }
                },
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(peer = %peer_addr, error = %err, "closing connection on frame error");
                    return;
                },
            }
        }

        let read_result = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                tracing::debug!(peer = %peer_addr, "closing connection on shutdown signal");
                return;
            },
            result = timeout(IO_TIMEOUT, stream.read(&mut buf)) => result,
        };

        match read_result {
            Ok(Ok(0)) => {
                tracing::debug!(peer = %peer_addr, "peer closed connection");
                return;
            },
            Ok(Ok(n)) => decoder.extend(&buf[..n]),
            Ok(Err(err)) => {
                tracing::debug!(peer = %peer_addr, error = %err, "closing connection on read error");
                return;
            },
            Err(_) => {
                tracing::debug!(peer = %peer_addr, "closing connection on read timeout");
                return;
            },
        }
    }
}
