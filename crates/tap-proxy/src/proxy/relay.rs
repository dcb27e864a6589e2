//! Chunked relay of streamed origin bodies.
//!
//! A background task reads origin frames and forwards them, split into pieces
//! of at most `chunk_size` bytes, through a small channel that backs the
//! client body. When the client goes away the channel closes and the task
//! stops reading from the origin.

use super::error::{BoxError, ForwardError};
use super::response_ext::ProxyBody;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::{Body, Frame};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Frames in flight between origin and client
const RELAY_BUFFER: usize = 4;

type RelayFrame = Result<Frame<Bytes>, BoxError>;

/// Client-facing body fed by the relay task.
struct RelayBody {
    frames: mpsc::Receiver<RelayFrame>,
}

impl Body for RelayBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.frames.poll_recv(cx)
    }
}

/// Stream `origin` to the client in chunks of at most `chunk_size` bytes.
pub fn relay_body<B>(origin: B, chunk_size: usize, target: String) -> ProxyBody
where
    B: Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<BoxError> + Send,
{
    let (tx, rx) = mpsc::channel(RELAY_BUFFER);
    tokio::spawn(pump(origin, chunk_size.max(1), tx, target));
    RelayBody { frames: rx }.boxed()
}

async fn pump<B>(mut origin: B, chunk_size: usize, tx: mpsc::Sender<RelayFrame>, target: String)
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError> + Send,
{
    let mut relayed = 0usize;
    while let Some(frame) = origin.frame().await {
        let frame = match frame.map_err(Into::into) {
            Ok(frame) => frame,
            Err(e) => {
                let err = ForwardError::Transfer(e);
                error!("Streaming {} aborted after {} bytes: {}", target, relayed, err);
                let _ = tx.send(Err(err.into())).await;
                return;
            }
        };

        match frame.into_data() {
            Ok(mut data) => {
                while !data.is_empty() {
                    let chunk = data.split_to(chunk_size.min(data.len()));
                    let len = chunk.len();
                    if tx.send(Ok(Frame::data(chunk))).await.is_err() {
                        debug!("Client closed {} after {} bytes", target, relayed);
                        return;
                    }
                    relayed += len;
                }
            }
            Err(frame) => {
                // Trailers
                if tx.send(Ok(frame)).await.is_err() {
                    debug!("Client closed {} after {} bytes", target, relayed);
                    return;
                }
            }
        }
    }
    debug!("Streamed {} bytes for {}", relayed, target);
}
