//! Object Stream Module
//!
//! Provides the per-request stream wrapper handed back by the proxy. A
//! spawned producer task feeds the wrapper over a channel; the first
//! message carries the upstream status and headers, every later message a
//! body chunk or a transport error. Channel order is what guarantees that
//! a registered response sink sees the headers before the first body byte.

use crate::config::HeaderTransform;
use crate::{ProxyError, Result};
use bytes::Bytes;
use futures::Stream;
use hyper::{HeaderMap, StatusCode};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Upstream response status and headers, observed at most once per stream
/// and always ahead of any body data.
#[derive(Debug, Clone)]
pub struct HeaderEvent {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Receiving end for relayed response headers.
///
/// Hosting processes typically implement this on whatever handle writes
/// their HTTP response head; [`sink_fn`] adapts a plain closure.
pub trait ResponseSink {
    fn write_head(&mut self, status: StatusCode, headers: &HeaderMap);
}

/// [`ResponseSink`] backed by a closure. Built with [`sink_fn`].
pub struct SinkFn<F>(F);

impl<F> ResponseSink for SinkFn<F>
where
    F: FnMut(StatusCode, &HeaderMap),
{
    fn write_head(&mut self, status: StatusCode, headers: &HeaderMap) {
        (self.0)(status, headers)
    }
}

/// Adapt a `FnMut(StatusCode, &HeaderMap)` closure into a [`ResponseSink`].
pub fn sink_fn<F>(f: F) -> SinkFn<F>
where
    F: FnMut(StatusCode, &HeaderMap),
{
    SinkFn(f)
}

/// Messages flowing from a producer task into an [`ObjectStream`].
pub(crate) enum StreamMessage {
    Headers(HeaderEvent),
    Data(Bytes),
    Error(ProxyError),
}

const STREAM_CHANNEL_CAPACITY: usize = 16;

/// A live byte stream of one remote object.
///
/// Yields `Result<Bytes>` items; remote and transport failures arrive as
/// an `Err` item, never as a panic. Dropping the stream abandons the
/// request and stops the producer. Register a sink with [`on_headers`] to
/// have the upstream status and headers written out before the first body
/// chunk is yielded.
///
/// [`on_headers`]: ObjectStream::on_headers
pub struct ObjectStream {
    receiver: mpsc::Receiver<StreamMessage>,
    transform: Option<HeaderTransform>,
    sink: Option<Box<dyn ResponseSink + Send>>,
    headers: Option<HeaderEvent>,
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("transform", &self.transform.as_ref().map(|_| "<transform>"))
            .field("sink", &self.sink.as_ref().map(|_| "<sink>"))
            .field("headers", &self.headers)
            .finish()
    }
}

impl ObjectStream {
    /// Create a stream plus the sender its producer task feeds.
    pub(crate) fn channel(
        transform: Option<HeaderTransform>,
    ) -> (mpsc::Sender<StreamMessage>, ObjectStream) {
        let (sender, receiver) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        (
            sender,
            ObjectStream {
                receiver,
                transform,
                sink: None,
                headers: None,
            },
        )
    }

    /// Register a response sink for the header event.
    ///
    /// When the upstream headers are observed, the configured transform is
    /// applied (identity when none is configured) and the result is written
    /// to the sink ahead of any body data. If the headers were already
    /// observed, the sink is written immediately.
    pub fn on_headers(&mut self, sink: impl ResponseSink + Send + 'static) {
        let mut sink: Box<dyn ResponseSink + Send> = Box::new(sink);
        if let Some(event) = &self.headers {
            Self::relay(&self.transform, sink.as_mut(), event);
            return;
        }
        self.sink = Some(sink);
    }

    /// Upstream status and headers, once observed.
    pub fn headers(&self) -> Option<&HeaderEvent> {
        self.headers.as_ref()
    }

    fn relay(transform: &Option<HeaderTransform>, sink: &mut dyn ResponseSink, event: &HeaderEvent) {
        match transform {
            Some(transform) => {
                let headers = transform(event.headers.clone());
                sink.write_head(event.status, &headers);
            }
            None => sink.write_head(event.status, &event.headers),
        }
    }

    fn observe(&mut self, event: HeaderEvent) {
        if let Some(sink) = self.sink.as_mut() {
            Self::relay(&self.transform, sink.as_mut(), &event);
        }
        self.headers = Some(event);
    }
}

impl Stream for ObjectStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.receiver.poll_recv(cx) {
                // Header message is consumed here, so the sink fires before
                // the first data chunk can be returned to the caller.
                Poll::Ready(Some(StreamMessage::Headers(event))) => this.observe(event),
                Poll::Ready(Some(StreamMessage::Data(chunk))) => {
                    return Poll::Ready(Some(Ok(chunk)))
                }
                Poll::Ready(Some(StreamMessage::Error(error))) => {
                    return Poll::Ready(Some(Err(error)))
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
