//! Proxy Core Module
//!
//! The long-lived proxy object: configuration, the client state machine,
//! initialization with its dual-channel completion reporting, and the
//! streaming entry points that hand [`ObjectStream`]s to the hosting HTTP
//! layer.

use crate::config::ProxyConfig;
use crate::store::{BucketStatus, RemoteStore, S3RemoteStore};
use crate::stream::{HeaderEvent, ObjectStream, ResponseSink, StreamMessage};
use crate::{ProxyError, Result};
use futures::StreamExt;
use hyper::Request;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Direct continuation for [`S3Proxy::init`]. When supplied, the caller
/// receives the health-check outcome here and no error event is emitted.
pub type InitCallback = Box<dyn FnOnce(Result<BucketStatus>) + Send>;

/// Lifecycle events delivered on the subscription channel.
#[derive(Debug, Clone)]
pub enum ProxyEvent {
    /// Initialization completed and the bucket is reachable.
    Init(BucketStatus),
    /// Initialization failed and no direct continuation was supplied.
    Error(ProxyError),
}

/// Observable client lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// No client constructed yet; every streaming entry point fails.
    Unconfigured,
    /// Client constructed but the reachability probe has not succeeded.
    /// Streaming is allowed in this state: a failed probe does not discard
    /// the client.
    ClientConstructed,
    /// Client constructed and the bucket probe succeeded.
    Ready,
}

enum ClientSlot {
    Unconfigured,
    Constructed(Arc<dyn RemoteStore>),
    Ready(Arc<dyn RemoteStore>),
}

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Streaming read proxy for a single bucket.
///
/// Construct with [`new`], make it usable with [`init`], then serve
/// requests with [`get`] and [`head`]. All request handling borrows the
/// proxy immutably; the one-time client assignment during `init` is the
/// only mutation.
///
/// [`new`]: S3Proxy::new
/// [`init`]: S3Proxy::init
/// [`get`]: S3Proxy::get
/// [`head`]: S3Proxy::head
pub struct S3Proxy {
    config: ProxyConfig,
    client: ClientSlot,
    events: broadcast::Sender<ProxyEvent>,
}

impl std::fmt::Debug for S3Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Proxy")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl S3Proxy {
    /// Validate the configuration and create an unconfigured proxy.
    /// Performs no I/O.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            client: ClientSlot::Unconfigured,
            events,
        })
    }

    /// Bucket this proxy reads from.
    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProxyState {
        match &self.client {
            ClientSlot::Unconfigured => ProxyState::Unconfigured,
            ClientSlot::Constructed(_) => ProxyState::ClientConstructed,
            ClientSlot::Ready(_) => ProxyState::Ready,
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.events.subscribe()
    }

    /// Strip leading path separators from a request path to form the
    /// object key. Idempotent; a key with no leading separators is
    /// returned unchanged.
    pub fn normalize_key(key: &str) -> &str {
        key.trim_start_matches('/')
    }

    /// Shared guard for every streaming entry point.
    fn store(&self) -> Result<&Arc<dyn RemoteStore>> {
        match &self.client {
            ClientSlot::Unconfigured => Err(ProxyError::Uninitialized),
            ClientSlot::Constructed(store) | ClientSlot::Ready(store) => Ok(store),
        }
    }

    /// Transition: Unconfigured -> ClientConstructed.
    ///
    /// Deliberately not rolled back when the subsequent probe fails; the
    /// constructed client stays attached and streaming is permitted.
    fn attach_client(&mut self, store: Arc<dyn RemoteStore>) {
        self.client = ClientSlot::Constructed(store);
    }

    /// Transition: ClientConstructed -> Ready, after a successful probe.
    fn mark_ready(&mut self) {
        if let ClientSlot::Constructed(store) = &self.client {
            self.client = ClientSlot::Ready(Arc::clone(store));
        }
    }

    /// Construct the remote client and verify the bucket is reachable.
    ///
    /// The outcome is reported on exactly one channel per call: through
    /// `done` when a continuation is supplied, otherwise through the event
    /// subscription. A successful probe additionally always emits
    /// [`ProxyEvent::Init`].
    pub async fn init(&mut self, done: Option<InitCallback>) {
        let store = S3RemoteStore::connect(self.config.bucket.clone(), &self.config.client).await;
        self.init_with(Arc::new(store), done).await;
    }

    /// Like [`init`], with a caller-provided store: a preconfigured SDK
    /// client wrapped in [`S3RemoteStore::from_client`], or any other
    /// [`RemoteStore`] implementation.
    ///
    /// [`init`]: S3Proxy::init
    pub async fn init_with(&mut self, store: Arc<dyn RemoteStore>, done: Option<InitCallback>) {
        self.attach_client(store);
        let result = self.health_check().await;

        match &result {
            Ok(status) => {
                self.mark_ready();
                info!(bucket = %self.config.bucket, "bucket reachable, proxy ready");
                let _ = self.events.send(ProxyEvent::Init(status.clone()));
            }
            Err(error) => {
                warn!(bucket = %self.config.bucket, %error, "bucket probe failed during init");
                // Single branch on "was a continuation supplied": the event
                // channel carries the error only when there is no callback
                // to receive it.
                if done.is_none() {
                    let _ = self.events.send(ProxyEvent::Error(error.clone()));
                }
            }
        }

        if let Some(done) = done {
            done(result);
        }
    }

    /// Probe the configured bucket. Network failures come back in the
    /// `Err` slot, never as a panic.
    pub async fn health_check(&self) -> Result<BucketStatus> {
        let store = self.store()?;
        store.head_bucket().await
    }

    /// Open a streaming read of one object.
    ///
    /// Fails synchronously with [`ProxyError::Uninitialized`] when no
    /// client is attached; remote failures surface asynchronously as an
    /// `Err` item on the returned stream. Must be called from within a
    /// tokio runtime.
    pub fn create_read_stream(&self, key: &str) -> Result<ObjectStream> {
        let store = Arc::clone(self.store()?);
        let key = Self::normalize_key(key).to_owned();
        debug!(bucket = %self.config.bucket, key = %key, "opening object read stream");

        let (sender, stream) = ObjectStream::channel(self.config.response_headers.clone());
        tokio::spawn(async move {
            match store.get_object(&key).await {
                Ok(object) => {
                    let event = HeaderEvent {
                        status: object.status,
                        headers: object.headers,
                    };
                    if sender.send(StreamMessage::Headers(event)).await.is_err() {
                        // Stream abandoned before the response arrived.
                        return;
                    }
                    let mut body = object.body;
                    while let Some(chunk) = body.next().await {
                        let message = match chunk {
                            Ok(data) => StreamMessage::Data(data),
                            Err(error) => StreamMessage::Error(error),
                        };
                        let terminal = matches!(message, StreamMessage::Error(_));
                        if sender.send(message).await.is_err() || terminal {
                            return;
                        }
                    }
                }
                Err(error) => {
                    let _ = sender.send(StreamMessage::Error(error)).await;
                }
            }
        });

        Ok(stream)
    }

    /// Streaming variant of the health check: probes the bucket and writes
    /// the raw status and headers to `sink` as soon as they arrive.
    ///
    /// The response-header transform is not applied on this path; probe
    /// responses go out exactly as received.
    pub fn health_check_stream(&self, sink: impl ResponseSink + Send + 'static) -> Result<ObjectStream> {
        let store = Arc::clone(self.store()?);
        let (sender, mut stream) = ObjectStream::channel(None);
        stream.on_headers(sink);

        tokio::spawn(async move {
            match store.head_bucket().await {
                Ok(status) => {
                    let event = HeaderEvent {
                        status: status.status,
                        headers: status.headers,
                    };
                    let _ = sender.send(StreamMessage::Headers(event)).await;
                }
                Err(error) => {
                    let _ = sender.send(StreamMessage::Error(error)).await;
                }
            }
        });

        Ok(stream)
    }

    /// Serve a GET request: stream the object named by the request path,
    /// writing (possibly transformed) upstream headers to `sink` before
    /// the first body byte. Returns the stream for the caller to consume
    /// and attach error handling to.
    pub fn get<B>(
        &self,
        request: &Request<B>,
        sink: impl ResponseSink + Send + 'static,
    ) -> Result<ObjectStream> {
        self.serve(request.uri().path(), sink)
    }

    /// Serve a HEAD request. Identical to [`get`] at this layer; whether
    /// body bytes are written out is the HTTP layer's concern.
    ///
    /// [`get`]: S3Proxy::get
    pub fn head<B>(
        &self,
        request: &Request<B>,
        sink: impl ResponseSink + Send + 'static,
    ) -> Result<ObjectStream> {
        self.serve(request.uri().path(), sink)
    }

    fn serve(&self, path: &str, sink: impl ResponseSink + Send + 'static) -> Result<ObjectStream> {
        let mut stream = self.create_read_stream(path)?;
        stream.on_headers(sink);
        Ok(stream)
    }
}
