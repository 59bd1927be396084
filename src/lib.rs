//! s3proxy - Streaming read proxy for a single S3 bucket
//!
//! This library exposes one remote bucket as a streaming read interface
//! for an HTTP-style request handler: given a request path, it fetches the
//! matching object and streams bytes and headers back as they arrive,
//! without buffering whole objects. Upstream status and headers can be
//! rewritten by a configured transform before the first response byte is
//! written.
//!
//! ```no_run
//! use futures::StreamExt;
//! use hyper::StatusCode;
//! use s3proxy::{sink_fn, ProxyConfig, S3Proxy};
//!
//! # async fn run() -> s3proxy::Result<()> {
//! let mut proxy = S3Proxy::new(ProxyConfig::new("assets"))?;
//! proxy.init(None).await;
//!
//! let mut stream = proxy.create_read_stream("/images/logo.png")?;
//! stream.on_headers(sink_fn(|status, _headers| {
//!     assert_eq!(status, StatusCode::OK);
//! }));
//! while let Some(chunk) = stream.next().await {
//!     let _bytes = chunk?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod store;
pub mod stream;

pub use config::{ClientOptions, HeaderTransform, ProxyConfig};
pub use error::{ProxyError, Result};
pub use proxy::{InitCallback, ProxyEvent, ProxyState, S3Proxy};
pub use store::{BucketStatus, ObjectBody, RemoteObject, RemoteStore, S3RemoteStore};
pub use stream::{sink_fn, HeaderEvent, ObjectStream, ResponseSink, SinkFn};
