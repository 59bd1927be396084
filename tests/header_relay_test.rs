//! End-to-end tests for the header relay: upstream status and headers are
//! written to the response sink before the first body chunk, with the
//! configured transform applied on the object path and skipped on the
//! health-check path.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use hyper::{HeaderMap, Request, StatusCode};
use s3proxy::{
    BucketStatus, ProxyConfig, ProxyError, RemoteObject, RemoteStore, ResponseSink, Result,
    S3Proxy,
};
use std::sync::{Arc, Mutex};

/// Store serving one fixed object and recording the keys requested of it.
struct StaticStore {
    chunks: Vec<Bytes>,
    headers: HeaderMap,
    requested_keys: Arc<Mutex<Vec<String>>>,
}

impl StaticStore {
    fn new(chunks: Vec<Bytes>, headers: HeaderMap) -> Self {
        Self {
            chunks,
            headers,
            requested_keys: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl RemoteStore for StaticStore {
    async fn head_bucket(&self) -> Result<BucketStatus> {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-bucket-region", "eu-west-1".parse().unwrap());
        Ok(BucketStatus {
            status: StatusCode::OK,
            headers,
        })
    }

    async fn get_object(&self, key: &str) -> Result<RemoteObject> {
        self.requested_keys.lock().unwrap().push(key.to_string());
        let chunks: Vec<Result<Bytes>> = self.chunks.iter().cloned().map(Ok).collect();
        Ok(RemoteObject {
            status: StatusCode::OK,
            headers: self.headers.clone(),
            body: Box::pin(futures::stream::iter(chunks)),
        })
    }
}

/// Store whose object fetch always fails.
struct BrokenStore;

#[async_trait]
impl RemoteStore for BrokenStore {
    async fn head_bucket(&self) -> Result<BucketStatus> {
        Ok(BucketStatus {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        })
    }

    async fn get_object(&self, _key: &str) -> Result<RemoteObject> {
        Err(ProxyError::RemoteError("no such key".to_string()))
    }
}

/// Interleaved record of sink writes and received body chunks, for
/// asserting relative order.
#[derive(Debug)]
enum Observation {
    Head(StatusCode, HeaderMap),
    Chunk(Bytes),
}

#[derive(Clone)]
struct OrderedSink {
    log: Arc<Mutex<Vec<Observation>>>,
}

impl ResponseSink for OrderedSink {
    fn write_head(&mut self, status: StatusCode, headers: &HeaderMap) {
        self.log
            .lock()
            .unwrap()
            .push(Observation::Head(status, headers.clone()));
    }
}

fn upstream_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("etag", "\"abc\"".parse().unwrap());
    headers
}

async fn ready_proxy(config: ProxyConfig, store: Arc<dyn RemoteStore>) -> S3Proxy {
    let mut proxy = S3Proxy::new(config).unwrap();
    proxy.init_with(store, None).await;
    proxy
}

#[tokio::test]
async fn test_headers_written_before_first_chunk() {
    let store = Arc::new(StaticStore::new(
        vec![Bytes::from("hello "), Bytes::from("world")],
        upstream_headers(),
    ));
    let proxy = ready_proxy(ProxyConfig::new("assets"), store).await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = OrderedSink { log: Arc::clone(&log) };

    let request = Request::builder().uri("/greeting.txt").body(()).unwrap();
    let mut stream = proxy.get(&request, sink).unwrap();

    while let Some(chunk) = stream.next().await {
        log.lock().unwrap().push(Observation::Chunk(chunk.unwrap()));
    }

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 3);
    match &log[0] {
        Observation::Head(status, headers) => {
            assert_eq!(*status, StatusCode::OK);
            assert_eq!(headers.get("etag").unwrap(), "\"abc\"");
        }
        other => panic!("expected head write first, got {:?}", other),
    }
    assert!(matches!(&log[1], Observation::Chunk(c) if c == "hello "));
    assert!(matches!(&log[2], Observation::Chunk(c) if c == "world"));
}

#[tokio::test]
async fn test_transform_applied_to_object_headers() {
    let store = Arc::new(StaticStore::new(vec![Bytes::from("x")], upstream_headers()));
    let config = ProxyConfig::new("assets").with_response_headers(|mut headers| {
        headers.insert("x-proxy", "1".parse().unwrap());
        headers
    });
    let proxy = ready_proxy(config, store).await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let request = Request::builder().uri("/images/logo.png").body(()).unwrap();
    let mut stream = proxy
        .get(&request, OrderedSink { log: Arc::clone(&log) })
        .unwrap();
    while stream.next().await.is_some() {}

    let log = log.lock().unwrap();
    match &log[0] {
        Observation::Head(status, headers) => {
            assert_eq!(*status, StatusCode::OK);
            assert_eq!(headers.get("etag").unwrap(), "\"abc\"");
            assert_eq!(headers.get("x-proxy").unwrap(), "1");
        }
        other => panic!("expected head write, got {:?}", other),
    }
}

#[tokio::test]
async fn test_headers_pass_through_without_transform() {
    let store = Arc::new(StaticStore::new(vec![Bytes::from("x")], upstream_headers()));
    let proxy = ready_proxy(ProxyConfig::new("assets"), store).await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let request = Request::builder().uri("/images/logo.png").body(()).unwrap();
    let mut stream = proxy
        .head(&request, OrderedSink { log: Arc::clone(&log) })
        .unwrap();
    while stream.next().await.is_some() {}

    let log = log.lock().unwrap();
    match &log[0] {
        Observation::Head(_, headers) => {
            assert_eq!(headers.len(), 1);
            assert_eq!(headers.get("etag").unwrap(), "\"abc\"");
        }
        other => panic!("expected head write, got {:?}", other),
    }
}

#[tokio::test]
async fn test_request_path_becomes_normalized_key() {
    let store = Arc::new(StaticStore::new(vec![Bytes::from("x")], upstream_headers()));
    let keys = Arc::clone(&store.requested_keys);
    let proxy = ready_proxy(ProxyConfig::new("assets"), store).await;

    let request = Request::builder().uri("/images/logo.png").body(()).unwrap();
    let mut stream = proxy
        .get(&request, OrderedSink { log: Arc::new(Mutex::new(Vec::new())) })
        .unwrap();
    while stream.next().await.is_some() {}

    // Leading separators are stripped, including repeated ones.
    let mut stream = proxy.create_read_stream("//images/logo.png").unwrap();
    while stream.next().await.is_some() {}

    let keys = keys.lock().unwrap();
    assert_eq!(keys.as_slice(), ["images/logo.png", "images/logo.png"]);
}

#[tokio::test]
async fn test_remote_error_is_a_stream_item_not_a_sink_write() {
    let proxy = ready_proxy(ProxyConfig::new("assets"), Arc::new(BrokenStore)).await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let request = Request::builder().uri("/missing").body(()).unwrap();
    let mut stream = proxy
        .get(&request, OrderedSink { log: Arc::clone(&log) })
        .unwrap();

    let item = stream.next().await.unwrap();
    assert!(matches!(item, Err(ProxyError::RemoteError(_))));
    assert!(stream.next().await.is_none());
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_health_check_stream_skips_transform() {
    let store = Arc::new(StaticStore::new(vec![Bytes::from("x")], upstream_headers()));
    let config = ProxyConfig::new("assets").with_response_headers(|mut headers| {
        headers.insert("x-proxy", "1".parse().unwrap());
        headers
    });
    let proxy = ready_proxy(config, store).await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut stream = proxy
        .health_check_stream(OrderedSink { log: Arc::clone(&log) })
        .unwrap();
    while stream.next().await.is_some() {}

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    match &log[0] {
        Observation::Head(status, headers) => {
            assert_eq!(*status, StatusCode::OK);
            assert_eq!(headers.get("x-amz-bucket-region").unwrap(), "eu-west-1");
            // Probe responses are relayed raw.
            assert!(headers.get("x-proxy").is_none());
        }
        other => panic!("expected head write, got {:?}", other),
    }
}
