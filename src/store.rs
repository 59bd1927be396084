//! Remote Store Module
//!
//! The narrow seam between the proxy core and the object-store transport.
//! The core only ever consumes a bucket reachability probe and a streaming
//! object fetch; everything else the transport does (signing, pooling,
//! retries, TLS) stays behind this trait. [`S3RemoteStore`] is the AWS SDK
//! backed implementation; callers with a preconfigured SDK client or a
//! different backend can inject their own implementation through
//! [`S3Proxy::init_with`].
//!
//! [`S3Proxy::init_with`]: crate::proxy::S3Proxy::init_with

use crate::config::ClientOptions;
use crate::{ProxyError, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::head_bucket::HeadBucketOutput;
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::Stream;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, StatusCode};
use std::pin::Pin;
use std::time::{Duration, UNIX_EPOCH};
use tracing::debug;

/// Boxed byte stream of one remote object's body.
pub type ObjectBody = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Result of a bucket reachability probe.
#[derive(Debug, Clone)]
pub struct BucketStatus {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// One fetched object: response status, response headers, and the lazily
/// consumed body stream.
pub struct RemoteObject {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ObjectBody,
}

/// Capability the proxy core requires from an object-store transport.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Lightweight existence/reachability probe for the configured bucket.
    async fn head_bucket(&self) -> Result<BucketStatus>;

    /// Fetch one object as a byte stream. The returned status and headers
    /// are available before any body data is consumed.
    async fn get_object(&self, key: &str) -> Result<RemoteObject>;
}

/// AWS S3 implementation of [`RemoteStore`].
pub struct S3RemoteStore {
    client: Client,
    bucket: String,
}

impl S3RemoteStore {
    /// Build an SDK client from the enumerated options and the ambient AWS
    /// environment (credentials chain, default region, and so on).
    pub async fn connect(bucket: impl Into<String>, options: &ClientOptions) -> Self {
        if !options.extra.is_empty() {
            let keys: Vec<&str> = options.extra.keys().map(String::as_str).collect();
            debug!(?keys, "extra client options are not used by the AWS backend");
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &options.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &options.profile {
            loader = loader.profile_name(profile.clone());
        }
        if let Some(endpoint) = &options.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }
        if let Some(timeout) = options.request_timeout {
            loader = loader.timeout_config(
                aws_config::timeout::TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .build(),
            );
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if options.force_path_style {
            builder = builder.force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.into(),
        }
    }

    /// Wrap an existing SDK client.
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl RemoteStore for S3RemoteStore {
    async fn head_bucket(&self) -> Result<BucketStatus> {
        debug!(bucket = %self.bucket, "issuing HeadBucket probe");
        let output = self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| map_sdk_error("HeadBucket", e))?;

        Ok(BucketStatus {
            status: StatusCode::OK,
            headers: head_bucket_headers(&output),
        })
    }

    async fn get_object(&self, key: &str) -> Result<RemoteObject> {
        debug!(bucket = %self.bucket, key = %key, "issuing GetObject");
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetObject", e))?;

        let headers = object_headers(&output);
        Ok(RemoteObject {
            status: StatusCode::OK,
            headers,
            body: into_body(output.body),
        })
    }
}

/// Translate an SDK failure into the proxy error taxonomy.
fn map_sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> ProxyError
where
    E: std::error::Error,
{
    match err {
        SdkError::TimeoutError(_) => {
            ProxyError::TimeoutError(format!("{} timed out", operation))
        }
        SdkError::DispatchFailure(failure) => ProxyError::ConnectionError(format!(
            "{} could not be dispatched: {:?}",
            operation, failure
        )),
        SdkError::ServiceError(context) => {
            ProxyError::RemoteError(format!("{} failed: {}", operation, context.err()))
        }
        SdkError::ResponseError(_) => {
            ProxyError::HttpError(format!("{} returned an unreadable response", operation))
        }
        SdkError::ConstructionFailure(_) => {
            ProxyError::HttpError(format!("{} request could not be constructed", operation))
        }
        _ => ProxyError::HttpError(format!("{} failed", operation)),
    }
}

fn into_body(body: ByteStream) -> ObjectBody {
    Box::pin(futures::stream::unfold(Some(body), |state| async move {
        let mut body = state?;
        match body.try_next().await {
            Ok(Some(chunk)) => Some((Ok(chunk), Some(body))),
            Ok(None) => None,
            // Terminal: the body is dropped so the stream fuses after the error.
            Err(error) => Some((
                Err(ProxyError::HttpError(format!(
                    "object body read failed: {}",
                    error
                ))),
                None,
            )),
        }
    }))
}

/// Reassemble response headers from the typed GetObject output.
fn object_headers(output: &GetObjectOutput) -> HeaderMap {
    let mut headers = HeaderMap::new();

    insert_str(&mut headers, hyper::header::CONTENT_TYPE, output.content_type());
    if let Some(length) = output.content_length() {
        insert_string(&mut headers, hyper::header::CONTENT_LENGTH, length.to_string());
    }
    insert_str(&mut headers, hyper::header::ETAG, output.e_tag());
    if let Some(modified) = output.last_modified() {
        if let Some(value) = http_date(modified) {
            headers.insert(hyper::header::LAST_MODIFIED, value);
        }
    }
    insert_str(&mut headers, hyper::header::CACHE_CONTROL, output.cache_control());
    insert_str(&mut headers, hyper::header::CONTENT_ENCODING, output.content_encoding());
    insert_str(&mut headers, hyper::header::CONTENT_LANGUAGE, output.content_language());
    insert_str(
        &mut headers,
        hyper::header::CONTENT_DISPOSITION,
        output.content_disposition(),
    );
    insert_str(&mut headers, hyper::header::ACCEPT_RANGES, output.accept_ranges());
    insert_str(&mut headers, hyper::header::CONTENT_RANGE, output.content_range());
    if let Some(version) = output.version_id() {
        insert_str(
            &mut headers,
            HeaderName::from_static("x-amz-version-id"),
            Some(version),
        );
    }

    if let Some(metadata) = output.metadata() {
        for (name, value) in metadata {
            let name = HeaderName::try_from(format!("x-amz-meta-{}", name));
            let value = HeaderValue::try_from(value.as_str());
            if let (Ok(name), Ok(value)) = (name, value) {
                headers.insert(name, value);
            }
        }
    }

    headers
}

fn head_bucket_headers(output: &HeadBucketOutput) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_str(
        &mut headers,
        HeaderName::from_static("x-amz-bucket-region"),
        output.bucket_region(),
    );
    headers
}

fn insert_str(headers: &mut HeaderMap, name: HeaderName, value: Option<&str>) {
    if let Some(value) = value {
        if let Ok(value) = HeaderValue::try_from(value) {
            headers.insert(name, value);
        }
    }
}

fn insert_string(headers: &mut HeaderMap, name: HeaderName, value: String) {
    if let Ok(value) = HeaderValue::try_from(value) {
        headers.insert(name, value);
    }
}

fn http_date(value: &DateTime) -> Option<HeaderValue> {
    let secs = u64::try_from(value.secs()).ok()?;
    let time = UNIX_EPOCH + Duration::from_secs(secs);
    HeaderValue::try_from(httpdate::fmt_http_date(time)).ok()
}
