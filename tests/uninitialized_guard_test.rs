//! Every streaming entry point must fail synchronously, without any
//! network activity, until a client has been attached by init.

use hyper::{HeaderMap, Request, StatusCode};
use s3proxy::{ProxyConfig, ProxyError, ProxyState, ResponseSink, S3Proxy};

struct NullSink;

impl ResponseSink for NullSink {
    fn write_head(&mut self, _status: StatusCode, _headers: &HeaderMap) {}
}

fn unconfigured_proxy() -> S3Proxy {
    S3Proxy::new(ProxyConfig::new("assets")).unwrap()
}

#[test]
fn test_create_read_stream_guard() {
    let proxy = unconfigured_proxy();
    assert_eq!(proxy.state(), ProxyState::Unconfigured);
    assert!(matches!(
        proxy.create_read_stream("/images/logo.png").unwrap_err(),
        ProxyError::Uninitialized
    ));
}

#[test]
fn test_get_guard() {
    let proxy = unconfigured_proxy();
    let request = Request::builder().uri("/images/logo.png").body(()).unwrap();
    assert!(matches!(
        proxy.get(&request, NullSink).unwrap_err(),
        ProxyError::Uninitialized
    ));
}

#[test]
fn test_head_guard() {
    let proxy = unconfigured_proxy();
    let request = Request::builder().uri("/images/logo.png").body(()).unwrap();
    assert!(matches!(
        proxy.head(&request, NullSink).unwrap_err(),
        ProxyError::Uninitialized
    ));
}

#[test]
fn test_health_check_stream_guard() {
    let proxy = unconfigured_proxy();
    assert!(matches!(
        proxy.health_check_stream(NullSink).unwrap_err(),
        ProxyError::Uninitialized
    ));
}

#[tokio::test]
async fn test_health_check_guard() {
    let proxy = unconfigured_proxy();
    assert!(matches!(
        proxy.health_check().await.unwrap_err(),
        ProxyError::Uninitialized
    ));
}

#[test]
fn test_missing_bucket_fails_construction() {
    assert!(matches!(
        S3Proxy::new(ProxyConfig::default()).unwrap_err(),
        ProxyError::InvalidParameterList(_)
    ));
    assert!(matches!(
        S3Proxy::new(ProxyConfig::new("  ")).unwrap_err(),
        ProxyError::InvalidParameterList(_)
    ));
}
