//! Request header filtering for forwarded HTTP requests

use hyper::header::{
    HeaderMap, HeaderName, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TRANSFER_ENCODING, UPGRADE,
};

/// Headers removed from every forwarded (non-CONNECT) request
pub const FILTERED_HEADERS: [HeaderName; 5] = [
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    HeaderName::from_static("proxy-connection"),
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Strip proxy hop headers in place
pub fn filter_proxy_headers(headers: &mut HeaderMap) {
    for name in &FILTERED_HEADERS {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HeaderValue, ACCEPT, HOST};

    #[test]
    fn test_filter_removes_proxy_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("example.com"));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert("proxy-connection", HeaderValue::from_static("keep-alive"));
        headers.insert(PROXY_AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        headers.insert(PROXY_AUTHENTICATE, HeaderValue::from_static("Basic"));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));

        filter_proxy_headers(&mut headers);

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get(HOST).unwrap(), "example.com");
        assert_eq!(headers.get(ACCEPT).unwrap(), "*/*");
    }

    #[test]
    fn test_filter_removes_every_value() {
        let mut headers = HeaderMap::new();
        headers.append(UPGRADE, HeaderValue::from_static("h2c"));
        headers.append(UPGRADE, HeaderValue::from_static("websocket"));
        headers.append("X-Custom", HeaderValue::from_static("kept"));

        filter_proxy_headers(&mut headers);

        assert!(headers.get(UPGRADE).is_none());
        assert_eq!(headers.get("x-custom").unwrap(), "kept");
    }
}
