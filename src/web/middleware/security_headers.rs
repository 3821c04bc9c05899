//! Response hardening headers for a JSON-only API.
//!
//! The registrar never renders HTML, so the policy is fixed: no framing, no
//! sniffing, no active content. `Strict-Transport-Security` is only sent when
//! the TLS-terminating proxy reports `X-Forwarded-Proto: https`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use tower::{Layer, Service};

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// The fixed header set plus the HSTS value for HTTPS requests.
#[derive(Debug)]
struct Policy {
    always: Vec<(HeaderName, HeaderValue)>,
    hsts: HeaderValue,
}

impl Policy {
    fn json_api() -> Self {
        Self {
            always: vec![
                (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
                (
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ),
                (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
                (
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
                ),
                (
                    HeaderName::from_static("cross-origin-resource-policy"),
                    HeaderValue::from_static("same-site"),
                ),
            ],
            hsts: HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        }
    }

    fn apply(&self, headers: &mut HeaderMap, https: bool) {
        for (name, value) in &self.always {
            headers.insert(name.clone(), value.clone());
        }
        if https {
            headers.insert(header::STRICT_TRANSPORT_SECURITY, self.hsts.clone());
        }
    }
}

fn forwarded_https(headers: &HeaderMap) -> bool {
    headers
        .get(FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        // Proxy chains append, e.g. "https, http"; the first hop is the client's.
        .and_then(|v| v.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

#[derive(Clone)]
pub struct SecurityHeadersLayer {
    policy: Arc<Policy>,
}

impl SecurityHeadersLayer {
    pub fn json_api() -> Self {
        Self {
            policy: Arc::new(Policy::json_api()),
        }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeaders<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeaders {
            inner,
            policy: Arc::clone(&self.policy),
        }
    }
}

#[derive(Clone)]
pub struct SecurityHeaders<S> {
    inner: S,
    policy: Arc<Policy>,
}

impl<S, B> Service<Request> for SecurityHeaders<S>
where
    S: Service<Request, Response = Response<B>> + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response<B>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<B>, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let https = forwarded_https(req.headers());
        let policy = Arc::clone(&self.policy);
        let future = self.inner.call(req);

        Box::pin(async move {
            let mut response = future.await?;
            policy.apply(response.headers_mut(), https);
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use std::convert::Infallible;
    use tower::ServiceExt;

    async fn respond(req: Request) -> Response {
        let svc = SecurityHeadersLayer::json_api().layer(tower::service_fn(
            |_req: Request| async { Ok::<_, Infallible>(Response::new(Body::empty())) },
        ));
        svc.oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn plain_http_gets_no_hsts() {
        let resp = respond(Request::new(Body::empty())).await;
        assert_eq!(resp.headers()[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(
            resp.headers()[header::CONTENT_SECURITY_POLICY],
            "default-src 'none'; frame-ancestors 'none'"
        );
        assert!(!resp.headers().contains_key(header::STRICT_TRANSPORT_SECURITY));
    }

    #[tokio::test]
    async fn forwarded_https_adds_hsts() {
        let req = Request::builder()
            .header(FORWARDED_PROTO, "HTTPS, http")
            .body(Body::empty())
            .unwrap();
        let resp = respond(req).await;
        assert!(resp.headers().contains_key(header::STRICT_TRANSPORT_SECURITY));
    }

    #[test]
    fn first_forwarded_hop_decides() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_PROTO, HeaderValue::from_static("http, https"));
        assert!(!forwarded_https(&headers));
    }
}
