//! HTTP handling of admission reviews

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Response, StatusCode};
use injector_core::{InjectorError, PatchEngine};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

use crate::admission::{assemble, encode_review, AdmissionPolicy, Outcome};
use crate::metrics::AdmissionMetrics;

/// Path the webhook configuration points the API server at
pub const MUTATE_PATH: &str = "/mutate";

/// Largest AdmissionReview body accepted on `/mutate`
pub const MAX_REVIEW_BYTES: usize = 4 * 1024 * 1024;

/// Answers admission reviews and the operational endpoints
pub struct WebhookHandler {
    engine: PatchEngine,
    policy: AdmissionPolicy,
    metrics: AdmissionMetrics,
}

impl WebhookHandler {
    pub fn new(engine: PatchEngine, policy: AdmissionPolicy, metrics: AdmissionMetrics) -> Self {
        Self {
            engine,
            policy,
            metrics,
        }
    }

    pub fn metrics(&self) -> &AdmissionMetrics {
        &self.metrics
    }

    /// Route an HTTP request
    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        debug!("{} {}", method, path);

        let response = match (&method, path.as_str()) {
            (&Method::POST, MUTATE_PATH) => self.handle_mutate(req).await,
            (&Method::GET, "/healthz") => text_response(StatusCode::OK, "OK\n"),
            (&Method::GET, "/metrics") => match self.metrics.gather() {
                Ok(text) => Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, "text/plain; version=0.0.4")
                    .body(Full::new(Bytes::from(text)))
                    .unwrap_or_else(|_| internal_error()),
                Err(e) => {
                    warn!(error = %e, "Failed to gather metrics");
                    internal_error()
                }
            },
            _ => text_response(StatusCode::NOT_FOUND, "Not Found\n"),
        };

        Ok(response)
    }

    async fn handle_mutate<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if !is_json {
            return text_response(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Content-Type must be application/json\n",
            );
        }

        let body = match Limited::new(req.into_body(), MAX_REVIEW_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                warn!(limit = MAX_REVIEW_BYTES, "Admission review body too large");
                return text_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large\n");
            }
            Err(e) => {
                debug!("Failed to read request body: {}", e);
                return text_response(StatusCode::BAD_REQUEST, "Failed to read request body\n");
            }
        };

        let review: AdmissionReview<DynamicObject> = match serde_json::from_slice(&body) {
            Ok(review) => review,
            Err(e) => {
                warn!(error = %e, "Failed to decode admission review");
                return text_response(
                    StatusCode::BAD_REQUEST,
                    &format!("Invalid admission review: {}\n", e),
                );
            }
        };

        let review = self.review(review).await;
        match encode_review(&review) {
            Ok(bytes) => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(bytes)))
                .unwrap_or_else(|_| internal_error()),
            Err(e) => {
                warn!(error = %e, "Failed to encode admission review");
                internal_error()
            }
        }
    }

    /// Answer a decoded admission review
    pub async fn review(&self, review: AdmissionReview<DynamicObject>) -> AdmissionReview<DynamicObject> {
        let request: AdmissionRequest<DynamicObject> = match review.try_into() {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Admission review carries no request");
                return AdmissionResponse::invalid(e.to_string()).into_review();
            }
        };

        let start = Instant::now();
        let span = info_span!("admission", uid = %request.uid, namespace = ?request.namespace);
        let (response, outcome) = self.mutate(&request).instrument(span).await;
        self.metrics.observe(outcome, start.elapsed());

        response.into_review()
    }

    /// Compute the admission response for one request
    pub async fn mutate(&self, request: &AdmissionRequest<DynamicObject>) -> (AdmissionResponse, Outcome) {
        let response = AdmissionResponse::from(request);

        if request.kind.kind != "Pod" {
            debug!(kind = %request.kind.kind, "Not a pod, allowing unchanged");
            return (response, Outcome::Unchanged);
        }

        if !matches!(request.operation, Operation::Create) {
            debug!(operation = ?request.operation, "Not a create, allowing unchanged");
            return (response, Outcome::Unchanged);
        }

        let Some(pod) = &request.object else {
            debug!("No pod object in request, allowing unchanged");
            return (response, Outcome::Unchanged);
        };

        let namespace = request.namespace.as_deref().unwrap_or_default();
        let result = match serde_json::to_vec(pod) {
            Ok(raw) => self.engine.compute_patch(&raw, namespace).await,
            Err(e) => Err(InjectorError::Serialization(e)),
        };

        if let Err(e) = &result {
            self.metrics.observe_error(e.kind());
        }

        assemble(response, result, &self.policy)
    }
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| internal_error())
}

fn internal_error() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from("Internal Server Error\n")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::tests::request;
    use injector_core::{NetworkDefinitionLookup, NetworkResolver};
    use std::sync::Arc;

    struct NoNetworks;

    #[async_trait::async_trait]
    impl NetworkDefinitionLookup for NoNetworks {
        async fn lookup(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> Result<Option<injector_api::NetworkAttachmentDefinition>, injector_core::LookupError> {
            Ok(None)
        }
    }

    fn handler() -> WebhookHandler {
        let engine = PatchEngine::new(NetworkResolver::new(Arc::new(NoNetworks)));
        WebhookHandler::new(engine, AdmissionPolicy::default(), AdmissionMetrics::new().unwrap())
    }

    fn get(path: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = handler().handle(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "OK\n");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let handler = handler();
        handler.metrics().observe(Outcome::Unchanged, std::time::Duration::from_millis(1));
        let response = handler.handle(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("admission_requests_total"));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let response = handler().handle(get("/validate")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mutate_requires_json() {
        let req = Request::builder()
            .method(Method::POST)
            .uri(MUTATE_PATH)
            .header(CONTENT_TYPE, "text/plain")
            .body(Full::new(Bytes::from("{}")))
            .unwrap();
        let response = handler().handle(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_mutate_rejects_garbage() {
        let req = Request::builder()
            .method(Method::POST)
            .uri(MUTATE_PATH)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from("not a review")))
            .unwrap();
        let response = handler().handle(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mutate_rejects_oversized_body() {
        let req = Request::builder()
            .method(Method::POST)
            .uri(MUTATE_PATH)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(vec![b' '; MAX_REVIEW_BYTES + 1])))
            .unwrap();
        let response = handler().handle(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_pod_without_networks_is_unchanged() {
        let (response, outcome) = handler().mutate(&request()).await;
        assert_eq!(outcome, Outcome::Unchanged);
        assert!(response.allowed);
    }

    #[tokio::test]
    async fn test_non_pod_is_unchanged() {
        let mut req = request();
        req.kind.kind = "Deployment".to_string();
        let (_, outcome) = handler().mutate(&req).await;
        assert_eq!(outcome, Outcome::Unchanged);
    }
}
