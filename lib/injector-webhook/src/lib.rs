//! Admission webhook surface of the network resources injector
//!
//! This library provides:
//! - Packaging of computed patches into AdmissionReview responses
//! - The HTTP handler serving `/mutate`, `/healthz` and `/metrics`
//! - TLS configuration for the HTTPS listener
//! - Prometheus metrics

pub mod admission;
pub mod handler;
pub mod metrics;
pub mod tls;

pub use admission::{assemble, encode_review, AdmissionPolicy, FailurePolicy, Outcome};
pub use handler::{WebhookHandler, MAX_REVIEW_BYTES, MUTATE_PATH};
pub use metrics::AdmissionMetrics;
pub use tls::TlsServerConfig;
