//! Packaging of computed patches into admission responses

use base64::{engine::general_purpose::STANDARD, Engine};
use injector_core::{InjectorError, PatchOperation};
use kube::core::admission::{AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{error, warn};

/// What to do with a pod when its patch cannot be computed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Reject the pod
    #[default]
    Fail,
    /// Admit the pod unmodified with a warning
    Ignore,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(FailurePolicy::Fail),
            "ignore" => Ok(FailurePolicy::Ignore),
            _ => Err(format!("Invalid failure policy: {}. Must be fail or ignore", s)),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Fail => f.write_str("fail"),
            FailurePolicy::Ignore => f.write_str("ignore"),
        }
    }
}

/// Failure policies per error class
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Unparsable pod or network annotation
    pub on_malformed_input: FailurePolicy,
    /// Network definition lookup failures and timeouts
    pub on_resolution_error: FailurePolicy,
}

impl AdmissionPolicy {
    pub fn for_error(&self, err: &InjectorError) -> FailurePolicy {
        match err {
            InjectorError::Resolution { .. } => self.on_resolution_error,
            e if e.is_malformed_input() => self.on_malformed_input,
            // Encoding failures are ours, never admit a pod we could not patch
            _ => FailurePolicy::Fail,
        }
    }
}

/// Result of one admission, used for metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Patched,
    Unchanged,
    Denied,
    Ignored,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Patched => "patched",
            Outcome::Unchanged => "unchanged",
            Outcome::Denied => "denied",
            Outcome::Ignored => "ignored",
        }
    }
}

/// Convert patch operations into the JSON Patch type carried by the response
pub fn to_json_patch(ops: &[PatchOperation]) -> Result<json_patch::Patch, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(ops)?)
}

/// Serialize a review for the API server.
///
/// kube keeps the patch as raw bytes, which serde writes as an array of
/// numbers; the wire format wants the base64 text of the JSON Patch.
pub fn encode_review(review: &AdmissionReview<DynamicObject>) -> Result<Vec<u8>, serde_json::Error> {
    let mut value = serde_json::to_value(review)?;
    let raw: Option<Vec<u8>> = value
        .pointer("/response/patch")
        .and_then(Value::as_array)
        .map(|bytes| bytes.iter().filter_map(Value::as_u64).map(|b| b as u8).collect());
    if let Some(raw) = raw {
        value["response"]["patch"] = Value::String(STANDARD.encode(raw));
    }
    serde_json::to_vec(&value)
}

/// Build the admission response for a computed patch.
///
/// `response` is the allowing response derived from the request.
pub fn assemble(
    response: AdmissionResponse,
    result: injector_core::Result<Vec<PatchOperation>>,
    policy: &AdmissionPolicy,
) -> (AdmissionResponse, Outcome) {
    let ops = match result {
        Ok(ops) => ops,
        Err(e) => return reject(response, &e, policy),
    };

    if ops.is_empty() {
        return (response, Outcome::Unchanged);
    }

    let patch = match to_json_patch(&ops) {
        Ok(patch) => patch,
        Err(e) => return reject(response, &InjectorError::Serialization(e), policy),
    };

    match response.clone().with_patch(patch) {
        Ok(response) => (response, Outcome::Patched),
        Err(e) => {
            error!(error = %e, "Failed to serialize patch");
            (
                response.deny(format!("patch serialization error: {}", e)),
                Outcome::Denied,
            )
        }
    }
}

fn reject(
    response: AdmissionResponse,
    err: &InjectorError,
    policy: &AdmissionPolicy,
) -> (AdmissionResponse, Outcome) {
    match policy.for_error(err) {
        FailurePolicy::Fail => {
            warn!(error = %err, kind = err.kind(), "Denying pod");
            (response.deny(err.to_string()), Outcome::Denied)
        }
        FailurePolicy::Ignore => {
            warn!(error = %err, kind = err.kind(), "Admitting pod without network resources");
            let mut response = response;
            response.warnings = Some(vec![format!(
                "network resources were not injected: {}",
                err
            )]);
            (response, Outcome::Ignored)
        }
    }
}
