//! JSON Patch generation for pod containers

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::resources::{merge, MergePolicy, ResourceMap};

/// Read-only projection of the parts of a Pod the injector looks at
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PodSpecView {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpecFields,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PodSpecFields {
    #[serde(default)]
    pub containers: Vec<ContainerView>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContainerView {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resources: Option<ResourcesView>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResourcesView {
    #[serde(default)]
    pub requests: Option<ResourceMap>,
    #[serde(default)]
    pub limits: Option<ResourceMap>,
}

impl PodSpecView {
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }
}

/// A single RFC 6902 operation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: "add".to_string(),
            path: path.into(),
            value,
        }
    }
}

/// Serialize a resource map to a JSON value, keeping entry order
fn map_value(map: &ResourceMap) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect(),
    )
}

/// Build the patch adding `identifiers` to every container of the pod.
///
/// Containers are visited in order and, per container, the requests operation
/// precedes the limits operation. Containers whose maps would not change get
/// no operation.
pub fn build_patch(
    pod: &PodSpecView,
    identifiers: &[String],
    policy: MergePolicy,
) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    if identifiers.is_empty() {
        return ops;
    }

    for (idx, container) in pod.spec.containers.iter().enumerate() {
        let base = format!("/spec/containers/{}/resources", idx);

        let Some(resources) = &container.resources else {
            // No resources object to add children to; add it whole
            let requests = merge(&ResourceMap::new(), identifiers, policy);
            let limits = merge(&ResourceMap::new(), identifiers, policy);
            if requests.is_empty() && limits.is_empty() {
                continue;
            }
            let mut value = serde_json::Map::new();
            value.insert("requests".to_string(), map_value(&requests));
            value.insert("limits".to_string(), map_value(&limits));
            ops.push(PatchOperation::add(base, Value::Object(value)));
            continue;
        };

        let requests = resources.requests.clone().unwrap_or_default();
        let new_requests = merge(&requests, identifiers, policy);
        if new_requests != requests {
            ops.push(PatchOperation::add(
                format!("{}/requests", base),
                map_value(&new_requests),
            ));
        }

        let limits = resources.limits.clone().unwrap_or_default();
        let new_limits = merge(&limits, identifiers, policy);
        if new_limits != limits {
            ops.push(PatchOperation::add(
                format!("{}/limits", base),
                map_value(&new_limits),
            ));
        }
    }

    ops
}
