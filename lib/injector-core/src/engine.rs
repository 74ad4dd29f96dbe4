//! Entry point tying parsing, resolution and patch building together

use injector_api::NETWORKS_ANNOTATION;
use tracing::{debug, info};

use crate::annotation::parse_networks;
use crate::patch::{build_patch, PatchOperation, PodSpecView};
use crate::resolver::NetworkResolver;
use crate::resources::MergePolicy;
use crate::{InjectorError, Result};

/// Namespace used when neither the request nor the pod carries one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Computes resource patches for pods. Holds no per-request state and can be
/// shared between connections.
#[derive(Clone)]
pub struct PatchEngine {
    resolver: NetworkResolver,
    policy: MergePolicy,
}

impl PatchEngine {
    pub fn new(resolver: NetworkResolver) -> Self {
        Self {
            resolver,
            policy: MergePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Compute the patch for a raw pod object.
    ///
    /// `namespace` is the admission request namespace; when empty the pod's own
    /// namespace is used. Either the whole patch is returned or an error, never
    /// a partial patch.
    pub async fn compute_patch(&self, pod_json: &[u8], namespace: &str) -> Result<Vec<PatchOperation>> {
        let pod: PodSpecView = serde_json::from_slice(pod_json).map_err(InjectorError::MalformedPod)?;

        let namespace = if namespace.is_empty() {
            pod.metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
        } else {
            namespace
        };

        let networks = parse_networks(pod.annotation(NETWORKS_ANNOTATION), namespace)?;
        if networks.is_empty() {
            debug!(namespace = %namespace, "Pod requests no networks");
            return Ok(Vec::new());
        }

        let resources = self.resolver.resolve_all(&networks).await?;
        let ops = build_patch(&pod, &resources, self.policy);

        info!(
            namespace = %namespace,
            networks = networks.len(),
            resources = resources.len(),
            patch_ops = ops.len(),
            "Computed network resource patch"
        );

        Ok(ops)
    }
}
