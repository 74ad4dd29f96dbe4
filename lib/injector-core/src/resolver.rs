//! Resolution of network references to device resource names

use async_trait::async_trait;
use futures::future::try_join_all;
use injector_api::NetworkAttachmentDefinition;
use kube::{Api, Client};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::annotation::NetworkReference;
use crate::{InjectorError, LookupError, Result};

/// Default bound on a single network definition lookup
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of NetworkAttachmentDefinitions.
///
/// `Ok(None)` means the definition does not exist.
#[async_trait]
pub trait NetworkDefinitionLookup: Send + Sync {
    async fn lookup(
        &self,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<Option<NetworkAttachmentDefinition>, LookupError>;
}

/// Lookup backed by the Kubernetes API server
pub struct KubeNetworkLookup {
    client: Client,
}

impl KubeNetworkLookup {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NetworkDefinitionLookup for KubeNetworkLookup {
    async fn lookup(
        &self,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<Option<NetworkAttachmentDefinition>, LookupError> {
        let api: Api<NetworkAttachmentDefinition> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

/// Resolves network references through an injected lookup
#[derive(Clone)]
pub struct NetworkResolver {
    lookup: Arc<dyn NetworkDefinitionLookup>,
    timeout: Duration,
}

impl NetworkResolver {
    pub fn new(lookup: Arc<dyn NetworkDefinitionLookup>) -> Self {
        Self {
            lookup,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resource name for one network, `None` when the network is unknown or
    /// carries no resource name
    pub async fn resolve(&self, reference: &NetworkReference) -> Result<Option<String>> {
        let lookup = self.lookup.lookup(&reference.namespace, &reference.name);
        let definition = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(result) => result.map_err(|source| InjectorError::Resolution {
                network: reference.key(),
                source,
            })?,
            Err(_) => {
                return Err(InjectorError::Resolution {
                    network: reference.key(),
                    source: LookupError::Timeout(self.timeout),
                })
            }
        };

        let Some(definition) = definition else {
            debug!(network = %reference.key(), "Network attachment definition not found");
            return Ok(None);
        };

        let resource = definition.resource_name().map(str::to_string);
        match &resource {
            Some(resource) => {
                debug!(network = %reference.key(), resource = %resource, "Resolved network resource")
            }
            None => debug!(network = %reference.key(), "Network has no resource name"),
        }
        Ok(resource)
    }

    /// Resource names for all references, in reference order.
    ///
    /// Each distinct network is looked up once and lookups run concurrently.
    /// A network referenced twice contributes its resource twice.
    pub async fn resolve_all(&self, references: &[NetworkReference]) -> Result<Vec<String>> {
        let mut unique: Vec<&NetworkReference> = Vec::new();
        for reference in references {
            if !unique
                .iter()
                .any(|u| u.namespace == reference.namespace && u.name == reference.name)
            {
                unique.push(reference);
            }
        }

        let resolved = try_join_all(unique.iter().map(|r| self.resolve(r))).await?;
        let by_network: HashMap<(&str, &str), Option<String>> = unique
            .iter()
            .map(|r| (r.namespace.as_str(), r.name.as_str()))
            .zip(resolved)
            .collect();

        Ok(references
            .iter()
            .filter_map(|r| {
                by_network
                    .get(&(r.namespace.as_str(), r.name.as_str()))
                    .cloned()
                    .flatten()
            })
            .collect())
    }
}
