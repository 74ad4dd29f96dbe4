use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::RESOURCE_NAME_ANNOTATION;

/// NetworkAttachmentDefinition from the Network Plumbing Working Group - describes
/// a secondary network a pod may attach to through Multus
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "k8s.cni.cncf.io",
    version = "v1",
    kind = "NetworkAttachmentDefinition",
    plural = "network-attachment-definitions",
    shortname = "net-attach-def",
    namespaced,
    derive = "Default",
)]
pub struct NetworkAttachmentDefinitionSpec {
    /// CNI configuration as a JSON string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

impl NetworkAttachmentDefinition {
    /// Build a definition carrying only a resource name annotation
    pub fn with_resource_name(namespace: &str, name: &str, resource_name: &str) -> Self {
        let mut nad = NetworkAttachmentDefinition::new(name, NetworkAttachmentDefinitionSpec::default());
        nad.metadata.namespace = Some(namespace.to_string());
        nad.metadata.annotations = Some(BTreeMap::from([(
            RESOURCE_NAME_ANNOTATION.to_string(),
            resource_name.to_string(),
        )]));
        nad
    }

    /// Device resource name backing this network, if any.
    ///
    /// A blank annotation value is treated the same as a missing one.
    pub fn resource_name(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()?
            .get(RESOURCE_NAME_ANNOTATION)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_resource_name_present() {
        let nad = NetworkAttachmentDefinition::with_resource_name(
            "kubevirt-test-default",
            "sriov",
            "openshift.io/intel_sriov",
        );
        assert_eq!(nad.resource_name(), Some("openshift.io/intel_sriov"));
    }

    #[test]
    fn test_resource_name_missing() {
        let nad = NetworkAttachmentDefinition::new("flannel", NetworkAttachmentDefinitionSpec::default());
        assert_eq!(nad.resource_name(), None);
    }

    #[test]
    fn test_resource_name_blank() {
        let nad = NetworkAttachmentDefinition::with_resource_name("default", "sriov", "  ");
        assert_eq!(nad.resource_name(), None);
    }

    #[test]
    fn test_api_coordinates() {
        assert_eq!(NetworkAttachmentDefinition::group(&()), crate::API_GROUP);
        assert_eq!(NetworkAttachmentDefinition::version(&()), crate::API_VERSION);
        assert_eq!(NetworkAttachmentDefinition::plural(&()), "network-attachment-definitions");
    }

    #[test]
    fn test_deserialize_from_api_json() {
        let json = serde_json::json!({
            "apiVersion": "k8s.cni.cncf.io/v1",
            "kind": "NetworkAttachmentDefinition",
            "metadata": {
                "name": "sriov-net",
                "namespace": "default",
                "annotations": {
                    "k8s.v1.cni.cncf.io/resourceName": "intel.com/sriov_netdevice"
                }
            },
            "spec": {
                "config": "{\"cniVersion\":\"0.3.1\",\"type\":\"sriov\"}"
            }
        });
        let nad: NetworkAttachmentDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(nad.resource_name(), Some("intel.com/sriov_netdevice"));
        assert!(nad.spec.config.unwrap().contains("sriov"));
    }
}
